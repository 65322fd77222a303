//! computer tool - mouse, keyboard and screenshots on an X display
//!
//! Input is parsed into a [`ComputerAction`] up front, so validation never
//! touches the display. Execution goes through `xdotool`; screenshots are
//! taken with `scrot` and returned as base64 PNG blocks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::context::{ToolContext, ToolError};
use super::{ContentBlock, Tool, ToolInputSchema, ToolResult};
use crate::config::ComputerConfig;

const TYPING_GROUP_SIZE: usize = 50;
const TYPING_DELAY_MS: u64 = 12;
const MAX_DURATION_SECS: f64 = 100.0;

const ACTIONS_20241022: &[&str] = &[
    "key",
    "type",
    "mouse_move",
    "left_click",
    "left_click_drag",
    "right_click",
    "middle_click",
    "double_click",
    "screenshot",
    "cursor_position",
];

const ACTIONS_20250124: &[&str] = &[
    "key",
    "type",
    "mouse_move",
    "left_click",
    "left_click_drag",
    "right_click",
    "middle_click",
    "double_click",
    "screenshot",
    "cursor_position",
    "left_mouse_down",
    "left_mouse_up",
    "scroll",
    "hold_key",
    "wait",
    "triple_click",
];

/// Action set revision advertised by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputerVersion {
    V20241022,
    V20250124,
}

impl ComputerVersion {
    fn api_type(self) -> &'static str {
        match self {
            Self::V20241022 => "computer_20241022",
            Self::V20250124 => "computer_20250124",
        }
    }

    fn actions(self) -> &'static [&'static str] {
        match self {
            Self::V20241022 => ACTIONS_20241022,
            Self::V20250124 => ACTIONS_20250124,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn xdotool_button(self) -> &'static str {
        match self {
            Self::Left => "1",
            Self::Middle => "2",
            Self::Right => "3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    fn xdotool_button(self) -> &'static str {
        match self {
            Self::Up => "4",
            Self::Down => "5",
            Self::Left => "6",
            Self::Right => "7",
        }
    }
}

/// A validated UI action
#[derive(Debug, Clone, PartialEq)]
pub enum ComputerAction {
    Key { keys: String },
    Type { text: String },
    MouseMove { x: u32, y: u32 },
    Click {
        button: MouseButton,
        repeat: u8,
        coordinate: Option<(u32, u32)>,
        /// Key held down for the duration of the click
        modifier: Option<String>,
    },
    LeftClickDrag { x: u32, y: u32 },
    LeftMouseDown,
    LeftMouseUp,
    Scroll {
        direction: ScrollDirection,
        amount: u32,
        coordinate: Option<(u32, u32)>,
        modifier: Option<String>,
    },
    HoldKey { key: String, duration: Duration },
    Wait { duration: Duration },
    Screenshot,
    CursorPosition,
}

impl ComputerAction {
    /// Parse and validate raw tool input for one action set revision and a
    /// display of the given size
    pub fn parse(input: &Value, version: ComputerVersion, width: u32, height: u32) -> Result<Self, ToolError> {
        let action = input["action"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidInput("action is required".to_string()))?;
        if !version.actions().contains(&action) {
            return Err(ToolError::InvalidInput(format!(
                "Invalid action: {} is not supported by {}",
                action,
                version.api_type()
            )));
        }
        let coordinate = parse_coordinate(input.get("coordinate"), width, height)?;
        let text = input["text"].as_str().map(str::to_string);

        let require_text = || {
            text.clone()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ToolError::InvalidInput(format!("text is required for {}", action)))
        };
        let require_coordinate = || {
            coordinate.ok_or_else(|| ToolError::InvalidInput(format!("coordinate is required for {}", action)))
        };
        let reject_coordinate = || match coordinate {
            Some(_) => Err(ToolError::InvalidInput(format!("coordinate is not accepted for {}", action))),
            None => Ok(()),
        };

        let click = |button, repeat| -> Result<Self, ToolError> {
            // 20241022 clicks act at the current cursor position only
            if version == ComputerVersion::V20241022 && (coordinate.is_some() || text.is_some()) {
                return Err(ToolError::InvalidInput(format!(
                    "coordinate and text are not accepted for {} in {}",
                    action,
                    version.api_type()
                )));
            }
            Ok(ComputerAction::Click {
                button,
                repeat,
                coordinate,
                modifier: text.clone(),
            })
        };

        let parsed = match action {
            "key" => {
                reject_coordinate()?;
                Self::Key { keys: require_text()? }
            }
            "type" => {
                reject_coordinate()?;
                Self::Type { text: require_text()? }
            }
            "mouse_move" => {
                let (x, y) = require_coordinate()?;
                Self::MouseMove { x, y }
            }
            "left_click_drag" => {
                let (x, y) = require_coordinate()?;
                Self::LeftClickDrag { x, y }
            }
            "left_click" => click(MouseButton::Left, 1)?,
            "right_click" => click(MouseButton::Right, 1)?,
            "middle_click" => click(MouseButton::Middle, 1)?,
            "double_click" => click(MouseButton::Left, 2)?,
            "triple_click" => click(MouseButton::Left, 3)?,
            "left_mouse_down" => {
                reject_coordinate()?;
                Self::LeftMouseDown
            }
            "left_mouse_up" => {
                reject_coordinate()?;
                Self::LeftMouseUp
            }
            "scroll" => {
                let direction = match input["scroll_direction"].as_str() {
                    Some("up") => ScrollDirection::Up,
                    Some("down") => ScrollDirection::Down,
                    Some("left") => ScrollDirection::Left,
                    Some("right") => ScrollDirection::Right,
                    other => {
                        return Err(ToolError::InvalidInput(format!(
                            "scroll_direction must be one of up, down, left, right (got {:?})",
                            other
                        )));
                    }
                };
                let amount = input["scroll_amount"]
                    .as_u64()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ToolError::InvalidInput("scroll_amount must be a positive integer".to_string()))?;
                let amount = u32::try_from(amount)
                    .map_err(|_| ToolError::InvalidInput(format!("scroll_amount {} is too large", amount)))?;
                Self::Scroll {
                    direction,
                    amount,
                    coordinate,
                    modifier: text.clone(),
                }
            }
            "hold_key" => {
                reject_coordinate()?;
                Self::HoldKey {
                    key: require_text()?,
                    duration: parse_duration(&input["duration"])?,
                }
            }
            "wait" => Self::Wait {
                duration: parse_duration(&input["duration"])?,
            },
            "screenshot" => {
                reject_coordinate()?;
                Self::Screenshot
            }
            "cursor_position" => {
                reject_coordinate()?;
                Self::CursorPosition
            }
            other => return Err(ToolError::InvalidInput(format!("Invalid action: {}", other))),
        };
        Ok(parsed)
    }

    /// Whether a screenshot should follow the action
    fn changes_display(&self) -> bool {
        !matches!(self, Self::Screenshot | Self::CursorPosition)
    }

    /// xdotool arguments for single-command actions
    fn xdotool_args(&self) -> Vec<String> {
        match self {
            Self::Key { keys } => vec!["key".into(), "--".into(), keys.clone()],
            Self::MouseMove { x, y } => mousemove(*x, *y),
            Self::Click {
                button,
                repeat,
                coordinate,
                modifier,
            } => {
                let mut args = coordinate.map(|(x, y)| mousemove(x, y)).unwrap_or_default();
                if let Some(key) = modifier {
                    args.extend(["keydown".into(), key.clone()]);
                }
                args.push("click".into());
                if *repeat > 1 {
                    args.extend(["--repeat".into(), repeat.to_string(), "--delay".into(), "10".into()]);
                }
                args.push(button.xdotool_button().into());
                if let Some(key) = modifier {
                    args.extend(["keyup".into(), key.clone()]);
                }
                args
            }
            Self::LeftClickDrag { x, y } => {
                let mut args = vec!["mousedown".into(), "1".into()];
                args.extend(mousemove(*x, *y));
                args.extend(["mouseup".into(), "1".into()]);
                args
            }
            Self::LeftMouseDown => vec!["mousedown".into(), "1".into()],
            Self::LeftMouseUp => vec!["mouseup".into(), "1".into()],
            Self::Scroll {
                direction,
                amount,
                coordinate,
                modifier,
            } => {
                let mut args = coordinate.map(|(x, y)| mousemove(x, y)).unwrap_or_default();
                if let Some(key) = modifier {
                    args.extend(["keydown".into(), key.clone()]);
                }
                args.extend([
                    "click".into(),
                    "--repeat".into(),
                    amount.to_string(),
                    direction.xdotool_button().into(),
                ]);
                if let Some(key) = modifier {
                    args.extend(["keyup".into(), key.clone()]);
                }
                args
            }
            Self::CursorPosition => vec!["getmouselocation".into(), "--shell".into()],
            Self::Type { .. } | Self::HoldKey { .. } | Self::Wait { .. } | Self::Screenshot => Vec::new(),
        }
    }
}

fn mousemove(x: u32, y: u32) -> Vec<String> {
    vec!["mousemove".into(), "--sync".into(), x.to_string(), y.to_string()]
}

fn parse_coordinate(value: Option<&Value>, width: u32, height: u32) -> Result<Option<(u32, u32)>, ToolError> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let invalid = || ToolError::InvalidInput(format!("{} must be a tuple of non-negative ints", value));
    let pair = value.as_array().filter(|a| a.len() == 2).ok_or_else(invalid)?;
    let x = pair[0].as_u64().ok_or_else(invalid)?;
    let y = pair[1].as_u64().ok_or_else(invalid)?;

    if x >= u64::from(width) || y >= u64::from(height) {
        return Err(ToolError::InvalidInput(format!(
            "Coordinate ({}, {}) is outside the display ({}x{})",
            x, y, width, height
        )));
    }
    Ok(Some((x as u32, y as u32)))
}

fn parse_duration(value: &Value) -> Result<Duration, ToolError> {
    let secs = value
        .as_f64()
        .ok_or_else(|| ToolError::InvalidInput("duration is required".to_string()))?;
    if !(0.0..=MAX_DURATION_SECS).contains(&secs) {
        return Err(ToolError::InvalidInput(format!(
            "duration must be between 0 and {} seconds",
            MAX_DURATION_SECS
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// UI control through xdotool and scrot
pub struct ComputerTool {
    version: ComputerVersion,
    config: ComputerConfig,
    /// Serializes access to the display
    ui: Mutex<()>,
}

impl ComputerTool {
    fn new(version: ComputerVersion, ctx: &ToolContext) -> Self {
        Self {
            version,
            config: ctx.config().computer.clone(),
            ui: Mutex::new(()),
        }
    }

    pub fn v20241022(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(ComputerVersion::V20241022, ctx))
    }

    pub fn v20250124(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(ComputerVersion::V20250124, ctx))
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(display) = self.config.display_number {
            cmd.env("DISPLAY", format!(":{}", display));
        }
        cmd
    }

    async fn xdotool(&self, args: &[String]) -> Result<String, ToolError> {
        log::debug!("xdotool {}", args.join(" "));
        let output = self
            .command("xdotool")
            .args(args)
            .output()
            .await
            .map_err(|e| ToolError::io("run xdotool", e))?;

        if !output.status.success() {
            return Err(ToolError::CommandFailed(format!(
                "xdotool failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn screenshot(&self) -> Result<String, ToolError> {
        let path: PathBuf = std::env::temp_dir().join(format!("screenshot_{:08x}.png", rand::random::<u32>()));
        let output = self
            .command("scrot")
            .arg("-p")
            .arg(&path)
            .output()
            .await
            .map_err(|e| ToolError::io("run scrot", e))?;
        if !output.status.success() {
            return Err(ToolError::CommandFailed(format!(
                "Failed to take screenshot: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::io("read screenshot", e))?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::warn!("Failed to remove screenshot {}: {}", path.display(), e);
        }
        Ok(BASE64.encode(bytes))
    }

    async fn perform(&self, action: &ComputerAction) -> Result<ToolResult, ToolError> {
        let _ui = self.ui.lock().await;

        let output = match action {
            ComputerAction::Screenshot => return Ok(ToolResult::image("image/png", self.screenshot().await?)),
            ComputerAction::CursorPosition => {
                let raw = self.xdotool(&action.xdotool_args()).await?;
                return Ok(ToolResult::success(parse_mouse_location(&raw)?));
            }
            ComputerAction::Type { text } => {
                let chars: Vec<char> = text.chars().collect();
                let mut out = Vec::new();
                for chunk in chars.chunks(TYPING_GROUP_SIZE) {
                    let args = vec![
                        "type".to_string(),
                        "--delay".to_string(),
                        TYPING_DELAY_MS.to_string(),
                        "--".to_string(),
                        chunk.iter().collect(),
                    ];
                    out.push(self.xdotool(&args).await?);
                }
                out.concat()
            }
            ComputerAction::HoldKey { key, duration } => {
                self.xdotool(&["keydown".to_string(), key.clone()]).await?;
                tokio::time::sleep(*duration).await;
                self.xdotool(&["keyup".to_string(), key.clone()]).await?
            }
            ComputerAction::Wait { duration } => {
                tokio::time::sleep(*duration).await;
                String::new()
            }
            other => self.xdotool(&other.xdotool_args()).await?,
        };

        let mut result = if output.is_empty() {
            ToolResult::empty()
        } else {
            ToolResult::success(output)
        };
        if action.changes_display() {
            tokio::time::sleep(Duration::from_millis(self.config.screenshot_delay_ms)).await;
            result = result.append([ContentBlock::png(self.screenshot().await?)]);
        }
        Ok(result)
    }
}

fn parse_mouse_location(raw: &str) -> Result<String, ToolError> {
    let field = |name: &str| {
        raw.lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix('='))
            .map(str::to_string)
    };
    match (field("X"), field("Y")) {
        (Some(x), Some(y)) => Ok(format!("X={},Y={}", x, y)),
        _ => Err(ToolError::CommandFailed(format!("Unexpected xdotool output: {}", raw))),
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &'static str {
        "computer"
    }

    fn schema(&self) -> ToolInputSchema {
        let mut schema = ToolInputSchema::new("computer", "Control the mouse and keyboard and take screenshots")
            .with_api_type(self.version.api_type())
            .with_option("display_width_px", self.config.display_width)
            .with_option("display_height_px", self.config.display_height)
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": self.version.actions() },
                    "text": { "type": "string" },
                    "coordinate": { "type": "array" },
                    "scroll_direction": { "type": "string" },
                    "scroll_amount": { "type": "integer" },
                    "duration": { "type": "number" }
                },
                "required": ["action"]
            }));
        if let Some(display) = self.config.display_number {
            schema = schema.with_option("display_number", display);
        }
        schema
    }

    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error> {
        if let Err(message) = self.schema().validate(&input) {
            return Ok(ToolResult::invalid_input(message));
        }
        let action = match ComputerAction::parse(
            &input,
            self.version,
            self.config.display_width,
            self.config.display_height,
        ) {
            Ok(action) => action,
            Err(e) => return Ok(e.into()),
        };
        Ok(self.perform(&action).await.unwrap_or_else(ToolResult::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolErrorKind;
    use serde_json::json;

    fn parse(input: Value) -> Result<ComputerAction, ToolError> {
        ComputerAction::parse(&input, ComputerVersion::V20250124, 1024, 768)
    }

    fn tool(version: ComputerVersion) -> ComputerTool {
        let ctx = ToolContext::new(std::env::temp_dir(), "s".to_string());
        ComputerTool::new(version, &ctx)
    }

    #[test]
    fn test_parse_key_and_type() {
        assert_eq!(
            parse(json!({"action": "key", "text": "ctrl+s"})).unwrap(),
            ComputerAction::Key { keys: "ctrl+s".to_string() }
        );
        assert!(parse(json!({"action": "type"})).is_err());
        assert!(parse(json!({"action": "type", "text": "hi", "coordinate": [1, 1]})).is_err());
    }

    #[test]
    fn test_parse_coordinates_within_display() {
        assert_eq!(
            parse(json!({"action": "mouse_move", "coordinate": [100, 200]})).unwrap(),
            ComputerAction::MouseMove { x: 100, y: 200 }
        );
        assert!(parse(json!({"action": "mouse_move", "coordinate": [1024, 0]})).is_err());
        assert!(parse(json!({"action": "mouse_move", "coordinate": [-1, 0]})).is_err());
        assert!(parse(json!({"action": "mouse_move", "coordinate": [1]})).is_err());
        assert!(parse(json!({"action": "mouse_move"})).is_err());
    }

    #[test]
    fn test_parse_click_with_modifier() {
        let action = parse(json!({"action": "left_click", "coordinate": [5, 6], "text": "shift"})).unwrap();
        assert_eq!(
            action.xdotool_args(),
            vec!["mousemove", "--sync", "5", "6", "keydown", "shift", "click", "1", "keyup", "shift"]
        );
    }

    #[test]
    fn test_triple_click_args() {
        let action = parse(json!({"action": "triple_click"})).unwrap();
        assert_eq!(action.xdotool_args(), vec!["click", "--repeat", "3", "--delay", "10", "1"]);
    }

    #[test]
    fn test_parse_scroll() {
        let action = parse(json!({
            "action": "scroll",
            "scroll_direction": "down",
            "scroll_amount": 3
        }))
        .unwrap();
        assert_eq!(action.xdotool_args(), vec!["click", "--repeat", "3", "5"]);

        assert!(parse(json!({"action": "scroll", "scroll_direction": "sideways", "scroll_amount": 3})).is_err());
        assert!(parse(json!({"action": "scroll", "scroll_direction": "up", "scroll_amount": 0})).is_err());
        assert!(
            parse(json!({"action": "scroll", "scroll_direction": "up", "scroll_amount": 4_294_967_296u64})).is_err()
        );
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(
            parse(json!({"action": "wait", "duration": 0.5})).unwrap(),
            ComputerAction::Wait {
                duration: Duration::from_millis(500)
            }
        );
        assert!(parse(json!({"action": "wait", "duration": 1000})).is_err());
        assert!(parse(json!({"action": "hold_key", "duration": 1})).is_err());
    }

    #[test]
    fn test_query_actions_skip_screenshot() {
        assert!(!parse(json!({"action": "screenshot"})).unwrap().changes_display());
        assert!(!parse(json!({"action": "cursor_position"})).unwrap().changes_display());
        assert!(parse(json!({"action": "left_mouse_down"})).unwrap().changes_display());
    }

    #[test]
    fn test_parse_mouse_location() {
        let raw = "X=120\nY=45\nSCREEN=0\nWINDOW=123";
        assert_eq!(parse_mouse_location(raw).unwrap(), "X=120,Y=45");
        assert!(parse_mouse_location("garbage").is_err());
    }

    #[test]
    fn test_schema_options() {
        let schema = tool(ComputerVersion::V20250124).schema();
        let params = schema.to_api_params();
        assert_eq!(params["type"], "computer_20250124");
        assert_eq!(params["display_width_px"], 1024);
        assert_eq!(params["display_height_px"], 768);
        assert!(params.get("display_number").is_none());
    }

    #[tokio::test]
    async fn test_old_version_rejects_new_actions() {
        let result = tool(ComputerVersion::V20241022)
            .invoke(json!({"action": "triple_click"}))
            .await
            .unwrap();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidInput));
    }

    #[test]
    fn test_old_version_clicks_take_no_coordinate_or_modifier() {
        let old = |input: Value| ComputerAction::parse(&input, ComputerVersion::V20241022, 1024, 768);

        assert!(matches!(
            old(json!({"action": "left_click"})).unwrap(),
            ComputerAction::Click { coordinate: None, modifier: None, .. }
        ));
        assert!(old(json!({"action": "triple_click"})).is_err());
        for action in ["left_click", "right_click", "middle_click", "double_click"] {
            assert!(old(json!({"action": action, "coordinate": [10, 10]})).is_err(), "{}", action);
            assert!(old(json!({"action": action, "text": "shift"})).is_err(), "{}", action);
        }
    }

    #[tokio::test]
    async fn test_old_version_rejects_click_modifier() {
        let result = tool(ComputerVersion::V20241022)
            .invoke(json!({"action": "left_click", "coordinate": [10, 10], "text": "shift"}))
            .await
            .unwrap();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_invalid_coordinate_is_invalid_input() {
        let result = tool(ComputerVersion::V20250124)
            .invoke(json!({"action": "left_click", "coordinate": [5000, 5000]}))
            .await
            .unwrap();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidInput));
        assert!(result.text().contains("outside the display"));
    }
}
