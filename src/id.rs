//! ID generation utilities
//!
//! Session ids scope report runs and tool contexts; call ids stand in for
//! `tool_use` ids when the CLI issues a call on its own.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique session ID
///
/// Format: `session-{timestamp_ms}-{random_hex}`
/// Example: `session-1738300800123-a1b2`
pub fn generate_session_id() -> String {
    let random: u16 = rand::rng().random();
    format!("session-{}-{:04x}", now_ms(), random)
}

/// Generate a tool call ID
///
/// Format: `call-{random_hex}`
pub fn generate_call_id() -> String {
    let random: u64 = rand::rng().random();
    format!("call-{:016x}", random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_generate_session_id_format() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_call_id_format() {
        let id = generate_call_id();
        assert!(id.starts_with("call-"));
        assert_eq!(id.len(), "call-".len() + 16);
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| generate_call_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
