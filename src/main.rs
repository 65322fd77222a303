use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

use toolharness::cli::Cli;
use toolharness::cli::commands::Commands;
use toolharness::config::Config;
use toolharness::id::{generate_call_id, generate_session_id};
use toolharness::tools::{TOOL_GROUPS, ToolCollection, ToolContext, ToolResult};

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolharness")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("toolharness.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Build the collection for the requested (or configured) version
fn open_collection(cli: &Cli, config: &Config) -> Result<ToolCollection> {
    let version = cli.command.tool_version().unwrap_or(&config.tool_version);
    let session_id = generate_session_id();
    let ctx = ToolContext::from_config(config.tools.clone(), session_id.clone());

    let collection = ToolCollection::for_version(version, &ctx)?;
    info!("Opened session {} with tool version {}", session_id, version);
    Ok(collection)
}

async fn close_collection(collection: &ToolCollection) {
    let report = toolharness::cli::close_collection(collection).await;
    if !report.is_clean() {
        eprintln!("{} {}", "Teardown incomplete:".yellow(), report);
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        eprintln!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Versions => handle_versions_command(config),
        Commands::Describe { .. } => handle_describe_command(cli, config),
        Commands::Call { name, input, .. } => handle_call_command(cli, config, name, input.as_deref()).await,
        Commands::Session { .. } => handle_session_command(cli, config).await,
    }
}

fn handle_versions_command(config: &Config) -> Result<()> {
    let ctx = ToolContext::from_config(config.tools.clone(), generate_session_id());
    for group in TOOL_GROUPS {
        let marker = if group.version == config.tool_version { " (default)".green() } else { "".normal() };
        println!("{}{}", group.version.bold(), marker);
        if let Some(flag) = group.beta_flag {
            println!("  {} {}", "beta:".dimmed(), flag);
        }
        let names: Vec<_> = group.instantiate(&ctx).iter().map(|t| t.name()).collect();
        println!("  {} {}", "tools:".dimmed(), names.join(", "));
    }
    Ok(())
}

fn handle_describe_command(cli: &Cli, config: &Config) -> Result<()> {
    let collection = open_collection(cli, config)?;
    let description = serde_json::json!({
        "version": collection.version(),
        "beta_flag": collection.beta_flag(),
        "tools": collection.to_params(),
    });
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}

async fn handle_call_command(cli: &Cli, config: &Config, name: &str, input: Option<&str>) -> Result<()> {
    let input: serde_json::Value = match input {
        Some(raw) => serde_json::from_str(raw).context("Tool input must be valid JSON")?,
        None => serde_json::json!({}),
    };

    let collection = open_collection(cli, config)?;
    info!("Calling tool {} with input {}", name, input);
    let result = collection.call(name, input).await;
    print_result(&result, cli.is_verbose());
    close_collection(&collection).await;

    if let Some(kind) = result.error_kind() {
        eyre::bail!("Tool {} returned {}", name, kind);
    }
    Ok(())
}

fn print_result(result: &ToolResult, verbose: bool) {
    match result {
        ToolResult::Success { content, system } => {
            if let Some(note) = system {
                println!("{} {}", "system:".yellow(), note);
            }
            for block in content {
                match block.as_text() {
                    Some(text) => println!("{}", text),
                    None => println!("{}", "[image block]".dimmed()),
                }
            }
        }
        ToolResult::Error { message, kind } => {
            println!("{} {}", format!("{}:", kind).red(), message);
        }
    }
    if verbose {
        println!("{}", result.to_api_block(&generate_call_id()));
    }
}

async fn handle_session_command(cli: &Cli, config: &Config) -> Result<()> {
    let collection = open_collection(cli, config)?;
    if cli.is_verbose() {
        eprintln!("{} {}", "Session ready:".green(), collection.names().join(", "));
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let served = toolharness::cli::run_session(&collection, stdin, tokio::io::stdout()).await;
    close_collection(&collection).await;

    let served = served.context("Session failed")?;
    info!("Session finished after {} calls", served);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
