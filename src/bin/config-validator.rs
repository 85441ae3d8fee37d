//! # Turntable Configuration Validator
//!
//! Command-line tool for validating turntable configuration files across
//! environments before running a dispatch.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use turntable::config::ConfigManager;
use turntable::constants::env::KNOWN_ENVIRONMENTS;
use turntable::execution::resolve_processes;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate turntable configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the effective configuration as JSON
    Show,

    /// List the environments known to the loader
    Environments,

    /// Compare the effective configuration of two environments
    Compare {
        /// Base environment for comparison
        #[arg(short, long, default_value = "development")]
        base: String,

        /// Target environment for comparison
        #[arg(short, long)]
        target: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Environments) => list_environments(),
        Some(Commands::Compare { base, target }) => compare(&cli, base, target),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            println!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli, environment: &str) -> Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        .with_context(|| format!("loading configuration for environment '{environment}'"))
}

fn validate(cli: &Cli) -> Result<()> {
    println!("🔧 Validating Turntable Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let manager = load(cli, &cli.environment)?;
    match manager.config_file() {
        Some(path) => println!("✅ Configuration loaded from {}", path.display()),
        None => println!("⚠️  No configuration file found, defaults in use"),
    }

    let config = manager.config();
    let processes = resolve_processes(config.execution.processes, None, config.execution.max_processes)
        .context("resolving worker count")?;
    println!("   ✅ Workers: {processes} (cap {})", config.execution.max_processes);
    match config.execution.batch_size {
        Some(size) => println!("   ✅ Batch size: {size}"),
        None => println!("   ✅ Batch size: items / workers"),
    }
    println!("   ✅ Scratch root: {}", config.scratch.root.display());
    println!(
        "   ✅ Store root: {} (offload {})",
        config.store.root.display(),
        if config.store.offload_enabled { "enabled" } else { "disabled" }
    );
    println!("   ✅ Codec: {:?}", config.codec);

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn show(cli: &Cli) -> Result<()> {
    let manager = load(cli, &cli.environment)?;
    let rendered = serde_json::to_string_pretty(&manager.debug_config())
        .context("rendering configuration")?;
    println!("{rendered}");
    Ok(())
}

fn list_environments() -> Result<()> {
    println!("📋 Known Environments:");
    for environment in KNOWN_ENVIRONMENTS {
        println!("   • {environment}");
    }
    println!("\nSelected by TURNTABLE_ENV, then APP_ENV, defaulting to development.");
    Ok(())
}

fn compare(cli: &Cli, base: &str, target: &str) -> Result<()> {
    println!("🔍 Comparing Configurations: {base} vs {target}");

    let base_json = load(cli, base)?.debug_config();
    let target_json = load(cli, target)?.debug_config();

    let mut differences = Vec::new();
    collect_differences("", &base_json, &target_json, &mut differences);

    if differences.is_empty() {
        println!("✅ No differences");
    } else {
        for (path, left, right) in differences {
            println!("   {path}: {left} -> {right}");
        }
    }
    Ok(())
}

fn collect_differences(
    prefix: &str,
    base: &serde_json::Value,
    target: &serde_json::Value,
    out: &mut Vec<(String, String, String)>,
) {
    match (base, target) {
        (serde_json::Value::Object(left), serde_json::Value::Object(right)) => {
            for (key, left_value) in left {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                let right_value = right.get(key).unwrap_or(&serde_json::Value::Null);
                collect_differences(&path, left_value, right_value, out);
            }
        }
        (left, right) if left != right => {
            out.push((prefix.to_string(), left.to_string(), right.to_string()));
        }
        _ => {}
    }
}
