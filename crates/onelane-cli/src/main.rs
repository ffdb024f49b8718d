//! `onelane` – command line entry point for the bridge coordinator.
//!
//! 1. Initialises structured logging (optionally exporting spans over OTLP).
//! 2. Loads `~/.onelane/config.toml`; writes the defaults on first run.
//! 3. Starts the HTTP + WebSocket server in front of a fresh coordinator.
//! 4. Runs until **Ctrl-C**, then exits cleanly.

mod config;

use std::process::ExitCode;

use colored::Colorize;
use onelane_coordinator::BridgeCoordinator;
use onelane_server::BridgeServer;
use onelane_types::BridgeError;
use tracing::{error, info, warn};

use crate::config::Config;

fn main() -> ExitCode {
    // Held until exit so pending spans are flushed.
    let _telemetry = onelane_server::init_tracing("onelane");

    print_banner();
    let cfg = load_config();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Server error".red(), e);
            error!(error = %e, "bridge server failed");
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

async fn serve(cfg: Config) -> Result<(), BridgeError> {
    let coordinator = BridgeCoordinator::new(cfg.duplicate_ids);
    let bound = BridgeServer::new(coordinator)
        .with_bind_address(cfg.bind_address)
        .with_port(cfg.port)
        .with_ws_path(cfg.ws_path.clone())
        .bind()
        .await?;

    let addr = bound.local_addr()?;
    println!(
        "  Cars cross at {}  (duplicate ids: {})\n",
        format!("ws://{addr}{}", cfg.ws_path).bold().cyan(),
        cfg.duplicate_ids
    );
    info!(addr = %addr, duplicate_ids = %cfg.duplicate_ids, "onelane started");

    tokio::select! {
        result = bound.serve() => result,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    println!();
                    println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
                    info!("shutdown requested");
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C; shutting down"),
            }
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____            __                "#.bold().cyan());
    println!("{}", r#"  / __ \___  ___  / /  ___ ____  ___ "#.bold().cyan());
    println!("{}", r#" / /_/ / _ \/ -_)/ /__/ _ `/ _ \/ -_)"#.bold().cyan());
    println!("{}", r#" \____/_//_/\__//____/\_,_/_//_/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "OneLane".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Single-lane bridge crossing coordinator");
    println!();
}
