//! `toolgate config`: configuration inspection.

use anyhow::Context;
use toolgate_config::{AppConfig, StoreBackend};

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  Config error: {e}");
            return Err(e.into());
        }
    };
    println!("  Config parsed successfully");

    let mut warnings = Vec::new();
    if config.users.is_empty() {
        warnings.push("No [[users]] configured; token authentication will reject everyone");
    }
    if !config.audit.enabled {
        warnings.push("Audit trail is disabled");
    } else if !config.audit.sanitize_tool_parameters {
        warnings.push("Audit records will contain unsanitized tool arguments");
    }
    if config.agent.turn_timeout_secs.is_none() {
        warnings.push("No turn_timeout_secs set; turns are bounded only by max_tool_iterations");
    }

    if warnings.is_empty() {
        println!("  All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("  warning: {w}");
        }
    }

    println!();
    println!("  Max iterations: {}", config.agent.max_tool_iterations);
    println!("  Temperature:    {}", config.agent.temperature);
    println!("  Users:          {}", config.users.len());
    println!("  Scoping rules:  {}", config.scoping.len());
    match config.store.backend {
        StoreBackend::Memory => println!("  Store:          memory"),
        StoreBackend::File => println!(
            "  Store:          file ({})",
            config.conversations_dir().display()
        ),
    }

    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}
