//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use bookshelf_core::config::MAX_RESULTS_RANGE;
use bookshelf_core::Config;

use crate::output::{Output, OutputFormat};

/// Keys accepted by `config set`
const KEYS: &str = "data_dir, catalog_url, api_key, max_results, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "catalog_url": config.catalog_url,
                    "api_key": config.api_key.as_ref().map(|_| "(set)"),
                    "max_results": config.max_results,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:    {}", config.data_dir.display());
            println!("  catalog_url: {}", config.catalog_url);
            println!(
                "  api_key:     {}",
                if config.api_key.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  max_results: {}", config.max_results);
            println!(
                "  log_file:    {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_key" { "(hidden)" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

/// Apply one `key = value` assignment
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let optional = |value: &str| {
        if value.is_empty() || value == "none" {
            None
        } else {
            Some(value.to_string())
        }
    };

    match key {
        "data_dir" => config.data_dir = value.into(),
        "catalog_url" => {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                bail!("catalog_url must be an http(s) URL");
            }
            config.catalog_url = value.to_string();
        }
        "api_key" => config.api_key = optional(value),
        "max_results" => {
            let n: u32 = value
                .parse()
                .context("Invalid value for max_results. Use a number from 1 to 40.")?;
            if !MAX_RESULTS_RANGE.contains(&n) {
                bail!("max_results must be between 1 and 40");
            }
            config.max_results = n;
        }
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS
            );
        }
    }
    Ok(())
}
