use clap::Subcommand;
use pomoloop_core::{Config, ConfigError};
use serde::Serialize;

use super::{CommandResult, Context};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "default_duration", "timer.poll_interval_ms")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dot-separated key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

#[derive(Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: String,
}

pub fn run(ctx: &Context, action: ConfigAction) -> CommandResult {
    let path = &ctx.paths.config_path;
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(path)?;
            let value = config
                .get(&key)
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            let kv = KeyValue { key: &key, value };
            ctx.out.emit(&kv, || kv.value.clone())?;
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(path)?;
            config.set(&key, &value)?;
            config.save(path)?;
            let kv = KeyValue { key: &key, value };
            ctx.out.emit(&kv, || "ok".to_string())?;
        }
        ConfigAction::List => {
            let config = Config::load(path)?;
            ctx.out
                .emit(&config, || toml::to_string_pretty(&config).unwrap_or_default())?;
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save(path)?;
            ctx.out
                .emit(&config, || "config reset to defaults".to_string())?;
        }
    }
    Ok(())
}
