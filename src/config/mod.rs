use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::redact;

/// Default lookback window for `meetbill run`.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// A secret plus where to find it when it isn't inline.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct CredentialConfig {
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct CalendarConfig {
    #[serde(flatten)]
    pub credential: CredentialConfig,
    /// Domain appended to the tracker username when the tracker has no email for the user.
    pub email_domain: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct TrackerConfig {
    #[serde(flatten)]
    pub credential: CredentialConfig,
    pub worktype_id: Option<u64>,
    /// Where `meetbill token set` stores the token. Defaults to ~/.meetbill/tracker_token.
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct AiConfig {
    #[serde(flatten)]
    pub credential: CredentialConfig,
    /// Full chat-completions URL of the deployment.
    pub endpoint: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RunConfig {
    pub lookback_days: Option<u32>,
}

/// Top-level config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct AppConfig {
    pub calendar: Option<CalendarConfig>,
    pub tracker: Option<TrackerConfig>,
    pub ai: Option<AiConfig>,
    pub run: Option<RunConfig>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load config from ~/.meetbill/config.toml. Returns default if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn lookback_days(&self) -> u32 {
        self.run
            .as_ref()
            .and_then(|r| r.lookback_days)
            .unwrap_or(DEFAULT_LOOKBACK_DAYS)
    }

    pub fn worktype_id(&self) -> Option<u64> {
        self.tracker.as_ref().and_then(|t| t.worktype_id)
    }

    pub fn token_file(&self) -> Option<&Path> {
        self.tracker.as_ref().and_then(|t| t.token_file.as_deref())
    }

    /// AI endpoint and settings, if configured and enabled.
    pub fn ai_settings(&self) -> Option<&AiConfig> {
        self.ai
            .as_ref()
            .filter(|a| a.enabled && a.endpoint.as_deref().is_some_and(|e| !e.is_empty()))
    }

    /// Display config with secrets redacted.
    pub fn display_redacted(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref cal) = self.calendar {
            lines.push("[calendar]".to_string());
            display_credential(&mut lines, &cal.credential);
            if let Some(ref d) = cal.email_domain {
                lines.push(format!("  email_domain = \"{}\"", d));
            }
        }
        if let Some(ref tr) = self.tracker {
            lines.push("[tracker]".to_string());
            display_credential(&mut lines, &tr.credential);
            if let Some(id) = tr.worktype_id {
                lines.push(format!("  worktype_id = {}", id));
            }
            if let Some(ref f) = tr.token_file {
                lines.push(format!("  token_file = \"{}\"", f.display()));
            }
        }
        if let Some(ref ai) = self.ai {
            lines.push("[ai]".to_string());
            display_credential(&mut lines, &ai.credential);
            if let Some(ref e) = ai.endpoint {
                lines.push(format!("  endpoint = \"{}\"", e));
            }
            lines.push(format!("  enabled = {}", ai.enabled));
        }
        if let Some(ref run) = self.run {
            lines.push("[run]".to_string());
            if let Some(days) = run.lookback_days {
                lines.push(format!("  lookback_days = {}", days));
            }
        }
        if lines.is_empty() {
            lines.push("(nothing configured)".to_string());
        }
        lines.join("\n")
    }
}

fn display_credential(lines: &mut Vec<String>, c: &CredentialConfig) {
    if let Some(ref key) = c.api_key {
        lines.push(format!("  api_key = \"{}\"", redact(key)));
    }
    if let Some(ref cmd) = c.api_key_command {
        lines.push(format!("  api_key_command = \"{}\"", cmd));
    }
    if let Some(ref url) = c.base_url {
        lines.push(format!("  base_url = \"{}\"", url));
    }
}

/// Resolve a credential through the chain: CLI flag > env var > config key > config command.
/// `Ok(None)` when nothing in the chain provides one.
pub fn resolve_credential(
    cli_flag: Option<&str>,
    env_var_name: &str,
    config: Option<&CredentialConfig>,
) -> Result<Option<String>> {
    // 1. CLI flag
    if let Some(key) = cli_flag {
        if !key.is_empty() {
            return Ok(Some(key.to_string()));
        }
    }

    // 2. Environment variable
    if let Ok(val) = std::env::var(env_var_name) {
        if !val.is_empty() {
            return Ok(Some(val));
        }
    }

    if let Some(c) = config {
        // 3. Config file api_key
        if let Some(ref key) = c.api_key {
            if !key.is_empty() {
                return Ok(Some(key.clone()));
            }
        }

        // 4. External command
        if let Some(ref cmd) = c.api_key_command {
            if !cmd.is_empty() {
                let secret = run_key_command(cmd)?;
                if !secret.is_empty() {
                    return Ok(Some(secret));
                }
            }
        }
    }

    Ok(None)
}

fn run_key_command(cmd: &str) -> Result<String> {
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .with_context(|| format!("Failed to run api_key_command: {cmd}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "api_key_command failed (exit {}): {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }

    Ok(String::from_utf8(output.stdout)
        .context("api_key_command output is not valid UTF-8")?
        .trim()
        .to_string())
}

/// Path to the config file: ~/.meetbill/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".meetbill").join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.meetbill/config.toml
# Credential resolution order: CLI flag > env var > api_key > api_key_command
# (the tracker token additionally falls back to the file written by `meetbill token set`)

[calendar]
# Microsoft Graph access token with Calendars.Read and OnlineMeetings.Read
# api_key_command = "your-token-helper --scope graph"
# email_domain = "example.onmicrosoft.com"

[tracker]
# api_key = "your-intervals-api-token"
# worktype_id = 799573

[ai]
# endpoint = "https://<resource>.openai.azure.com/openai/deployments/<deployment>/chat/completions?api-version=2024-08-01-preview"
# api_key_command = "your-secrets-manager-command-here"
# enabled = true

[run]
# lookback_days = 30
"#
}

/// Create the default config file if it doesn't already exist.
pub fn init_config() -> Result<bool> {
    let path = config_path()?;
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_template())?;
    Ok(true)
}
