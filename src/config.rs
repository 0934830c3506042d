//! Settings management for marginalia
//!
//! Stores settings in ~/.config/marginalia/config.json

use crate::util::{read_unpoisoned, write_unpoisoned};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_DELAY_MS: u64 = 2000;
pub const DEFAULT_COMMAND: &str = "claude";

/// Read-only capabilities; nothing that writes files or runs commands.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &["Read", "Grep", "Glob"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Quiet period before an edit burst becomes a query
    #[serde(default = "default_debounce_delay_ms")]
    pub debounce_delay_ms: u64,
    /// Capabilities the assistant may use during an invocation
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Assistant executable, looked up on PATH
    #[serde(default = "default_command")]
    pub command: String,
    /// Custom prompt template; the built-in one is used when unset
    #[serde(default)]
    pub prompt_template_path: Option<PathBuf>,
}

fn default_debounce_delay_ms() -> u64 {
    DEFAULT_DEBOUNCE_DELAY_MS
}

fn default_allowed_tools() -> Vec<String> {
    DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect()
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_delay_ms: default_debounce_delay_ms(),
            allowed_tools: default_allowed_tools(),
            command: default_command(),
            prompt_template_path: None,
        }
    }
}

/// Partial settings change delivered by the host. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub debounce_delay_ms: Option<u64>,
    pub allowed_tools: Option<Vec<String>>,
    pub command: Option<String>,
    pub prompt_template_path: Option<Option<PathBuf>>,
}

/// Settings shared between the dispatcher and the client.
pub type SharedSettings = Arc<RwLock<Settings>>;

pub fn shared(settings: Settings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

pub fn snapshot(settings: &SharedSettings) -> Settings {
    read_unpoisoned(settings).clone()
}

pub fn apply_update(settings: &SharedSettings, update: SettingsUpdate) {
    write_unpoisoned(settings).apply(update);
}

impl Settings {
    pub fn sanitize(&mut self) {
        if self.debounce_delay_ms == 0 {
            self.debounce_delay_ms = 1;
        }

        let mut seen = Vec::with_capacity(self.allowed_tools.len());
        for tool in self.allowed_tools.drain(..) {
            let tool = tool.trim().to_string();
            if !tool.is_empty() && !seen.contains(&tool) {
                seen.push(tool);
            }
        }
        self.allowed_tools = seen;

        let command = self.command.trim();
        self.command = if command.is_empty() {
            default_command()
        } else {
            command.to_string()
        };
    }

    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(delay) = update.debounce_delay_ms {
            self.debounce_delay_ms = delay;
        }
        if let Some(tools) = update.allowed_tools {
            self.allowed_tools = tools;
        }
        if let Some(command) = update.command {
            self.command = command;
        }
        if let Some(path) = update.prompt_template_path {
            self.prompt_template_path = path;
        }
        self.sanitize();
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms.max(1))
    }

    /// Comma-joined allow-list as passed on the command line
    pub fn allowed_tools_arg(&self) -> String {
        self.allowed_tools.join(",")
    }

    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("marginalia"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load settings from disk, or return defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str::<Settings>(&content) {
                Ok(mut settings) => {
                    settings.sanitize();
                    return settings;
                }
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "settings file was corrupted; a backup was saved and defaults were loaded"
                    );
                }
            }
        }
        Self::default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path()
            .ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), String> {
        let mut sanitized = self.clone();
        sanitized.sanitize();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!(error = %e, "failed to set config directory permissions");
                }
            }
        }

        let content = serde_json::to_string_pretty(&sanitized)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        write_config_atomic(path, &content).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/marginalia/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &std::path::Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!(error = %e, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}
