use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 10000;
const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: format!("0.0.0.0:{DEFAULT_PORT}"),
            database_url: "sqlite://./data/checkin.db".into(),
        }
    }
}

impl Settings {
    /// Layers `server.toml` values, then environment variables, over the
    /// defaults. Later sources win.
    pub fn from_sources(file_contents: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Settings::default();

        if let Some(raw) = file_contents {
            match toml::from_str::<HashMap<String, String>>(raw) {
                Ok(file_cfg) => {
                    if let Some(v) = file_cfg.get("bind_addr") {
                        settings.server_bind = v.clone();
                    }
                    if let Some(v) = file_cfg.get("database_url") {
                        settings.database_url = v.clone();
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "ignoring unreadable {SETTINGS_FILE}");
                }
            }
        }

        if let Some(port) = env("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            settings.server_bind = format!("0.0.0.0:{port}");
        }
        if let Some(v) = env("SERVER_BIND") {
            settings.server_bind = v;
        }
        if let Some(v) = env("APP__BIND_ADDR") {
            settings.server_bind = v;
        }

        if let Some(v) = env("DATABASE_URL") {
            settings.database_url = v;
        }
        if let Some(v) = env("APP__DATABASE_URL") {
            settings.database_url = v;
        }

        settings
    }
}

pub fn load_settings() -> Settings {
    let raw = fs::read_to_string(SETTINGS_FILE).ok();
    Settings::from_sources(raw.as_deref(), |key| std::env::var(key).ok())
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
