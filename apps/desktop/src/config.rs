use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::{CacheConfig, ReorderConfig, SessionConfig, DEFAULT_COLLECTION_KEY};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "catalog.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_base_url: String,
    pub database_url: String,
    pub page_size: u32,
    pub reveal_increment: usize,
    pub stale_after_secs: u64,
    pub collection_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://pokeapi.co/api/v2".into(),
            database_url: storage::DEFAULT_DATABASE_URL.into(),
            page_size: 6,
            reveal_increment: 6,
            stale_after_secs: 120,
            collection_key: DEFAULT_COLLECTION_KEY.into(),
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cache: CacheConfig {
                page_size: self.page_size.max(1),
                stale_after: Duration::from_secs(self.stale_after_secs),
            },
            reveal_increment: self.reveal_increment.max(1),
            collection_key: self.collection_key.clone(),
            reorder: ReorderConfig::default(),
        }
    }
}

/// Keys accepted in `catalog.toml`. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    database_url: Option<String>,
    page_size: Option<u32>,
    reveal_increment: Option<usize>,
    stale_after_secs: Option<u64>,
    collection_key: Option<String>,
}

pub fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    load_settings_with(config_path, |name| std::env::var(name).ok())
}

/// File values first, then environment overrides. Later names win.
pub fn load_settings_with(
    config_path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if config_path.exists() {
        let raw = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read '{}'", config_path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse '{}'", config_path.display()))?;
        apply_file(&mut settings, file_cfg);
    }

    for name in ["CATALOG_API_URL", "APP__API_BASE_URL"] {
        if let Some(v) = env(name) {
            settings.api_base_url = v;
        }
    }
    for name in ["DATABASE_URL", "APP__DATABASE_URL"] {
        if let Some(v) = env(name) {
            settings.database_url = v;
        }
    }
    if let Some(v) = parsed_env(&env, "APP__PAGE_SIZE") {
        settings.page_size = v;
    }
    if let Some(v) = parsed_env(&env, "APP__REVEAL_INCREMENT") {
        settings.reveal_increment = v;
    }
    if let Some(v) = parsed_env(&env, "APP__STALE_AFTER_SECS") {
        settings.stale_after_secs = v;
    }
    if let Some(v) = env("APP__COLLECTION_KEY") {
        settings.collection_key = v;
    }

    settings.database_url = normalize_database_url(&settings.database_url);
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.page_size {
        settings.page_size = v;
    }
    if let Some(v) = file_cfg.reveal_increment {
        settings.reveal_increment = v;
    }
    if let Some(v) = file_cfg.stale_after_secs {
        settings.stale_after_secs = v;
    }
    if let Some(v) = file_cfg.collection_key {
        settings.collection_key = v;
    }
}

fn parsed_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = env(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(name, value = %raw, "config: ignoring unparsable override");
            None
        }
    }
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
