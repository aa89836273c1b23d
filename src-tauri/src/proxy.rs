//! Proxy override file. Written by the `proxy-settings` bridge channel (the
//! app then quits), read back at window construction on the next launch.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::warn;
use tauri::{AppHandle, Manager};

use crate::bridge::ProxySettings;

const PROXY_FILE: &str = "proxy.ini";

fn proxy_file(app: &AppHandle) -> Result<PathBuf> {
    let dir = app
        .path()
        .app_config_dir()
        .context("app config dir unavailable")?;
    Ok(dir.join(PROXY_FILE))
}

pub fn format_rules(settings: &ProxySettings) -> String {
    format!("{}:{}", settings.ip, settings.port)
}

/// Writes `ip:port` for the next launch; returns the file path.
pub fn save(app: &AppHandle, settings: &ProxySettings) -> Result<PathBuf> {
    let path = proxy_file(app)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, format_rules(settings))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Returns the configured `ip:port` rules, if any. A missing file is the
/// normal case; an unreadable one is logged and ignored.
pub fn load(app: &AppHandle) -> Option<String> {
    let path = proxy_file(app).ok()?;
    if !path.is_file() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(contents) => {
            let rules = contents.trim().to_string();
            (!rules.is_empty()).then_some(rules)
        }
        Err(err) => {
            warn!("failed to read {}: {err}", path.display());
            None
        }
    }
}
