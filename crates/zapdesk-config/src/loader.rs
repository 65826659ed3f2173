// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./zapdesk.toml` > `~/.config/zapdesk/zapdesk.toml` > `/etc/zapdesk/zapdesk.toml`
//! with environment variable overrides via `ZAPDESK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::{KNOWN_KEYS, ZapdeskConfig};

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zapdesk/zapdesk.toml` (system-wide)
/// 3. `~/.config/zapdesk/zapdesk.toml` (user XDG config)
/// 4. `./zapdesk.toml` (local directory)
/// 5. `ZAPDESK_*` environment variables
pub fn load_config() -> Result<ZapdeskConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ZapdeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZapdeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ZapdeskConfig::default()))
        .merge(Toml::file("/etc/zapdesk/zapdesk.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("zapdesk/zapdesk.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("zapdesk.toml"))
        .merge(env_provider())
}

/// Maps `section_key` to `section.key`, leaving underscores inside keys alone.
///
/// `ZAPDESK_QUEUE_MAX_ATTEMPTS` must become `queue.max_attempts`, which
/// `Env::split("_")` would get wrong.
pub(crate) fn map_env_key(key: &str) -> String {
    for (section, _) in KNOWN_KEYS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("ZAPDESK_").map(|key| map_env_key(key.as_str()).into())
}
