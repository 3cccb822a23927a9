// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./keepsake.toml` > `~/.config/keepsake/keepsake.toml` >
//! `/etc/keepsake/keepsake.toml` with environment variable overrides via `KEEPSAKE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::KeepsakeConfig;

/// Config sections that can be addressed from environment variables.
const SECTIONS: &[&str] = &["general", "llm", "storage", "retrieval", "persona"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/keepsake/keepsake.toml` (system-wide)
/// 3. `~/.config/keepsake/keepsake.toml` (user XDG config)
/// 4. `./keepsake.toml` (local directory)
/// 5. `KEEPSAKE_*` environment variables
pub fn load_config() -> Result<KeepsakeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<KeepsakeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeepsakeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeepsakeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeepsakeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KeepsakeConfig::default()))
        .merge(Toml::file("/etc/keepsake/keepsake.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("keepsake/keepsake.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("keepsake.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` since field names contain
/// underscores: `KEEPSAKE_RETRIEVAL_MIN_SIMILARITY` must become
/// `retrieval.min_similarity`, not `retrieval.min.similarity`.
/// Variables that do not start with a known section are passed through
/// unchanged and rejected by `deny_unknown_fields` only if they collide.
fn env_provider() -> Env {
    Env::prefixed("KEEPSAKE_")
        .map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
        .filter(|key| SECTIONS.iter().any(|s| key.as_str().starts_with(&format!("{s}."))))
}

/// Map a lowercased, prefix-stripped env var name onto a dotted config path.
///
/// Example: `KEEPSAKE_LLM_API_KEY` arrives as `llm_api_key` and maps to `llm.api_key`.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
