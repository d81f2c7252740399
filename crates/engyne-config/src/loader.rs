// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-based layered config loading.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/engyne/engyne.toml`, `~/.config/engyne/engyne.toml`,
//! `./engyne.toml`, then `ENGYNE_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::EngyneConfig;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/engyne/engyne.toml";

/// Top-level sections, longest first so `remote_login_` wins over shorter prefixes.
const SECTIONS: &[&str] = &[
    "remote_login",
    "supervisor",
    "dispatcher",
    "prometheus",
    "gateway",
    "alerts",
    "paths",
    "node",
];

pub fn load_config() -> Result<EngyneConfig, figment::Error> {
    build_figment().extract()
}

/// Load from a TOML string only. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<EngyneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngyneConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EngyneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngyneConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full XDG figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(EngyneConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("engyne/engyne.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("engyne.toml"))
        .merge(env_provider())
}

/// Maps `ENGYNE_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Uses an explicit section table rather than `Env::split("_")`, since most
/// keys contain underscores themselves (`ENGYNE_SUPERVISOR_STOP_GRACE_SECS`).
fn env_provider() -> Env {
    Env::prefixed("ENGYNE_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
