// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./despacho.toml` > `~/.config/despacho/despacho.toml` >
//! `/etc/despacho/despacho.toml` with environment variable overrides via `DESPACHO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DespachoConfig;

/// Top-level sections, used to map `DESPACHO_<SECTION>_<KEY>` to `section.key`.
pub const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "vault",
    "whatsapp",
    "broker",
    "inventory",
    "alerts",
    "gateway",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/despacho/despacho.toml` (system-wide)
/// 3. `~/.config/despacho/despacho.toml` (user XDG config)
/// 4. `./despacho.toml` (local directory)
/// 5. `DESPACHO_*` environment variables
pub fn load_config() -> Result<DespachoConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<DespachoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DespachoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DespachoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DespachoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DespachoConfig::default()))
        .merge(Toml::file("/etc/despacho/despacho.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("despacho/despacho.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("despacho.toml"))
        .merge(env_provider())
}

/// Map `section_key` to `section.key` for the first matching section only.
///
/// `Env::split("_")` would turn `broker_order_queue` into `broker.order.queue`.
pub fn map_env_key(key: &str) -> String {
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

fn env_provider() -> Env {
    // The vault passphrase is read directly by the vault prompt, never merged.
    Env::prefixed("DESPACHO_")
        .ignore(&["VAULT_KEY"])
        .map(|key| map_env_key(key.as_str()).into())
}
