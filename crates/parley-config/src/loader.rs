// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered TOML and environment loading.
//!
//! Every entry point starts from the compiled defaults, so a file only has to
//! name the keys it changes.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ParleyConfig;

/// Sections that may appear in `PARLEY_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &[
    "bot", "gateway", "retry", "store", "memory", "billing", "sweep",
];

/// Loads `/etc/parley/parley.toml`, then the user config file, then
/// `./parley.toml`, then `PARLEY_*` variables. Missing files are skipped.
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    search_path()
        .into_iter()
        .fold(defaults(), |figment, file| figment.merge(Toml::file(file)))
        .merge(env_provider())
        .extract()
}

/// Loads one file; `PARLEY_*` variables still win over it.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    defaults()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Loads inline TOML with no files and no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    defaults().merge(Toml::string(toml_content)).extract()
}

fn defaults() -> Figment {
    Figment::from(Serialized::defaults(ParleyConfig::default()))
}

/// Config files in ascending priority.
fn search_path() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/parley/parley.toml")];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("parley").join("parley.toml"));
    }
    files.push(PathBuf::from("parley.toml"));
    files
}

// Keys keep their underscores: PARLEY_GATEWAY_API_KEY is gateway.api_key.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| map_env_key(key.as_str()).into())
}

/// `gateway_api_key` becomes `gateway.api_key`. Unknown sections pass through
/// unchanged and are rejected later as unknown keys.
pub(crate) fn map_env_key(key: &str) -> String {
    ENV_SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key.to_string())
}
