// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::schema::Config;

/// Load `settings.json` from `path`, migrating a legacy nested schema in
/// place and falling back to defaults for any field the file doesn't set.
/// Environment variables are applied last (priority: env > file > defaults).
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let mut value = if path.is_file() {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        debug!(path = %path.display(), "no settings file found, using defaults");
        serde_json::Value::Object(serde_json::Map::new())
    };

    migrate_legacy(&mut value);

    let mut config: Config = if value.as_object().map(|m| m.is_empty()).unwrap_or(false) {
        Config::default()
    } else {
        let defaults = serde_json::to_value(Config::default())?;
        merge_json(&mut defaults.clone(), value);
        serde_json::from_value(defaults).context("validating settings.json against schema")?
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Persist `config` to `path` as flat JSON, always in the current
/// (non-legacy) schema.
pub fn save(path: &Path, config: &Config) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts. Mirrors the
/// merge used for YAML config layering elsewhere in this codebase, ported to
/// `serde_json::Value` since settings are JSON here.
fn merge_json(dst: &mut serde_json::Value, src: serde_json::Value) {
    match (dst, src) {
        (serde_json::Value::Object(d), serde_json::Value::Object(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Detect and flatten the legacy nested schema some older installs carry:
/// `{"provider": {"name": "...", "model": "...", "api_key_env": "...",
/// "base_url": "..."}}` becomes the flat top-level fields the current
/// schema expects. No-op when `provider` is already a string.
fn migrate_legacy(value: &mut serde_json::Value) {
    let Some(obj) = value.as_object_mut() else { return };
    let Some(nested) = obj.get("provider").cloned() else { return };
    let Some(nested_obj) = nested.as_object() else { return };

    debug!("migrating legacy nested settings.json schema");
    if let Some(name) = nested_obj.get("name").cloned() {
        obj.insert("provider".to_string(), name);
    } else {
        obj.remove("provider");
    }
    for key in ["model", "api_key_env", "base_url"] {
        if let Some(v) = nested_obj.get(key).cloned() {
            obj.insert(key.to_string(), v);
        }
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("MNEMOD_PROVIDER") {
        if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v)) {
            config.provider = kind;
        }
    }
    if let Ok(v) = std::env::var("MNEMOD_MODEL") {
        config.model = v;
    }
    if let Ok(v) = std::env::var("MNEMOD_API_KEY_ENV") {
        config.api_key_env = Some(v);
    }
    if let Ok(v) = std::env::var("MNEMOD_BASE_URL") {
        config.base_url = Some(v);
    }
    if let Ok(v) = std::env::var("MNEMOD_PORT") {
        if let Ok(port) = v.parse() {
            config.server.port = port;
        }
    }
    if let Ok(v) = std::env::var("MNEMOD_DATA_DIR") {
        config.server.data_dir = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProviderKind;
    use std::io::Write;

    #[test]
    fn load_with_missing_file_returns_defaults() {
        let cfg = load(Path::new("/tmp/mnemod_nonexistent_settings.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_flat_file_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"provider": "gemini", "model": "gemini-2.5-pro"}}"#).unwrap();
        let cfg = load(f.path()).unwrap();
        assert_eq!(cfg.provider, ProviderKind::Gemini);
        assert_eq!(cfg.model, "gemini-2.5-pro");
    }

    #[test]
    fn load_preserves_unset_fields_as_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"model": "custom"}}"#).unwrap();
        let cfg = load(f.path()).unwrap();
        assert_eq!(cfg.model, "custom");
        assert_eq!(cfg.server.port, Config::default().server.port);
    }

    #[test]
    fn load_migrates_legacy_nested_schema() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"{{"provider": {{"name": "openai_compat", "model": "llama3.2", "base_url": "http://localhost:11434/v1"}}}}"#
        )
        .unwrap();
        let cfg = load(f.path()).unwrap();
        assert_eq!(cfg.provider, ProviderKind::OpenAiCompat);
        assert_eq!(cfg.model, "llama3.2");
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn load_errors_on_invalid_json() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "not json").unwrap();
        assert!(load(f.path()).is_err());
    }

    #[test]
    fn env_override_beats_file_value() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"model": "from-file"}}"#).unwrap();
        std::env::set_var("MNEMOD_MODEL", "from-env");
        let cfg = load(f.path()).unwrap();
        std::env::remove_var("MNEMOD_MODEL");
        assert_eq!(cfg.model, "from-env");
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut cfg = Config::default();
        cfg.model = "roundtrip-model".into();
        save(&path, &cfg).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.model, "roundtrip-model");
    }

    #[test]
    fn merge_json_nested_object_fields_merge_independently() {
        let mut dst = serde_json::json!({"server": {"port": 1, "data_dir": null}});
        let src = serde_json::json!({"server": {"port": 2}});
        merge_json(&mut dst, src);
        assert_eq!(dst["server"]["port"], 2);
        assert_eq!(dst["server"]["data_dir"], serde_json::Value::Null);
    }
}
