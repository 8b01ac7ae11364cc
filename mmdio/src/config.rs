use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Fill `hash` of loaded assets.
    pub compute_hash: bool,
    /// Threads used for .x normal generation. `None` or `1` stays on the calling thread.
    pub x_worker_threads: Option<usize>,
    /// Add the `Root` and `表情` display slots when a model lacks them.
    pub create_default_display_slots: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            compute_hash: true,
            x_worker_threads: None,
            create_default_display_slots: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Keep bones and morphs flagged as system entities.
    pub include_system: bool,
    pub sanitize_non_finite: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            include_system: true,
            sanitize_non_finite: true,
        }
    }
}

/// Options file layout: `{"load": {...}, "save": {...}}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub load: LoadOptions,
    pub save: SaveOptions,
}

impl Config {
    pub fn from_json(text: &str) -> crate::error::Result<Config> {
        Ok(serde_json::from_str(text)?)
    }
}

#[test]
fn test_partial_config_keeps_defaults() {
    let config = Config::from_json(r#"{"save": {"include_system": false}}"#).unwrap();
    assert!(!config.save.include_system);
    assert!(config.save.sanitize_non_finite);
    assert_eq!(LoadOptions::default(), config.load);
    let config = Config::from_json(r#"{"load": {"x_worker_threads": 4}}"#).unwrap();
    assert_eq!(Some(4), config.load.x_worker_threads);
    assert!(Config::from_json("[").is_err());
}
