use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, sync::PoisonError, time::Duration};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/process_tweet";
pub const MIN_DEBOUNCE_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Classification service URL the relay POSTs to.
    pub endpoint: String,
    pub debounce_ms: u64,
    pub startup_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            debounce_ms: 100,
            startup_delay_ms: 750,
            request_timeout_secs: 10,
        }
    }
}

impl Settings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(MIN_DEBOUNCE_MS))
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Applies `POSTFLAG_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup("POSTFLAG_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint.trim().to_string();
        }
        if let Some(ms) = lookup("POSTFLAG_DEBOUNCE_MS").and_then(|v| v.trim().parse().ok()) {
            self.debounce_ms = ms;
        }
        if is_debug(lookup("POSTFLAG_DEBUG")) {
            self.debounce_ms = MIN_DEBOUNCE_MS;
        }
        self
    }
}

pub fn debug_enabled() -> bool {
    is_debug(std::env::var("POSTFLAG_DEBUG").ok())
}

fn is_debug(value: Option<String>) -> bool {
    value
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> Settings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("postflag.json")).unwrap();
        assert_eq!(store.settings(), Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postflag.json");
        fs::write(&path, r#"{ "endpoint": "http://localhost:9000/classify" }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.endpoint, "http://localhost:9000/classify");
        assert_eq!(settings.debounce_ms, 100);
        assert_eq!(settings.startup_delay(), Duration::from_millis(750));
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postflag.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().settings(), Settings::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postflag.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.settings();
        settings.debounce_ms = 250;
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.settings(), settings);
        reopened.reload().unwrap();
        assert_eq!(reopened.settings().debounce_ms, 250);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("POSTFLAG_ENDPOINT", " http://10.0.0.2:5000/process_tweet "),
            ("POSTFLAG_DEBOUNCE_MS", "40"),
        ]);
        let settings =
            Settings::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.endpoint, "http://10.0.0.2:5000/process_tweet");
        assert_eq!(settings.debounce(), Duration::from_millis(40));
    }

    #[test]
    fn debug_mode_uses_minimum_debounce() {
        let settings = Settings::default().with_overrides(|key| {
            (key == "POSTFLAG_DEBUG").then(|| "TRUE".to_string())
        });
        assert_eq!(settings.debounce_ms, MIN_DEBOUNCE_MS);
    }

    #[test]
    fn zero_debounce_is_clamped() {
        let settings = Settings {
            debounce_ms: 0,
            ..Settings::default()
        };
        assert_eq!(settings.debounce(), Duration::from_millis(MIN_DEBOUNCE_MS));
    }
}
