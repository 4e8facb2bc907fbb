use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::light::ResolveOptions;

pub const PROCESSING_DELAY_ENV_VAR: &str = "UMBRA_PROCESSING_DELAY_MS";
pub const ENABLED_ENV_VAR: &str = "UMBRA_ENABLED";
pub const EFFECTS_ENV_VAR: &str = "UMBRA_EFFECTS";

/// Which downstream marker format the reconciler writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStyle {
    #[default]
    StatusIcon,
    ActiveEffect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureSettings {
    pub enabled: bool,
    pub effects_enabled: bool,
    pub global_illumination: bool,
    pub negative_lights: bool,
    /// Per-actor debounce; 0 resolves inside `notify`.
    pub processing_delay_ms: u64,
    pub cooldown_ms: u64,
    pub pending_max_age_ms: u64,
    pub scene_pass_batch_size: usize,
    pub marker_style: MarkerStyle,
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            effects_enabled: true,
            global_illumination: true,
            negative_lights: true,
            processing_delay_ms: 0,
            cooldown_ms: 500,
            pending_max_age_ms: 5000,
            scene_pass_batch_size: 64,
            marker_style: MarkerStyle::StatusIcon,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Parse(String),
    #[error("invalid settings: {field} must be greater than zero")]
    NonPositive { field: &'static str },
}

impl ExposureSettings {
    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let settings = match serde_path_to_error::deserialize::<_, Self>(&mut deserializer) {
            Ok(settings) => settings,
            Err(error) => {
                let path = error.path().to_string();
                let source = error.into_inner();
                return Err(if path.is_empty() || path == "." {
                    SettingsError::Parse(format!("parse settings json: {source}"))
                } else {
                    SettingsError::Parse(format!("parse settings json at {path}: {source}"))
                });
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cooldown_ms == 0 {
            return Err(SettingsError::NonPositive {
                field: "cooldown_ms",
            });
        }
        if self.pending_max_age_ms == 0 {
            return Err(SettingsError::NonPositive {
                field: "pending_max_age_ms",
            });
        }
        if self.scene_pass_batch_size == 0 {
            return Err(SettingsError::NonPositive {
                field: "scene_pass_batch_size",
            });
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key));
    }

    /// Same as [`Self::apply_env_overrides`] with an injectable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        if let Some(value) = read_override(&lookup, PROCESSING_DELAY_ENV_VAR, parse_millis) {
            self.processing_delay_ms = value;
        }
        if let Some(value) = read_override(&lookup, ENABLED_ENV_VAR, parse_flag) {
            self.enabled = value;
        }
        if let Some(value) = read_override(&lookup, EFFECTS_ENV_VAR, parse_flag) {
            self.effects_enabled = value;
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            global_illumination: self.global_illumination,
            negative_lights: self.negative_lights,
        }
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn pending_max_age(&self) -> Duration {
        Duration::from_millis(self.pending_max_age_ms)
    }
}

fn read_override<F, T>(lookup: &F, key: &'static str, parse: fn(&str) -> Option<T>) -> Option<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(key) {
        Ok(value) => match parse(value.trim()) {
            Some(parsed) => Some(parsed),
            None => {
                warn!(
                    env_var = key,
                    value = value.as_str(),
                    "invalid settings env var value; keeping configured value"
                );
                None
            }
        },
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                env_var = key,
                error = %err,
                "unable to read settings env var; keeping configured value"
            );
            None
        }
    }
}

fn parse_millis(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup_from(
        pairs: &[(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Result<String, env::VarError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| {
            map.get(key)
                .map(|value| value.to_string())
                .ok_or(env::VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = ExposureSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.cooldown(), Duration::from_millis(500));
        assert_eq!(settings.pending_max_age(), Duration::from_millis(5000));
        assert_eq!(settings.scene_pass_batch_size, 64);
        assert_eq!(settings.processing_delay(), Duration::ZERO);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings = ExposureSettings::from_json_str(
            r#"{ "processing_delay_ms": 150, "marker_style": "active_effect" }"#,
        )
        .expect("settings");
        assert_eq!(settings.processing_delay_ms, 150);
        assert_eq!(settings.marker_style, MarkerStyle::ActiveEffect);
        assert_eq!(settings.cooldown_ms, 500);
    }

    #[test]
    fn parse_errors_name_the_failing_field() {
        let error = ExposureSettings::from_json_str(r#"{ "cooldown_ms": "soon" }"#)
            .expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("at cooldown_ms"), "{message}");
    }

    #[test]
    fn zero_cooldown_is_rejected() {
        let error =
            ExposureSettings::from_json_str(r#"{ "cooldown_ms": 0 }"#).expect_err("must fail");
        assert!(matches!(
            error,
            SettingsError::NonPositive {
                field: "cooldown_ms"
            }
        ));
    }

    #[test]
    fn load_reads_settings_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "effects_enabled": false }}"#).expect("write settings");
        let settings = ExposureSettings::load(file.path()).expect("load");
        assert!(!settings.effects_enabled);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = ExposureSettings::load(&dir.path().join("absent.json")).expect_err("missing");
        assert!(matches!(error, SettingsError::Read { .. }));
    }

    #[test]
    fn env_overrides_replace_configured_values() {
        let mut settings = ExposureSettings::default();
        settings.apply_overrides_from(lookup_from(&[
            (PROCESSING_DELAY_ENV_VAR, "250"),
            (ENABLED_ENV_VAR, "off"),
            (EFFECTS_ENV_VAR, "false"),
        ]));
        assert_eq!(settings.processing_delay_ms, 250);
        assert!(!settings.enabled);
        assert!(!settings.effects_enabled);
    }

    #[test]
    fn invalid_env_values_keep_configured_values() {
        let mut settings = ExposureSettings {
            processing_delay_ms: 40,
            ..ExposureSettings::default()
        };
        settings.apply_overrides_from(lookup_from(&[
            (PROCESSING_DELAY_ENV_VAR, "-3"),
            (ENABLED_ENV_VAR, "maybe"),
        ]));
        assert_eq!(settings.processing_delay_ms, 40);
        assert!(settings.enabled);
    }
}
