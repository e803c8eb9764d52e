use std::{env, fs, path::Path};

use serde::Deserialize;
use shared::domain::{CampusLocation, Coordinate};
use tracing::{debug, warn};

pub const SETTINGS_FILE: &str = "krimini.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub default_horizon_hours: u32,
    pub max_horizon_hours: u32,
    pub transcript_retention: usize,
    pub emergency_trigger_message: String,
    pub voice_name: String,
    pub voice_input_sample_rate: u32,
    pub voice_output_sample_rate: u32,
    pub campus_locations: Vec<CampusLocation>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_latitude: 37.7749,
            default_longitude: -122.4194,
            default_horizon_hours: 24,
            max_horizon_hours: 48,
            transcript_retention: 11,
            emergency_trigger_message: "Emergency triggered via Command Center.".into(),
            voice_name: voice_link::DEFAULT_VOICE_NAME.into(),
            voice_input_sample_rate: 16_000,
            voice_output_sample_rate: 24_000,
            campus_locations: default_campus_locations(),
        }
    }
}

impl Settings {
    pub fn default_location(&self) -> Coordinate {
        Coordinate::new(self.default_latitude, self.default_longitude)
    }
}

fn default_campus_locations() -> Vec<CampusLocation> {
    [
        ("Main Library", 37.7749, -122.4194),
        ("Student Center", 37.7759, -122.4184),
        ("Engineering Building", 37.7739, -122.4204),
        ("Campus Security", 37.7769, -122.4174),
    ]
    .into_iter()
    .map(|(name, lat, lng)| CampusLocation {
        name: name.into(),
        coords: Coordinate::new(lat, lng),
    })
    .collect()
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    default_latitude: Option<f64>,
    default_longitude: Option<f64>,
    default_horizon_hours: Option<u32>,
    max_horizon_hours: Option<u32>,
    transcript_retention: Option<usize>,
    emergency_trigger_message: Option<String>,
    voice_name: Option<String>,
    voice_input_sample_rate: Option<u32>,
    voice_output_sample_rate: Option<u32>,
    campus_locations: Option<Vec<CampusLocation>>,
}

/// Defaults, overlaid by `krimini.toml` (or the file named by
/// `KRIMINI_CONFIG`), overlaid by environment variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    let path = env::var("KRIMINI_CONFIG").unwrap_or_else(|_| SETTINGS_FILE.to_string());
    if let Err(err) = apply_file(&mut settings, Path::new(&path)) {
        warn!(path = %path, "ignoring unreadable settings file: {err:#}");
    }

    apply_env_overrides(&mut settings, |key| env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, path: &Path) -> anyhow::Result<()> {
    let Ok(raw) = fs::read_to_string(path) else {
        debug!(path = %path.display(), "no settings file");
        return Ok(());
    };
    apply_toml(settings, &raw)?;
    Ok(())
}

pub fn apply_toml(settings: &mut Settings, raw: &str) -> Result<(), toml::de::Error> {
    let file: SettingsFile = toml::from_str(raw)?;

    if let Some(v) = file.default_latitude {
        settings.default_latitude = v;
    }
    if let Some(v) = file.default_longitude {
        settings.default_longitude = v;
    }
    if let Some(v) = file.default_horizon_hours {
        settings.default_horizon_hours = v;
    }
    if let Some(v) = file.max_horizon_hours {
        settings.max_horizon_hours = v;
    }
    if let Some(v) = file.transcript_retention {
        settings.transcript_retention = v;
    }
    if let Some(v) = file.emergency_trigger_message {
        settings.emergency_trigger_message = v;
    }
    if let Some(v) = file.voice_name {
        settings.voice_name = v;
    }
    if let Some(v) = file.voice_input_sample_rate {
        settings.voice_input_sample_rate = v;
    }
    if let Some(v) = file.voice_output_sample_rate {
        settings.voice_output_sample_rate = v;
    }
    if let Some(v) = file.campus_locations {
        settings.campus_locations = v;
    }

    Ok(())
}

/// Each setting reads `KRIMINI_<NAME>` and then `APP__<NAME>`; the latter wins.
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| {
        lookup(&format!("APP__{name}")).or_else(|| lookup(&format!("KRIMINI_{name}")))
    };

    if let Some(v) = read("DEFAULT_LATITUDE").and_then(|v| v.parse().ok()) {
        settings.default_latitude = v;
    }
    if let Some(v) = read("DEFAULT_LONGITUDE").and_then(|v| v.parse().ok()) {
        settings.default_longitude = v;
    }
    if let Some(v) = read("DEFAULT_HORIZON_HOURS").and_then(|v| v.parse().ok()) {
        settings.default_horizon_hours = v;
    }
    if let Some(v) = read("MAX_HORIZON_HOURS").and_then(|v| v.parse().ok()) {
        settings.max_horizon_hours = v;
    }
    if let Some(v) = read("TRANSCRIPT_RETENTION").and_then(|v| v.parse().ok()) {
        settings.transcript_retention = v;
    }
    if let Some(v) = read("EMERGENCY_TRIGGER_MESSAGE") {
        settings.emergency_trigger_message = v;
    }
    if let Some(v) = read("VOICE_NAME") {
        settings.voice_name = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
