//! Poller configuration, loaded from TOML.
//!
//! Every field has a default matching the original wiring (DHT22 on GPIO 3,
//! water sensor on GPIO 2, two ground thermometers), so an empty file is valid.
//!
//! ```toml
//! interval_ms = 1000
//!
//! [air]
//! pin = 3
//! offset_c = -4.5
//!
//! [air.timing]
//! bit_threshold_us = 40
//!
//! [thermometers]
//! max_retries = 25
//!
//! [thermometers.names]
//! "28-3c01f0963fbc" = "Ground Temperature 1"
//!
//! [thermometers.offsets]
//! "28-3c01f0963fbc" = -3.0
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dht22::Timing;
use crate::ds18b20::{RetryPolicy, W1_DEVICES_ROOT};
use crate::error::ConfigError;
use crate::line::SYSFS_GPIO_ROOT;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// sysfs GPIO class directory.
    pub gpio_root: PathBuf,
    /// 1-Wire bus device directory.
    pub w1_root: PathBuf,
    /// Polling cadence.
    pub interval_ms: u64,
    pub air: AirConfig,
    pub water: WaterConfig,
    pub thermometers: ThermometerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from(SYSFS_GPIO_ROOT),
            w1_root: PathBuf::from(W1_DEVICES_ROOT),
            interval_ms: 1000,
            air: AirConfig::default(),
            water: WaterConfig::default(),
            thermometers: ThermometerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// DHT22 air temperature and humidity sensor.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AirConfig {
    pub pin: u32,
    /// Added to the decoded temperature.
    pub offset_c: f32,
    pub timing: Timing,
}

impl Default for AirConfig {
    fn default() -> Self {
        Self {
            pin: 3,
            offset_c: 0.0,
            timing: Timing::default(),
        }
    }
}

/// Level-only water sensor.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaterConfig {
    pub pin: u32,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self { pin: 2 }
    }
}

/// DS18B20 thermometers on the 1-Wire bus.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermometerConfig {
    pub retry_interval_ms: u32,
    /// Unset keeps re-reading a not-ready record forever.
    pub max_retries: Option<u32>,
    /// Display name by device id.
    pub names: HashMap<String, String>,
    /// Calibration offset in degrees Celsius by device id.
    pub offsets: HashMap<String, f64>,
}

impl Default for ThermometerConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 200,
            max_retries: None,
            names: HashMap::from([
                (
                    "28-3c01f0965cb3".to_owned(),
                    "Ground Temperature 2".to_owned(),
                ),
                (
                    "28-3c01f0963fbc".to_owned(),
                    "Ground Temperature 1".to_owned(),
                ),
            ]),
            offsets: HashMap::new(),
        }
    }
}

impl ThermometerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(u64::from(self.retry_interval_ms)),
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.air.pin, 3);
        assert_eq!(config.water.pin, 2);
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.thermometers.retry_policy(), RetryPolicy::default());
        assert_eq!(
            config.thermometers.names["28-3c01f0963fbc"],
            "Ground Temperature 1"
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            interval_ms = 2500

            [air]
            offset_c = -4.5

            [air.timing]
            bit_cap_us = 120

            [thermometers]
            max_retries = 10

            [thermometers.names]
            "28-000000000001" = "Pond"
            "#,
        )
        .unwrap();

        assert_eq!(config.interval_ms, 2500);
        assert_eq!(config.air.pin, 3);
        assert_eq!(config.air.offset_c, -4.5);
        assert_eq!(config.air.timing.bit_cap_us, 120);
        assert_eq!(config.air.timing.bit_threshold_us, 40);
        assert_eq!(config.thermometers.max_retries, Some(10));
        assert_eq!(config.thermometers.names.len(), 1);
    }

    #[test]
    fn oversized_retry_interval_is_rejected() {
        let parsed = toml::from_str::<Config>("[thermometers]\nretry_interval_ms = 4294967496\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[water]\npni = 4\n").is_err());
    }

    #[test]
    fn misspelled_timing_key_is_rejected() {
        let err = toml::from_str::<Config>("[air.timing]\nbit_treshold_us = 60\n").unwrap_err();
        assert!(err.to_string().contains("bit_treshold_us"));
    }

    #[test]
    fn load_reports_path_on_error() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "interval_ms = \"soon\"").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == file.path()));
    }

    #[test]
    fn load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/sensor-poller.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
