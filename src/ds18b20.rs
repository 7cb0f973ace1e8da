//! DS18B20 thermometers exposed by the kernel's `w1-therm` driver.
//!
//! Each device shows up as `<w1 root>/28-<serial>/w1_slave`, a two-line text
//! record:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line ends in `YES` once the conversion is valid; the second
//! carries the temperature in millidegrees Celsius.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use tracing::{debug, warn};

use crate::error::ThermometerError;

/// Family code prefix of DS18B20 device directories.
pub const FAMILY_PREFIX: &str = "28-";

/// Display name for devices missing from the name table.
pub const UNKNOWN_SENSOR: &str = "Unknown Sensor";

/// Default mount point of the 1-Wire bus devices.
pub const W1_DEVICES_ROOT: &str = "/sys/bus/w1/devices";

const READY_MARKER: &str = "YES";
const TEMPERATURE_TAG: &str = "t=";

/// One enumerated thermometer.
#[derive(Clone, Debug, PartialEq)]
pub struct Thermometer {
    id: String,
    name: String,
    record_path: PathBuf,
    offset_c: f64,
}

impl Thermometer {
    pub fn new(id: impl Into<String>, name: impl Into<String>, record_path: PathBuf) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            record_path,
            offset_c: 0.0,
        }
    }

    /// Calibration offset added to every reading.
    pub fn with_offset(mut self, offset_c: f64) -> Self {
        self.offset_c = offset_c;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn offset_c(&self) -> f64 {
        self.offset_c
    }
}

/// Lists the thermometers under `root`, sorted by device id.
///
/// Names and calibration offsets are looked up by device id. A missing bus
/// directory means the `w1-gpio` overlay is not loaded; that yields no devices
/// rather than an error.
pub fn enumerate(
    root: &Path,
    names: &HashMap<String, String>,
    offsets: &HashMap<String, f64>,
) -> io::Result<Vec<Thermometer>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(root = %root.display(), "1-Wire bus directory not found, no thermometers");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str() {
            if id.starts_with(FAMILY_PREFIX) {
                ids.push(id.to_owned());
            }
        }
    }
    ids.sort();

    Ok(ids
        .into_iter()
        .map(|id| {
            let name = names.get(&id).map_or(UNKNOWN_SENSOR, String::as_str);
            let offset = offsets.get(&id).copied().unwrap_or(0.0);
            let record_path = root.join(&id).join("w1_slave");
            debug!(%id, name, "found thermometer");
            Thermometer::new(id, name, record_path).with_offset(offset)
        })
        .collect())
}

/// How long to keep re-reading a record that is not ready yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` retries until the record becomes ready.
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            max_retries: None,
        }
    }
}

/// Outcome of parsing one raw record.
#[derive(Debug, PartialEq, Eq)]
enum Record {
    NotReady,
    Ready { millidegrees: i32 },
}

fn parse_record(text: &str) -> Result<Record, &'static str> {
    let mut lines = text.lines();
    let ready = lines
        .next()
        .is_some_and(|status| status.trim_end().ends_with(READY_MARKER));
    if !ready {
        return Ok(Record::NotReady);
    }

    let data = lines.next().ok_or("missing temperature line")?;
    let pos = data.find(TEMPERATURE_TAG).ok_or("no t= field")?;
    let millidegrees = data[pos + TEMPERATURE_TAG.len()..]
        .trim()
        .parse()
        .map_err(|_| "t= field is not an integer")?;
    Ok(Record::Ready { millidegrees })
}

/// Reads thermometers, waiting out conversions that are still in progress.
pub struct Ds18b20Reader<D> {
    delay: D,
    policy: RetryPolicy,
}

impl<D: DelayNs> Ds18b20Reader<D> {
    pub fn new(delay: D, policy: RetryPolicy) -> Self {
        Self { delay, policy }
    }

    /// Reads `device` in degrees Celsius, offset applied.
    ///
    /// A record without the ready marker is re-read after sleeping for the
    /// policy interval until it becomes ready or the retry bound is hit.
    pub fn read(&mut self, device: &Thermometer) -> Result<f64, ThermometerError> {
        let path = device.record_path();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let text = fs::read_to_string(path).map_err(|source| ThermometerError::Read {
                path: path.to_owned(),
                source,
            })?;

            let record =
                parse_record(&text).map_err(|reason| ThermometerError::InvalidRecord {
                    path: path.to_owned(),
                    reason,
                })?;
            if let Record::Ready { millidegrees } = record {
                return Ok(f64::from(millidegrees) / 1000.0 + device.offset_c());
            }

            if self.policy.max_retries.is_some_and(|max| attempts > max) {
                return Err(ThermometerError::NotReady { attempts });
            }
            debug!(id = device.id(), attempts, "conversion not ready, retrying");
            let sleep_ms = u32::try_from(self.policy.interval.as_millis()).unwrap_or(u32::MAX);
            self.delay.delay_ms(sleep_ms);
        }
    }
}
