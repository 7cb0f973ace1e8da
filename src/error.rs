use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Wait step of the DHT22 handshake that ran out of time.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Sensor never pulled the line low after the start request.
    Response,
    /// Sensor's acknowledge low pulse never ended.
    AckLow,
    /// Sensor's acknowledge high pulse never ended.
    AckHigh,
    /// Rising edge of data bit `index` never arrived.
    BitStart { index: u8 },
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Phase::Response => f.write_str("no response from sensor"),
            Phase::AckLow => f.write_str("acknowledge low pulse did not end"),
            Phase::AckHigh => f.write_str("acknowledge high pulse did not end"),
            Phase::BitStart { index } => write!(f, "data bit {index} never started"),
        }
    }
}

/// Possible errors from the DHT22 decoder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DhtError<E> {
    /// Timed out waiting for a pin state change.
    #[error("timed out: {0}")]
    Timeout(Phase),
    /// Checksum did not match the received data.
    #[error("checksum mismatch (computed {expected:#04x}, received {received:#04x})")]
    ChecksumMismatch { expected: u8, received: u8 },
    /// Error from the GPIO pin (input/output).
    #[error("line I/O failed: {0}")]
    PinError(E),
}

impl<E> From<E> for DhtError<E> {
    fn from(value: E) -> Self {
        Self::PinError(value)
    }
}

/// Errors raised by a sysfs GPIO line.
#[derive(Debug, Error)]
pub enum LineError {
    /// Writing the pin number to `export` failed.
    #[error("failed to export gpio{pin}")]
    Export {
        pin: u32,
        #[source]
        source: io::Error,
    },
    /// The `direction` attribute could not be written.
    #[error("failed to set direction of gpio{pin}")]
    Direction {
        pin: u32,
        #[source]
        source: io::Error,
    },
    /// The `value` attribute could not be opened or read.
    #[error("failed to read gpio{pin}")]
    Read {
        pin: u32,
        #[source]
        source: io::Error,
    },
    /// The `value` attribute could not be written.
    #[error("failed to write gpio{pin}")]
    Write {
        pin: u32,
        #[source]
        source: io::Error,
    },
    /// `value` held something other than `0` or `1`.
    #[error("gpio{pin} reported unexpected level {value:?}")]
    InvalidLevel { pin: u32, value: String },
    /// I/O on a line after [`Line::release`](crate::line::Line::release).
    #[error("gpio{pin} has already been released")]
    Released { pin: u32 },
}

impl embedded_hal::digital::Error for LineError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

/// Errors from reading a bus-exposed DS18B20 thermometer.
#[derive(Debug, Error)]
pub enum ThermometerError {
    /// The `w1_slave` record could not be read.
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The record was ready but had no usable `t=` value.
    #[error("invalid record in {}: {reason}", path.display())]
    InvalidRecord { path: PathBuf, reason: &'static str },
    /// Every attempt allowed by the retry policy saw a not-ready record.
    #[error("conversion not ready after {attempts} attempts")]
    NotReady { attempts: u32 },
}

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML or has unknown or mistyped keys.
    #[error("failed to parse config {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fatal failures while the poller is starting up.
#[derive(Debug, Error)]
pub enum StartupError {
    /// A GPIO line could not be claimed.
    #[error("hardware acquisition failed")]
    Line(#[from] LineError),
    /// The 1-Wire device directory exists but could not be listed.
    #[error("failed to enumerate thermometers in {}", path.display())]
    Enumerate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// SIGINT/SIGTERM handling could not be installed.
    #[error("failed to install stop signal handler")]
    Signal(#[from] ctrlc::Error),
}
