//! Sensor poller for a Linux single-board computer.
//!
//! This crate polls a DHT22 air temperature/humidity sensor, a level-only
//! water sensor and any number of DS18B20 ground thermometers, and prints one
//! report per cycle until interrupted.
//!
//! # Features
//! - Bit-banged DHT22 decoder built on the [`embedded-hal`] traits, timed
//!   against a software clock
//! - Digital lines over the sysfs GPIO interface
//! - DS18B20 thermometers read through the kernel's `w1-therm` driver
//! - Per-sensor failure isolation and cooperative shutdown
//!
//! # Optional Features
//! - `defmt`: Implements `defmt::Format` for the decoder's value types
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal

pub mod config;
pub mod dht22;
pub mod ds18b20;
pub mod error;
pub mod line;
pub mod poller;
pub mod report;
pub mod shutdown;
pub mod timing;

pub use config::Config;
pub use dht22::{Dht22, Frame, Reading as AirReading, Timing};
pub use ds18b20::{Ds18b20Reader, RetryPolicy, Thermometer};
pub use error::{ConfigError, DhtError, LineError, Phase, StartupError, ThermometerError};
pub use line::{Bidirectional, Direction, GpioChip, Line};
pub use poller::Poller;
pub use report::{Console, Reading, Sensor};
pub use shutdown::StopToken;
