//! Per-cycle readings and their console lines.

use std::fmt;
use std::io::Write;

use tracing::warn;

/// Which sensor a failed reading came from.
#[derive(Clone, Debug, PartialEq)]
pub enum Sensor {
    Air,
    Water,
    Thermometer(String),
}

/// One sensor's outcome for one cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum Reading {
    /// Air temperature in degrees Celsius.
    AirTemperature(f32),
    /// Relative humidity in percent.
    Humidity(f32),
    /// Whether the water sensor is wet.
    Water(bool),
    /// Ground thermometer temperature in degrees Celsius.
    Thermometer { name: String, celsius: f64 },
    Failed { sensor: Sensor, reason: String },
}

impl Reading {
    pub fn failed(sensor: Sensor, reason: impl fmt::Display) -> Self {
        Reading::Failed {
            sensor,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::AirTemperature(celsius) => write!(f, "Air Temperature: {celsius:.1} C"),
            Reading::Humidity(percent) => write!(f, "Humidity: {percent:.1} %"),
            Reading::Water(true) => f.write_str("Water: Yes"),
            Reading::Water(false) => f.write_str("Water: No"),
            Reading::Thermometer { name, celsius } => write!(f, "{name}: {celsius:.1} °C"),
            Reading::Failed { sensor, reason } => match sensor {
                Sensor::Air => write!(f, "Failed to retrieve data from humidity sensor: {reason}"),
                Sensor::Water => write!(f, "Failed to read water sensor: {reason}"),
                Sensor::Thermometer(name) => {
                    write!(f, "Failed to read temperature from {name}: {reason}")
                }
            },
        }
    }
}

/// Line-oriented console sink.
pub struct Console<W> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn emit(&mut self, reading: &Reading) {
        self.line(format_args!("{reading}"));
    }

    pub fn notice(&mut self, text: &str) {
        self.line(format_args!("{text}"));
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        let written = self.out.write_fmt(args).and_then(|()| {
            self.out.write_all(b"\n")?;
            self.out.flush()
        });
        if let Err(err) = written {
            warn!(error = %err, "failed to write to console");
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_successful_readings() {
        assert_eq!(
            Reading::AirTemperature(26.6).to_string(),
            "Air Temperature: 26.6 C"
        );
        assert_eq!(Reading::Humidity(65.2).to_string(), "Humidity: 65.2 %");
        assert_eq!(Reading::Water(true).to_string(), "Water: Yes");
        assert_eq!(Reading::Water(false).to_string(), "Water: No");
        assert_eq!(
            Reading::Thermometer {
                name: "Ground Temperature 1".into(),
                celsius: 12.0625,
            }
            .to_string(),
            "Ground Temperature 1: 12.1 °C"
        );
    }

    #[test]
    fn formats_failures_with_reason() {
        assert_eq!(
            Reading::failed(Sensor::Air, "timed out").to_string(),
            "Failed to retrieve data from humidity sensor: timed out"
        );
        assert_eq!(
            Reading::failed(Sensor::Water, "gpio2 busy").to_string(),
            "Failed to read water sensor: gpio2 busy"
        );
        let failed = Reading::failed(Sensor::Thermometer("Unknown Sensor".into()), "no t= field");
        assert_eq!(
            failed.to_string(),
            "Failed to read temperature from Unknown Sensor: no t= field"
        );
    }

    #[test]
    fn console_writes_one_line_per_reading() {
        let mut console = Console::new(Vec::new());
        console.emit(&Reading::Water(false));
        console.notice("Stopped by User");

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(out, "Water: No\nStopped by User\n");
    }
}
