//! Polling loop composing every sensor into one report per cycle.
//!
//! [`Poller::start`] acquires all hardware up front and fails as a whole;
//! [`Poller::run`] reports each sensor in a fixed order until the stop token
//! is observed at a cycle boundary, then releases every line.

use std::io::Write;
use std::time::{Duration, Instant};

use embedded_hal::digital::InputPin;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dht22::Dht22;
use crate::ds18b20::{self, Ds18b20Reader, Thermometer};
use crate::error::StartupError;
use crate::line::{Direction, GpioChip, Line};
use crate::report::{Console, Reading, Sensor};
use crate::shutdown::StopToken;
use crate::timing::{MonotonicClock, SpinDelay};

/// Printed once every line has been released.
pub const STOP_NOTICE: &str = "Stopped by User";

/// Owns every claimed sensor and the console the readings are printed to.
///
/// Built by [`Poller::start`] and consumed by [`Poller::run`], which releases
/// the lines exactly once.
pub struct Poller<W> {
    air: Dht22<Line, SpinDelay, MonotonicClock>,
    air_offset_c: f32,
    water: Line,
    thermometers: Vec<Thermometer>,
    reader: Ds18b20Reader<SpinDelay>,
    interval: Duration,
    console: Console<W>,
}

impl<W: Write> Poller<W> {
    /// Enumerates thermometers and claims the air and water lines.
    ///
    /// Any failure is fatal; lines claimed before the failure are released
    /// on the way out.
    pub fn start(config: &Config, console: Console<W>) -> Result<Self, StartupError> {
        let tc = &config.thermometers;
        let thermometers = ds18b20::enumerate(&config.w1_root, &tc.names, &tc.offsets)
            .map_err(|source| StartupError::Enumerate {
                path: config.w1_root.clone(),
                source,
            })?;

        let chip = GpioChip::new(&config.gpio_root);
        let air_line = chip.acquire(config.air.pin, Direction::Output)?;
        let water = chip.acquire(config.water.pin, Direction::Input)?;

        info!(
            air_pin = config.air.pin,
            water_pin = config.water.pin,
            thermometers = thermometers.len(),
            "sensors acquired"
        );

        Ok(Self {
            air: Dht22::with_timing(
                air_line,
                SpinDelay,
                MonotonicClock::new(),
                config.air.timing,
            ),
            air_offset_c: config.air.offset_c,
            water,
            thermometers,
            reader: Ds18b20Reader::new(SpinDelay, tc.retry_policy()),
            interval: config.interval(),
            console,
        })
    }

    pub fn thermometers(&self) -> &[Thermometer] {
        &self.thermometers
    }

    /// Polls until `stop` is observed or `max_cycles` cycles have run, then
    /// drains. Returns the console sink.
    ///
    /// Cycles start once per interval; a cycle that overruns the interval is
    /// followed immediately by the next one.
    pub fn run(mut self, stop: &StopToken, max_cycles: Option<u64>) -> W {
        info!("polling");
        let within_cap = |cycles: u64| max_cycles.is_none_or(|max| cycles < max);
        let mut cycles = 0u64;
        while within_cap(cycles) && !stop.is_stopped() {
            let started = Instant::now();
            self.cycle();
            cycles += 1;
            if !within_cap(cycles) || stop.sleep(self.interval.saturating_sub(started.elapsed())) {
                break;
            }
        }
        debug!(cycles, "polling finished");
        self.drain()
    }

    /// Reads and reports every sensor once, in a fixed order: air, water,
    /// then each thermometer. Failures are reported in place and never cut
    /// the cycle short.
    pub fn cycle(&mut self) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(self.thermometers.len() + 3);
        for reading in self.read_air() {
            self.report(&mut readings, reading);
        }
        let water = self.read_water();
        self.report(&mut readings, water);
        for index in 0..self.thermometers.len() {
            let reading = self.read_thermometer(index);
            self.report(&mut readings, reading);
        }
        readings
    }

    fn report(&mut self, readings: &mut Vec<Reading>, reading: Reading) {
        self.console.emit(&reading);
        readings.push(reading);
    }

    fn read_air(&mut self) -> Vec<Reading> {
        match self.air.read() {
            Ok(reading) => vec![
                Reading::AirTemperature(reading.temperature + self.air_offset_c),
                Reading::Humidity(reading.relative_humidity),
            ],
            Err(err) => {
                warn!(error = %err, "air sensor read failed");
                vec![Reading::failed(Sensor::Air, err)]
            }
        }
    }

    fn read_water(&mut self) -> Reading {
        match self.water.is_high() {
            Ok(wet) => Reading::Water(wet),
            Err(err) => {
                warn!(error = %err, "water sensor read failed");
                Reading::failed(Sensor::Water, err)
            }
        }
    }

    fn read_thermometer(&mut self, index: usize) -> Reading {
        let device = &self.thermometers[index];
        match self.reader.read(device) {
            Ok(celsius) => Reading::Thermometer {
                name: device.name().to_owned(),
                celsius,
            },
            Err(err) => {
                warn!(id = device.id(), error = %err, "thermometer read failed");
                Reading::failed(Sensor::Thermometer(device.name().to_owned()), err)
            }
        }
    }

    fn drain(mut self) -> W {
        info!("releasing lines");
        self.air.pin_mut().release();
        self.water.release();
        self.console.notice(STOP_NOTICE);
        self.console.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht22::Timing;
    use crate::error::LineError;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    const AIR_PIN: u32 = 3;
    const WATER_PIN: u32 = 2;

    struct Rig {
        sysfs: TempDir,
        w1: TempDir,
    }

    impl Rig {
        fn new(pins: &[u32]) -> Self {
            let sysfs = TempDir::new().unwrap();
            fs::write(sysfs.path().join("export"), "").unwrap();
            fs::write(sysfs.path().join("unexport"), "").unwrap();
            for pin in pins {
                let dir = sysfs.path().join(format!("gpio{pin}"));
                fs::create_dir(&dir).unwrap();
                fs::write(dir.join("direction"), "in").unwrap();
                fs::write(dir.join("value"), "1\n").unwrap();
            }
            Self {
                sysfs,
                w1: TempDir::new().unwrap(),
            }
        }

        fn add_device(&self, id: &str, record: &str) {
            let dir = self.w1.path().join(id);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("w1_slave"), record).unwrap();
        }

        fn config(&self) -> Config {
            let mut config = Config {
                gpio_root: self.sysfs.path().to_owned(),
                w1_root: self.w1.path().to_owned(),
                interval_ms: 10,
                ..Config::default()
            };
            config.air.pin = AIR_PIN;
            config.water.pin = WATER_PIN;
            // a static value file never answers the start request
            config.air.timing = Timing {
                request_low_us: 0,
                ..Timing::default()
            };
            config.thermometers.names = HashMap::from([(
                "28-000000000001".to_owned(),
                "Ground Temperature 1".to_owned(),
            )]);
            config
        }

        fn unexported(&self) -> Vec<String> {
            read_lines(&self.sysfs.path().join("unexport"))
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    const READY: &str = "50 05 4b 46 7f ff 0c 10 1c : crc=1c YES\n\
                         50 05 4b 46 7f ff 0c 10 1c t=21000\n";

    #[test]
    fn cycle_isolates_failures() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        rig.add_device("28-000000000001", READY);
        rig.add_device("28-000000000002", "00 : crc=00 YES\n00 garbage\n");

        let mut poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        let readings = poller.cycle();

        assert_eq!(readings.len(), 4);
        assert!(matches!(readings[0], Reading::Failed { sensor: Sensor::Air, .. }));
        assert_eq!(readings[1], Reading::Water(true));
        assert_eq!(
            readings[2],
            Reading::Thermometer {
                name: "Ground Temperature 1".into(),
                celsius: 21.0
            }
        );
        assert!(matches!(
            readings[3],
            Reading::Failed { sensor: Sensor::Thermometer(ref name), .. } if name == "Unknown Sensor"
        ));
    }

    #[test]
    fn water_line_reports_dry() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        fs::write(
            rig.sysfs.path().join(format!("gpio{WATER_PIN}/value")),
            "0\n",
        )
        .unwrap();

        let mut poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        assert_eq!(poller.cycle()[1], Reading::Water(false));
    }

    #[test]
    fn water_failure_does_not_suppress_thermometers() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        rig.add_device("28-000000000001", READY);
        fs::write(
            rig.sysfs.path().join(format!("gpio{WATER_PIN}/value")),
            "x\n",
        )
        .unwrap();

        let mut poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        let readings = poller.cycle();

        assert_eq!(readings.len(), 3);
        assert!(matches!(
            readings[1],
            Reading::Failed { sensor: Sensor::Water, ref reason } if reason.contains("gpio2")
        ));
        assert_eq!(
            readings[2],
            Reading::Thermometer {
                name: "Ground Temperature 1".into(),
                celsius: 21.0
            }
        );
    }

    #[test]
    fn single_cycle_then_drain() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        rig.add_device("28-000000000001", READY);

        let poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        let out = poller.run(&StopToken::new(), Some(1));
        let lines: Vec<_> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Failed to retrieve data from humidity sensor: "));
        assert_eq!(lines[1], "Water: Yes");
        assert_eq!(lines[2], "Ground Temperature 1: 21.0 °C");
        assert_eq!(lines[3], STOP_NOTICE);
    }

    #[test]
    fn stopped_token_runs_no_cycle_and_releases_once() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        let stop = StopToken::new();
        stop.stop();

        let poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        let out = poller.run(&stop, None);

        assert_eq!(String::from_utf8(out).unwrap(), "Stopped by User\n");
        assert_eq!(rig.unexported(), ["3", "2"]);
    }

    #[test]
    fn zero_cycle_cap_only_drains() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        rig.add_device("28-000000000001", READY);

        let poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        let out = poller.run(&StopToken::new(), Some(0));

        assert_eq!(String::from_utf8(out).unwrap(), "Stopped by User\n");
        assert_eq!(rig.unexported(), ["3", "2"]);
    }

    #[test]
    fn stop_from_another_thread_ends_run() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        let stop = StopToken::new();
        let stopper = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            stopper.stop();
        });

        let poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        let out = String::from_utf8(poller.run(&stop, None)).unwrap();
        handle.join().unwrap();

        assert!(out.contains("Water: Yes\n"));
        assert!(out.ends_with("Stopped by User\n"));
        assert_eq!(rig.unexported(), ["3", "2"]);
    }

    #[test]
    fn failed_acquire_is_fatal_and_releases_claimed_lines() {
        // no gpio2 directory: the water line cannot be configured
        let rig = Rig::new(&[AIR_PIN]);

        let err = Poller::start(&rig.config(), Console::new(Vec::new()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            StartupError::Line(LineError::Direction { pin: 2, .. })
        ));
        assert_eq!(rig.unexported(), ["2", "3"]);
    }

    #[test]
    fn enumerates_thermometers_at_start() {
        let rig = Rig::new(&[AIR_PIN, WATER_PIN]);
        rig.add_device("28-000000000002", READY);
        rig.add_device("28-000000000001", READY);

        let poller = Poller::start(&rig.config(), Console::new(Vec::new())).unwrap();
        let ids: Vec<_> = poller.thermometers().iter().map(Thermometer::id).collect();
        assert_eq!(ids, ["28-000000000001", "28-000000000002"]);

        // devices added later are not picked up
        rig.add_device("28-000000000003", READY);
        assert_eq!(poller.thermometers().len(), 2);
    }
}
