//! Digital line over the Linux sysfs GPIO interface.
//!
//! A [`Line`] owns one exported pin for as long as it lives. The owning reader
//! releases it explicitly with [`Line::release`]; dropping an unreleased line
//! releases it as well, so the unexport happens exactly once either way.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};
use tracing::{debug, warn};

use crate::error::LineError;

/// Default mount point of the sysfs GPIO class.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Direction of a digital line.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn as_sysfs(self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }
}

/// A pin that can be switched between input and output at runtime.
///
/// `embedded-hal` leaves direction changes to the HAL; single-wire protocols
/// need them mid-transaction.
pub trait Bidirectional: ErrorType {
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error>;
}

impl<T: Bidirectional + ?Sized> Bidirectional for &mut T {
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error> {
        (**self).set_direction(direction)
    }
}

/// Handle to a sysfs GPIO controller directory.
#[derive(Clone, Debug)]
pub struct GpioChip {
    root: PathBuf,
}

impl GpioChip {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Exports `pin`, sets its direction and opens its value file.
    ///
    /// A pin that was exported but could not be configured is unexported
    /// again before the error is returned.
    pub fn acquire(&self, pin: u32, direction: Direction) -> Result<Line, LineError> {
        write_command(&self.root.join("export"), pin)
            .map_err(|source| LineError::Export { pin, source })?;
        debug!(pin, "exported gpio");

        let pin_dir = self.root.join(format!("gpio{pin}"));
        let configured = write_attr(&pin_dir.join("direction"), direction.as_sysfs())
            .map_err(|source| LineError::Direction { pin, source })
            .and_then(|()| {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(pin_dir.join("value"))
                    .map_err(|source| LineError::Read { pin, source })
            });

        match configured {
            Ok(value) => Ok(Line {
                pin,
                root: self.root.clone(),
                direction,
                value: Some(value),
            }),
            Err(err) => {
                unexport(&self.root, pin);
                Err(err)
            }
        }
    }
}

/// One exported GPIO pin.
#[derive(Debug)]
pub struct Line {
    pin: u32,
    root: PathBuf,
    direction: Direction,
    /// `None` once the line has been released.
    value: Option<File>,
}

impl Line {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_claimed(&self) -> bool {
        self.value.is_some()
    }

    /// Samples the current level.
    pub fn read(&mut self) -> Result<PinState, LineError> {
        let pin = self.pin;
        let file = self.value.as_ref().ok_or(LineError::Released { pin })?;
        let mut buf = [0u8; 4];
        let n = file
            .read_at(&mut buf, 0)
            .map_err(|source| LineError::Read { pin, source })?;
        match buf[..n].first() {
            Some(b'0') => Ok(PinState::Low),
            Some(b'1') => Ok(PinState::High),
            _ => Err(LineError::InvalidLevel {
                pin,
                value: String::from_utf8_lossy(&buf[..n]).trim().to_owned(),
            }),
        }
    }

    /// Drives the line; only meaningful while the direction is output.
    pub fn write(&mut self, level: PinState) -> Result<(), LineError> {
        let pin = self.pin;
        let file = self.value.as_ref().ok_or(LineError::Released { pin })?;
        let byte: &[u8] = match level {
            PinState::Low => b"0",
            PinState::High => b"1",
        };
        file.write_at(byte, 0)
            .map(drop)
            .map_err(|source| LineError::Write { pin, source })
    }

    /// Unexports the pin. Failures are logged and otherwise ignored; calling
    /// this again is a no-op.
    pub fn release(&mut self) {
        if self.value.take().is_some() {
            unexport(&self.root, self.pin);
        }
    }
}

impl Drop for Line {
    fn drop(&mut self) {
        self.release();
    }
}

impl ErrorType for Line {
    type Error = LineError;
}

impl InputPin for Line {
    fn is_high(&mut self) -> Result<bool, LineError> {
        Ok(self.read()? == PinState::High)
    }

    fn is_low(&mut self) -> Result<bool, LineError> {
        Ok(self.read()? == PinState::Low)
    }
}

impl OutputPin for Line {
    fn set_low(&mut self) -> Result<(), LineError> {
        self.write(PinState::Low)
    }

    fn set_high(&mut self) -> Result<(), LineError> {
        self.write(PinState::High)
    }
}

impl Bidirectional for Line {
    fn set_direction(&mut self, direction: Direction) -> Result<(), LineError> {
        let pin = self.pin;
        if !self.is_claimed() {
            return Err(LineError::Released { pin });
        }
        let path = self.root.join(format!("gpio{pin}")).join("direction");
        write_attr(&path, direction.as_sysfs())
            .map_err(|source| LineError::Direction { pin, source })?;
        self.direction = direction;
        Ok(())
    }
}

fn unexport(root: &Path, pin: u32) {
    match write_command(&root.join("unexport"), pin) {
        Ok(()) => debug!(pin, "unexported gpio"),
        Err(err) => warn!(pin, error = %err, "failed to unexport gpio"),
    }
}

/// Writes a pin number to the write-only `export`/`unexport` files.
fn write_command(path: &Path, pin: u32) -> io::Result<()> {
    OpenOptions::new()
        .append(true)
        .open(path)?
        .write_all(format!("{pin}\n").as_bytes())
}

/// Writes a sysfs attribute. Attributes always exist, so the file is never
/// created.
fn write_attr(path: &Path, contents: &str) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?
        .write_all(contents.as_bytes())
}
