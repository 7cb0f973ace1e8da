use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{DhtError, Phase};
use crate::line::{Bidirectional, Direction};
use crate::timing::Clock;

/// Number of data bits in one DHT22 transmission.
const FRAME_BITS: u8 = 40;

/// Timing budget of the DHT22 handshake, in microseconds.
///
/// The defaults are the sensor's nominal values. Timeouts are measured
/// against a software [`Clock`], so they bound how long each wait may poll
/// rather than the exact pulse width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    /// How long the start request holds the line low.
    pub request_low_us: u32,
    /// How long the line is released high before switching to input.
    pub release_high_us: u32,
    /// Wait for the sensor to pull the line low after the request.
    pub response_timeout_us: u32,
    /// Wait for the end of the sensor's acknowledge low pulse.
    pub ack_low_timeout_us: u32,
    /// Wait for the end of the sensor's acknowledge high pulse.
    pub ack_high_timeout_us: u32,
    /// Wait for the rising edge that starts each data bit.
    pub bit_start_timeout_us: u32,
    /// High pulses longer than this decode to `1`.
    pub bit_threshold_us: u32,
    /// Upper bound on measuring one high pulse.
    pub bit_cap_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            request_low_us: 18_000,
            release_high_us: 30,
            response_timeout_us: 40,
            ack_low_timeout_us: 88,
            ack_high_timeout_us: 88,
            bit_start_timeout_us: 65,
            bit_threshold_us: 40,
            bit_cap_us: 100,
        }
    }
}

/// Driver for the DHT22 temperature and humidity sensor on a bidirectional
/// line without hardware edge timestamps.
pub struct Dht22<PIN, D, C> {
    pin: PIN,
    delay: D,
    clock: C,
    timing: Timing,
}

/// Reading returned by the DHT22 sensor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub relative_humidity: f32,
}

/// Five raw bytes whose checksum has been verified: humidity high/low,
/// temperature high/low, checksum.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame([u8; 5]);

impl Frame {
    /// Validates the checksum byte against the truncated sum of the payload.
    pub fn new<E>(bytes: [u8; 5]) -> Result<Self, DhtError<E>> {
        let expected = bytes[..4].iter().fold(0u8, |sum, v| sum.wrapping_add(*v));
        let received = bytes[4];
        if expected != received {
            return Err(DhtError::ChecksumMismatch { expected, received });
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> [u8; 5] {
        self.0
    }

    /// Converts the payload into a `Reading`.
    ///
    /// Temperature is sign-magnitude: bit 7 of the high byte is the sign,
    /// the remaining 15 bits are tenths of a degree.
    pub fn reading(&self) -> Reading {
        let [hum_hi, hum_lo, temp_hi, temp_lo, _] = self.0;

        let joined_humidity = u16::from_be_bytes([hum_hi, hum_lo]);
        let relative_humidity = joined_humidity as f32 / 10.0;

        let is_temp_negative = (temp_hi >> 7) != 0;
        let temp_hi = temp_hi & 0b0111_1111;
        let joined_temp = u16::from_be_bytes([temp_hi, temp_lo]);
        let mut temperature = joined_temp as f32 / 10.0;
        if is_temp_negative {
            temperature = -temperature;
        }

        Reading {
            temperature,
            relative_humidity,
        }
    }
}

impl<PIN, DELAY, CLOCK, E> Dht22<PIN, DELAY, CLOCK>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E> + Bidirectional<Error = E>,
    DELAY: DelayNs,
    CLOCK: Clock,
{
    /// Creates a new instance of the DHT22 driver with nominal timing.
    ///
    /// # Arguments
    ///
    /// * `pin` - The line connected to the DHT22 data pin. Must support both input and output.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    /// * `clock` - Free-running clock used to time pulses.
    pub fn new(pin: PIN, delay: DELAY, clock: CLOCK) -> Self {
        Self::with_timing(pin, delay, clock, Timing::default())
    }

    /// Creates a driver with a custom timing budget, e.g. one loaded from the
    /// `[air.timing]` config table.
    pub fn with_timing(pin: PIN, delay: DELAY, clock: CLOCK, timing: Timing) -> Self {
        Dht22 {
            pin,
            delay,
            clock,
            timing,
        }
    }

    pub fn pin_mut(&mut self) -> &mut PIN {
        &mut self.pin
    }

    /// Reads a temperature and humidity measurement from the DHT22 sensor.
    ///
    /// This method performs the complete DHT22 communication sequence:
    /// sending a start signal, waiting for the sensor's acknowledge,
    /// reading 40 bits, validating the checksum, and decoding the result.
    ///
    /// # Returns
    ///
    /// * `Ok(Reading)` if the read is successful and the checksum is valid.
    /// * `Err(DhtError)` naming the step that failed otherwise.
    pub fn read(&mut self) -> Result<Reading, DhtError<E>> {
        self.start()?;
        let bytes = self.read_bits()?;
        let frame = Frame::new(bytes)?;
        debug!(bytes = ?frame.bytes(), "dht22 frame received");
        Ok(frame.reading())
    }

    /// Sends the start request and waits through the sensor's acknowledge.
    ///
    /// The line is held low to wake the sensor, released high briefly, then
    /// turned around to input. The sensor answers with ~80us low followed by
    /// ~80us high before the first data bit.
    fn start(&mut self) -> Result<(), DhtError<E>> {
        let t = self.timing;

        // MCU sends start request
        self.pin.set_direction(Direction::Output)?;
        self.pin.set_low()?;
        self.delay.delay_us(t.request_low_us);
        self.pin.set_high()?;
        self.delay.delay_us(t.release_high_us);
        self.pin.set_direction(Direction::Input)?;

        // Waiting for DHT22 Response
        self.wait_for_low(t.response_timeout_us, Phase::Response)?;
        self.wait_for_high(t.ack_low_timeout_us, Phase::AckLow)?;
        self.wait_for_low(t.ack_high_timeout_us, Phase::AckHigh)?;
        Ok(())
    }

    /// Reads all 40 bits, packed MSB-first in arrival order.
    fn read_bits(&mut self) -> Result<[u8; 5], DhtError<E>> {
        let mut bytes = [0u8; 5];
        for index in 0..FRAME_BITS {
            if self.read_bit(index)? {
                bytes[usize::from(index / 8)] |= 1 << (7 - index % 8);
            }
        }
        Ok(bytes)
    }

    /// Reads a single bit from the sensor.
    ///
    /// Every bit starts with ~50us low; the length of the following high
    /// pulse carries the value (~27us for 0, ~70us for 1).
    fn read_bit(&mut self, index: u8) -> Result<bool, DhtError<E>> {
        let t = self.timing;
        self.wait_for_high(t.bit_start_timeout_us, Phase::BitStart { index })?;
        let high_us = self.measure_high()?;
        Ok(high_us > u64::from(t.bit_threshold_us))
    }

    /// Measures how long the line stays high, capped at `bit_cap_us`.
    fn measure_high(&mut self) -> Result<u64, E> {
        let cap = u64::from(self.timing.bit_cap_us);
        let start = self.clock.now_us();
        while self.pin.is_high()? {
            if self.clock.since_us(start) > cap {
                break;
            }
        }
        Ok(self.clock.since_us(start))
    }

    /// Waits until the data line goes high or times out.
    fn wait_for_high(&mut self, timeout_us: u32, phase: Phase) -> Result<(), DhtError<E>> {
        Self::wait_for_state(&self.clock, timeout_us, phase, || self.pin.is_high())
    }

    /// Waits until the data line goes low or times out.
    fn wait_for_low(&mut self, timeout_us: u32, phase: Phase) -> Result<(), DhtError<E>> {
        Self::wait_for_state(&self.clock, timeout_us, phase, || self.pin.is_low())
    }

    /// Generic wait loop that checks a pin condition until true or timeout.
    ///
    /// # Errors
    ///
    /// Returns `DhtError::Timeout(phase)` once more than `timeout_us` has
    /// elapsed without the condition holding.
    fn wait_for_state<F>(
        clock: &CLOCK,
        timeout_us: u32,
        phase: Phase,
        mut condition: F,
    ) -> Result<(), DhtError<E>>
    where
        F: FnMut() -> Result<bool, E>,
    {
        let start = clock.now_us();
        loop {
            if condition()? {
                return Ok(());
            }
            if clock.since_us(start) > u64::from(timeout_us) {
                debug!(%phase, "dht22 wait timed out");
                return Err(DhtError::Timeout(phase));
            }
        }
    }
}
