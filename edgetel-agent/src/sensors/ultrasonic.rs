//! HC-SR04 ultrasonic rangefinder.
//!
//! A measurement walks `IDLE -> PULSING -> LISTENING -> IDLE`: a 10 µs
//! trigger pulse, then the width of the echo pulse is timed by polling the
//! echo line. Both polling loops are bounded by a deadline derived from the
//! maximum range, so a disconnected sensor yields an error instead of a hang.

use std::time::Duration;

use edgetel_common::{FieldValue, Fields, Reading, SensorKind, Tags, round_to};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::gpio::{DigitalIo, Direction, GpioError, Level};
use crate::sensors::{SensorReader, device_tags};

/// Speed of sound in air at ~20 °C, not temperature compensated.
pub const SPEED_OF_SOUND_CM_PER_S: f64 = 34_300.0;

/// Width of the trigger pulse.
pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Default maximum range; gives an echo timeout of about 30 ms.
pub const DEFAULT_MAX_RANGE_CM: f64 = 515.0;

/// Largest configurable range; keeps each echo wait under about 60 ms.
pub const MAX_RANGE_LIMIT_CM: f64 = 1000.0;

/// Ranging failures.
#[derive(Debug, Error)]
pub enum RangerError {
    #[error("Echo line did not rise within {0:?}")]
    EchoRiseTimeout(Duration),

    #[error("Echo line did not fall within {0:?}")]
    EchoFallTimeout(Duration),

    #[error(transparent)]
    Gpio(#[from] GpioError),
}

/// Round-trip time of a sound pulse to an object `max_range_cm` away.
pub fn echo_timeout_for_range(max_range_cm: f64) -> Duration {
    Duration::from_secs_f64(2.0 * max_range_cm / SPEED_OF_SOUND_CM_PER_S)
}

/// Distance for an echo pulse width, rounded to one decimal.
pub fn distance_cm(echo: Duration) -> f64 {
    round_to(echo.as_secs_f64() * SPEED_OF_SOUND_CM_PER_S / 2.0, 1)
}

/// Ultrasonic rangefinder on a trigger/echo pin pair.
pub struct UltrasonicRanger<IO, C> {
    io: IO,
    clock: C,
    trigger_pin: u8,
    echo_pin: u8,
    timeout: Duration,
    tags: Tags,
}

impl<IO: DigitalIo, C: Clock> UltrasonicRanger<IO, C> {
    /// Claim the pins and park the trigger line low.
    pub fn new(
        mut io: IO,
        clock: C,
        trigger_pin: u8,
        echo_pin: u8,
        timeout: Duration,
        device: &str,
    ) -> Result<Self, GpioError> {
        io.set_direction(trigger_pin, Direction::Output)?;
        io.set_direction(echo_pin, Direction::Input)?;
        io.write(trigger_pin, Level::Low)?;

        Ok(Self {
            io,
            clock,
            trigger_pin,
            echo_pin,
            timeout,
            tags: device_tags(device),
        })
    }

    /// Perform one ranging cycle and return the distance in centimetres.
    pub fn measure(&mut self) -> Result<f64, RangerError> {
        self.io.write(self.trigger_pin, Level::High)?;
        self.clock.delay(TRIGGER_PULSE);
        self.io.write(self.trigger_pin, Level::Low)?;

        let listen_from = self.clock.now();
        let start = self
            .wait_for_echo(Level::High, listen_from)?
            .ok_or(RangerError::EchoRiseTimeout(self.timeout))?;
        let stop = self
            .wait_for_echo(Level::Low, start)?
            .ok_or(RangerError::EchoFallTimeout(self.timeout))?;

        Ok(distance_cm(stop - start))
    }

    /// Poll the echo line until it reads `level`.
    ///
    /// Returns the first instant the level was observed, or `None` once more
    /// than `timeout` has passed since `since`.
    fn wait_for_echo(&mut self, level: Level, since: Duration) -> Result<Option<Duration>, GpioError> {
        loop {
            let now = self.clock.now();
            if self.io.read(self.echo_pin)? == level {
                return Ok(Some(now));
            }
            if now.saturating_sub(since) > self.timeout {
                return Ok(None);
            }
        }
    }
}

impl<IO: DigitalIo, C: Clock> SensorReader for UltrasonicRanger<IO, C> {
    fn kind(&self) -> SensorKind {
        SensorKind::Ultrasonic
    }

    fn read(&mut self) -> Option<Reading> {
        match self.measure() {
            Ok(distance) => {
                info!(sensor = %SensorKind::Ultrasonic, distance_cm = distance, "Ultrasonic distance");
                let fields = Fields::from([(
                    "distance_cm".to_string(),
                    Some(FieldValue::Gauge(distance)),
                )]);
                Reading::new(SensorKind::Ultrasonic.measurement(), fields, self.tags.clone())
            }
            Err(e) => {
                warn!(sensor = %SensorKind::Ultrasonic, error = %e, "Ultrasonic read failed");
                None
            }
        }
    }

    fn release(&mut self) -> Result<(), GpioError> {
        self.io.cleanup()
    }
}
