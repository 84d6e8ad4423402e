//! Digital I/O abstraction over GPIO lines.
//!
//! Sensors drive pins through [`DigitalIo`] so the timing code can run
//! against a scripted line in tests. The `rppal` backend (BCM numbering) is
//! compiled only with the `hardware` feature on Linux.

use thiserror::Error;

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// GPIO errors.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("GPIO support is not available in this build (enable the `hardware` feature)")]
    Unsupported,

    #[error("Pin {0} has not been configured")]
    NotConfigured(u8),

    #[error("GPIO backend error: {0}")]
    Backend(String),
}

/// Minimal digital I/O surface needed by the sensors.
pub trait DigitalIo {
    /// Configure `pin` as input or output, claiming it if needed.
    fn set_direction(&mut self, pin: u8, direction: Direction) -> Result<(), GpioError>;

    /// Drive an output pin.
    fn write(&mut self, pin: u8, level: Level) -> Result<(), GpioError>;

    /// Sample a pin.
    fn read(&mut self, pin: u8) -> Result<Level, GpioError>;

    /// Release every claimed pin back to its original state.
    fn cleanup(&mut self) -> Result<(), GpioError>;
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use rpi::RppalIo;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod rpi {
    use std::collections::HashMap;

    use rppal::gpio::{Gpio, IoPin, Mode};

    use super::{DigitalIo, Direction, GpioError, Level};

    /// Raspberry Pi GPIO through `rppal`.
    pub struct RppalIo {
        gpio: Gpio,
        pins: HashMap<u8, IoPin>,
    }

    impl RppalIo {
        /// Open the GPIO peripheral.
        pub fn open() -> Result<Self, GpioError> {
            let gpio = Gpio::new().map_err(|e| GpioError::Backend(e.to_string()))?;
            Ok(Self {
                gpio,
                pins: HashMap::new(),
            })
        }

        fn pin(&mut self, pin: u8) -> Result<&mut IoPin, GpioError> {
            self.pins.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))
        }
    }

    impl DigitalIo for RppalIo {
        fn set_direction(&mut self, pin: u8, direction: Direction) -> Result<(), GpioError> {
            let mode = match direction {
                Direction::Input => Mode::Input,
                Direction::Output => Mode::Output,
            };

            if let Some(io) = self.pins.get_mut(&pin) {
                io.set_mode(mode);
                return Ok(());
            }

            let io = self
                .gpio
                .get(pin)
                .map_err(|e| GpioError::Backend(e.to_string()))?
                .into_io(mode);
            self.pins.insert(pin, io);
            Ok(())
        }

        fn write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
            let io = self.pin(pin)?;
            match level {
                Level::High => io.set_high(),
                Level::Low => io.set_low(),
            }
            Ok(())
        }

        fn read(&mut self, pin: u8) -> Result<Level, GpioError> {
            let io = self.pin(pin)?;
            Ok(if io.is_high() { Level::High } else { Level::Low })
        }

        fn cleanup(&mut self) -> Result<(), GpioError> {
            // Dropping an IoPin restores its original mode.
            self.pins.clear();
            Ok(())
        }
    }
}
