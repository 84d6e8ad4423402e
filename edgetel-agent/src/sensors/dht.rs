//! DHT11 humidity/temperature probe.
//!
//! [`Dht11`] bit-bangs the single-wire protocol over [`DigitalIo`];
//! [`DhtReader`] turns a probe sample into a reading and downgrades every
//! failure to "no reading" for the tick.

use std::time::Duration;

use edgetel_common::{FieldValue, Fields, Reading, SensorKind, Tags, round_to};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::gpio::{DigitalIo, Direction, GpioError, Level};
use crate::sensors::{SensorReader, device_tags};

/// How long the host holds the line low to request a sample.
const START_SIGNAL: Duration = Duration::from_millis(18);

/// Pause after releasing the line before switching to input.
const RELEASE_DELAY: Duration = Duration::from_micros(30);

/// Upper bound for any single level on the wire.
const EDGE_TIMEOUT: Duration = Duration::from_micros(100);

/// High pulses longer than this encode a 1 bit (26-28 µs vs 70 µs).
const ONE_BIT_THRESHOLD: Duration = Duration::from_micros(40);

/// Probe errors. All of them are transient from the agent's point of view.
#[derive(Debug, Error)]
pub enum DhtError {
    #[error("Sensor did not answer the start signal")]
    NoResponse,

    #[error("Timed out waiting for {level:?} at bit {bit}")]
    Timeout { level: Level, bit: usize },

    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error(transparent)]
    Gpio(#[from] GpioError),
}

/// One probe sample. Either value may be missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSample {
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
}

/// A two-value temperature/humidity device.
pub trait HumidityProbe {
    /// Take a single-shot sample.
    fn sample(&mut self) -> Result<ProbeSample, DhtError>;

    /// Release the underlying pins.
    fn release(&mut self) -> Result<(), GpioError> {
        Ok(())
    }
}

/// DHT11 driver on a single bidirectional data pin.
pub struct Dht11<IO, C> {
    io: IO,
    clock: C,
    pin: u8,
}

impl<IO: DigitalIo, C: Clock> Dht11<IO, C> {
    /// Claim the data pin and leave the bus idle (high).
    pub fn new(mut io: IO, clock: C, pin: u8) -> Result<Self, GpioError> {
        io.set_direction(pin, Direction::Output)?;
        io.write(pin, Level::High)?;
        Ok(Self { io, clock, pin })
    }

    /// Read the raw 5-byte frame.
    pub fn read_frame(&mut self) -> Result<[u8; 5], DhtError> {
        self.io.set_direction(self.pin, Direction::Output)?;
        self.io.write(self.pin, Level::Low)?;
        self.clock.delay(START_SIGNAL);
        self.io.write(self.pin, Level::High)?;
        self.clock.delay(RELEASE_DELAY);
        self.io.set_direction(self.pin, Direction::Input)?;

        // Response: ~80 µs low, ~80 µs high, then the first bit's low preamble.
        self.wait_for(Level::Low)?.ok_or(DhtError::NoResponse)?;
        self.wait_for(Level::High)?.ok_or(DhtError::NoResponse)?;
        self.wait_for(Level::Low)?.ok_or(DhtError::NoResponse)?;

        let mut frame = [0u8; 5];
        for bit in 0..40 {
            self.wait_for(Level::High)?.ok_or(DhtError::Timeout {
                level: Level::High,
                bit,
            })?;
            let high = self.wait_for(Level::Low)?.ok_or(DhtError::Timeout {
                level: Level::Low,
                bit,
            })?;

            frame[bit / 8] <<= 1;
            if high > ONE_BIT_THRESHOLD {
                frame[bit / 8] |= 1;
            }
        }

        let expected = checksum(&frame);
        if frame[4] != expected {
            return Err(DhtError::Checksum {
                expected,
                actual: frame[4],
            });
        }

        Ok(frame)
    }

    /// Wait until the line reads `level`; returns how long that took.
    fn wait_for(&mut self, level: Level) -> Result<Option<Duration>, GpioError> {
        let since = self.clock.now();
        loop {
            let now = self.clock.now();
            if self.io.read(self.pin)? == level {
                return Ok(Some(now - since));
            }
            if now - since > EDGE_TIMEOUT {
                return Ok(None);
            }
        }
    }
}

impl<IO: DigitalIo, C: Clock> HumidityProbe for Dht11<IO, C> {
    fn sample(&mut self) -> Result<ProbeSample, DhtError> {
        let frame = self.read_frame()?;
        debug!(frame = ?frame, "DHT11 frame");
        Ok(decode_frame(&frame))
    }

    fn release(&mut self) -> Result<(), GpioError> {
        self.io.cleanup()
    }
}

fn checksum(frame: &[u8; 5]) -> u8 {
    frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Decode a checksummed frame into temperature and humidity.
pub fn decode_frame(frame: &[u8; 5]) -> ProbeSample {
    let humidity = frame[0] as f64 + frame[1] as f64 / 10.0;
    let magnitude = frame[2] as f64 + (frame[3] & 0x7f) as f64 / 10.0;
    let temperature = if frame[3] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };

    ProbeSample {
        temperature_c: Some(temperature),
        humidity_percent: Some(humidity),
    }
}

/// Scheduled reader for a humidity probe.
pub struct DhtReader<P> {
    probe: P,
    tags: Tags,
}

impl<P: HumidityProbe> DhtReader<P> {
    pub fn new(probe: P, device: &str) -> Self {
        Self {
            probe,
            tags: device_tags(device),
        }
    }
}

impl<P: HumidityProbe> SensorReader for DhtReader<P> {
    fn kind(&self) -> SensorKind {
        SensorKind::Dht11
    }

    fn read(&mut self) -> Option<Reading> {
        let sample = match self.probe.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!(sensor = %SensorKind::Dht11, error = %e, "DHT11 read error");
                return None;
            }
        };

        let (Some(temperature), Some(humidity)) = (sample.temperature_c, sample.humidity_percent)
        else {
            warn!(sensor = %SensorKind::Dht11, "DHT11 read returned no value for temperature or humidity");
            return None;
        };

        let temperature = round_to(temperature, 1);
        let humidity = round_to(humidity, 1);
        info!(
            sensor = %SensorKind::Dht11,
            temperature_c = temperature,
            humidity_percent = humidity,
            "DHT11 read"
        );

        let fields = Fields::from([
            ("temperature".to_string(), Some(FieldValue::Gauge(temperature))),
            ("humidity".to_string(), Some(FieldValue::Gauge(humidity))),
        ]);
        Reading::new(SensorKind::Dht11.measurement(), fields, self.tags.clone())
    }

    fn release(&mut self) -> Result<(), GpioError> {
        self.probe.release()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::clock::testing::SteppingClock;

    const PIN: u8 = 4;

    /// Data line that replays a waveform once the host switches to input.
    struct DhtLine {
        time: Rc<Cell<Duration>>,
        released_at: Option<Duration>,
        /// (level, duration in µs) segments after release; idle high afterwards.
        waveform: Vec<(Level, u64)>,
        fail_reads: bool,
    }

    impl DhtLine {
        fn new(clock: &SteppingClock, waveform: Vec<(Level, u64)>) -> Self {
            Self {
                time: clock.time(),
                released_at: None,
                waveform,
                fail_reads: false,
            }
        }

        fn level_at(&self, offset: Duration) -> Level {
            let mut edge = Duration::ZERO;
            for (level, us) in &self.waveform {
                edge += Duration::from_micros(*us);
                if offset < edge {
                    return *level;
                }
            }
            Level::High
        }
    }

    impl DigitalIo for DhtLine {
        fn set_direction(&mut self, pin: u8, direction: Direction) -> Result<(), GpioError> {
            assert_eq!(pin, PIN);
            self.released_at = match direction {
                Direction::Input => Some(self.time.get()),
                Direction::Output => None,
            };
            Ok(())
        }

        fn write(&mut self, _pin: u8, _level: Level) -> Result<(), GpioError> {
            Ok(())
        }

        fn read(&mut self, _pin: u8) -> Result<Level, GpioError> {
            if self.fail_reads {
                return Err(GpioError::Backend("line request lost".to_string()));
            }
            let released = self.released_at.expect("read before release");
            Ok(self.level_at(self.time.get() - released))
        }

        fn cleanup(&mut self) -> Result<(), GpioError> {
            Ok(())
        }
    }

    /// Waveform for a full DHT11 transmission of `frame`.
    fn transmission(frame: [u8; 5]) -> Vec<(Level, u64)> {
        let mut waveform = vec![(Level::High, 20), (Level::Low, 80), (Level::High, 80)];
        for byte in frame {
            for i in (0..8).rev() {
                let high = if (byte >> i) & 1 == 1 { 70 } else { 27 };
                waveform.push((Level::Low, 50));
                waveform.push((Level::High, high));
            }
        }
        waveform.push((Level::Low, 50));
        waveform
    }

    fn dht(waveform: Vec<(Level, u64)>) -> Dht11<DhtLine, SteppingClock> {
        let clock = SteppingClock::new(Duration::from_micros(1));
        let line = DhtLine::new(&clock, waveform);
        Dht11::new(line, clock, PIN).unwrap()
    }

    struct FixedProbe(Result<ProbeSample, ()>);

    impl HumidityProbe for FixedProbe {
        fn sample(&mut self) -> Result<ProbeSample, DhtError> {
            self.0.map_err(|_| DhtError::NoResponse)
        }
    }

    #[test]
    fn test_decode_frame() {
        let sample = decode_frame(&[45, 0, 22, 5, 72]);
        assert_eq!(sample.humidity_percent, Some(45.0));
        assert_eq!(sample.temperature_c, Some(22.5));

        let negative = decode_frame(&[30, 0, 1, 0x82, 0]);
        assert_eq!(negative.temperature_c, Some(-1.2));
    }

    #[test]
    fn test_reads_valid_frame() {
        let frame = [45, 0, 22, 5, 72];
        let mut probe = dht(transmission(frame));
        assert_eq!(probe.read_frame().unwrap(), frame);
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let mut probe = dht(transmission([45, 0, 22, 5, 99]));
        assert!(matches!(
            probe.read_frame(),
            Err(DhtError::Checksum {
                expected: 72,
                actual: 99
            })
        ));
    }

    #[test]
    fn test_silent_line_is_no_response() {
        // Nothing pulls the line low after release.
        let mut probe = dht(Vec::new());
        assert!(matches!(probe.read_frame(), Err(DhtError::NoResponse)));
    }

    #[test]
    fn test_truncated_transmission_times_out() {
        let mut waveform = transmission([45, 0, 22, 5, 72]);
        waveform.truncate(20);
        // Line stuck low after the truncated bits.
        waveform.push((Level::Low, 10_000));
        let mut probe = dht(waveform);
        assert!(matches!(
            probe.read_frame(),
            Err(DhtError::Timeout { .. })
        ));
    }

    #[test]
    fn test_gpio_error_is_no_reading() {
        let mut sensor = dht(transmission([45, 0, 22, 5, 72]));
        sensor.io.fail_reads = true;
        assert!(matches!(
            sensor.read_frame(),
            Err(DhtError::Gpio(GpioError::Backend(_)))
        ));

        let mut reader = DhtReader::new(sensor, "pi01");
        assert!(reader.read().is_none());
    }

    #[test]
    fn test_reader_rounds_values() {
        let mut reader = DhtReader::new(
            FixedProbe(Ok(ProbeSample {
                temperature_c: Some(21.46),
                humidity_percent: Some(40.04),
            })),
            "pi01",
        );
        let reading = reader.read().unwrap();
        assert_eq!(reading.measurement, "sensor");
        assert_eq!(reading.field("temperature"), Some(&FieldValue::Gauge(21.5)));
        assert_eq!(reading.field("humidity"), Some(&FieldValue::Gauge(40.0)));
    }

    #[test]
    fn test_reader_missing_value_is_no_reading() {
        let mut reader = DhtReader::new(
            FixedProbe(Ok(ProbeSample {
                temperature_c: Some(21.0),
                humidity_percent: None,
            })),
            "pi01",
        );
        assert!(reader.read().is_none());
    }

    #[test]
    fn test_reader_probe_error_is_no_reading() {
        let mut reader = DhtReader::new(FixedProbe(Err(())), "pi01");
        assert!(reader.read().is_none());
    }

    #[test]
    fn test_reader_over_bitbanged_driver() {
        let mut reader = DhtReader::new(dht(transmission([45, 0, 22, 5, 72])), "pi01");
        let reading = reader.read().unwrap();
        assert_eq!(reading.field("temperature"), Some(&FieldValue::Gauge(22.5)));
        assert_eq!(reading.field("humidity"), Some(&FieldValue::Gauge(45.0)));
    }
}
