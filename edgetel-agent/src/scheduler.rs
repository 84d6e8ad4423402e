//! Multi-rate sensor scheduler.
//!
//! One loop drives every sensor. Each base tick, sensors whose interval has
//! elapsed since they last fired are read and published in registration
//! order. Reads are synchronous, so a slow sensor delays the rest of the
//! tick; intervals are measured from when a sensor actually fired, so an
//! overrun pushes the next firing back instead of causing a burst.

use std::future::Future;
use std::time::Duration;

use edgetel_common::SensorKind;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::pipeline::PublishPipeline;
use crate::probe::Capability;
use crate::sensors::{SensorReader, SensorSpec};
use crate::sink::{BusSink, DatabaseSink};

/// Pause between scheduler ticks.
pub const BASE_TICK: Duration = Duration::from_secs(1);

/// When a sensor last fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleState {
    pub last_fired: Option<Duration>,
}

impl ScheduleState {
    fn is_due(&self, now: Duration, interval: Duration) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_sub(last) >= interval,
        }
    }
}

struct ScheduledSensor {
    spec: SensorSpec,
    reader: Box<dyn SensorReader>,
    state: ScheduleState,
}

/// Drives registered sensors into a [`PublishPipeline`].
pub struct Scheduler<B, D> {
    pipeline: PublishPipeline<B, D>,
    sensors: Vec<ScheduledSensor>,
    start: Option<Duration>,
}

impl<B: BusSink, D: DatabaseSink> Scheduler<B, D> {
    /// Sensors fire on the first tick, then every interval after that.
    pub fn new(pipeline: PublishPipeline<B, D>) -> Self {
        Self {
            pipeline,
            sensors: Vec::new(),
            start: None,
        }
    }

    /// Sensors first fire one full interval after `start`.
    pub fn starting_at(pipeline: PublishPipeline<B, D>, start: Duration) -> Self {
        Self {
            pipeline,
            sensors: Vec::new(),
            start: Some(start),
        }
    }

    /// Register an available sensor.
    pub fn register(&mut self, spec: SensorSpec, reader: Box<dyn SensorReader>) {
        info!(
            sensor = %spec.kind,
            interval_secs = spec.interval.as_secs_f64(),
            topic = %spec.topic,
            bucket = %spec.bucket,
            "Sensor registered"
        );
        self.sensors.push(ScheduledSensor {
            spec,
            reader,
            state: ScheduleState {
                last_fired: self.start,
            },
        });
    }

    /// Register a probed sensor if it is available; unavailable ones are
    /// logged and skipped. Returns whether the sensor was registered.
    pub fn register_probed(
        &mut self,
        spec: SensorSpec,
        capability: Capability<Box<dyn SensorReader>>,
    ) -> bool {
        match capability {
            Capability::Available(reader) => {
                self.register(spec, reader);
                true
            }
            Capability::Unavailable(reason) => {
                warn!(sensor = %spec.kind, reason = %reason, "Sensor not available");
                false
            }
        }
    }

    /// Registered sensor kinds, in firing order.
    pub fn registered(&self) -> Vec<SensorKind> {
        self.sensors.iter().map(|s| s.spec.kind).collect()
    }

    /// Last firing state of a registered sensor.
    pub fn state(&self, kind: SensorKind) -> Option<ScheduleState> {
        self.sensors
            .iter()
            .find(|s| s.spec.kind == kind)
            .map(|s| s.state)
    }

    pub fn pipeline(&self) -> &PublishPipeline<B, D> {
        &self.pipeline
    }

    /// Run one scheduling pass at monotonic time `now`.
    ///
    /// Returns the sensors that fired. A sensor that fires but yields no
    /// reading publishes nothing and still waits a full interval.
    pub async fn tick(&mut self, now: Duration) -> Vec<SensorKind> {
        let mut fired = Vec::new();

        for sensor in &mut self.sensors {
            if !sensor.state.is_due(now, sensor.spec.interval) {
                continue;
            }
            sensor.state.last_fired = Some(now);
            fired.push(sensor.spec.kind);

            match sensor.reader.read() {
                Some(reading) => {
                    let outcome = self
                        .pipeline
                        .publish(&reading, &sensor.spec.topic, &sensor.spec.bucket)
                        .await;
                    debug!(sensor = %sensor.spec.kind, ?outcome, "Reading published");
                }
                None => {
                    debug!(sensor = %sensor.spec.kind, "No reading this tick");
                }
            }
        }

        fired
    }

    /// Tick until `shutdown` resolves.
    ///
    /// The shutdown future is only polled between ticks, so an in-progress
    /// read/publish always completes.
    pub async fn run<C, F>(&mut self, clock: &C, shutdown: F)
    where
        C: Clock,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut wake = tokio::time::Instant::now();
        loop {
            // Shutdown is checked before every tick, including the first.
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = tokio::time::sleep_until(wake) => {}
            }

            self.tick(clock.now()).await;
            wake = tokio::time::Instant::now() + BASE_TICK;
        }
    }

    /// Split into readers and pipeline for shutdown.
    pub fn into_parts(self) -> (Vec<Box<dyn SensorReader>>, PublishPipeline<B, D>) {
        let readers = self.sensors.into_iter().map(|s| s.reader).collect();
        (readers, self.pipeline)
    }
}
