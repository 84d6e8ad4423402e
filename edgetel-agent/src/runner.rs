//! Agent runner for lifecycle management.

use std::future::Future;

use edgetel_common::{SensorKind, init_tracing};
use tokio::signal;
use tracing::{info, warn};

use crate::AgentArgs;
use crate::clock::{Clock, MonotonicClock};
use crate::config::{AgentConfig, Credentials};
use crate::error::{AgentError, Result};
use crate::pipeline::PublishPipeline;
use crate::probe::probe_sensors;
use crate::scheduler::Scheduler;
use crate::sink::{BusSink, DatabaseSink, InfluxClient, ZenohBus};

/// What happened during shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sensors whose hardware could not be released.
    pub release_failures: Vec<SensorKind>,
    pub bus_closed: bool,
    pub database_closed: bool,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.release_failures.is_empty() && self.bus_closed && self.database_closed
    }
}

/// The running agent: a scheduler wired to its sinks.
///
/// Handles:
/// - Startup (logging, identity, credentials, sink connections, probing)
/// - The sampling loop until a shutdown signal
/// - Ordered shutdown: hardware, then bus, then database
pub struct Agent<B, D> {
    device: String,
    scheduler: Scheduler<B, D>,
}

impl Agent<ZenohBus, InfluxClient> {
    /// Start the production agent.
    ///
    /// Any error returned here is fatal: nothing has been scheduled yet.
    pub async fn start(config: AgentConfig, args: &AgentArgs) -> Result<Self> {
        let mut logging = config.logging.clone();
        if let Some(level) = &args.log_level {
            logging.level = level.clone();
        }
        init_tracing(&logging).map_err(|e| AgentError::validation(e.to_string()))?;

        let version = env!("CARGO_PKG_VERSION");
        info!(version = %version, "Starting edgetel agent");

        let device = config.device_name()?;
        let credentials = Credentials::from_env()?;

        let bus = ZenohBus::connect(&config.zenoh, credentials.bus.as_ref()).await?;
        info!(zid = %bus.session().zid(), device = %device, "Connected to Zenoh");

        let database = InfluxClient::new(&config.influxdb, credentials.influx_token)?;
        info!(url = %database.write_url(), org = %config.influxdb.org, "InfluxDB client ready");

        let pipeline = PublishPipeline::new(bus, database, config.serialization);
        let mut scheduler = Scheduler::new(pipeline);
        for (spec, capability) in probe_sensors(&config, &device) {
            scheduler.register_probed(spec, capability);
        }

        Ok(Self::new(device, scheduler))
    }
}

impl<B: BusSink, D: DatabaseSink> Agent<B, D> {
    pub fn new(device: impl Into<String>, scheduler: Scheduler<B, D>) -> Self {
        Self {
            device: device.into(),
            scheduler,
        }
    }

    /// Get the device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Sensors that will be sampled.
    pub fn sensors(&self) -> Vec<SensorKind> {
        self.scheduler.registered()
    }

    /// Run until `shutdown` resolves, then shut down in order.
    pub async fn run<C, F>(mut self, clock: &C, shutdown: F) -> ShutdownReport
    where
        C: Clock,
        F: Future<Output = ()>,
    {
        info!(
            device = %self.device,
            sensors = ?self.sensors(),
            "Agent running. Press Ctrl+C to stop."
        );

        self.scheduler.run(clock, shutdown).await;
        self.shutdown().await
    }

    /// Release hardware, stop the bus, then close the database.
    ///
    /// Every step runs even if an earlier one fails.
    pub async fn shutdown(self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let (mut readers, pipeline) = self.scheduler.into_parts();

        for reader in &mut readers {
            if let Err(e) = reader.release() {
                warn!(sensor = %reader.kind(), error = %e, "Failed to release sensor hardware");
                report.release_failures.push(reader.kind());
            }
        }
        drop(readers);

        let (bus, database) = pipeline.into_sinks();

        match bus.shutdown().await {
            Ok(()) => report.bus_closed = true,
            Err(e) => warn!(error = %e, "Error closing bus session"),
        }

        match database.close().await {
            Ok(()) => report.database_closed = true,
            Err(e) => warn!(error = %e, "Error closing database client"),
        }

        info!(device = %self.device, clean = report.is_clean(), "Goodbye!");
        report
    }
}

/// Ctrl+C / SIGTERM listeners.
///
/// On Unix the handlers are registered by [`ShutdownSignal::install`], so a
/// signal that arrives while the agent is still starting up is held until
/// [`ShutdownSignal::recv`] is polled instead of terminating the process.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register the signal handlers.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};

            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolve on the first Ctrl+C or SIGTERM.
    #[cfg(unix)]
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Received Ctrl+C, shutting down..."),
            _ = self.terminate.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    /// Resolve on the first Ctrl+C.
    #[cfg(not(unix))]
    pub async fn recv(self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Load configuration, start the agent and run it until a signal.
pub async fn run_agent(args: AgentArgs) -> anyhow::Result<()> {
    let signals = ShutdownSignal::install()?;
    let config = AgentConfig::load(&args.config)?;
    let agent = Agent::start(config, &args).await?;

    let clock = MonotonicClock::new();
    let report = agent.run(&clock, signals.recv()).await;
    if !report.is_clean() {
        warn!(?report, "Shutdown completed with errors");
    }
    Ok(())
}
