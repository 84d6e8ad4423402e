//! Zenoh bus sink.

use edgetel_common::{BusCredentials, ZenohConfig, connect};
use zenoh::Session;

use crate::error::{AgentError, Result};
use crate::sink::{BusSink, SinkError};

/// Publishes readings on a Zenoh session.
///
/// The session owns its own background I/O (routing, reconnects); this
/// wrapper only puts samples and closes the session on shutdown.
#[derive(Clone, Debug)]
pub struct ZenohBus {
    session: Session,
}

impl ZenohBus {
    /// Open a session using the bus configuration.
    pub async fn connect(
        config: &ZenohConfig,
        credentials: Option<&BusCredentials>,
    ) -> Result<Self> {
        let session = connect(config, credentials)
            .await
            .map_err(|e| AgentError::ZenohConnection(e.to_string()))?;
        Ok(Self { session })
    }

    /// Wrap an already open session.
    pub fn from_session(session: Session) -> Self {
        Self { session }
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl BusSink for ZenohBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> std::result::Result<(), SinkError> {
        self.session
            .put(topic, payload)
            .await
            .map_err(|e| SinkError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn shutdown(&self) -> std::result::Result<(), SinkError> {
        self.session.close().await.map_err(|e| SinkError::Close {
            sink: "zenoh",
            message: e.to_string(),
        })
    }
}
