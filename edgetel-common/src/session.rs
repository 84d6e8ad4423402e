use zenoh::Session;

use crate::config::{BusCredentials, ZenohConfig};
use crate::error::{Error, Result};

/// Connect to Zenoh using the provided configuration.
///
/// `credentials`, when given, enables user/password authentication.
pub async fn connect(config: &ZenohConfig, credentials: Option<&BusCredentials>) -> Result<Session> {
    let zenoh_config = build_zenoh_config(config, credentials)?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        tls = config.tls.is_some(),
        auth = credentials.is_some(),
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).await?;

    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}

/// Translate our configuration into a Zenoh configuration.
pub fn build_zenoh_config(
    config: &ZenohConfig,
    credentials: Option<&BusCredentials>,
) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    let mode_str = match config.mode.as_str() {
        "client" | "peer" | "router" => format!("\"{}\"", config.mode),
        other => {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };

    insert(&mut zenoh_config, "mode", &mode_str)?;

    if !config.connect.is_empty() {
        insert(&mut zenoh_config, "connect/endpoints", &to_json(&config.connect)?)?;
    }

    if !config.listen.is_empty() {
        insert(&mut zenoh_config, "listen/endpoints", &to_json(&config.listen)?)?;
    }

    if let Some(tls) = &config.tls {
        let path = tls.root_ca_certificate.to_string_lossy();
        insert(
            &mut zenoh_config,
            "transport/link/tls/root_ca_certificate",
            &to_json(&path)?,
        )?;
    }

    if let Some(creds) = credentials {
        insert(&mut zenoh_config, "transport/auth/usrpwd/user", &to_json(&creds.user)?)?;
        insert(
            &mut zenoh_config,
            "transport/auth/usrpwd/password",
            &to_json(&creds.password)?,
        )?;
    }

    Ok(zenoh_config)
}

fn insert(zenoh_config: &mut zenoh::Config, key: &str, value: &str) -> Result<()> {
    zenoh_config
        .insert_json5(key, value)
        .map_err(|e| Error::Config(format!("Failed to set '{}': {}", key, e)))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::from)
}
