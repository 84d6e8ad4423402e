//! Edge telemetry agent binary.

use anyhow::Result;
use edgetel_agent::{AgentArgs, run_agent};

#[tokio::main]
async fn main() -> Result<()> {
    run_agent(AgentArgs::parse()).await
}
