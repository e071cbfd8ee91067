pub mod health;
pub mod messaging;
pub mod objects;
pub mod sheets;

use anyhow::Result;
use cloud_gateway::Envelope;
use serde::Serialize;

/// Print an envelope as pretty JSON on stdout. Returns whether it succeeded.
pub fn print<T: Serialize>(envelope: &Envelope<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(envelope.success)
}
