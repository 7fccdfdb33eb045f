//! Command intake.
//!
//! Incoming payloads are JSON-encoded `SystemCommand`s, e.g.
//! `{"ct":"s","sc":"data"}` or `{"ct":"m","mc":"speed","rpm":3000.0}`.
//! They are parsed here and queued on `COMMAND_CHANNEL` for the
//! `SystemController` loop.

use crate::utils::controllers::{SystemCommand, COMMAND_CHANNEL};

/// Why a payload could not be queued.
#[derive(Debug)]
pub enum SubmitError {
    Parse(serde_json::Error),
    QueueFull,
}

/// Decode a JSON payload into a `SystemCommand`.
pub fn parse_command(payload: &[u8]) -> Result<SystemCommand, serde_json::Error> {
    serde_json::from_slice::<SystemCommand>(payload)
}

/// Parse a payload and queue it without waiting.
pub fn submit(payload: &[u8]) -> Result<(), SubmitError> {
    let command = parse_command(payload).map_err(|error| {
        tracing::error!(?error, "error deserializing SystemCommand");
        SubmitError::Parse(error)
    })?;

    COMMAND_CHANNEL
        .try_send(command)
        .map_err(|_| {
            tracing::warn!("command queue full, dropping");
            SubmitError::QueueFull
        })
}

/// Parse a payload and queue it, waiting for room.
pub async fn forward(payload: &[u8]) -> Result<(), serde_json::Error> {
    let command = parse_command(payload)?;
    COMMAND_CHANNEL.send(command).await;
    Ok(())
}
