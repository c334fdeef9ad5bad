//! Callbacks fired in response to a node's track events.
//!
//! Handlers run on the receive task of the node which owns the player: a slow
//! handler delays every later message from that node, but no other node.
//! Handlers may freely issue commands to any [`Player`], including the one
//! passed to them.
//!
//! [`Player`]: crate::Player

use crate::Player;
use async_trait::async_trait;
use std::error::Error as StdError;

/// Outcome of a single handler callback.
///
/// Failures are logged by the node's receive task, which then moves on to
/// the next message.
pub type HandlerResult = Result<(), Box<dyn StdError + Send + Sync>>;

/// Trait to handle the track events of one player.
///
/// Each callback receives the player which fired it, the encoded track it
/// concerns, and details specific to the event. All callbacks default to
/// doing nothing.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Fired when a track stops playing, after the player's cached track
    /// has been cleared.
    ///
    /// `reason` is the node's end reason, e.g., `FINISHED`, `LOAD_FAILED`,
    /// `STOPPED`, `REPLACED` or `CLEANUP`.
    async fn track_end(&self, _player: &Player, _track: &str, _reason: &str) -> HandlerResult {
        Ok(())
    }

    /// Fired when a track throws an exception during playback.
    async fn track_exception(&self, _player: &Player, _track: &str, _error: &str) -> HandlerResult {
        Ok(())
    }

    /// Fired when a track has produced no audio for `threshold_ms` milliseconds.
    async fn track_stuck(&self, _player: &Player, _track: &str, _threshold_ms: u64) -> HandlerResult {
        Ok(())
    }
}

/// Handler which accepts and discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreEvents;

impl EventHandler for IgnoreEvents {}
