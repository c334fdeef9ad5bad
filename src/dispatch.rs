//! Routing of inbound node messages to players and event handlers.

use crate::{
    error::{Error, Result},
    manager::Registry,
    model::{IncomingEvent, PlayerEvent, PlayerUpdate, TrackEvent},
    node::Node,
    Player,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Applies one message received from `node`.
///
/// Player messages are only honoured if `node` still owns the player.
pub(crate) async fn handle(registry: &Arc<Registry>, node: &Node, msg: IncomingEvent) -> Result<()> {
    match msg {
        IncomingEvent::PlayerUpdate(update) => player_update(registry, node, update),
        IncomingEvent::Event(event) => player_event(registry, node, event).await,
        IncomingEvent::Stats(stats) => {
            trace!(
                "Node {} reports load {} with {} player(s).",
                node.id(),
                stats.cpu.lavalink_load,
                stats.players
            );
            node.update_stats(stats);
            Ok(())
        },
        IncomingEvent::Unknown => Err(Error::UnknownPayload),
    }
}

fn player_update(registry: &Registry, node: &Node, update: PlayerUpdate) -> Result<()> {
    let mut session = registry
        .sessions
        .get_mut(&update.guild_id)
        .filter(|s| s.node == node.id())
        .ok_or(Error::PlayerNotFound)?;

    session.state.time = update.state.time;
    session.state.position = update.state.position;

    Ok(())
}

async fn player_event(registry: &Arc<Registry>, node: &Node, event: PlayerEvent) -> Result<()> {
    let guild_id = event.guild_id;

    // The map guard must be gone before the handler runs: it may issue
    // commands against this very player.
    let handler = {
        let mut session = registry
            .sessions
            .get_mut(&guild_id)
            .filter(|s| s.node == node.id())
            .ok_or(Error::PlayerNotFound)?;

        if let TrackEvent::TrackEndEvent { .. } = event.kind {
            session.state.track = None;
        }

        Arc::clone(&session.handler)
    };

    let player = Player::new(guild_id, Arc::clone(registry));

    let outcome = match event.kind {
        TrackEvent::TrackEndEvent { track, reason } => {
            debug!("Track ended in guild {}: {}.", guild_id, reason);
            handler.track_end(&player, &track, &reason).await
        },
        TrackEvent::TrackExceptionEvent {
            track,
            error,
            exception,
            reason,
        } => {
            let error = error
                .or_else(|| exception.and_then(|e| e.message))
                .or(reason)
                .unwrap_or_default();

            debug!("Track failed in guild {}: {}.", guild_id, error);
            handler.track_exception(&player, &track, &error).await
        },
        TrackEvent::TrackStuckEvent {
            track,
            threshold_ms,
        } => {
            debug!("Track stuck in guild {} after {}ms.", guild_id, threshold_ms);
            handler.track_stuck(&player, &track, threshold_ms).await
        },
        TrackEvent::Other => {
            debug!("Ignoring unhandled event type in guild {}.", guild_id);
            Ok(())
        },
    };

    outcome.map_err(Error::Handler)
}
