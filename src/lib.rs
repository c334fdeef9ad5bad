#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Lavasong is an async client for [Lavalink] audio nodes, written in Rust.
//!
//! The library offers:
//!  * A pool of node connections, each of which reconnects once if its socket
//!  drops, and is removed if that attempt fails. New players are placed via
//!  least-load selection over the remaining nodes.
//!  * Per-guild [`Player`]s, which send playback commands to their node and
//!  cache its reported state, with track events delivered to an
//!  [`EventHandler`] of your choosing.
//!  * Track queries over each node's REST API, and a [decoder] for the binary
//!  track descriptors those queries return.
//!
//! Lavasong does not talk to Discord itself: your gateway library must supply
//! each guild's voice session ID and [`VOICE_SERVER_UPDATE`] events.
//!
//! ## Example
//! ```no_run
//! use lavasong::{events::IgnoreEvents, id::UserId, model::VoiceServerUpdate, Lavalink, NodeConfig};
//! use std::sync::Arc;
//!
//! # async fn run(update: VoiceServerUpdate, session_id: &str) -> lavasong::error::Result<()> {
//! let lavalink = Lavalink::new(1, UserId(81384788765712384));
//! lavalink
//!     .add_nodes(vec![NodeConfig::new(
//!         "http://localhost:2333",
//!         "ws://localhost:2333",
//!         "youshallnotpass",
//!     )])
//!     .await?;
//!
//! let node = lavalink.best_node()?;
//! let tracks = node.load_tracks("ytsearch:never gonna give you up").await?;
//!
//! let guild_id = update.guild_id;
//! let player = lavalink
//!     .create_player(&node, guild_id, session_id, update, Arc::new(IgnoreEvents))
//!     .await?;
//!
//! if let Some(track) = tracks.tracks.first() {
//!     player.play(&track.data).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//! Lavasong logs through [`tracing`]. Background tasks log to whichever
//! subscriber is the default when they run, unless a sink is supplied
//! through [`Config::dispatch`].
//!
//! [Lavalink]: https://github.com/freyacodes/Lavalink
//! [decoder]: codec
//! [`EventHandler`]: events::EventHandler
//! [`VOICE_SERVER_UPDATE`]: model::VoiceServerUpdate
//! [`Config::dispatch`]: Config::dispatch()

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    // TODO: would require significant rewriting of all existing docs
    clippy::missing_errors_doc,
)]

pub mod codec;
mod config;
pub mod constants;
mod dispatch;
pub mod error;
pub mod events;
pub mod id;
mod manager;
pub mod model;
pub mod node;
mod player;
mod ws;

pub use crate::{
    config::{Config, NodeConfig},
    events::EventHandler,
    manager::Lavalink,
    node::{Node, NodeState},
    player::{Player, PlayerState},
};
