//! Per-guild playback control.

use crate::{
    constants::{DEFAULT_VOLUME, MAX_VOLUME},
    error::{Error, Result},
    id::{GuildId, NodeId},
    manager::Registry,
    model::{GuildOnly, OutgoingEvent, Pause, Play, Seek, VoiceServerUpdate, VoiceUpdate, Volume},
    node::Node,
};
use derivative::Derivative;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Locally cached playback state of a [`Player`].
///
/// Commands update this state as soon as they are issued, whether or not
/// the node has received them; `time` and `position` are only ever set
/// from the node's own reports.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct PlayerState {
    /// Encoded track last sent to the node, cleared when it stops or ends.
    pub track: Option<String>,
    /// Node-side timestamp (ms) of the last progress report.
    pub time: u64,
    /// Playback position (ms) at the last progress report.
    pub position: u64,
    /// Whether playback is paused.
    pub paused: bool,
    /// Playback volume, in `0..=1000`.
    pub volume: u16,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            track: None,
            time: 0,
            position: 0,
            paused: false,
            volume: DEFAULT_VOLUME,
        }
    }
}

/// Handle to the player of one guild.
///
/// Handles are cheap to clone, and every clone addresses the same player.
/// A handle does not keep its player alive: once the player is destroyed,
/// all operations on it fail with [`Error::PlayerNotFound`].
///
/// Commands are fire-and-forget: each returns once its message has been
/// written to the owning node's socket.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Player {
    guild_id: GuildId,
    #[derivative(Debug = "ignore")]
    registry: Arc<Registry>,
}

impl Player {
    pub(crate) fn new(guild_id: GuildId, registry: Arc<Registry>) -> Self {
        Self { guild_id, registry }
    }

    /// Returns the guild this player belongs to.
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Plays `track` from its start.
    ///
    /// `track` is a base64 descriptor, as found in [`Track::data`].
    ///
    /// [`Track::data`]: crate::model::Track::data
    pub async fn play(&self, track: &str) -> Result<()> {
        self.play_at(track, 0, 0).await
    }

    /// Plays `track` between `start_ms` and `end_ms`.
    ///
    /// A value of `0` leaves that bound unset.
    #[instrument(skip(self, track), fields(guild = %self.guild_id))]
    pub async fn play_at(&self, track: &str, start_ms: u64, end_ms: u64) -> Result<()> {
        let event = OutgoingEvent::Play(Play {
            guild_id: self.guild_id,
            track: track.to_string(),
            start_time: start_ms.to_string(),
            end_time: end_ms.to_string(),
        });

        self.command(&event, |state| {
            state.paused = false;
            state.track = Some(track.to_string());
        })
        .await
    }

    /// Stops the current track.
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn stop(&self) -> Result<()> {
        let event = OutgoingEvent::Stop(GuildOnly {
            guild_id: self.guild_id,
        });

        self.command(&event, |state| state.track = None).await
    }

    /// Pauses or resumes playback.
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn pause(&self, pause: bool) -> Result<()> {
        let event = OutgoingEvent::Pause(Pause {
            guild_id: self.guild_id,
            pause,
        });

        self.command(&event, |state| state.paused = pause).await
    }

    /// Seeks to `position_ms` within the current track.
    ///
    /// The cached position is left unchanged until the node next reports it.
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        let event = OutgoingEvent::Seek(Seek {
            guild_id: self.guild_id,
            position: position_ms,
        });

        self.command(&event, |_| {}).await
    }

    /// Sets the playback volume, where `100` is unity gain.
    ///
    /// Fails with [`Error::VolumeOutOfRange`] unless `volume` lies in `0..=1000`.
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn volume(&self, volume: i32) -> Result<()> {
        let level = u16::try_from(volume)
            .ok()
            .filter(|v| *v <= MAX_VOLUME)
            .ok_or(Error::VolumeOutOfRange(volume))?;

        let event = OutgoingEvent::Volume(Volume {
            guild_id: self.guild_id,
            volume: level,
        });

        self.command(&event, |state| state.volume = level).await
    }

    /// Forwards a voice session to the node, (re)binding this player to a
    /// Discord voice server.
    ///
    /// This should be called whenever the bot's voice session or voice
    /// server changes.
    #[instrument(skip(self, session_id, event), fields(guild = %self.guild_id))]
    pub async fn forward(&self, session_id: &str, event: VoiceServerUpdate) -> Result<()> {
        let event = OutgoingEvent::VoiceUpdate(VoiceUpdate {
            guild_id: self.guild_id,
            session_id: session_id.to_string(),
            event,
        });

        self.command(&event, |_| {}).await
    }

    /// Destroys this player on its node, and unregisters it.
    ///
    /// If the message cannot be sent, the player remains registered. Players
    /// whose node has been removed are unregistered without contacting any
    /// node.
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn destroy(&self) -> Result<()> {
        let node_id = self.node_id()?;

        match self.registry.node(node_id) {
            Some(node) => {
                node.send(&OutgoingEvent::Destroy(GuildOnly {
                    guild_id: self.guild_id,
                }))
                .await?;
            },
            None => warn!(
                "Player for guild {} outlived node {}: dropping it locally.",
                self.guild_id, node_id
            ),
        }

        self.registry
            .sessions
            .remove_if(&self.guild_id, |_, session| session.node == node_id);

        Ok(())
    }

    /// Returns the encoded track this player was last told to play.
    pub fn track(&self) -> Result<Option<String>> {
        self.read(|state| state.track.clone())
    }

    /// Returns whether this player is paused.
    pub fn paused(&self) -> Result<bool> {
        self.read(|state| state.paused)
    }

    /// Returns the last playback position (ms) reported by the node.
    pub fn position(&self) -> Result<u64> {
        self.read(|state| state.position)
    }

    /// Returns the node-side timestamp (ms) of the last progress report.
    pub fn time(&self) -> Result<u64> {
        self.read(|state| state.time)
    }

    /// Returns this player's volume.
    pub fn volume_level(&self) -> Result<u16> {
        self.read(|state| state.volume)
    }

    /// Returns a snapshot of this player's cached state.
    pub fn state(&self) -> Result<PlayerState> {
        self.read(PlayerState::clone)
    }

    /// Returns the ID of the node which owns this player.
    ///
    /// The node may since have been removed: see [`node`](Player::node).
    pub fn node_id(&self) -> Result<NodeId> {
        self.registry
            .sessions
            .get(&self.guild_id)
            .map(|session| session.node)
            .ok_or(Error::PlayerNotFound)
    }

    /// Returns the node which owns this player.
    ///
    /// Fails with [`Error::NodeLost`] if that node has been removed.
    pub fn node(&self) -> Result<Arc<Node>> {
        let node_id = self.node_id()?;

        self.registry.node(node_id).ok_or(Error::NodeLost)
    }

    fn read<T>(&self, f: impl FnOnce(&PlayerState) -> T) -> Result<T> {
        self.registry
            .sessions
            .get(&self.guild_id)
            .map(|session| f(&session.state))
            .ok_or(Error::PlayerNotFound)
    }

    /// Sends `event` to the owning node, applying its effect to the cached
    /// state once that node's writer is held.
    ///
    /// Nothing is mutated if the player is missing or orphaned.
    async fn command(
        &self,
        event: &OutgoingEvent,
        f: impl FnOnce(&mut PlayerState),
    ) -> Result<()> {
        let node = self.node()?;

        node.send_after(event, || {
            if let Some(mut session) = self.registry.sessions.get_mut(&self.guild_id) {
                if session.node == node.id() {
                    f(&mut session.state);
                }
            }
        })
        .await?;

        Ok(())
    }
}
