//! Payloads exchanged with Lavalink nodes over WebSocket and REST.

use crate::{
    codec::{self, DecodeError},
    id::GuildId,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A raw Discord `VOICE_SERVER_UPDATE` event, forwarded verbatim to a node.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VoiceServerUpdate {
    /// Guild whose voice server changed.
    pub guild_id: GuildId,
    /// Voice server host.
    pub endpoint: String,
    /// Voice connection token.
    pub token: String,
}

/// Commands sent from this client to a node.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub(crate) enum OutgoingEvent {
    VoiceUpdate(VoiceUpdate),
    Play(Play),
    Stop(GuildOnly),
    Pause(Pause),
    Seek(Seek),
    Volume(Volume),
    Destroy(GuildOnly),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VoiceUpdate {
    pub guild_id: GuildId,
    pub session_id: String,
    pub event: VoiceServerUpdate,
}

/// Start and end times travel as decimal strings, with `"0"` meaning unset.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Play {
    pub guild_id: GuildId,
    pub track: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GuildOnly {
    pub guild_id: GuildId,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Pause {
    pub guild_id: GuildId,
    pub pause: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Seek {
    pub guild_id: GuildId,
    pub position: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Volume {
    pub guild_id: GuildId,
    pub volume: u16,
}

impl OutgoingEvent {
    pub(crate) fn op(&self) -> &'static str {
        match self {
            Self::VoiceUpdate(_) => "voiceUpdate",
            Self::Play(_) => "play",
            Self::Stop(_) => "stop",
            Self::Pause(_) => "pause",
            Self::Seek(_) => "seek",
            Self::Volume(_) => "volume",
            Self::Destroy(_) => "destroy",
        }
    }
}

/// Messages sent from a node to this client.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub(crate) enum IncomingEvent {
    PlayerUpdate(PlayerUpdate),
    Event(PlayerEvent),
    Stats(Stats),
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerUpdate {
    pub guild_id: GuildId,
    pub state: PlayerUpdateState,
}

/// Playback progress reported by a node.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerUpdateState {
    /// Node-side Unix timestamp (ms) at which this state was sampled.
    #[serde(default)]
    pub time: u64,
    /// Position within the current track (ms).
    #[serde(default)]
    pub position: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerEvent {
    pub guild_id: GuildId,
    #[serde(flatten)]
    pub kind: TrackEvent,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum TrackEvent {
    TrackEndEvent {
        track: String,
        #[serde(default)]
        reason: String,
    },
    TrackExceptionEvent {
        track: String,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        exception: Option<TrackException>,
        #[serde(default)]
        reason: Option<String>,
    },
    TrackStuckEvent {
        track: String,
        #[serde(rename = "thresholdMs", default)]
        threshold_ms: u64,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct TrackException {
    #[serde(default)]
    pub message: Option<String>,
}

/// Resource usage reported periodically by a node.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Number of players hosted by the node.
    #[serde(default)]
    pub players: u64,
    /// Number of hosted players currently playing audio.
    #[serde(default)]
    pub playing_players: u64,
    /// Node uptime (ms).
    #[serde(default)]
    pub uptime: u64,
    /// JVM memory statistics, in bytes.
    #[serde(default)]
    pub memory: MemoryStats,
    /// CPU load statistics.
    #[serde(default)]
    pub cpu: CpuStats,
    /// Audio frame statistics, averaged per minute.
    ///
    /// Absent until a node has been sending audio for a while.
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

/// Memory figures within a node's [`Stats`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    #[serde(default)]
    pub free: u64,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub allocated: u64,
    #[serde(default)]
    pub reservable: u64,
}

/// CPU figures within a node's [`Stats`].
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    /// Number of cores available to the node.
    #[serde(default)]
    pub cores: u32,
    /// Load of the whole host system, in `[0, 1]`.
    #[serde(default)]
    pub system_load: f32,
    /// Load attributable to the Lavalink process, in `[0, 1]`.
    ///
    /// This is the metric used to rank nodes.
    #[serde(default)]
    pub lavalink_load: f32,
}

/// Audio frame figures within a node's [`Stats`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    #[serde(default)]
    pub sent: i64,
    #[serde(default)]
    pub nulled: i64,
    #[serde(default)]
    pub deficit: i64,
}

/// Outcome category of a REST track query.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    /// A single track was loaded.
    TrackLoaded,
    /// A playlist was loaded.
    PlaylistLoaded,
    /// A search query produced a list of candidate tracks.
    SearchResult,
    /// Nothing matched the query.
    NoMatches,
    /// The node failed while loading; see [`Tracks::exception`].
    LoadFailed,
}

/// Response body of a REST track query.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracks {
    /// Kind of result returned.
    pub load_type: LoadType,
    /// Playlist details, present for playlist loads.
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    /// Loaded tracks, in node order.
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Failure details, present when `load_type` is [`LoadType::LoadFailed`].
    #[serde(default)]
    pub exception: Option<LoadException>,
}

/// Details of a loaded playlist.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    /// Friendly name of the playlist.
    #[serde(default)]
    pub name: Option<String>,
    /// Index of the track which caused the playlist to load, or `-1`.
    #[serde(default = "no_selection")]
    pub selected_track: i64,
}

fn no_selection() -> i64 {
    -1
}

impl PlaylistInfo {
    /// Index of the track which caused the playlist to load, if any.
    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        usize::try_from(self.selected_track).ok()
    }
}

/// Reason a REST track query failed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LoadException {
    /// Human-readable failure message.
    #[serde(default)]
    pub message: Option<String>,
    /// How the node classifies the failure (`COMMON`, `SUSPICIOUS`, `FAULT`).
    #[serde(default)]
    pub severity: Option<String>,
}

/// A track returned by a REST query.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Track {
    /// Base64-encoded track descriptor, passed back to nodes to play this track.
    #[serde(rename = "track")]
    pub data: String,
    /// Node-decoded metadata accompanying the descriptor.
    pub info: TrackInfo,
}

impl Track {
    /// Decodes this track's embedded descriptor locally.
    ///
    /// The result is not checked against [`info`](Track::info).
    pub fn decode(&self) -> Result<TrackInfo, DecodeError> {
        codec::decode_base64(&self.data)
    }
}

/// Metadata describing a single track.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct TrackInfo {
    /// Source-specific track identifier.
    pub identifier: String,
    /// Track title.
    pub title: String,
    /// Track author or uploader.
    pub author: String,
    /// Source URI, if the track has one.
    #[serde(default)]
    pub uri: Option<String>,
    /// Whether the track supports seeking.
    #[serde(rename = "isSeekable", default)]
    pub seekable: bool,
    /// Whether the track is a live stream.
    #[serde(rename = "isStream", default)]
    pub stream: bool,
    /// Track length (ms).
    pub length: u64,
    /// Playback start position (ms).
    #[serde(default)]
    pub position: u64,
}

impl TrackInfo {
    /// Track length as a [`Duration`].
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.length)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn play_command_matches_wire_format() {
        let cmd = OutgoingEvent::Play(Play {
            guild_id: GuildId(1),
            track: "QAAA".into(),
            start_time: "0".into(),
            end_time: "0".into(),
        });

        let value: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({
                "op": "play",
                "guildId": "1",
                "track": "QAAA",
                "startTime": "0",
                "endTime": "0",
            })
        );
        assert_eq!(cmd.op(), "play");
    }

    #[test]
    fn voice_update_nests_server_update() {
        let cmd = OutgoingEvent::VoiceUpdate(VoiceUpdate {
            guild_id: GuildId(5),
            session_id: "abc".into(),
            event: VoiceServerUpdate {
                guild_id: GuildId(5),
                endpoint: "us-east1.discord.media".into(),
                token: "tok".into(),
            },
        });

        let value: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["op"], "voiceUpdate");
        assert_eq!(value["sessionId"], "abc");
        assert_eq!(value["event"]["guild_id"], "5");
        assert_eq!(value["event"]["endpoint"], "us-east1.discord.media");
        assert_eq!(value["event"]["token"], "tok");
    }

    #[test]
    fn incoming_events_parse() {
        let update: IncomingEvent = serde_json::from_value(json!({
            "op": "playerUpdate",
            "guildId": "7",
            "state": {"time": 1500, "position": 300},
        }))
        .unwrap();
        assert!(matches!(
            update,
            IncomingEvent::PlayerUpdate(PlayerUpdate {
                guild_id: GuildId(7),
                state: PlayerUpdateState {
                    time: 1500,
                    position: 300
                },
            })
        ));

        let stuck: IncomingEvent = serde_json::from_value(json!({
            "op": "event",
            "type": "TrackStuckEvent",
            "guildId": "7",
            "track": "QAAA",
            "thresholdMs": 10000,
        }))
        .unwrap();
        match stuck {
            IncomingEvent::Event(PlayerEvent {
                guild_id,
                kind: TrackEvent::TrackStuckEvent { track, threshold_ms },
            }) => {
                assert_eq!(guild_id, GuildId(7));
                assert_eq!(track, "QAAA");
                assert_eq!(threshold_ms, 10_000);
            },
            other => panic!("unexpected parse: {:?}", other),
        }

        let stats: IncomingEvent = serde_json::from_value(json!({
            "op": "stats",
            "players": 2,
            "playingPlayers": 1,
            "uptime": 1000,
            "memory": {"free": 1, "used": 2, "allocated": 3, "reservable": 4},
            "cpu": {"cores": 4, "systemLoad": 0.5, "lavalinkLoad": 0.25},
        }))
        .unwrap();
        match stats {
            IncomingEvent::Stats(s) => {
                assert_eq!(s.playing_players, 1);
                assert!((s.cpu.lavalink_load - 0.25).abs() < f32::EPSILON);
                assert!(s.frame_stats.is_none());
            },
            other => panic!("unexpected parse: {:?}", other),
        }

        let unknown: IncomingEvent =
            serde_json::from_value(json!({"op": "somethingNew", "guildId": "1"})).unwrap();
        assert!(matches!(unknown, IncomingEvent::Unknown));
    }

    #[test]
    fn unhandled_event_types_parse_as_other() {
        let start: IncomingEvent = serde_json::from_value(json!({
            "op": "event",
            "type": "TrackStartEvent",
            "guildId": "7",
            "track": "QAAA",
        }))
        .unwrap();

        assert!(matches!(
            start,
            IncomingEvent::Event(PlayerEvent {
                kind: TrackEvent::Other,
                ..
            })
        ));
    }

    #[test]
    fn load_results_parse() {
        let tracks: Tracks = serde_json::from_value(json!({
            "loadType": "PLAYLIST_LOADED",
            "playlistInfo": {"name": "Mix", "selectedTrack": -1},
            "tracks": [{
                "track": "QAAA",
                "info": {
                    "identifier": "id",
                    "title": "t",
                    "author": "a",
                    "uri": "https://example.com",
                    "isSeekable": true,
                    "isStream": false,
                    "length": 1000,
                    "position": 0,
                },
            }],
        }))
        .unwrap();

        assert_eq!(tracks.load_type, LoadType::PlaylistLoaded);
        let playlist = tracks.playlist_info.unwrap();
        assert_eq!(playlist.name.as_deref(), Some("Mix"));
        assert_eq!(playlist.selected(), None);
        assert_eq!(tracks.tracks[0].info.duration(), Duration::from_secs(1));

        let failed: Tracks = serde_json::from_value(json!({
            "loadType": "LOAD_FAILED",
            "playlistInfo": {},
            "tracks": [],
            "exception": {"message": "blocked", "severity": "COMMON"},
        }))
        .unwrap();
        assert_eq!(failed.load_type, LoadType::LoadFailed);
        assert_eq!(failed.playlist_info.unwrap().selected(), None);
        assert_eq!(failed.exception.unwrap().message.as_deref(), Some("blocked"));
    }
}
