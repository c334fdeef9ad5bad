//! Constants affecting node connections and player commands.

/// Lowest Lavalink major version this library can talk to.
pub const MIN_MAJOR_VERSION: u32 = 3;

/// Volume assigned to every newly created player.
pub const DEFAULT_VOLUME: u16 = 100;

/// Largest volume a node will accept, as a percentage of unity gain.
pub const MAX_VOLUME: u16 = 1000;

/// Client name announced to nodes during the WebSocket handshake.
pub const DEFAULT_CLIENT_NAME: &str = concat!("lavasong/", env!("CARGO_PKG_VERSION"));

/// Highest track descriptor version understood by the decoder.
pub const MAX_DESCRIPTOR_VERSION: u8 = 3;

pub(crate) const AUTHORIZATION_HEADER: &str = "authorization";
pub(crate) const CLIENT_NAME_HEADER: &str = "client-name";
pub(crate) const NUM_SHARDS_HEADER: &str = "num-shards";
pub(crate) const USER_ID_HEADER: &str = "user-id";

/// Response header carrying the node's major protocol version.
pub(crate) const VERSION_HEADER: &str = "lavalink-major-version";
