use crate::{
    error::{Error, Result},
    events::EventHandler,
    id::{GuildId, NodeId, UserId},
    model::{OutgoingEvent, VoiceServerUpdate, VoiceUpdate},
    node::{ClientData, Node, NodeState},
    player::{Player, PlayerState},
    Config,
    NodeConfig,
};
use dashmap::DashMap;
use derivative::Derivative;
use flume::{Receiver, Sender};
use parking_lot::Mutex as PMutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
    Weak,
};
use tokio::{spawn, task::JoinHandle};
use tracing::{debug, info, instrument, trace, warn};
use tracing_futures::WithSubscriber;

/// Notifications sent from node tasks to the registry supervisor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RegistryMessage {
    /// A node lost its socket and could not reconnect.
    NodeFailed(NodeId),
}

/// Registry entry for one guild's player.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Session {
    pub node: NodeId,
    pub state: PlayerState,
    #[derivative(Debug = "ignore")]
    pub handler: Arc<dyn EventHandler>,
}

/// Shared store of nodes and players.
///
/// Nodes and sessions refer to one another only by ID. The node list lock and
/// session map guards are never held together, nor across an `.await`. A
/// session map guard may be taken while a node's writer is held.
#[derive(Debug)]
pub(crate) struct Registry {
    client: ClientData,
    config: Config,
    next_id: AtomicU64,
    nodes: PMutex<Vec<Arc<Node>>>,
    pub(crate) sessions: DashMap<GuildId, Session>,
    notify: Sender<RegistryMessage>,
    supervisor: PMutex<Option<JoinHandle<()>>>,
}

impl Registry {
    fn new(client: ClientData, config: Config, notify: Sender<RegistryMessage>) -> Self {
        Self {
            client,
            config,
            next_id: AtomicU64::new(0),
            nodes: PMutex::new(vec![]),
            sessions: DashMap::new(),
            notify,
            supervisor: PMutex::new(None),
        }
    }

    pub(crate) fn next_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.lock().iter().find(|node| node.id() == id).cloned()
    }

    fn best_node(&self) -> Result<Arc<Node>> {
        let mut nodes = self.nodes.lock();

        // Stable: equally loaded nodes keep their current order.
        nodes.sort_by(|a, b| a.load().total_cmp(&b.load()));

        nodes.first().cloned().ok_or(Error::NoNodesAvailable)
    }

    #[instrument(skip(self))]
    pub(crate) async fn remove_node(&self, id: NodeId) -> Result<()> {
        let node = {
            let mut nodes = self.nodes.lock();
            let index = nodes
                .iter()
                .position(|node| node.id() == id)
                .ok_or(Error::NodeNotFound)?;

            nodes.swap_remove(index)
        };

        node.close().await;

        let orphaned = self.sessions.iter().filter(|s| s.node == id).count();
        if orphaned > 0 {
            warn!(
                "Node {} removed with {} player(s) still bound to it.",
                id, orphaned
            );
        }

        info!("Node {} removed.", id);

        Ok(())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for node in self.nodes.get_mut().drain(..) {
            node.abort();
        }

        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.abort();
        }
    }
}

#[instrument(skip_all)]
async fn supervisor(registry: Weak<Registry>, rx: Receiver<RegistryMessage>) {
    trace!("Registry supervisor started.");

    while let Ok(msg) = rx.recv_async().await {
        let registry = match registry.upgrade() {
            Some(registry) => registry,
            None => break,
        };

        match msg {
            RegistryMessage::NodeFailed(id) => {
                if registry.remove_node(id).await.is_err() {
                    debug!("Failed node {} was already removed.", id);
                }
            },
        }
    }

    trace!("Registry supervisor finished.");
}

/// A client for a pool of Lavalink nodes, responsible for managing
/// [`Player`]s.
///
/// New players are placed on whichever node the caller picks, typically
/// [`best_node`]. Each guild has at most one player at a time.
///
/// Handles are cheap to clone. Once every clone is dropped, all node
/// connections are shut down.
///
/// [`Player`]: Player
/// [`best_node`]: Lavalink::best_node
#[derive(Clone, Debug)]
pub struct Lavalink {
    registry: Arc<Registry>,
}

impl Lavalink {
    /// Create a new client for a bot with the given user ID, running
    /// `shard_count` gateway shards.
    ///
    /// This must be called from within a Tokio runtime.
    #[must_use]
    pub fn new<U: Into<UserId>>(shard_count: u64, user_id: U) -> Self {
        Self::from_config(shard_count, user_id, Config::default())
    }

    /// Create a new client, using the given configuration.
    ///
    /// This must be called from within a Tokio runtime.
    #[must_use]
    pub fn from_config<U: Into<UserId>>(shard_count: u64, user_id: U, config: Config) -> Self {
        let (tx, rx) = flume::unbounded();
        let client = ClientData {
            shard_count,
            user_id: user_id.into(),
        };
        let dispatch = config.dispatch.clone();

        let registry = Arc::new(Registry::new(client, config, tx));

        let task = supervisor(Arc::downgrade(&registry), rx);
        let handle = match dispatch {
            Some(dispatch) => spawn(task.with_subscriber(dispatch)),
            None => spawn(task),
        };
        *registry.supervisor.lock() = Some(handle);

        Self { registry }
    }

    /// Opens and registers a single node.
    #[instrument(skip(self))]
    pub async fn add_node(&self, config: NodeConfig) -> Result<Arc<Node>> {
        let registry = &self.registry;
        let node = Arc::new(Node::new(
            registry.next_id(),
            config,
            registry.client,
            &registry.config,
        ));

        node.open(
            Arc::downgrade(registry),
            registry.notify.clone(),
            registry.config.dispatch.clone(),
        )
        .await?;

        registry.nodes.lock().push(Arc::clone(&node));

        // The receive task may have failed before the node was listed,
        // in which case the supervisor could not find it to remove.
        if node.state() == NodeState::Disconnected {
            let _ = registry.remove_node(node.id()).await;
        }

        Ok(node)
    }

    /// Opens and registers each of the given nodes, in order.
    ///
    /// This stops at the first node which fails to open, returning its error.
    /// Nodes opened before that point remain registered.
    pub async fn add_nodes<I>(&self, configs: I) -> Result<()>
    where
        I: IntoIterator<Item = NodeConfig>,
    {
        for config in configs {
            self.add_node(config).await?;
        }

        Ok(())
    }

    /// Closes a node and unregisters it.
    ///
    /// Players bound to the node remain registered, but every command sent to
    /// them fails with [`Error::NodeLost`] until they are destroyed.
    pub async fn remove_node(&self, node: &Node) -> Result<()> {
        self.registry.remove_node(node.id()).await
    }

    /// Returns the registered node with the least reported load.
    ///
    /// Ties are resolved in favour of the node which has ranked first for longer.
    pub fn best_node(&self) -> Result<Arc<Node>> {
        self.registry.best_node()
    }

    /// Retrieves a registered node by its ID.
    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.registry.node(id)
    }

    /// Returns every registered node.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.registry.nodes.lock().clone()
    }

    /// Creates a player for a guild on the given node, using a voice session
    /// received from Discord.
    ///
    /// Any existing player for the guild is destroyed first.
    #[inline]
    pub async fn create_player<G: Into<GuildId>>(
        &self,
        node: &Node,
        guild_id: G,
        session_id: &str,
        event: VoiceServerUpdate,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Player> {
        self._create_player(node, guild_id.into(), session_id, event, handler)
            .await
    }

    #[instrument(skip(self, node, session_id, event, handler), fields(node = %node.id()))]
    async fn _create_player(
        &self,
        node: &Node,
        guild_id: GuildId,
        session_id: &str,
        event: VoiceServerUpdate,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Player> {
        let node = self.registry.node(node.id()).ok_or(Error::NodeNotFound)?;

        if self.registry.sessions.contains_key(&guild_id) {
            match Player::new(guild_id, Arc::clone(&self.registry)).destroy().await {
                Ok(()) | Err(Error::PlayerNotFound) => {},
                Err(e) => return Err(e),
            }
        }

        node.send(&OutgoingEvent::VoiceUpdate(VoiceUpdate {
            guild_id,
            session_id: session_id.to_string(),
            event,
        }))
        .await?;

        self.registry.sessions.insert(guild_id, Session {
            node: node.id(),
            state: PlayerState::default(),
            handler,
        });

        debug!("Player created for guild {}.", guild_id);

        Ok(Player::new(guild_id, Arc::clone(&self.registry)))
    }

    /// Retrieves the player for the given guild, if one exists.
    #[inline]
    pub fn get_player<G: Into<GuildId>>(&self, guild_id: G) -> Result<Player> {
        self._get_player(guild_id.into())
    }

    fn _get_player(&self, guild_id: GuildId) -> Result<Player> {
        if self.registry.sessions.contains_key(&guild_id) {
            Ok(Player::new(guild_id, Arc::clone(&self.registry)))
        } else {
            Err(Error::PlayerNotFound)
        }
    }

    /// Returns the IDs of all guilds which currently have a player.
    pub fn guilds(&self) -> Vec<GuildId> {
        self.registry.sessions.iter().map(|s| *s.key()).collect()
    }
}

#[cfg(test)]
impl Registry {
    pub(crate) fn detached() -> Arc<Self> {
        let (tx, _rx) = flume::unbounded();
        let client = ClientData {
            shard_count: 1,
            user_id: UserId(1),
        };

        Arc::new(Self::new(client, Config::default(), tx))
    }

    pub(crate) fn insert_node(&self, node: Arc<Node>) {
        self.nodes.lock().push(node);
    }

    pub(crate) fn insert_detached_node(&self) -> Arc<Node> {
        let node = Node::detached(self.next_id());
        self.insert_node(Arc::clone(&node));
        node
    }

    pub(crate) fn insert_session(&self, guild_id: GuildId, node: NodeId, handler: Arc<dyn EventHandler>) {
        self.sessions.insert(guild_id, Session {
            node,
            state: PlayerState::default(),
            handler,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{events::IgnoreEvents, model::VoiceServerUpdate};
    use futures::StreamExt;
    use serde_json::Value;
    use tokio_tungstenite::tungstenite::Message;

    fn lavalink(registry: &Arc<Registry>) -> Lavalink {
        Lavalink {
            registry: Arc::clone(registry),
        }
    }

    fn voice(guild: u64) -> VoiceServerUpdate {
        VoiceServerUpdate {
            guild_id: GuildId(guild),
            endpoint: "eu-west1.discord.media".into(),
            token: "secret".into(),
        }
    }

    #[test]
    fn best_node_prefers_lowest_load() {
        let registry = Registry::detached();
        let loads = [5.0, 2.0, 8.0];
        let nodes: Vec<_> = loads
            .iter()
            .map(|load| {
                let node = registry.insert_detached_node();
                node.set_load(*load);
                node
            })
            .collect();

        assert_eq!(lavalink(&registry).best_node().unwrap().id(), nodes[1].id());
    }

    #[test]
    fn best_node_ties_keep_insertion_order() {
        let registry = Registry::detached();
        let a = registry.insert_detached_node();
        let b = registry.insert_detached_node();
        a.set_load(3.0);
        b.set_load(3.0);

        let lavalink = lavalink(&registry);
        assert_eq!(lavalink.best_node().unwrap().id(), a.id());
        assert_eq!(lavalink.best_node().unwrap().id(), a.id());
    }

    #[test]
    fn best_node_needs_a_node() {
        let registry = Registry::detached();

        assert!(matches!(
            lavalink(&registry).best_node(),
            Err(Error::NoNodesAvailable)
        ));
    }

    #[tokio::test]
    async fn removing_nodes() {
        let registry = Registry::detached();
        let a = registry.insert_detached_node();
        let b = registry.insert_detached_node();
        let c = registry.insert_detached_node();
        let lavalink = lavalink(&registry);

        lavalink.remove_node(&a).await.unwrap();

        // Swap-remove moves the last node into the gap.
        let ids: Vec<_> = lavalink.nodes().iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![c.id(), b.id()]);
        assert_eq!(a.state(), NodeState::Removed);
        assert!(lavalink.node(a.id()).is_none());

        assert!(matches!(
            lavalink.remove_node(&a).await,
            Err(Error::NodeNotFound)
        ));
    }

    #[test]
    fn node_ids_are_never_reused() {
        let registry = Registry::detached();
        let first = registry.next_id();
        let second = registry.next_id();

        assert!(second > first);
    }

    #[tokio::test]
    async fn create_player_replaces_existing_player() {
        let registry = Registry::detached();
        let (old, mut old_remote) = Node::loopback(registry.next_id()).await;
        let (new, mut new_remote) = Node::loopback(registry.next_id()).await;
        registry.insert_node(Arc::clone(&old));
        registry.insert_node(Arc::clone(&new));
        let lavalink = lavalink(&registry);

        lavalink
            .create_player(&old, GuildId(10), "session", voice(10), Arc::new(IgnoreEvents))
            .await
            .unwrap();
        let player = lavalink
            .create_player(&new, GuildId(10), "session", voice(10), Arc::new(IgnoreEvents))
            .await
            .unwrap();

        assert_eq!(player.node_id().unwrap(), new.id());
        assert_eq!(lavalink.guilds(), vec![GuildId(10)]);

        let mut ops = vec![];
        for _ in 0..2 {
            if let Some(Ok(Message::Text(text))) = old_remote.next().await {
                ops.push(serde_json::from_str::<Value>(&text).unwrap()["op"].clone());
            }
        }
        assert_eq!(ops, vec!["voiceUpdate", "destroy"]);

        match new_remote.next().await {
            Some(Ok(Message::Text(text))) => {
                let value: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["op"], "voiceUpdate");
                assert_eq!(value["sessionId"], "session");
                assert_eq!(value["event"]["token"], "secret");
            },
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_player_needs_registered_node() {
        let registry = Registry::detached();
        let stranger = Node::detached(NodeId(99));

        let out = lavalink(&registry)
            .create_player(&stranger, GuildId(1), "session", voice(1), Arc::new(IgnoreEvents))
            .await;

        assert!(matches!(out, Err(Error::NodeNotFound)));
        assert!(matches!(
            lavalink(&registry).get_player(GuildId(1)),
            Err(Error::PlayerNotFound)
        ));
    }

    #[tokio::test]
    async fn orphaned_player_is_replaced_without_old_node() {
        let registry = Registry::detached();
        let old = registry.insert_detached_node();
        let (new, _remote) = Node::loopback(registry.next_id()).await;
        registry.insert_node(Arc::clone(&new));
        registry.insert_session(GuildId(2), old.id(), Arc::new(IgnoreEvents));
        let lavalink = lavalink(&registry);

        lavalink.remove_node(&old).await.unwrap();
        let player = lavalink
            .create_player(&new, GuildId(2), "session", voice(2), Arc::new(IgnoreEvents))
            .await
            .unwrap();

        assert_eq!(player.node_id().unwrap(), new.id());
    }

    #[tokio::test]
    async fn supervisor_removes_failed_nodes() {
        let lavalink = Lavalink::new(1, UserId(1));
        let node = lavalink.registry.insert_detached_node();

        lavalink
            .registry
            .notify
            .send(RegistryMessage::NodeFailed(node.id()))
            .unwrap();

        while !lavalink.nodes().is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(node.state(), NodeState::Removed);
        assert!(matches!(lavalink.best_node(), Err(Error::NoNodesAvailable)));
    }
}
