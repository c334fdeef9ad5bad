use super::{Node, NodeState};
use crate::{
    dispatch,
    manager::{Registry, RegistryMessage},
    model::IncomingEvent,
    ws::WsStream,
};
use flume::Sender;
use std::sync::{Arc, Weak};
use tracing::{error, info, instrument, trace, warn};

/// Supervisory states of a node's receive task.
enum ReceiveState {
    Connected(WsStream),
    Reconnecting,
    Failed,
}

#[instrument(skip_all, fields(node = %node.id(), url = %node.config().websocket))]
pub(crate) async fn runner(
    node: Arc<Node>,
    stream: WsStream,
    registry: Weak<Registry>,
    notify: Sender<RegistryMessage>,
) {
    trace!("Node receive task started.");

    let mut state = ReceiveState::Connected(stream);

    loop {
        if node.state() == NodeState::Removed {
            break;
        }

        state = match state {
            ReceiveState::Connected(mut stream) => match stream.recv_json::<IncomingEvent>().await {
                Ok(Some(event)) => {
                    let registry = match registry.upgrade() {
                        Some(registry) => registry,
                        None => break,
                    };

                    if let Err(e) = dispatch::handle(&registry, &node, event).await {
                        warn!("Node {} could not dispatch a message: {}.", node.id(), e);
                    }

                    ReceiveState::Connected(stream)
                },
                Ok(None) => ReceiveState::Connected(stream),
                Err(e) if e.is_fatal() => {
                    warn!("Node {} lost its connection: {:?}.", node.id(), e);
                    ReceiveState::Reconnecting
                },
                Err(e) => {
                    warn!("Node {} sent an unknown payload: {:?}.", node.id(), e);
                    ReceiveState::Connected(stream)
                },
            },
            ReceiveState::Reconnecting => {
                node.set_state(NodeState::Reconnecting);

                match node.connect().await {
                    Ok(stream) => {
                        node.set_state(NodeState::Connected);
                        info!("Node {} reconnected.", node.id());
                        ReceiveState::Connected(stream)
                    },
                    Err(e) => {
                        error!("Node {} failed to reconnect: {}.", node.id(), e);
                        ReceiveState::Failed
                    },
                }
            },
            ReceiveState::Failed => {
                node.set_state(NodeState::Disconnected);

                // Registry may already be gone: nothing left to remove from.
                let _ = notify.send(RegistryMessage::NodeFailed(node.id()));
                break;
            },
        };
    }

    trace!("Node receive task finished.");
}
