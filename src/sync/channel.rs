use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info, warn};

use super::peer::{PeerId, PeerState, Role};
use super::protocol::Message;
use super::transport::{Transport, TransportEvent};
use crate::error::SyncError;

/// What a subscriber sees from the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected { remote: PeerId },
    Message(Message),
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a [`SyncChannel::subscribe`] call.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<SyncEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Everything delivered since the last drain, in arrival order.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.rx.try_iter().collect()
    }
}

/// Owns the peer transport and fans decoded traffic out to subscribers.
///
/// The transport itself is never handed out; the rest of the system only
/// sees [`SyncEvent`]s.
pub struct SyncChannel {
    transport: Box<dyn Transport>,
    peer: Option<PeerState>,
    connect_announced: bool,
    subscribers: Vec<(SubscriptionId, Sender<SyncEvent>)>,
    next_subscription: u64,
}

impl fmt::Debug for SyncChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncChannel")
            .field("peer", &self.peer)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl SyncChannel {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            peer: None,
            connect_announced: false,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Establishes a local identity for `role`, replacing any previous one.
    pub fn initialize(&mut self, role: Role) -> Result<PeerId, SyncError> {
        if self.peer.take().is_some() {
            self.transport.close();
        }
        self.connect_announced = false;

        let local_id = self.transport.open().inspect_err(|e| {
            warn!("could not establish {} identity: {}", role, e);
        })?;

        info!("peer {} ready as {}", local_id, role);
        self.peer = Some(PeerState {
            local_id: local_id.clone(),
            role,
            connected: false,
            remote_id: None,
        });
        Ok(local_id)
    }

    /// Dials the host. Success means the link is being opened; the
    /// `Connected` event arrives on a later [`pump`](Self::pump).
    pub fn join(&mut self, remote: &PeerId) -> Result<(), SyncError> {
        match self.peer.as_ref().map(|p| p.role) {
            Some(Role::Client) => {}
            Some(Role::Host) => {
                return Err(SyncError::Connection("a host does not dial".into()));
            }
            None => {
                return Err(SyncError::Connection("identity not initialized".into()));
            }
        }

        self.connect_announced = false;
        self.transport.dial(remote).inspect_err(|e| {
            warn!("failed to join {}: {}", remote, e);
        })
    }

    /// Sends `message` if a link is open. Nothing is queued: a message sent
    /// before the link opens is lost.
    pub fn send(&mut self, message: &Message) {
        if !self.is_connected() {
            debug!("dropping {} with no open connection", message.kind());
            return;
        }

        let sent = message
            .encode()
            .and_then(|frame| self.transport.send(frame));
        if let Err(e) = sent {
            debug!("dropping {}: {}", message.kind(), e);
        }
    }

    pub fn subscribe(&mut self) -> Subscription {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let (tx, rx) = mpsc::channel();
        self.subscribers.push((id, tx));
        Subscription { id, rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drains the transport and delivers events to every subscriber.
    /// Returns how many events were delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;

        for event in self.transport.poll() {
            let event = match event {
                TransportEvent::Connected { remote } => {
                    let Some(peer) = self.peer.as_mut() else {
                        continue;
                    };
                    peer.connected = true;
                    peer.remote_id = Some(remote.clone());

                    if self.connect_announced {
                        debug!("already announced link to {}", remote);
                        continue;
                    }
                    self.connect_announced = true;
                    info!("connected to {}", remote);
                    SyncEvent::Connected { remote }
                }
                TransportEvent::Data(frame) => match Message::decode(&frame) {
                    Ok(message) => {
                        debug!("received {}", message.kind());
                        SyncEvent::Message(message)
                    }
                    Err(e) => {
                        warn!("dropping inbound frame: {}", e);
                        continue;
                    }
                },
                TransportEvent::Closed => {
                    if let Some(peer) = self.peer.as_mut() {
                        peer.connected = false;
                    }
                    info!("peer connection closed");
                    SyncEvent::Disconnected
                }
            };

            self.dispatch(event);
            delivered += 1;
        }
        delivered
    }

    fn dispatch(&mut self, event: SyncEvent) {
        self.subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Closes the link and forgets the local identity. Safe to call twice.
    pub fn cleanup(&mut self) {
        if let Some(peer) = self.peer.take() {
            self.transport.close();
            info!("peer {} torn down", peer.local_id);
        }
        self.connect_announced = false;
    }

    pub fn peer(&self) -> Option<&PeerState> {
        self.peer.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.peer.as_ref().is_some_and(|p| p.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::Switchboard;
    use crate::sync::protocol::{FinishPayload, UpdatePayload};
    use assert_matches::assert_matches;

    fn linked(board: &Switchboard) -> (SyncChannel, SyncChannel, PeerId) {
        let mut host = SyncChannel::new(board.transport());
        let mut client = SyncChannel::new(board.transport());
        let host_id = host.initialize(Role::Host).unwrap();
        client.initialize(Role::Client).unwrap();
        client.join(&host_id).unwrap();
        (host, client, host_id)
    }

    #[test]
    fn connect_fires_once_per_join() {
        let board = Switchboard::new();
        let (mut host, mut client, host_id) = linked(&board);
        let sub = client.subscribe();

        client.pump();
        client.join(&host_id).unwrap();
        client.pump();
        assert_matches!(sub.drain().as_slice(), [SyncEvent::Connected { .. }, SyncEvent::Connected { .. }]);

        let host_sub = host.subscribe();
        host.pump();
        assert!(host.is_connected());
        assert_eq!(host_sub.drain().len(), 1);
    }

    #[test]
    fn duplicate_connect_in_one_session_is_suppressed() {
        let board = Switchboard::new();
        let (mut host, mut client, host_id) = linked(&board);
        let sub = host.subscribe();
        // a second dial from the same client reaches the host again
        client.join(&host_id).unwrap();
        host.pump();
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn messages_reach_every_subscriber() {
        let board = Switchboard::new();
        let (mut host, mut client, _) = linked(&board);
        host.pump();
        client.pump();

        let a = client.subscribe();
        let b = client.subscribe();
        host.send(&Message::Finish(FinishPayload { wpm: 88 }));
        assert_eq!(client.pump(), 1);

        let expected = vec![SyncEvent::Message(Message::Finish(FinishPayload { wpm: 88 }))];
        assert_eq!(a.drain(), expected);
        assert_eq!(b.drain(), expected);
    }

    #[test]
    fn unsubscribed_listener_gets_nothing() {
        let board = Switchboard::new();
        let (mut host, mut client, _) = linked(&board);
        host.pump();
        client.pump();

        let kept = client.subscribe();
        let gone = client.subscribe();
        assert!(client.unsubscribe(gone.id()));
        assert!(!client.unsubscribe(gone.id()));

        host.send(&Message::Update(UpdatePayload::default()));
        client.pump();
        assert_eq!(kept.drain().len(), 1);
        assert!(gone.drain().is_empty());
        assert_eq!(client.subscriber_count(), 1);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let board = Switchboard::new();
        let (mut host, mut client, _) = linked(&board);
        host.pump();
        drop(client.subscribe());
        client.pump();
        assert_eq!(client.subscriber_count(), 0);
    }

    #[test]
    fn send_before_connect_is_dropped() {
        let board = Switchboard::new();
        let mut host = SyncChannel::new(board.transport());
        let host_id = host.initialize(Role::Host).unwrap();
        host.send(&Message::Finish(FinishPayload { wpm: 1 }));

        let mut client = SyncChannel::new(board.transport());
        client.initialize(Role::Client).unwrap();
        client.join(&host_id).unwrap();
        let sub = client.subscribe();
        client.pump();
        assert_matches!(sub.drain().as_slice(), [SyncEvent::Connected { .. }]);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let board = Switchboard::new();
        let (mut host, mut client, _) = linked(&board);
        host.pump();
        client.pump();
        let sub = client.subscribe();

        let client_id = client.peer().unwrap().local_id.clone();
        assert!(board.inject(&client_id, r#"{"type":"TELEPORT","payload":{}}"#));
        assert!(board.inject(&client_id, r#"{"type":"FINISH","payload":{"wpm":5}}"#));

        assert_eq!(client.pump(), 1);
        assert_eq!(
            sub.drain(),
            vec![SyncEvent::Message(Message::Finish(FinishPayload { wpm: 5 }))]
        );
    }

    #[test]
    fn join_requires_client_identity() {
        let board = Switchboard::new();
        let mut channel = SyncChannel::new(board.transport());
        assert_matches!(channel.join(&PeerId::new("X")), Err(SyncError::Connection(_)));
        channel.initialize(Role::Host).unwrap();
        assert_matches!(channel.join(&PeerId::new("X")), Err(SyncError::Connection(_)));
    }

    #[test]
    fn initialize_fails_when_transport_cannot() {
        let board = Switchboard::new();
        board.set_offline(true);
        let mut channel = SyncChannel::new(board.transport());
        assert_matches!(channel.initialize(Role::Host), Err(SyncError::Connection(_)));
        assert!(channel.peer().is_none());
    }

    #[test]
    fn cleanup_is_idempotent_and_disconnects_remote() {
        let board = Switchboard::new();
        let (mut host, mut client, host_id) = linked(&board);
        host.pump();
        client.pump();
        let sub = client.subscribe();

        host.cleanup();
        host.cleanup();
        assert!(host.peer().is_none());
        assert!(!board.is_registered(&host_id));

        client.pump();
        assert_eq!(sub.drain(), vec![SyncEvent::Disconnected]);
        assert!(!client.is_connected());
    }
}
