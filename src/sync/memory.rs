//! In-process transport.
//!
//! A [`Switchboard`] plays the part of the signaling service: transports
//! register an identity with it and dial each other by that identity. Frames
//! are delivered into the receiver's inbox and picked up on its next poll.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::debug;

use super::peer::PeerId;
use super::transport::{Transport, TransportEvent};
use crate::error::SyncError;

type Inbox = Rc<RefCell<VecDeque<TransportEvent>>>;

#[derive(Debug, Default)]
struct Exchange {
    inboxes: HashMap<PeerId, Inbox>,
    offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Switchboard {
    exchange: Rc<RefCell<Exchange>>,
}

impl Switchboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            board: self.clone(),
            local: None,
            remote: None,
            inbox: None,
        }
    }

    /// While offline, registering and dialing fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.exchange.borrow_mut().offline = offline;
    }

    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.exchange.borrow().inboxes.contains_key(id)
    }

    /// Delivers a raw frame to `to`, bypassing any sender.
    pub fn inject(&self, to: &PeerId, frame: impl Into<String>) -> bool {
        match self.inbox(to) {
            Some(inbox) => {
                inbox.borrow_mut().push_back(TransportEvent::Data(frame.into()));
                true
            }
            None => false,
        }
    }

    fn register(&self) -> Result<(PeerId, Inbox), SyncError> {
        let mut exchange = self.exchange.borrow_mut();
        if exchange.offline {
            return Err(SyncError::Connection("signaling service unreachable".into()));
        }

        let mut id = PeerId::random();
        while exchange.inboxes.contains_key(&id) {
            id = PeerId::random();
        }
        let inbox = Inbox::default();
        exchange.inboxes.insert(id.clone(), Rc::clone(&inbox));
        Ok((id, inbox))
    }

    fn inbox(&self, id: &PeerId) -> Option<Inbox> {
        self.exchange.borrow().inboxes.get(id).cloned()
    }

    fn is_offline(&self) -> bool {
        self.exchange.borrow().offline
    }

    fn unregister(&self, id: &PeerId) {
        self.exchange.borrow_mut().inboxes.remove(id);
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    board: Switchboard,
    local: Option<PeerId>,
    remote: Option<PeerId>,
    inbox: Option<Inbox>,
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<PeerId, SyncError> {
        self.close();
        let (id, inbox) = self.board.register()?;
        self.local = Some(id.clone());
        self.inbox = Some(inbox);
        Ok(id)
    }

    fn dial(&mut self, remote: &PeerId) -> Result<(), SyncError> {
        let (Some(local), Some(own)) = (self.local.clone(), self.inbox.clone()) else {
            return Err(SyncError::Connection("identity not established".into()));
        };
        if self.board.is_offline() {
            return Err(SyncError::Connection("signaling service unreachable".into()));
        }
        let theirs = self
            .board
            .inbox(remote)
            .ok_or_else(|| SyncError::Connection(format!("peer {remote} is unavailable")))?;

        theirs
            .borrow_mut()
            .push_back(TransportEvent::Connected { remote: local });
        own.borrow_mut().push_back(TransportEvent::Connected {
            remote: remote.clone(),
        });
        self.remote = Some(remote.clone());
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<(), SyncError> {
        let remote = self.remote.as_ref().ok_or(SyncError::NotConnected)?;
        let theirs = self.board.inbox(remote).ok_or(SyncError::NotConnected)?;
        theirs.borrow_mut().push_back(TransportEvent::Data(frame));
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let Some(inbox) = &self.inbox else {
            return Vec::new();
        };
        let events: Vec<TransportEvent> = inbox.borrow_mut().drain(..).collect();

        for event in &events {
            match event {
                TransportEvent::Connected { remote } => self.remote = Some(remote.clone()),
                TransportEvent::Closed => self.remote = None,
                TransportEvent::Data(_) => {}
            }
        }
        events
    }

    fn close(&mut self) {
        if let Some(remote) = self.remote.take() {
            if let Some(theirs) = self.board.inbox(&remote) {
                theirs.borrow_mut().push_back(TransportEvent::Closed);
            }
        }
        if let Some(local) = self.local.take() {
            debug!("releasing peer id {}", local);
            self.board.unregister(&local);
        }
        self.inbox = None;
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}
