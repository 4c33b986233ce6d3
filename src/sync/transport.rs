use super::peer::PeerId;
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data-capable link to `remote` is open.
    Connected { remote: PeerId },
    /// One inbound text frame.
    Data(String),
    /// The link was closed by either side.
    Closed,
}

/// Bidirectional frame link between two peers.
///
/// Implementations own signaling and connection setup. `poll` never blocks;
/// it returns whatever arrived since the last call.
pub trait Transport {
    /// Registers with the signaling service and returns the identity the
    /// other side dials.
    fn open(&mut self) -> Result<PeerId, SyncError>;

    fn dial(&mut self, remote: &PeerId) -> Result<(), SyncError>;

    fn send(&mut self, frame: String) -> Result<(), SyncError>;

    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Closes any link and releases the identity.
    fn close(&mut self);
}
