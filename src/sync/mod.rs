//! Two-party race synchronization.
//!
//! The host is authoritative for content: it sends the sentence list once
//! (INIT), after which both sides stream their own progress (UPDATE) and a
//! final score (FINISH). There is no sequencing, acknowledgement or retry;
//! a dropped link simply stops producing opponent updates.

pub mod channel;
pub mod memory;
pub mod peer;
pub mod protocol;
pub mod transport;

pub use channel::{Subscription, SubscriptionId, SyncChannel, SyncEvent};
pub use memory::{MemoryTransport, Switchboard};
pub use peer::{OpponentSnapshot, PeerId, PeerState, Role};
pub use protocol::{FinishPayload, InitPayload, Message, MessageKind, UpdatePayload};
pub use transport::{Transport, TransportEvent};
