//! Peer connection negotiation
//!
//! A pure transition table (`state`), an opaque transport seam (`transport`),
//! and the controller that serializes commands, signaling, and transport
//! events into single-threaded state updates (`controller`).

pub mod controller;
pub mod state;
pub mod transport;

pub use controller::{CallEvent, PeerConnectionController};
pub use state::{next_state, ConnectionState, NegotiationInput};
pub use transport::{IceServer, PeerTransport, SdpType, SessionDescription, TransportEvent};
