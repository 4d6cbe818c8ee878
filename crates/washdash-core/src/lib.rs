//! Assistant chat core for the WASH monitoring dashboard
//!
//! Reconciles three sources of truth behind the assistant chat surfaces:
//! server-persisted thread history, local messages of a conversation that has
//! not been created on the server yet, and the assistant reply that is still
//! streaming in.
//!
//! ## Architecture
//!
//! - [`gateway::ChatGateway`]: backend contract (threads, messages, send)
//! - [`transport::TransportAdapter`]: turns a reply into fragments plus a completion marker
//! - [`accumulator::StreamingSession`]: concatenates fragments, single attachment, cancellable
//! - [`cache::ThreadCache`]: read-through TTL cache with an explicit dirty set
//! - [`controller::ThreadController`]: the draft/active/sending state machine
//!
//! The presentation layer only reads [`controller::ChatSnapshot`] values and
//! issues intents; it never touches controller-owned state.

pub mod accumulator;
pub mod cache;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use accumulator::{CancelHandle, SessionState, StreamObserver, StreamOutcome, StreamingSession};
pub use cache::{Lookup, ThreadCache};
pub use controller::{ChatPhase, ChatSnapshot, ControllerSettings, SendOutcome, ThreadController};
pub use error::{ChatError, ChatErrorKind, ChatResult, GatewayError, GatewayResult};
pub use gateway::ChatGateway;
pub use transport::{FragmentStream, TransportAdapter, TransportEvent};
pub use types::{derive_title, Message, MessageRole, Thread};
