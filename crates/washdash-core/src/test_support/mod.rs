//! Test doubles shared by unit tests and downstream crates
//!
//! Enabled for this crate's own tests and, for other crates, through the
//! `test-utils` feature.

pub mod mocks;

pub use mocks::{GatewayCall, MockGateway, ScriptedReply};
