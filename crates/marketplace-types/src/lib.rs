//! Shared types for the marketplace matching and settlement engine.
//!
//! This crate defines the domain entities (requests, providers, firms,
//! payments, distributions), the status enums they move through, the shared
//! error taxonomy, and the event bus used to publish lifecycle and
//! settlement events to collaborators.

pub mod common;
pub mod errors;
pub mod events;
pub mod payment;
pub mod provider;
pub mod request;

pub use common::*;
pub use errors::*;
pub use events::*;
pub use payment::*;
pub use provider::*;
pub use request::*;
