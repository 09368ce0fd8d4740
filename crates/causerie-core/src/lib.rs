//! # causerie-core
//!
//! The realtime chat coordination layer:
//!
//! - **Connection registry** -- maps authenticated users to live session
//!   handles and room memberships; the only globally shared mutable state.
//! - **Conversation model** -- creation with direct-chat deduplication,
//!   participant resolution, summary views.
//! - **Message pipeline** -- append-only per-conversation sequences,
//!   read-receipt aggregation, room broadcast.
//! - **Chat request state machine** -- pending/accepted/rejected handshake
//!   that gates who may converse, with a group-invite variant.
//! - **Signaling relay** -- presence-gated point-to-point forwarding of
//!   call/WebRTC payloads, plus typing broadcasts.
//!
//! Durable storage and credential verification are external collaborators,
//! consumed through the [`causerie_store::RecordStore`] and
//! [`identity::IdentityVerifier`] seams.

pub mod conversations;
pub mod identity;
pub mod messages;
pub mod registry;
pub mod requests;
pub mod signaling;

mod error;

pub use error::{CoreError, Result};
pub use registry::{AuthenticatedSession, ConnectionRegistry, SessionHandle};
