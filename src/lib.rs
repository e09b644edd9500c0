//! Secure remote administration core: authenticated channels and file
//! transfer.
//!
//! Two cooperating subsystems share this crate. [`net`] establishes an
//! encrypted session over a framed channel: X25519 key agreement plus an
//! SRP-6a exchange select a bulk cipher and a session-type capability.
//! [`transfer`] copies directory trees between a source and a target
//! endpoint over typed file requests, with packet pacing, progress
//! accounting, and an interactive error policy.
//!
//! The transport, the UI, and user persistence stay outside: the crate
//! consumes them through the [`net::Channel`], [`transfer::TransferWindow`]
//! and [`net::UserList`] interfaces.

pub mod crypto;
pub mod net;
pub mod proto;
pub mod transfer;
