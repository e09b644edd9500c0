//! Secure channel establishment
//!
//! Exposes the framed-channel adapter, the read-only user directory, and
//! the server-side authentication state machine.

pub mod authenticator;
pub mod channel;
pub mod users;

pub use authenticator::{AnonymousAccess, ServerAuthenticator, State};
pub use channel::{Channel, ChannelError, ChannelEvent};
pub use users::{User, UserList};
