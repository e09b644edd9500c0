//! Adapter over a framed, in-order byte-message transport.
//!
//! The transport itself lives outside this crate; anything that frames
//! complete messages over a reliable stream can implement [`Channel`].
//! Events are delivered in order and consumed single-threaded, so handler
//! code runs to completion between suspension points.

use async_trait::async_trait;
use thiserror::Error;

use crate::crypto::{MessageDecryptor, MessageEncryptor};

/// Transport-level failure reported through [`ChannelEvent::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("unknown channel error")]
    Unknown,
    #[error("access denied")]
    AccessDenied,
    #[error("network error")]
    NetworkError,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("remote host closed the connection")]
    RemoteHostClosed,
    #[error("socket operation timed out")]
    SocketTimeout,
    #[error("protocol failure")]
    ProtocolFailure,
}

/// Events surfaced by a channel to its current consumer.
#[derive(Debug)]
pub enum ChannelEvent {
    Connected,
    Disconnected(ChannelError),
    /// A complete inbound message, already decrypted by the channel.
    MessageReceived(Vec<u8>),
    /// An outbound message finished writing; `pending` is the number of
    /// messages still queued behind it.
    MessageWritten { pending: usize },
}

/// A framed byte-message transport with pluggable frame encryption.
///
/// `send` queues a message and later surfaces a `MessageWritten` event.
/// While paused, no `MessageReceived` events are produced. Installing an
/// encryptor or decryptor replaces the previous one atomically; the
/// channel owns the installed instance.
#[async_trait]
pub trait Channel: Send {
    fn send(&mut self, message: Vec<u8>);

    fn pause(&mut self);

    fn resume(&mut self);

    fn set_encryptor(&mut self, encryptor: Box<dyn MessageEncryptor>);

    fn set_decryptor(&mut self, decryptor: Box<dyn MessageDecryptor>);

    /// Peer address in display form, for logging.
    fn peer_address(&self) -> String;

    /// Next channel event; `None` once the channel is gone for good.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}
