use crate::{codec::FramingError, eio::ErrorKind, types::InvalidUrl};

/// The main error returned by `Client`.
///
/// Distincts between unrecoverable and recoverable errors.
/// Recoverability in this context refers to whether the current connection is still usable
/// after the error has occured.
///
/// # Recovery
/// - For unrecoverable errors the client has already closed the transport and notified the
///   disconnect handler. Call `Client::connect` to start over.
/// - For recoverable errors no action has been taken by the client. Fix the input or retry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The request queue is full.
    ///
    /// Recoverable error. Try again after `Client::on_ready_to_write` has transmitted queued packets.
    QueueFull,

    /// An internal buffer used for tracking in-flight publications or subscriptions is full.
    ///
    /// Recoverable error. Try again after acknowledgments of earlier requests have been received.
    SessionBuffer,

    /// A topic name or filter is empty, too long or uses wildcards where they are not allowed.
    ///
    /// Recoverable error.
    InvalidTopic,

    /// The broker address cannot be used.
    ///
    /// Recoverable error.
    InvalidUrl(InvalidUrl),

    /// The client identifier does not fit a length-prefixed string.
    ///
    /// Recoverable error.
    InvalidClientIdentifier,

    /// A packet was too long to encode its length with the variable byte integer.
    ///
    /// Recoverable error.
    PacketTooLong,

    /// The transport failed to start a connection or to take bytes.
    ///
    /// Unrecoverable error.
    Transport(ErrorKind),

    /// The broker sent bytes violating the MQTT framing.
    ///
    /// Unrecoverable error.
    Framing(FramingError),

    /// Nothing was received from the broker within the keep alive interval.
    ///
    /// Unrecoverable error.
    KeepAliveTimeout,

    /// The source of a streamed PUBLISH payload failed or ended before the declared length.
    /// The packet cannot be completed on the wire.
    ///
    /// Unrecoverable error.
    PayloadSource(ErrorKind),
}

impl Error {
    /// Returns whether the current connection is still usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull
                | Self::SessionBuffer
                | Self::InvalidTopic
                | Self::InvalidUrl(_)
                | Self::InvalidClientIdentifier
                | Self::PacketTooLong
        )
    }
}

impl From<InvalidUrl> for Error {
    fn from(e: InvalidUrl) -> Self {
        Self::InvalidUrl(e)
    }
}

impl From<FramingError> for Error {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::QueueFull => f.write_str("request queue full"),
            Self::SessionBuffer => f.write_str("in-flight table full"),
            Self::InvalidTopic => f.write_str("invalid topic"),
            Self::InvalidUrl(e) => write!(f, "invalid broker url: {}", e),
            Self::InvalidClientIdentifier => f.write_str("invalid client identifier"),
            Self::PacketTooLong => f.write_str("packet too long"),
            Self::Transport(kind) => write!(f, "transport error: {:?}", kind),
            Self::Framing(e) => write!(f, "framing error: {}", e),
            Self::KeepAliveTimeout => f.write_str("keep alive timeout"),
            Self::PayloadSource(kind) => write!(f, "payload source error: {:?}", kind),
        }
    }
}

impl core::error::Error for Error {}
