/// Configuration of a client's session.
///
/// Queue and in-flight capacities are const generics of [`crate::Client`] and not part of this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Keep alive interval in seconds sent in CONNECT. 0 disables the keep alive timeout.
    pub keep_alive: u16,

    /// Seconds of outbound or inbound silence after which a PINGREQ is queued.
    /// Clamped to half of `keep_alive` when that is non-zero.
    pub ping_repeat_time: u16,

    /// Whether the broker should discard any previous session state on connect.
    /// The client's in-flight table is cleared on connect if set.
    pub clean_session: bool,

    /// Maximum number of PUBLISH payload bytes the default payload parser stages.
    pub payload_limit: usize,

    /// Maximum accepted length of a topic name or filter in bytes.
    pub max_topic_length: usize,

    /// Number of payload bytes of a streamed PUBLISH handed to the transport per write.
    pub stream_chunk_len: usize,
}

impl Config {
    /// The keep alive interval used if none is set.
    pub const DEFAULT_KEEP_ALIVE: u16 = 60;
    /// The ping repeat interval used if none is set.
    pub const DEFAULT_PING_REPEAT_TIME: u16 = 20;
    /// The payload staging limit used if none is set.
    pub const DEFAULT_PAYLOAD_LIMIT: usize = 1024;
    /// The streamed payload chunk length used if none is set.
    pub const DEFAULT_STREAM_CHUNK_LEN: usize = 1024;
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keep_alive: Self::DEFAULT_KEEP_ALIVE,
            ping_repeat_time: Self::DEFAULT_PING_REPEAT_TIME,
            clean_session: true,
            payload_limit: Self::DEFAULT_PAYLOAD_LIMIT,
            max_topic_length: crate::types::MAX_STRING_LEN,
            stream_chunk_len: Self::DEFAULT_STREAM_CHUNK_LEN,
        }
    }
}
