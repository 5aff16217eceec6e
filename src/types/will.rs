use alloc::vec::Vec;

use crate::types::{MAX_STRING_LEN, PublishFlags, TopicName};

/// Message the broker publishes on the client's behalf when the connection drops
/// without a DISCONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    /// Topic the will is published on.
    pub topic: TopicName,
    /// Will payload.
    pub message: Vec<u8>,
    /// Retain flag and QoS of the will publication.
    pub flags: PublishFlags,
}

impl Will {
    /// Creates a will, or `None` if the message does not fit a length-prefixed field.
    pub fn new(topic: TopicName, message: &[u8], flags: PublishFlags) -> Option<Self> {
        if message.len() > MAX_STRING_LEN {
            return None;
        }

        Some(Self {
            topic,
            message: message.into(),
            flags,
        })
    }
}
