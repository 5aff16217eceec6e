//! Contains types used throughout the MQTT specification.

mod int;
mod qos;
mod topic;
mod url;
mod will;

pub use int::VarByteInt;
pub use qos::{InvalidQoS, PublishFlags, QoS};
pub use topic::{TopicFilter, TopicName};
pub use url::{BrokerUrl, InvalidUrl, Scheme};
pub use will::Will;

/// Maximum length of a length-prefixed UTF-8 string or binary field.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Variable byte integer: If `VarByteInt::MAX_ENCODABLE` is exceeded, an error of this type is returned.
/// Length-prefixed fields: If [`MAX_STRING_LEN`] is exceeded, an error of this type is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TooLargeToEncode;

impl core::fmt::Display for TooLargeToEncode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("value too large to encode")
    }
}

impl core::error::Error for TooLargeToEncode {}
