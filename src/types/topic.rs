use alloc::string::String;

use crate::types::MAX_STRING_LEN;

/// A topic name that messages can be published on. Cannot contain wildcard characters.
///
/// Examples:
/// - "sport/tennis/player1"
/// - "sport/tennis/player1/ranking"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName(String);

impl TopicName {
    /// Creates a new topic name while checking for correct syntax of the topic name string.
    pub fn new(s: &str) -> Option<Self> {
        // Topic names must be at least one character long and fit a length-prefixed string.
        if s.is_empty() || s.len() > MAX_STRING_LEN {
            return None;
        }

        // Topic names must not include the null character.
        if s.contains('\0') {
            return None;
        }

        // Wildcard characters must not be used within a topic name.
        if s.contains('+') || s.contains('#') {
            None
        } else {
            Some(Self(s.into()))
        }
    }

    /// Returns the topic as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TopicName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A topic filter for subscribing to certain topics. Can contain wildcard characters.
///
/// Examples:
/// - "sport/tennis/#"
/// - "sport/+/player1"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter(String);

impl TopicFilter {
    // Derived from rumqtt, licensed under Apache-2.0
    // https://github.com/bytebeamio/rumqtt/blob/main/rumqttc/src/v5/mqttbytes/mod.rs
    //
    /// Creates a new topic filter while checking for correct syntax of the topic filter string
    pub fn new(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > MAX_STRING_LEN {
            return None;
        }

        if s.contains('\0') {
            return None;
        }

        let mut topic_levels = s.rsplit('/');

        // `rsplit` always yields at least one item.
        let last = topic_levels.next().unwrap_or_default();

        // The multi-level wildcard character must be specified on its own
        // and must be the last level of the filter.
        if last.contains('#') && last != "#" {
            return None;
        }
        // The single-level wildcard must occupy an entire level.
        if last.contains('+') && last != "+" {
            return None;
        }

        for level in topic_levels {
            if level.contains('#') {
                return None;
            }
            if level.contains('+') && level != "+" {
                return None;
            }
        }

        Some(Self(s.into()))
    }

    /// Returns the filter as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TopicFilter {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<TopicName> for TopicFilter {
    fn from(name: TopicName) -> Self {
        Self(name.0)
    }
}

#[cfg(test)]
mod unit {
    use alloc::string::String;

    use crate::types::{MAX_STRING_LEN, TopicFilter, TopicName};

    #[test_log::test]
    fn topic_names() {
        assert!(TopicName::new("a/b").is_some());
        assert!(TopicName::new("/").is_some());
        assert!(TopicName::new("").is_none());
        assert!(TopicName::new("a/+/b").is_none());
        assert!(TopicName::new("a/#").is_none());
        assert!(TopicName::new("a\0b").is_none());
    }

    #[test_log::test]
    fn topic_name_length_limit() {
        let s: String = core::iter::repeat_n('a', MAX_STRING_LEN).collect();
        assert!(TopicName::new(&s).is_some());

        let s: String = core::iter::repeat_n('a', MAX_STRING_LEN + 1).collect();
        assert!(TopicName::new(&s).is_none());
    }

    #[test_log::test]
    fn topic_filters() {
        assert!(TopicFilter::new("sport/tennis/#").is_some());
        assert!(TopicFilter::new("#").is_some());
        assert!(TopicFilter::new("+").is_some());
        assert!(TopicFilter::new("sport/+/player1").is_some());
        assert!(TopicFilter::new("+/+/#").is_some());

        assert!(TopicFilter::new("").is_none());
        assert!(TopicFilter::new("sport/tennis#").is_none());
        assert!(TopicFilter::new("sport/#/player1").is_none());
        assert!(TopicFilter::new("sport+/player1").is_none());
        assert!(TopicFilter::new("sport/pla+yer").is_none());
    }
}
