//! Topic namespacing and topic filter matching
//!
//! A session subscribes under its prefix but publishes verbatim. Incoming
//! messages are routed by MQTT filter matching with `+` and `#` wildcards.

use rumqttc::QoS;

/// Every subscribe and publish issued by a session uses exactly-once delivery
pub const SESSION_QOS: QoS = QoS::ExactlyOnce;

/// Separator between MQTT topic levels
pub const LEVEL_SEPARATOR: char = '/';

/// Prefix applied to the logical topics a session subscribes to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicNamespace {
    prefix: String,
}

impl TopicNamespace {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Topic subscribed for a logical topic: `prefix/logical`, or `logical`
    /// unchanged when the prefix is empty
    pub fn subscription_topic(&self, logical: &str) -> String {
        if self.prefix.is_empty() {
            logical.to_string()
        } else {
            format!("{}{LEVEL_SEPARATOR}{logical}", self.prefix)
        }
    }

    /// Topic published for a caller-supplied topic. Publishes are never
    /// prefixed; callers pass fully qualified topics.
    pub fn publish_topic<'a>(&self, raw: &'a str) -> &'a str {
        raw
    }
}

/// Check whether a published topic name matches a subscription filter
///
/// - `+` matches exactly one level
/// - `#` matches the remaining levels, including none, when it is the last
///   level of the filter; elsewhere it is compared literally
pub fn topic_matches(topic: &str, filter: &str) -> bool {
    let mut topic_levels = topic.split(LEVEL_SEPARATOR);
    let mut filter_levels = filter.split(LEVEL_SEPARATOR).peekable();

    while let Some(filter_level) = filter_levels.next() {
        if filter_level == "#" && filter_levels.peek().is_none() {
            return true;
        }

        let Some(topic_level) = topic_levels.next() else {
            return false;
        };

        if filter_level != "+" && filter_level != topic_level {
            return false;
        }
    }

    topic_levels.next().is_none()
}
