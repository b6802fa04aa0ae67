//! Handler registry keyed by logical (unprefixed) topic

use std::collections::hash_map::{self, HashMap};
use std::fmt;
use std::sync::Arc;

/// Callback invoked with the topic and payload of every matching message
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Wrap a closure as a shareable [`MessageHandler`]
pub fn message_handler<F>(handler: F) -> MessageHandler
where
    F: Fn(&str, &[u8]) + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Mapping from logical topic to handler
///
/// Keys are unique; inserting an existing topic replaces its handler.
/// Iteration order is unspecified.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, MessageHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaced
    pub fn insert<S, F>(&mut self, topic: S, handler: F) -> Option<MessageHandler>
    where
        S: Into<String>,
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.insert_shared(topic, message_handler(handler))
    }

    /// Register an already shared handler, returning the one it replaced
    pub fn insert_shared<S: Into<String>>(
        &mut self,
        topic: S,
        handler: MessageHandler,
    ) -> Option<MessageHandler> {
        self.handlers.insert(topic.into(), handler)
    }

    /// Builder form of [`HandlerRegistry::insert`]
    pub fn with_handler<S, F>(mut self, topic: S, handler: F) -> Self
    where
        S: Into<String>,
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.insert(topic, handler);
        self
    }

    pub fn remove(&mut self, topic: &str) -> Option<MessageHandler> {
        self.handlers.remove(topic)
    }

    pub fn get(&self, topic: &str) -> Option<&MessageHandler> {
        self.handlers.get(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Logical topics, sorted for stable output
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, MessageHandler> {
        self.handlers.iter()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}

impl<S: Into<String>> FromIterator<(S, MessageHandler)> for HandlerRegistry {
    fn from_iter<I: IntoIterator<Item = (S, MessageHandler)>>(iter: I) -> Self {
        let mut registry = Self::new();
        for (topic, handler) in iter {
            registry.insert_shared(topic, handler);
        }
        registry
    }
}

impl<'a> IntoIterator for &'a HandlerRegistry {
    type Item = (&'a String, &'a MessageHandler);
    type IntoIter = hash_map::Iter<'a, String, MessageHandler>;

    fn into_iter(self) -> Self::IntoIter {
        self.handlers.iter()
    }
}
