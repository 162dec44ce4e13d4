//! Item sink trait and implementations.

use tracing::{debug, info, Level};

use crate::errors::CrawlflowError;
use crate::spider::Item;

/// Receives the items extracted during a crawl.
///
/// `process` runs on the crawl's own task between exchanges, so it should
/// hand heavy work off rather than block.
pub trait ItemSink: Send + Sync {
    /// Accepts one extracted item.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the item could not be stored.
    /// The crawler logs and counts it and keeps going.
    fn process(&self, item: Item) -> Result<(), CrawlflowError>;

    /// Called once after the last round.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered items could not be written out.
    fn flush(&self) -> Result<(), CrawlflowError> {
        Ok(())
    }
}

/// A sink that discards every item.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpItemSink;

impl ItemSink for NoOpItemSink {
    fn process(&self, _item: Item) -> Result<(), CrawlflowError> {
        Ok(())
    }
}

/// A sink that logs items using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingItemSink {
    level: Level,
}

impl Default for LoggingItemSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingItemSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl ItemSink for LoggingItemSink {
    fn process(&self, item: Item) -> Result<(), CrawlflowError> {
        let fields = serde_json::to_string(&item)?;
        if self.level == Level::DEBUG {
            debug!(item = %fields, "Item extracted");
        } else {
            info!(item = %fields, "Item extracted");
        }
        Ok(())
    }
}

/// A sink that keeps every item in memory.
#[derive(Debug, Default)]
pub struct CollectingItemSink {
    items: parking_lot::RwLock<Vec<Item>>,
}

impl CollectingItemSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every collected item.
    #[must_use]
    pub fn items(&self) -> Vec<Item> {
        self.items.read().clone()
    }

    /// Removes and returns every collected item.
    pub fn take(&self) -> Vec<Item> {
        std::mem::take(&mut *self.items.write())
    }

    /// Returns the number of collected items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns the collected items that carry a field.
    #[must_use]
    pub fn items_with(&self, field: &str) -> Vec<Item> {
        self.items
            .read()
            .iter()
            .filter(|item| item.has(field))
            .cloned()
            .collect()
    }
}

impl ItemSink for CollectingItemSink {
    fn process(&self, item: Item) -> Result<(), CrawlflowError> {
        self.items.write().push(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_and_logging_sinks_accept_items() {
        let item = Item::new().with("title", "x");
        assert!(NoOpItemSink.process(item.clone()).is_ok());
        assert!(LoggingItemSink::default().process(item.clone()).is_ok());
        assert!(LoggingItemSink::debug().process(item).is_ok());
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingItemSink::new();
        assert!(sink.is_empty());

        sink.process(Item::new().with("title", "x")).unwrap();
        sink.process(Item::new().with("price", 3)).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.items_with("title").len(), 1);
        assert_eq!(sink.items()[1].get("price"), Some(&json!(3)));

        let taken = sink.take();
        assert_eq!(taken.len(), 2);
        assert!(sink.is_empty());
    }
}
