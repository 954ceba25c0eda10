//! indexkit-debug
//!
//! A search service that indexes nothing and logs every pipeline event and
//! service call instead. Useful for tracing a run and as the reference event
//! trace other backends are compared against.
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use indexkit_core::{
    Collection, Event, EventBus, EventKind, EventSubscriber, IndexDocument, Options, Reply, SearchResult,
    SearchService, ServiceError,
};

/// Lines kept in memory by [`DebugSearchService::new`].
pub const DEFAULT_LINE_CAPACITY: usize = 1024;

pub struct DebugSearchService {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for DebugSearchService {
    fn default() -> Self {
        Self::with_line_capacity(DEFAULT_LINE_CAPACITY)
    }
}

impl DebugSearchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` of the most recent lines; `0` keeps none.
    pub fn with_line_capacity(capacity: usize) -> Self {
        Self { lines: Mutex::new(VecDeque::new()), capacity }
    }

    /// The most recent logged lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    fn log(&self, message: String, collection: Option<&str>, document: Option<&str>) {
        debug!(collection = collection.unwrap_or("-"), document = document.unwrap_or("-"), "{message}");
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(message);
    }
}

impl SearchService for DebugSearchService {
    fn name(&self) -> &str {
        "debug"
    }

    fn create_index(&self, name: &str, _options: &Options) -> Result<(), ServiceError> {
        self.log(format!("Create index operation executed: {name}"), None, None);
        Ok(())
    }

    fn index_document(&self, collection: &dyn Collection, document: &IndexDocument) -> Result<(), ServiceError> {
        self.log(
            format!("The index_document() hook invoked for collection: {}", collection.id()),
            Some(collection.id()),
            Some(document.id()),
        );
        Ok(())
    }

    fn search(&self, keywords: &str, _options: &Options) -> Result<Vec<SearchResult>, ServiceError> {
        self.log(format!("Search operation executed using keywords: {keywords}"), None, None);
        Ok(Vec::new())
    }

    fn delete(&self) -> Result<(), ServiceError> {
        self.log("Delete index operation executed.".to_string(), None, None);
        Ok(())
    }
}

impl EventSubscriber for DebugSearchService {
    fn name(&self) -> &str {
        "debug"
    }

    fn subscribed_events(&self) -> Vec<EventKind> {
        EventKind::ALL.to_vec()
    }

    // Field events are passed through untouched.
    fn on_event(&self, event: &Event<'_>, _bus: &EventBus) -> anyhow::Result<Reply> {
        let collection = event.collection().id();
        let document = event.document().map(IndexDocument::id);
        let message = match (event, document) {
            (Event::CollectionPreIndex { .. } | Event::CollectionPostIndex { .. }, _) => {
                format!("Event {} thrown for collection: {collection}", event.kind())
            }
            (Event::FieldEnrich { field, .. } | Event::FieldNormalize { field, .. }, Some(doc)) => {
                format!("Event thrown: {} (document: {doc}, field: {})", event.kind(), field.name)
            }
            (_, Some(doc)) => format!("Event thrown: {} (document: {doc})", event.kind()),
            (_, None) => format!("Event thrown: {}", event.kind()),
        };
        self.log(message, Some(collection), document);
        Ok(Reply::Continue)
    }
}
