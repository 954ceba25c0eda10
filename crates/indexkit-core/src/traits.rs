use crate::collection::Collection;
use crate::error::ServiceError;
use crate::events::{Event, EventBus, EventKind, Reply};
use crate::types::{IndexDocument, Options, SearchResult};

/// Contract every indexing backend implements.
///
/// `create_index` and `delete` are idempotent. A failed `index_document`
/// names the offending document and leaves earlier documents indexed.
/// `search` never changes index state and reports an absent index as an
/// empty result.
pub trait SearchService: Send + Sync {
    fn name(&self) -> &str;
    fn create_index(&self, name: &str, options: &Options) -> Result<(), ServiceError>;
    fn index_document(&self, collection: &dyn Collection, document: &IndexDocument) -> Result<(), ServiceError>;
    fn search(&self, keywords: &str, options: &Options) -> Result<Vec<SearchResult>, ServiceError>;
    fn delete(&self) -> Result<(), ServiceError>;
}

/// A component that declares up front which events it listens to.
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str;
    fn subscribed_events(&self) -> Vec<EventKind>;
    fn on_event(&self, event: &Event<'_>, bus: &EventBus) -> anyhow::Result<Reply>;
}
