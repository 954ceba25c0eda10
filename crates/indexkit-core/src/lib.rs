//! indexkit-core
//!
//! Event-driven indexing pipeline: the document model, the synchronous event
//! bus, the `SearchService` contract every backend implements, and the
//! pipeline that drives a collection through the fixed event sequence.

pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod traits;
pub mod types;

pub use collection::{Collection, DirectoryCollection, MemoryCollection};
pub use error::{EventError, PipelineError, ServiceError};
pub use events::{Event, EventBus, EventBusBuilder, EventKind, EventRecorder, HandlerPolicy, Reply};
pub use pipeline::{ErrorPolicy, IndexingPipeline, PipelineConfig, PipelineState, RunReport};
pub use traits::{EventSubscriber, SearchService};
pub use types::{Field, FieldSpec, FieldType, FieldValue, IndexDocument, Options, SearchResult, SourceItem};
