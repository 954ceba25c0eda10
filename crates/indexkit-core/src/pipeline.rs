//! Drives a collection through the indexing event sequence.
//!
//! One run is:
//!
//! 1. `create_index` on the service
//! 2. `collection.pre_index`
//! 3. per item: build the document, `document.pre_index`, then
//!    `field.enrich` / `field.normalize` for each field in order,
//!    `index_document`, `document.post_index`
//! 4. `collection.post_index`
//!
//! What happens when a document cannot be built or indexed is decided by
//! [`ErrorPolicy`], which has no default and must be configured.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, trace, warn};

use crate::collection::Collection;
use crate::error::{EventError, Phase, PipelineError, ServiceError};
use crate::events::{Event, EventBus, EventBusBuilder, HandlerPolicy};
use crate::traits::SearchService;
use crate::types::{Field, IndexDocument, Options, SearchResult};

/// Reaction to a document that fails to build or to index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the run; no further events are published.
    Abort,
    /// Record the failure, publish `document.post_index` and continue.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub index_name: String,
    pub on_index_error: ErrorPolicy,
    #[serde(default)]
    pub handler_policy: HandlerPolicy,
    /// Maximum number of items taken from a collection per run.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub index_options: Options,
}

impl PipelineConfig {
    pub fn new(index_name: impl Into<String>, on_index_error: ErrorPolicy) -> Self {
        Self {
            index_name: index_name.into(),
            on_index_error,
            handler_policy: HandlerPolicy::default(),
            limit: None,
            index_options: Options::new(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_handler_policy(mut self, policy: HandlerPolicy) -> Self {
        self.handler_policy = policy;
        self
    }

    /// An event bus builder carrying this config's handler policy.
    pub fn bus_builder(&self) -> EventBusBuilder {
        EventBus::builder().policy(self.handler_policy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    CollectionOpen,
    DocumentOpen,
    FieldOpen,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, CollectionOpen)
                | (CollectionOpen, DocumentOpen)
                | (DocumentOpen, FieldOpen)
                | (FieldOpen, DocumentOpen)
                | (DocumentOpen, CollectionOpen)
                | (CollectionOpen, Idle)
        )
    }
}

struct RunState(PipelineState);

impl RunState {
    fn enter(&mut self, next: PipelineState) {
        debug_assert!(self.0.can_transition_to(next), "invalid transition {:?} -> {:?}", self.0, next);
        trace!(from = ?self.0, to = ?next, "state");
        self.0 = next;
    }
}

#[derive(Debug)]
pub struct SkippedDocument {
    pub document_id: String,
    pub phase: Phase,
    pub error: ServiceError,
}

/// Summary of one completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub collection: String,
    pub indexed: usize,
    pub skipped: Vec<SkippedDocument>,
    /// Handler failures recorded under `HandlerPolicy::Isolate`.
    pub handler_failures: Vec<EventError>,
    pub events_published: usize,
}

pub struct IndexingPipeline {
    bus: Arc<EventBus>,
    service: Arc<dyn SearchService>,
    config: PipelineConfig,
}

impl IndexingPipeline {
    pub fn new(bus: Arc<EventBus>, service: Arc<dyn SearchService>, config: PipelineConfig) -> Self {
        Self { bus, service, config }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn service(&self) -> &dyn SearchService {
        self.service.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Indexes every item of `collection` into the active service.
    pub fn run(&self, collection: &dyn Collection) -> Result<RunReport, PipelineError> {
        let span = info_span!("index_run", collection = collection.id(), service = self.service.name());
        let _enter = span.enter();

        let mut state = RunState(PipelineState::Idle);
        let mut report = RunReport { collection: collection.id().to_string(), ..RunReport::default() };

        self.service
            .create_index(&self.config.index_name, &self.config.index_options)
            .map_err(|source| service_error(Phase::CreateIndex, collection, None, source))?;

        state.enter(PipelineState::CollectionOpen);
        self.emit(&mut report, Event::CollectionPreIndex { collection })?;

        let items = collection
            .items()
            .map_err(|source| PipelineError::Collection { collection: collection.id().to_string(), source })?;

        for item in items.take(self.config.limit.unwrap_or(usize::MAX)) {
            let mut document = match collection.build_document(&item) {
                Ok(document) => document,
                Err(source) => {
                    self.handle_failure(&mut report, service_error(Phase::BuildDocument, collection, Some(item.id.as_str()), source))?;
                    continue;
                }
            };

            state.enter(PipelineState::DocumentOpen);
            self.emit(&mut report, Event::DocumentPreIndex { collection, document: &document })?;

            let outcome = self
                .rewrite_fields(&mut report, &mut state, collection, &mut document)
                .and_then(|()| {
                    self.service
                        .index_document(collection, &document)
                        .map_err(|source| service_error(Phase::IndexDocument, collection, Some(document.id()), source))
                });
            match outcome {
                Ok(()) => report.indexed += 1,
                Err(err) => {
                    self.handle_failure(&mut report, err)?;
                    if state.0 == PipelineState::FieldOpen {
                        state.enter(PipelineState::DocumentOpen);
                    }
                }
            }

            self.emit(&mut report, Event::DocumentPostIndex { collection, document: &document })?;
            state.enter(PipelineState::CollectionOpen);
        }

        self.emit(&mut report, Event::CollectionPostIndex { collection })?;
        state.enter(PipelineState::Idle);

        info!(
            indexed = report.indexed,
            skipped = report.skipped.len(),
            handler_failures = report.handler_failures.len(),
            events = report.events_published,
            "collection indexed"
        );
        Ok(report)
    }

    /// Runs each collection in turn, stopping at the first failed run.
    pub fn run_all(&self, collections: &[&dyn Collection]) -> Result<Vec<RunReport>, PipelineError> {
        collections.iter().map(|c| self.run(*c)).collect()
    }

    pub fn search(&self, keywords: &str, options: &Options) -> Result<Vec<SearchResult>, ServiceError> {
        self.service.search(keywords, options)
    }

    pub fn delete(&self) -> Result<(), ServiceError> {
        self.service.delete()
    }

    // Enrich then normalize each field; each value is written back to the
    // document before the next event so handlers see the current state.
    fn rewrite_fields(
        &self,
        report: &mut RunReport,
        state: &mut RunState,
        collection: &dyn Collection,
        document: &mut IndexDocument,
    ) -> Result<(), PipelineError> {
        for i in 0..document.len() {
            state.enter(PipelineState::FieldOpen);
            let name = document.fields()[i].name.clone();

            let field = document.fields()[i].clone();
            let enriched = self.emit(report, Event::FieldEnrich { collection, document: &*document, field })?;
            self.apply(collection, document, &name, enriched)?;

            let field = document.fields()[i].clone();
            let normalized = self.emit(report, Event::FieldNormalize { collection, document: &*document, field })?;
            self.apply(collection, document, &name, normalized)?;

            state.enter(PipelineState::DocumentOpen);
        }
        Ok(())
    }

    fn apply(
        &self,
        collection: &dyn Collection,
        document: &mut IndexDocument,
        name: &str,
        field: Option<Field>,
    ) -> Result<(), PipelineError> {
        let Some(field) = field else { return Ok(()) };
        document
            .set_value(name, field.value)
            .map_err(|source| service_error(Phase::BuildDocument, collection, Some(document.id()), source))
    }

    fn emit(&self, report: &mut RunReport, event: Event<'_>) -> Result<Option<Field>, PipelineError> {
        let dispatch = self.bus.publish(event)?;
        report.events_published += 1;
        report.handler_failures.extend(dispatch.failures);
        Ok(dispatch.field)
    }

    fn handle_failure(&self, report: &mut RunReport, err: PipelineError) -> Result<(), PipelineError> {
        match (self.config.on_index_error, err) {
            (ErrorPolicy::Skip, PipelineError::Service { phase, document_id: Some(document_id), source, .. }) => {
                warn!(document = %document_id, %phase, error = %source, "document skipped");
                report.skipped.push(SkippedDocument { document_id, phase, error: source });
                Ok(())
            }
            (_, err) => Err(err),
        }
    }
}

fn service_error(phase: Phase, collection: &dyn Collection, document_id: Option<&str>, source: ServiceError) -> PipelineError {
    PipelineError::Service {
        phase,
        collection: collection.id().to_string(),
        document_id: document_id.map(str::to_string),
        source,
    }
}
