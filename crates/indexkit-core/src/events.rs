//! Synchronous publish/subscribe dispatch of pipeline lifecycle events.
//!
//! Subscriptions are collected by [`EventBusBuilder`] at startup and frozen by
//! [`EventBusBuilder::build`]; a built [`EventBus`] can only publish. Handlers run
//! in registration order on the publisher's thread. Field events carry a
//! snapshot of the field: a handler answers [`Reply::Replace`] to rewrite the
//! value, and the next handler sees the rewritten snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{trace, warn};

use crate::collection::Collection;
use crate::error::EventError;
use crate::traits::EventSubscriber;
use crate::types::{Field, FieldValue, IndexDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "collection.pre_index")]
    CollectionPreIndex,
    #[serde(rename = "collection.post_index")]
    CollectionPostIndex,
    #[serde(rename = "document.pre_index")]
    DocumentPreIndex,
    #[serde(rename = "document.post_index")]
    DocumentPostIndex,
    #[serde(rename = "field.enrich")]
    FieldEnrich,
    #[serde(rename = "field.normalize")]
    FieldNormalize,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::CollectionPreIndex,
        EventKind::CollectionPostIndex,
        EventKind::DocumentPreIndex,
        EventKind::DocumentPostIndex,
        EventKind::FieldEnrich,
        EventKind::FieldNormalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::CollectionPreIndex => "collection.pre_index",
            EventKind::CollectionPostIndex => "collection.post_index",
            EventKind::DocumentPreIndex => "document.pre_index",
            EventKind::DocumentPostIndex => "document.post_index",
            EventKind::FieldEnrich => "field.enrich",
            EventKind::FieldNormalize => "field.normalize",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event kind '{s}'"))
    }
}

/// An event together with the entities relevant to its phase.
pub enum Event<'a> {
    CollectionPreIndex { collection: &'a dyn Collection },
    CollectionPostIndex { collection: &'a dyn Collection },
    DocumentPreIndex { collection: &'a dyn Collection, document: &'a IndexDocument },
    DocumentPostIndex { collection: &'a dyn Collection, document: &'a IndexDocument },
    FieldEnrich { collection: &'a dyn Collection, document: &'a IndexDocument, field: Field },
    FieldNormalize { collection: &'a dyn Collection, document: &'a IndexDocument, field: Field },
}

impl<'a> Event<'a> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::CollectionPreIndex { .. } => EventKind::CollectionPreIndex,
            Event::CollectionPostIndex { .. } => EventKind::CollectionPostIndex,
            Event::DocumentPreIndex { .. } => EventKind::DocumentPreIndex,
            Event::DocumentPostIndex { .. } => EventKind::DocumentPostIndex,
            Event::FieldEnrich { .. } => EventKind::FieldEnrich,
            Event::FieldNormalize { .. } => EventKind::FieldNormalize,
        }
    }

    pub fn collection(&self) -> &'a dyn Collection {
        match self {
            Event::CollectionPreIndex { collection }
            | Event::CollectionPostIndex { collection }
            | Event::DocumentPreIndex { collection, .. }
            | Event::DocumentPostIndex { collection, .. }
            | Event::FieldEnrich { collection, .. }
            | Event::FieldNormalize { collection, .. } => *collection,
        }
    }

    pub fn document(&self) -> Option<&'a IndexDocument> {
        match self {
            Event::CollectionPreIndex { .. } | Event::CollectionPostIndex { .. } => None,
            Event::DocumentPreIndex { document, .. }
            | Event::DocumentPostIndex { document, .. }
            | Event::FieldEnrich { document, .. }
            | Event::FieldNormalize { document, .. } => Some(*document),
        }
    }

    pub fn field(&self) -> Option<&Field> {
        match self {
            Event::FieldEnrich { field, .. } | Event::FieldNormalize { field, .. } => Some(field),
            _ => None,
        }
    }

    fn field_mut(&mut self) -> Option<&mut Field> {
        match self {
            Event::FieldEnrich { field, .. } | Event::FieldNormalize { field, .. } => Some(field),
            _ => None,
        }
    }

    fn into_field(self) -> Option<Field> {
        match self {
            Event::FieldEnrich { field, .. } | Event::FieldNormalize { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind())
            .field("collection", &self.collection().id())
            .field("document", &self.document().map(IndexDocument::id))
            .field("field", &self.field())
            .finish()
    }
}

/// What a handler wants done with the event it received.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Continue,
    /// Replace the value of the field carried by a field event.
    Replace(FieldValue),
}

pub type Handler = Box<dyn Fn(&Event<'_>, &EventBus) -> anyhow::Result<Reply> + Send + Sync>;

/// How handler failures are treated during `publish`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerPolicy {
    /// Return the first failure; remaining handlers are not invoked.
    #[default]
    FailFast,
    /// Log and record the failure, then keep dispatching.
    Isolate,
}

/// Outcome of one `publish` call.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// The field as left by the last handler (field events only).
    pub field: Option<Field>,
    /// Failures recorded under [`HandlerPolicy::Isolate`].
    pub failures: Vec<EventError>,
}

struct Registration {
    name: String,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBusBuilder {
    handlers: HashMap<EventKind, Vec<Registration>>,
    policy: HandlerPolicy,
}

impl EventBusBuilder {
    pub fn policy(mut self, policy: HandlerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn subscribe<F>(mut self, kind: EventKind, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Event<'_>, &EventBus) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Registration { name: name.into(), handler: Box::new(handler) });
        self
    }

    /// Registers one handler per kind the subscriber declares.
    pub fn add_subscriber<S>(mut self, subscriber: Arc<S>) -> Self
    where
        S: EventSubscriber + ?Sized + 'static,
    {
        for kind in subscriber.subscribed_events() {
            let s = Arc::clone(&subscriber);
            let name = s.name().to_string();
            self = self.subscribe(kind, name, move |event, bus| s.on_event(event, bus));
        }
        self
    }

    pub fn build(self) -> EventBus {
        EventBus { handlers: self.handlers, policy: self.policy }
    }
}

pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Registration>>,
    policy: HandlerPolicy,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    pub fn policy(&self) -> HandlerPolicy {
        self.policy
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every handler registered for the event's kind, in order.
    ///
    /// Handlers may publish further events through the `&EventBus` they
    /// receive; those resolve depth-first before this call moves on.
    pub fn publish(&self, mut event: Event<'_>) -> Result<Dispatch, EventError> {
        let kind = event.kind();
        let mut dispatch = Dispatch::default();
        trace!(event = %kind, handlers = self.handler_count(kind), "publish");

        for reg in self.handlers.get(&kind).into_iter().flatten() {
            let outcome = (reg.handler)(&event, self).and_then(|reply| apply_reply(&mut event, reply));
            if let Err(source) = outcome {
                let err = EventError {
                    event: kind,
                    handler: reg.name.clone(),
                    document_id: event.document().map(|d| d.id().to_string()),
                    source,
                };
                match self.policy {
                    HandlerPolicy::FailFast => return Err(err),
                    HandlerPolicy::Isolate => {
                        warn!(error = %err, "handler failure isolated");
                        dispatch.failures.push(err);
                    }
                }
            }
        }

        dispatch.field = event.into_field();
        Ok(dispatch)
    }
}

fn apply_reply(event: &mut Event<'_>, reply: Reply) -> anyhow::Result<()> {
    let Reply::Replace(value) = reply else { return Ok(()) };
    let kind = event.kind();
    let field = event
        .field_mut()
        .ok_or_else(|| anyhow::anyhow!("{kind} carries no field to replace"))?;
    if !value.conforms_to(field.field_type) {
        anyhow::bail!("replacement for field '{}' is not a {} value", field.name, field.field_type);
    }
    field.value = value;
    Ok(())
}

/// One entry of a recorded event trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub collection: String,
    pub document: Option<String>,
    pub field: Option<String>,
}

/// Subscriber that records every event it sees, in order.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn trace(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind.as_str()).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl EventSubscriber for EventRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn subscribed_events(&self) -> Vec<EventKind> {
        EventKind::ALL.to_vec()
    }

    fn on_event(&self, event: &Event<'_>, _bus: &EventBus) -> anyhow::Result<Reply> {
        let entry = RecordedEvent {
            kind: event.kind(),
            collection: event.collection().id().to_string(),
            document: event.document().map(|d| d.id().to_string()),
            field: event.field().map(|f| f.name.clone()),
        };
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
        Ok(Reply::Continue)
    }
}
