#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use indexkit_core::{
    Collection, Event, EventBus, EventKind, EventSubscriber, FieldSpec, FieldType, IndexDocument, MemoryCollection,
    Options, Reply, SearchResult, SearchService, ServiceError, SourceItem,
};

/// Shared, ordered log of everything observed during a run.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// In-memory backend that logs every call and can be told to reject documents.
pub struct FakeService {
    log: Log,
    fail_on: HashSet<String>,
    fail_create: bool,
    pub indexed: Mutex<Vec<IndexDocument>>,
}

impl FakeService {
    pub fn new(log: Log) -> Self {
        Self { log, fail_on: HashSet::new(), fail_create: false, indexed: Mutex::new(Vec::new()) }
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.fail_on.insert(id.to_string());
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn indexed_ids(&self) -> Vec<String> {
        self.indexed.lock().unwrap().iter().map(|d| d.id().to_string()).collect()
    }
}

impl SearchService for FakeService {
    fn name(&self) -> &str {
        "fake"
    }

    fn create_index(&self, name: &str, _options: &Options) -> Result<(), ServiceError> {
        self.log.lock().unwrap().push(format!("create_index {name}"));
        if self.fail_create {
            return Err(ServiceError::unavailable("backend down"));
        }
        Ok(())
    }

    fn index_document(&self, collection: &dyn Collection, document: &IndexDocument) -> Result<(), ServiceError> {
        self.log.lock().unwrap().push(format!("index_document {} {}", collection.id(), document.id()));
        if self.fail_on.contains(document.id()) {
            return Err(ServiceError::unavailable(format!("rejected {}", document.id())));
        }
        self.indexed.lock().unwrap().push(document.clone());
        Ok(())
    }

    fn search(&self, _keywords: &str, _options: &Options) -> Result<Vec<SearchResult>, ServiceError> {
        Ok(Vec::new())
    }

    fn delete(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Subscriber writing `kind document field` lines into a shared log.
pub struct LogSubscriber(pub Log);

impl EventSubscriber for LogSubscriber {
    fn name(&self) -> &str {
        "log"
    }

    fn subscribed_events(&self) -> Vec<EventKind> {
        EventKind::ALL.to_vec()
    }

    fn on_event(&self, event: &Event<'_>, _bus: &EventBus) -> anyhow::Result<Reply> {
        let mut line = event.kind().to_string();
        if let Some(d) = event.document() {
            line.push(' ');
            line.push_str(d.id());
        }
        if let Some(f) = event.field() {
            line.push(' ');
            line.push_str(&f.name);
        }
        self.0.lock().unwrap().push(line);
        Ok(Reply::Continue)
    }
}

pub fn products() -> MemoryCollection {
    MemoryCollection::new("products", vec![FieldSpec::new("name", FieldType::Text)])
        .with_item(SourceItem::new("p1").with("name", "Apple"))
        .with_item(SourceItem::new("p2").with("name", "Pear"))
}

/// `n` items with `fields` text fields each.
pub fn wide_collection(n: usize, fields: usize) -> MemoryCollection {
    let specs = (0..fields).map(|f| FieldSpec::new(format!("f{f}"), FieldType::Text)).collect();
    let mut collection = MemoryCollection::new("wide", specs);
    for i in 0..n {
        let mut item = SourceItem::new(format!("doc{i}"));
        for f in 0..fields {
            item = item.with(format!("f{f}"), format!("value {i}/{f}"));
        }
        collection.push(item);
    }
    collection
}
