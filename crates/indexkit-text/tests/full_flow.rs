use std::sync::Arc;

use indexkit_core::{
    ErrorPolicy, EventRecorder, Field, FieldSpec, FieldType, IndexDocument, IndexingPipeline, MemoryCollection,
    Options, PipelineConfig, SearchService, ServiceError, SourceItem,
};
use indexkit_debug::DebugSearchService;
use indexkit_text::TantivySearchService;

fn orchard() -> MemoryCollection {
    MemoryCollection::new(
        "orchard",
        vec![FieldSpec::new("name", FieldType::Text), FieldSpec::new("stock", FieldType::Numeric)],
    )
    .with_item(SourceItem::new("apple").with("name", "Crisp apple from the orchard").with("stock", 12))
    .with_item(SourceItem::new("pear").with("name", "Juicy pear").with("stock", 3))
    .with_item(SourceItem::new("cider").with("name", "Apple cider, apple pressed").with("stock", 7))
}

fn limit(n: u64) -> Options {
    let mut options = Options::new();
    options.insert("limit".to_string(), serde_json::json!(n));
    options
}

fn run_with(service: Arc<dyn SearchService>, collection: &MemoryCollection) -> Vec<&'static str> {
    let recorder = Arc::new(EventRecorder::new());
    let config = PipelineConfig::new("orchard", ErrorPolicy::Abort);
    let bus = config.bus_builder().add_subscriber(recorder.clone()).build();
    IndexingPipeline::new(Arc::new(bus), service, config).run(collection).expect("run");
    recorder.trace()
}

#[test]
fn fresh_index_returns_no_results() {
    let service = TantivySearchService::in_ram();
    service.create_index("orchard", &Options::new()).expect("create");
    service.create_index("orchard", &Options::new()).expect("create is idempotent");
    assert!(service.search("apple", &Options::new()).expect("search").is_empty());
}

#[test]
fn pipeline_indexes_and_search_ranks_matches() {
    let service = Arc::new(TantivySearchService::in_ram());
    run_with(service.clone(), &orchard());

    let hits = service.search("apple", &limit(10)).expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"apple") && ids.contains(&"cider"));
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].collection.as_deref(), Some("orchard"));

    assert_eq!(service.search("apple", &limit(1)).expect("search").len(), 1);
    assert!(service.search("   ", &Options::new()).expect("blank").is_empty());
}

#[test]
fn tantivy_and_debug_backends_produce_the_same_trace() {
    let collection = orchard();
    let tantivy_trace = run_with(Arc::new(TantivySearchService::in_ram()), &collection);
    let debug_trace = run_with(Arc::new(DebugSearchService::new()), &collection);
    assert_eq!(tantivy_trace, debug_trace);
    assert_eq!(tantivy_trace.len(), 2 * 3 + 2 + 2 * 2 * 3);
}

#[test]
fn delete_is_idempotent_and_empties_search() {
    let service = Arc::new(TantivySearchService::in_ram());
    run_with(service.clone(), &orchard());

    service.delete().expect("delete");
    service.delete().expect("second delete is a no-op");
    assert!(service.index_name().is_none());
    assert!(service.search("apple", &Options::new()).expect("search").is_empty());
}

#[test]
fn indexing_without_an_index_is_reported() {
    let service = TantivySearchService::in_ram();
    let document = IndexDocument::new("x").with_field(Field::text("name", "x")).expect("doc");
    let err = service.index_document(&orchard(), &document).expect_err("no index");
    assert!(matches!(err, ServiceError::IndexNotFound(_)));
}

#[test]
fn reindexing_a_document_replaces_it() {
    let service = TantivySearchService::in_ram();
    service.create_index("orchard", &Options::new()).expect("create");
    let collection = orchard();
    for text in ["green apple", "red apple"] {
        let document = IndexDocument::new("apple").with_field(Field::text("name", text)).expect("doc");
        service.index_document(&collection, &document).expect("index");
    }
    assert_eq!(service.search("apple", &Options::new()).expect("search").len(), 1);
    assert!(service.search("green", &Options::new()).expect("search").is_empty());
}

#[test]
fn boost_lifts_equal_matches() {
    let service = TantivySearchService::in_ram();
    service.create_index("orchard", &Options::new()).expect("create");
    let collection = orchard();
    let plain = IndexDocument::new("plain").with_field(Field::text("name", "apple")).expect("doc");
    let boosted = IndexDocument::new("boosted").with_boost(2.0).with_field(Field::text("name", "apple")).expect("doc");
    service.index_document(&collection, &plain).expect("index");
    service.index_document(&collection, &boosted).expect("index");

    let hits = service.search("apple", &Options::new()).expect("search");
    assert_eq!(hits[0].id, "boosted");
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn unknown_query_field_is_an_invalid_query() {
    let service = Arc::new(TantivySearchService::in_ram());
    run_with(service.clone(), &orchard());
    let err = service.search("nosuchfield:apple", &Options::new()).expect_err("bad query");
    assert!(matches!(err, ServiceError::InvalidQuery(_)));
}

#[test]
fn directory_index_survives_reopen_and_is_removed_on_delete() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let service = Arc::new(TantivySearchService::in_dir(tmp.path()));
        run_with(service.clone(), &orchard());
    }

    let service = TantivySearchService::in_dir(tmp.path());
    service.create_index("orchard", &Options::new()).expect("reopen");
    assert_eq!(service.search("pear", &Options::new()).expect("search").len(), 1);

    service.delete().expect("delete");
    assert!(!tmp.path().join("orchard").exists());
}

#[test]
fn zero_and_huge_limits_are_handled() {
    let service = Arc::new(TantivySearchService::in_ram());
    run_with(service.clone(), &orchard());

    assert!(service.search("apple", &limit(0)).expect("limit 0").is_empty());
    let hits = service.search("apple", &limit(u64::MAX)).expect("huge limit");
    assert_eq!(hits.len(), 2);
}

#[test]
fn boosted_documents_survive_a_small_limit() {
    let service = TantivySearchService::in_ram();
    service.create_index("orchard", &Options::new()).expect("create");
    let collection = orchard();
    let strong = IndexDocument::new("strong").with_field(Field::text("name", "apple apple apple")).expect("doc");
    let boosted = IndexDocument::new("boosted")
        .with_boost(10.0)
        .with_field(Field::text("name", "apple with a much longer description of an orchard tree"))
        .expect("doc");
    service.index_document(&collection, &strong).expect("index");
    service.index_document(&collection, &boosted).expect("index");

    let full = service.search("apple", &limit(10)).expect("search");
    assert_eq!(full[0].id, "boosted");
    let top = service.search("apple", &limit(1)).expect("search");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, "boosted");
    assert!((top[0].score - full[0].score).abs() < 1e-4);
}

#[test]
fn rejected_document_leaves_earlier_documents_searchable() {
    let service = TantivySearchService::in_ram();
    service.create_index("orchard", &Options::new()).expect("create");
    let collection = orchard();
    let good = IndexDocument::new("apple").with_field(Field::text("name", "apple")).expect("doc");
    service.index_document(&collection, &good).expect("index");

    let bad = IndexDocument::new("pear").with_boost(f32::NAN).with_field(Field::text("name", "pear apple")).expect("doc");
    let err = service.index_document(&collection, &bad).expect_err("nan boost");
    assert!(matches!(err, ServiceError::InvalidDocument { .. }));
    assert!(!err.is_retryable());

    let hits = service.search("apple", &Options::new()).expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["apple"]);

    let next = IndexDocument::new("cider").with_field(Field::text("name", "apple cider")).expect("doc");
    service.index_document(&collection, &next).expect("writer still usable");
    assert_eq!(service.search("apple", &Options::new()).expect("search").len(), 2);
}
