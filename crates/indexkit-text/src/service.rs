//! Tantivy-backed `SearchService`.
//!
//! All field values of a document are rendered to text and indexed into one
//! `body` field; `id`, `collection` and the document boost are stored. Scores
//! returned by `search` are the BM25 score multiplied by the stored boost.
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{doc, DocId, Index, IndexWriter, ReloadPolicy, Score, SegmentReader, TantivyDocument, TantivyError, Term};
use tracing::{debug, info, warn};

use indexkit_core::{Collection, IndexDocument, Options, SearchResult, SearchService, ServiceError};

use crate::tantivy_utils::{build_schema, register_tokenizer, IndexFields, BOOST_FIELD};

const DEFAULT_LIMIT: usize = 10;
const WRITER_HEAP_BYTES: usize = 50_000_000;

enum Storage {
	Ram,
	Dir(PathBuf),
}

struct OpenIndex {
	name: String,
	index: Index,
	writer: Mutex<IndexWriter>,
	fields: IndexFields,
	path: Option<PathBuf>,
}

pub struct TantivySearchService {
	storage: Storage,
	current: RwLock<Option<OpenIndex>>,
}

impl TantivySearchService {
	/// Indexes live in memory and vanish on `delete` or drop.
	pub fn in_ram() -> Self {
		Self { storage: Storage::Ram, current: RwLock::new(None) }
	}

	/// Each index is stored under `root/<index name>`.
	pub fn in_dir(root: impl Into<PathBuf>) -> Self {
		Self { storage: Storage::Dir(root.into()), current: RwLock::new(None) }
	}

	/// Name of the index currently open, if any.
	pub fn index_name(&self) -> Option<String> {
		self.current.read().unwrap_or_else(PoisonError::into_inner).as_ref().map(|open| open.name.clone())
	}

	fn open(&self, name: &str) -> Result<OpenIndex, ServiceError> {
		let schema = build_schema();
		let (index, path) = match &self.storage {
			Storage::Ram => (Index::create_in_ram(schema.clone()), None),
			Storage::Dir(root) => {
				let path = root.join(name);
				fs::create_dir_all(&path).map_err(|e| ServiceError::unavailable(format!("{}: {e}", path.display())))?;
				let dir = MmapDirectory::open(&path).map_err(|e| ServiceError::unavailable(format!("{}: {e}", path.display())))?;
				(Index::open_or_create(dir, schema.clone()).map_err(backend)?, Some(path))
			}
		};
		register_tokenizer(&index);
		let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(backend)?;
		let fields = IndexFields::from_schema(&schema).map_err(backend)?;
		Ok(OpenIndex { name: name.to_string(), index, writer: Mutex::new(writer), fields, path })
	}
}

fn backend(e: TantivyError) -> ServiceError {
	ServiceError::backend(e.to_string())
}

// I/O and lock failures can clear up on retry; anything else is a backend fault.
fn write_error(e: TantivyError) -> ServiceError {
	match e {
		TantivyError::IoError(_) | TantivyError::LockFailure(..) => ServiceError::unavailable(e.to_string()),
		other => backend(other),
	}
}

fn requested_limit(options: &Options) -> usize {
	options
		.get("limit")
		.and_then(serde_json::Value::as_u64)
		.map_or(DEFAULT_LIMIT, |n| usize::try_from(n).unwrap_or(usize::MAX))
}

impl SearchService for TantivySearchService {
	fn name(&self) -> &str {
		"tantivy"
	}

	fn create_index(&self, name: &str, _options: &Options) -> Result<(), ServiceError> {
		let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
		if current.as_ref().is_some_and(|open| open.name == name) {
			debug!(index = name, "index already open");
			return Ok(());
		}
		// Release the previous writer before opening another index.
		*current = None;
		*current = Some(self.open(name)?);
		info!(index = name, "index ready");
		Ok(())
	}

	fn index_document(&self, collection: &dyn Collection, document: &IndexDocument) -> Result<(), ServiceError> {
		if document.id().is_empty() {
			return Err(ServiceError::invalid_document("", "document id is empty"));
		}
		if !document.boost().is_finite() || document.boost() < 0.0 {
			return Err(ServiceError::invalid_document(document.id(), format!("boost must be a finite non-negative number, got {}", document.boost())));
		}
		let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
		let open = current.as_ref().ok_or_else(|| ServiceError::IndexNotFound("no index has been created".to_string()))?;
		let f = open.fields;

		let key = format!("{}/{}", collection.id(), document.id());
		let body = document.fields().iter().map(|field| field.value.to_text()).collect::<Vec<_>>().join("\n");
		let doc = doc!(
			f.id => document.id().to_string(),
			f.key => key.clone(),
			f.collection => collection.id().to_string(),
			f.body => body,
			f.boost => f64::from(document.boost()),
		);

		let mut writer = open.writer.lock().unwrap_or_else(PoisonError::into_inner);
		writer.delete_term(Term::from_field_text(f.key, &key));
		let committed = writer.add_document(doc).and_then(|_| writer.commit());
		if let Err(e) = committed {
			// Drop the half-written operations so earlier documents stay intact.
			if let Err(rollback) = writer.rollback() {
				warn!(document = document.id(), error = %rollback, "rollback failed");
				return Err(ServiceError::backend(format!("{e}; rollback failed: {rollback}")));
			}
			return Err(write_error(e));
		}
		Ok(())
	}

	fn search(&self, keywords: &str, options: &Options) -> Result<Vec<SearchResult>, ServiceError> {
		let limit = requested_limit(options);
		if keywords.trim().is_empty() || limit == 0 {
			return Ok(Vec::new());
		}
		let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
		let Some(open) = current.as_ref() else { return Ok(Vec::new()) };
		let f = open.fields;

		let reader = open.index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(backend)?;
		let searcher = reader.searcher();
		let query = QueryParser::for_index(&open.index, vec![f.body])
			.parse_query(keywords)
			.map_err(|e| ServiceError::InvalidQuery(e.to_string()))?;
		// The collector allocates for the full limit, so never ask for more than exist.
		let limit = limit.min(usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX));
		if limit == 0 {
			return Ok(Vec::new());
		}
		// Boost is applied inside the collector so the cutoff sees the final score.
		let collector = TopDocs::with_limit(limit).tweak_score(|segment: &SegmentReader| {
			let boosts = segment.fast_fields().f64(BOOST_FIELD).ok();
			move |doc: DocId, score: Score| {
				let boost = boosts.as_ref().and_then(|column| column.first(doc)).unwrap_or(1.0);
				score * boost as Score
			}
		});
		let top_docs = searcher.search(&query, &collector).map_err(backend)?;

		let mut results = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(backend)?;
			let id = doc.get_first(f.id).and_then(|v| v.as_str()).unwrap_or("").to_string();
			let collection = doc.get_first(f.collection).and_then(|v| v.as_str()).map(str::to_string);
			results.push(SearchResult { id, score, collection });
		}
		Ok(results)
	}

	fn delete(&self) -> Result<(), ServiceError> {
		let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
		let Some(open) = current.take() else {
			debug!("delete on absent index");
			return Ok(());
		};
		let OpenIndex { name, index, writer, path, .. } = open;
		drop(writer);
		drop(index);
		if let Some(path) = path {
			if path.exists() {
				fs::remove_dir_all(&path).map_err(|e| ServiceError::unavailable(format!("{}: {e}", path.display())))?;
			}
		}
		info!(index = %name, "index deleted");
		Ok(())
	}
}
