//! indexkit-text
//!
//! Tantivy-based `SearchService`. See `service` for how documents map onto the
//! index and `tantivy_utils` for the schema and tokenizer.
pub mod service;
pub mod tantivy_utils;

pub use service::TantivySearchService;
