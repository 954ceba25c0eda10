use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "text_with_stopwords";
pub const BOOST_FIELD: &str = "boost";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _id_field = schema_builder.add_text_field("id", STRING | STORED);
	let _key_field = schema_builder.add_text_field("key", STRING);
	let _collection_field = schema_builder.add_text_field("collection", STRING | STORED);
	let body_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let body_options = TextOptions::default().set_indexing_options(body_indexing).set_stored();
	let _body_field = schema_builder.add_text_field("body", body_options);
	let _boost_field = schema_builder.add_f64_field(BOOST_FIELD, FAST | STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Handles to the schema fields the service reads and writes.
#[derive(Clone, Copy)]
pub struct IndexFields {
	pub id: Field,
	pub key: Field,
	pub collection: Field,
	pub body: Field,
	pub boost: Field,
}

impl IndexFields {
	pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id: schema.get_field("id")?,
			key: schema.get_field("key")?,
			collection: schema.get_field("collection")?,
			body: schema.get_field("body")?,
			boost: schema.get_field(BOOST_FIELD)?,
		})
	}
}
