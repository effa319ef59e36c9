use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use scirag_core::error::Error;
use scirag_core::traits::LexicalIndex;
use scirag_core::types::{Chunk, RetrievedCandidate, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Fields {
	id: Field,
	title: Field,
	section: Field,
	position: Field,
	body: Field,
	created_at: Field,
}

/// Full-text index over chunk titles and bodies.
///
/// Stores every chunk field except the embedding so hits can be returned
/// without a round trip to the vector store.
pub struct TantivyLexicalIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: Fields,
}

impl TantivyLexicalIndex {
	/// Fresh index in `index_dir`; any previous index there is removed.
	pub fn create_in_dir(index_dir: &Path) -> Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(index_dir)?; }
		std::fs::create_dir_all(index_dir)?;
		Self::from_index(Index::create_in_dir(index_dir, build_schema())?)
	}

	pub fn create_in_ram() -> Result<Self> { Self::from_index(Index::create_in_ram(build_schema())) }

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let schema = index.schema();
		let fields = Fields {
			id: schema.get_field("id")?,
			title: schema.get_field("book_title")?,
			section: schema.get_field("section")?,
			position: schema.get_field("chunk_idx")?,
			body: schema.get_field("body")?,
			created_at: schema.get_field("created_at")?,
		};
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let writer = index.writer(WRITER_HEAP_BYTES)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields })
	}

	fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
		let mut writer = self.writer.lock().map_err(|_| anyhow!("lexical index writer poisoned"))?;
		for c in chunks {
			let mut document = doc!(
				self.fields.id => c.id,
				self.fields.title => c.title.clone(),
				self.fields.position => u64::from(c.position),
				self.fields.body => c.body.clone(),
				self.fields.created_at => c.created_at.timestamp_millis(),
			);
			if let Some(section) = &c.section { document.add_text(self.fields.section, section); }
			writer.add_document(document)?;
		}
		writer.commit()?;
		self.reader.reload()?;
		Ok(())
	}

	fn search_chunks(&self, query: &str, k: usize) -> Result<Vec<RetrievedCandidate>> {
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, vec![self.fields.body, self.fields.title]);
		// User text is not query syntax; keep whatever parses.
		let (q, errors) = qp.parse_query_lenient(query);
		if !errors.is_empty() { tracing::debug!(?errors, "lenient parse dropped parts of the query"); }
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let document: TantivyDocument = searcher.doc(addr)?;
			hits.push(RetrievedCandidate { chunk: self.to_chunk(&document)?, score, source: SourceKind::Lexical });
		}
		Ok(hits)
	}

	fn to_chunk(&self, document: &TantivyDocument) -> Result<Chunk> {
		let text = |field: Field| document.get_first(field).and_then(|v| v.as_str()).map(str::to_string);
		let id = document.get_first(self.fields.id).and_then(|v| v.as_i64()).ok_or_else(|| anyhow!("stored doc without id"))?;
		let position = document.get_first(self.fields.position).and_then(|v| v.as_u64()).unwrap_or(0);
		let millis = document.get_first(self.fields.created_at).and_then(|v| v.as_i64()).unwrap_or(0);
		Ok(Chunk {
			id,
			title: text(self.fields.title).unwrap_or_default(),
			section: text(self.fields.section),
			position: u32::try_from(position)?,
			body: text(self.fields.body).unwrap_or_default(),
			embedding: None,
			created_at: Utc.timestamp_millis_opt(millis).single().unwrap_or_default(),
		})
	}
}

fn lexical_error(err: anyhow::Error) -> Error { Error::StoreUnavailable(format!("lexical index: {err:#}")) }

#[async_trait]
impl LexicalIndex for TantivyLexicalIndex {
	fn index(&self, chunks: &[Chunk]) -> scirag_core::Result<()> {
		if chunks.is_empty() { return Ok(()); }
		self.add_chunks(chunks).map_err(lexical_error)?;
		tracing::debug!(count = chunks.len(), "indexed chunks into tantivy");
		Ok(())
	}

	async fn search(&self, query: &str, k: usize) -> scirag_core::Result<Vec<RetrievedCandidate>> {
		if k == 0 || query.trim().is_empty() { return Ok(Vec::new()); }
		self.search_chunks(query, k).map_err(lexical_error)
	}
}
