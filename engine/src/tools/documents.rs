//! Local document index and the tools that read it
//!
//! Text files are split into overlapping chunks, each chunk is embedded
//! through the Model Gateway, and documents with their chunk vectors are
//! persisted as one JSON file. An in-memory HNSW graph over the vectors is
//! rebuilt on open and after every indexing pass; `document_search` asks it
//! for the chunks nearest the query embedding by cosine distance.
//! `document_summary` returns an opening excerpt of one document.

use anndists::dist::DistCosine;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::errors::ResearchError;
use sdk::types::{ToolError, ToolInput, ToolOutput};
use serde::{Deserialize, Serialize};
use hnsw_rs::hnsw::Hnsw;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::web::HtmlExtractor;
use super::{ParamKind, ParamSpec, ResearchTool};
use crate::config::Config;
use crate::db::MemoryKind;
use crate::llm::gateway::ModelGateway;

/// Extensions read as plain UTF-8 text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "json", "csv", "html", "htm", "py", "js", "ts", "jsx", "tsx",
    "java", "c", "cpp", "h", "cs", "go", "rb", "php", "swift", "kt", "rs", "sql", "sh", "yaml",
    "yml", "toml", "xml", "css", "scss",
];

/// Files larger than this are skipped
const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Length of the excerpt returned by `document_summary`
const EXCERPT_CHARS: usize = 1000;

// HNSW graph parameters
const MAX_CONNECTIONS: usize = 16;
const MAX_LAYERS: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH_MIN: usize = 32;

/// One indexed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub filename: String,
    pub path: PathBuf,
    pub file_type: String,
    pub size_bytes: u64,
    pub chunks: usize,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    document_id: String,
    ordinal: usize,
    text: String,
    embedding: Vec<f32>,
}

/// A chunk ranked against a query
#[derive(Debug, Clone, Serialize)]
pub struct ChunkMatch {
    pub document_id: String,
    pub filename: String,
    pub path: PathBuf,
    pub ordinal: usize,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    documents: BTreeMap<String, IndexedDocument>,
    chunks: Vec<StoredChunk>,
    #[serde(skip)]
    graph: Option<ChunkGraph>,
}

impl IndexFile {
    fn rebuild_graph(&mut self) {
        self.graph = ChunkGraph::build(&self.chunks);
    }
}

/// Approximate nearest-neighbour graph over chunk embeddings
///
/// HNSW has no removal, so the graph is rebuilt whenever the chunks change.
/// Data ids are positions in `IndexFile::chunks`.
struct ChunkGraph {
    hnsw: Hnsw<'static, f32, DistCosine>,
    dimension: usize,
    len: usize,
}

impl ChunkGraph {
    /// `None` when no chunk has a usable embedding
    fn build(chunks: &[StoredChunk]) -> Option<Self> {
        let dimension = chunks
            .iter()
            .map(|c| c.embedding.len())
            .find(|len| *len > 0)?;
        let max_layers = MAX_LAYERS
            .min((chunks.len() as f32).ln().trunc() as usize)
            .max(1);
        let hnsw = Hnsw::new(
            MAX_CONNECTIONS,
            chunks.len(),
            max_layers,
            EF_CONSTRUCTION,
            DistCosine {},
        );

        let mut len = 0;
        for (id, chunk) in chunks.iter().enumerate() {
            if chunk.embedding.len() != dimension || is_zero(&chunk.embedding) {
                warn!(
                    document = %chunk.document_id,
                    ordinal = chunk.ordinal,
                    dimension = chunk.embedding.len(),
                    "Chunk embedding left out of the search graph"
                );
                continue;
            }
            hnsw.insert((chunk.embedding.as_slice(), id));
            len += 1;
        }

        debug!(chunks = len, dimension, "Search graph built");
        (len > 0).then_some(Self {
            hnsw,
            dimension,
            len,
        })
    }

    /// Up to `k` `(chunk position, cosine similarity)` pairs, best first
    fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || query.len() != self.dimension || is_zero(query) {
            return Vec::new();
        }
        let ef_search = (k * 2).max(EF_SEARCH_MIN);
        let mut hits: Vec<(usize, f32)> = self
            .hnsw
            .search(query, k, ef_search)
            .into_iter()
            .map(|n| (n.d_id, 1.0 - n.distance))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits
    }
}

impl fmt::Debug for ChunkGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkGraph")
            .field("dimension", &self.dimension)
            .field("len", &self.len)
            .finish()
    }
}

fn is_zero(vector: &[f32]) -> bool {
    vector.iter().all(|x| *x == 0.0)
}

/// Embedding index over local text documents, persisted as JSON
pub struct DocumentIndex {
    path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    extractor: HtmlExtractor,
    state: RwLock<IndexFile>,
}

impl DocumentIndex {
    /// Open the index stored at `path`
    ///
    /// A missing file yields an empty index. A corrupt file is logged and
    /// replaced on the next write.
    pub fn open(path: impl Into<PathBuf>, chunk_size: usize, chunk_overlap: usize) -> Result<Self, ResearchError> {
        let path = path.into();
        let mut state: IndexFile = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Document index at {} is unreadable, starting empty: {}", path.display(), e);
                IndexFile::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexFile::default(),
            Err(e) => return Err(e.into()),
        };
        let extractor =
            HtmlExtractor::new().map_err(|e| ResearchError::Config(format!("html selectors: {}", e)))?;
        state.rebuild_graph();

        debug!(documents = state.documents.len(), chunks = state.chunks.len(), "Document index opened");
        Ok(Self {
            path,
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            extractor,
            state: RwLock::new(state),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ResearchError> {
        Self::open(
            config.document_index_path(),
            config.tools.documents.chunk_size,
            config.tools.documents.chunk_overlap,
        )
    }

    /// Index a file, or every supported file under a directory
    ///
    /// Re-indexing a path replaces its previous chunks.
    pub async fn index_path(&self, path: &Path, gateway: &ModelGateway) -> Result<Vec<IndexedDocument>, ResearchError> {
        let root = tokio::fs::canonicalize(path).await?;
        let files = if root.is_dir() {
            collect_files(&root)?
        } else {
            vec![root]
        };

        let mut prepared = Vec::new();
        for file in files {
            if let Some(entry) = self.prepare_file(&file, gateway).await? {
                prepared.push(entry);
            }
        }

        let mut indexed = Vec::with_capacity(prepared.len());
        if !prepared.is_empty() {
            let mut state = self.state.write().await;
            for (document, chunks) in prepared {
                state.chunks.retain(|c| c.document_id != document.id);
                state.chunks.extend(chunks);
                state.documents.insert(document.id.clone(), document.clone());
                indexed.push(document);
            }
            state.rebuild_graph();
            drop(state);
            self.persist().await?;
        }
        info!("Indexed {} document(s) from {}", indexed.len(), path.display());
        Ok(indexed)
    }

    /// Read, chunk and embed one file without touching the index
    async fn prepare_file(
        &self,
        file: &Path,
        gateway: &ModelGateway,
    ) -> Result<Option<(IndexedDocument, Vec<StoredChunk>)>, ResearchError> {
        let extension = extension_of(file);
        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            debug!("Skipping unsupported file {}", file.display());
            return Ok(None);
        }
        let size_bytes = tokio::fs::metadata(file).await?.len();
        if size_bytes > MAX_FILE_BYTES {
            warn!("Skipping {} ({} bytes exceeds the size limit)", file.display(), size_bytes);
            return Ok(None);
        }
        let Some(text) = self.read_text(file).await else {
            warn!("Skipping {}: not valid UTF-8", file.display());
            return Ok(None);
        };

        let pieces = chunk_text(&text, self.chunk_size, self.chunk_overlap);
        if pieces.is_empty() {
            debug!("Skipping empty file {}", file.display());
            return Ok(None);
        }

        let id = document_id(file);
        let mut chunks = Vec::with_capacity(pieces.len());
        for (ordinal, piece) in pieces.into_iter().enumerate() {
            let embedding = gateway.embed(&piece).await?;
            chunks.push(StoredChunk {
                document_id: id.clone(),
                ordinal,
                text: piece,
                embedding,
            });
        }

        let document = IndexedDocument {
            id,
            filename: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: file.to_path_buf(),
            file_type: extension,
            size_bytes,
            chunks: chunks.len(),
            indexed_at: Utc::now(),
        };

        debug!(document = %document.filename, chunks = document.chunks, "Document embedded");
        Ok(Some((document, chunks)))
    }

    async fn read_text(&self, file: &Path) -> Option<String> {
        let bytes = tokio::fs::read(file).await.ok()?;
        let text = String::from_utf8(bytes).ok()?;
        if matches!(extension_of(file).as_str(), "html" | "htm") {
            Some(self.extractor.text(&text))
        } else {
            Some(text)
        }
    }

    async fn persist(&self) -> Result<(), ResearchError> {
        let state = self.state.read().await;
        let contents = serde_json::to_string(&*state)
            .map_err(|e| ResearchError::storage("document index", e))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, contents)
            .await
            .map_err(|e| ResearchError::storage("document index", e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| ResearchError::storage("document index", e))?;
        Ok(())
    }

    /// Indexed documents sorted by filename
    pub async fn list(&self) -> Vec<IndexedDocument> {
        let state = self.state.read().await;
        let mut documents: Vec<_> = state.documents.values().cloned().collect();
        documents.sort_by(|a, b| a.filename.cmp(&b.filename).then_with(|| a.path.cmp(&b.path)));
        documents
    }

    /// Look up a document by id or unambiguous id prefix
    pub async fn get(&self, id: &str) -> Option<IndexedDocument> {
        let id = id.trim().trim_end_matches('.');
        if id.is_empty() {
            return None;
        }
        let state = self.state.read().await;
        if let Some(document) = state.documents.get(id) {
            return Some(document.clone());
        }
        let mut matches = state.documents.values().filter(|d| d.id.starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(document), None) => Some(document.clone()),
            _ => None,
        }
    }

    /// Up to `limit` chunks nearest `query` by cosine similarity
    ///
    /// A query whose dimension differs from the indexed vectors matches nothing.
    pub async fn search(&self, query: &[f32], limit: usize) -> Vec<ChunkMatch> {
        let state = self.state.read().await;
        let Some(graph) = &state.graph else {
            return Vec::new();
        };

        graph
            .nearest(query, limit)
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .filter_map(|(position, score)| {
                let chunk = state.chunks.get(position)?;
                let document = state.documents.get(&chunk.document_id)?;
                Some(ChunkMatch {
                    document_id: chunk.document_id.clone(),
                    filename: document.filename.clone(),
                    path: document.path.clone(),
                    ordinal: chunk.ordinal,
                    score,
                    text: chunk.text.clone(),
                })
            })
            .collect()
    }

    /// Opening excerpt of a document
    ///
    /// Reads the file again when possible, otherwise stitches the stored
    /// chunks back together.
    pub async fn excerpt(&self, document: &IndexedDocument, max_chars: usize) -> String {
        let text = match self.read_text(&document.path).await {
            Some(text) => text,
            None => {
                let state = self.state.read().await;
                let mut chunks: Vec<&StoredChunk> = state
                    .chunks
                    .iter()
                    .filter(|c| c.document_id == document.id)
                    .collect();
                chunks.sort_by_key(|c| c.ordinal);
                chunks.first().map(|c| c.text.clone()).unwrap_or_default()
            }
        };

        let text = text.trim();
        if text.chars().count() > max_chars {
            format!("{}...", text.chars().take(max_chars).collect::<String>())
        } else {
            text.to_string()
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.documents.is_empty()
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Stable id for a file: BLAKE3 of its absolute path
fn document_id(path: &Path) -> String {
    blake3::hash(path.to_string_lossy().as_bytes()).to_hex().to_string()
}

/// Every regular file under `root`, skipping hidden entries
fn collect_files(root: &Path) -> Result<Vec<PathBuf>, ResearchError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Split text into chunks of at most `size` chars overlapping by `overlap`
///
/// Breaks prefer a newline, then a space, in the second half of the window.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            let window = &chars[start + size / 2..hard_end];
            window
                .iter()
                .rposition(|c| *c == '\n')
                .or_else(|| window.iter().rposition(|c| c.is_whitespace()))
                .map(|i| start + size / 2 + i + 1)
                .unwrap_or(hard_end)
        };

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    chunks
}

/// `document_search` tool
pub struct DocumentSearchTool {
    index: Arc<DocumentIndex>,
    gateway: Arc<ModelGateway>,
}

impl DocumentSearchTool {
    pub fn new(index: Arc<DocumentIndex>, gateway: Arc<ModelGateway>) -> Self {
        Self { index, gateway }
    }
}

#[async_trait]
impl ResearchTool for DocumentSearchTool {
    fn name(&self) -> &str {
        "document_search"
    }

    fn description(&self) -> &str {
        "Search locally indexed documents for passages relevant to a query."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("query", ParamKind::Text, "What to look for"),
            ParamSpec::optional("limit", ParamKind::Integer, "Maximum number of passages (1-20)"),
        ]
    }

    fn record_kind(&self) -> Option<MemoryKind> {
        Some(MemoryKind::DocumentReference)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput, ToolError> {
        let query = input.param_str("query")?.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidParameter("query is empty".to_string()));
        }
        let limit = input
            .param_i64_opt("limit")
            .map(|n| n.clamp(1, 20) as usize)
            .unwrap_or(5);

        if self.index.is_empty().await {
            return Err(ToolError::Execution("no documents are indexed".to_string()));
        }

        let embedding = self.gateway.embed(query).await.map_err(|e| match e {
            ResearchError::ModelUnavailable { .. } => ToolError::Unavailable(e.to_string()),
            other => ToolError::Execution(other.to_string()),
        })?;

        let matches = self.index.search(&embedding, limit).await;
        if matches.is_empty() {
            return Err(ToolError::Execution(format!(
                "no indexed passage matches '{}'",
                query
            )));
        }

        let text = matches
            .iter()
            .map(|m| format!("[{} #{}] (score {:.2})\n{}", m.filename, m.ordinal, m.score, m.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut sources: Vec<String> = Vec::new();
        for m in &matches {
            let path = m.path.display().to_string();
            if !sources.contains(&path) && sources.len() < 3 {
                sources.push(path);
            }
        }

        Ok(ToolOutput::json(json!({ "query": query, "matches": matches }), text)
            .with_source(sources.join(", ")))
    }
}

/// `document_summary` tool
pub struct DocumentSummaryTool {
    index: Arc<DocumentIndex>,
}

impl DocumentSummaryTool {
    pub fn new(index: Arc<DocumentIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl ResearchTool for DocumentSummaryTool {
    fn name(&self) -> &str {
        "document_summary"
    }

    fn description(&self) -> &str {
        "Return the opening excerpt of an indexed document by id."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "document_id",
            ParamKind::Text,
            "Document id or unambiguous id prefix",
        )]
    }

    fn record_kind(&self) -> Option<MemoryKind> {
        Some(MemoryKind::Fact)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput, ToolError> {
        let id = input.param_str("document_id")?;
        let document = self
            .index
            .get(id)
            .await
            .ok_or_else(|| ToolError::Execution(format!("no indexed document with id '{}'", id)))?;

        let excerpt = self.index.excerpt(&document, EXCERPT_CHARS).await;
        if excerpt.is_empty() {
            return Err(ToolError::Execution(format!("{} has no text", document.filename)));
        }

        Ok(ToolOutput::json(
            json!({ "document_id": document.id, "filename": document.filename }),
            format!("{}\n\n{}", document.filename, excerpt),
        )
        .with_source(document.path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{scripted_gateway, ScriptedProvider};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<DocumentIndex>, Arc<ScriptedProvider>, Arc<ModelGateway>) {
        let temp = TempDir::new().unwrap();
        let index = Arc::new(DocumentIndex::open(temp.path().join("documents.json"), 200, 40).unwrap());
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let gateway = Arc::new(scripted_gateway(Arc::clone(&provider)));
        (temp, index, provider, gateway)
    }

    #[test]
    fn test_chunk_text_overlaps_and_respects_size() {
        let text = "alpha beta gamma delta ".repeat(40);
        let chunks = chunk_text(&text, 100, 20);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        let tail: String = chunks[0].chars().rev().take(5).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn test_chunk_text_edge_cases() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n  ", 100, 10).is_empty());
        assert_eq!(chunk_text("short note", 100, 10), vec!["short note"]);
        // no whitespace at all still makes progress
        let chunks = chunk_text(&"x".repeat(250), 100, 99);
        assert!(chunks.iter().map(|c| c.len()).sum::<usize>() >= 250);
    }

    fn chunk(document_id: &str, ordinal: usize, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            document_id: document_id.to_string(),
            ordinal,
            text: format!("{} #{}", document_id, ordinal),
            embedding,
        }
    }

    #[test]
    fn test_graph_ranks_by_cosine_similarity() {
        let chunks = vec![
            chunk("a", 0, vec![0.0, 1.0, 0.0]),
            chunk("a", 1, vec![1.0, 0.1, 0.0]),
            chunk("b", 0, vec![0.7, 0.7, 0.0]),
            chunk("b", 1, vec![0.0, 0.0, 1.0]),
        ];
        let graph = ChunkGraph::build(&chunks).unwrap();

        let hits = graph.nearest(&[1.0, 0.0, 0.0], 2);
        assert_eq!(hits.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(hits[0].1 > hits[1].1);
        assert!((hits[0].1 - 0.995).abs() < 0.01);

        assert!(graph.nearest(&[1.0, 0.0], 2).is_empty());
        assert!(graph.nearest(&[0.0, 0.0, 0.0], 2).is_empty());
        assert!(graph.nearest(&[1.0, 0.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_graph_skips_unusable_embeddings() {
        assert!(ChunkGraph::build(&[]).is_none());
        assert!(ChunkGraph::build(&[chunk("a", 0, vec![0.0, 0.0])]).is_none());

        let graph = ChunkGraph::build(&[
            chunk("a", 0, vec![1.0, 0.0]),
            chunk("a", 1, vec![1.0, 0.0, 0.0]),
            chunk("a", 2, vec![0.0, 0.0]),
        ])
        .unwrap();
        assert_eq!(graph.len, 1);
        let hits = graph.nearest(&[1.0, 0.0], 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_index_directory_and_search() {
        let (temp, index, provider, gateway) = setup();
        let docs = temp.path().join("docs");
        std::fs::create_dir_all(docs.join("nested")).unwrap();
        std::fs::write(docs.join("climate.md"), "Carbon pricing and emissions trading policy").unwrap();
        std::fs::write(docs.join("nested/garden.txt"), "Tomatoes need sun and water").unwrap();
        std::fs::write(docs.join("image.png"), [0u8, 159, 146, 150]).unwrap();
        std::fs::write(docs.join(".hidden.txt"), "secret").unwrap();

        let indexed = index.index_path(&docs, &gateway).await.unwrap();
        assert_eq!(indexed.len(), 2);
        assert_eq!(provider.embed_calls(), 2);

        let tool = DocumentSearchTool::new(Arc::clone(&index), Arc::clone(&gateway));
        let output = tool
            .execute(&ToolInput::new("document_search").with_param("query", "emissions policy"))
            .await
            .unwrap();
        assert!(output.text.starts_with("[climate.md #0]"));
        assert!(output.source.unwrap().ends_with("climate.md"));
    }

    #[tokio::test]
    async fn test_index_persists_and_reindex_replaces() {
        let (temp, index, _provider, gateway) = setup();
        let file = temp.path().join("notes.txt");
        std::fs::write(&file, "first version").unwrap();
        index.index_path(&file, &gateway).await.unwrap();

        std::fs::write(&file, "second version").unwrap();
        let again = index.index_path(&file, &gateway).await.unwrap();
        assert_eq!(again.len(), 1);

        let reopened = DocumentIndex::open(temp.path().join("documents.json"), 200, 40).unwrap();
        let listed = reopened.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, "notes.txt");
        assert_eq!(listed[0].id.len(), 64);

        let hits = reopened.search(&crate::llm::testing::word_hash_embedding("second version"), 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "second version");
    }

    #[tokio::test]
    async fn test_search_on_empty_index_fails() {
        let (_temp, index, provider, gateway) = setup();
        let tool = DocumentSearchTool::new(index, gateway);

        let err = tool
            .execute(&ToolInput::new("document_search").with_param("query", "anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_by_prefix() {
        let (temp, index, _provider, gateway) = setup();
        let file = temp.path().join("report.md");
        std::fs::write(&file, format!("# Report\n{}", "word ".repeat(400))).unwrap();
        let indexed = index.index_path(&file, &gateway).await.unwrap();
        let prefix = &indexed[0].id[..8];

        let tool = DocumentSummaryTool::new(Arc::clone(&index));
        assert_eq!(tool.record_kind(), Some(MemoryKind::Fact));

        let output = tool
            .execute(&ToolInput::new("document_summary").with_param("document_id", format!("{}...", prefix)))
            .await
            .unwrap();
        assert!(output.text.starts_with("report.md\n\n# Report"));
        assert!(output.text.ends_with("..."));

        let err = tool
            .execute(&ToolInput::new("document_summary").with_param("document_id", "zzzz"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_missing_path_is_io_error() {
        let (temp, index, _provider, gateway) = setup();
        let err = index
            .index_path(&temp.path().join("nope"), &gateway)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::Io(_)));
    }
}
