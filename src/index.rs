//! Persisted vector index with atomic whole-index replacement.
//!
//! Every ingestion builds a complete new index and publishes it as a new
//! *generation*. Readers always resolve the live generation through the
//! `CURRENT` pointer file, which is swapped with a rename, so an observer sees
//! either the previous complete index or the new one, never a partial build.
//!
//! # On-disk layout
//!
//! ```text
//! <index_dir>/
//! ├── CURRENT                      # name of the live generation
//! └── generations/
//!     └── <generation>/
//!         ├── manifest.json        # IndexManifest
//!         ├── chunks.json          # Vec<DocumentChunk>, in vector order
//!         └── vectors.bin          # chunk_count × dims little-endian f32
//! ```
//!
//! Superseded generations and abandoned temporary builds are pruned after a
//! successful swap.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::DocumentChunk;

pub const FORMAT_VERSION: u32 = 1;

const CURRENT_FILE: &str = "CURRENT";
const GENERATIONS_DIR: &str = "generations";
const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_FILE: &str = "vectors.bin";
const TMP_SUFFIX: &str = ".tmp";

/// Metadata describing one built index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub generation: String,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub dims: usize,
    /// Source files that contributed at least one chunk.
    pub sources: Vec<String>,
    pub chunk_count: usize,
    /// SHA-256 over the ordered chunk hashes; detects mismatched files.
    pub content_hash: String,
}

/// A retrieval hit.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub score: f32,
    pub chunk: &'a DocumentChunk,
}

/// In-memory index: chunks with their embeddings, searched by cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    chunks: Vec<DocumentChunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Build an index from chunks and their vectors (same order, same length).
    pub fn build(
        embedding_model: &str,
        chunks: Vec<DocumentChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            bail!("cannot build an index with no chunks");
        }
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let dims = vectors[0].len();
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            bail!("embedding vectors must be non-empty and share one dimensionality");
        }

        let mut sources: Vec<String> = Vec::new();
        for c in &chunks {
            if !sources.contains(&c.source_file) {
                sources.push(c.source_file.clone());
            }
        }

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            generation: new_generation_name(),
            created_at: Utc::now(),
            embedding_model: embedding_model.to_string(),
            dims,
            sources,
            chunk_count: chunks.len(),
            content_hash: batch_hash(&chunks),
        };

        Ok(Self {
            manifest,
            chunks,
            vectors,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn dims(&self) -> usize {
        self.manifest.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// Return the `k` chunks most similar to `query`, best first.
    ///
    /// Ties keep index order, so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .map(|(chunk, vector)| ScoredChunk {
                score: cosine_similarity(query, vector),
                chunk,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

fn new_generation_name() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        Uuid::new_v4().simple()
    )
}

fn batch_hash(chunks: &[DocumentChunk]) -> String {
    let mut hasher = Sha256::new();
    for c in chunks {
        hasher.update(c.hash.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// The on-disk home of the index.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True once an index has been published.
    pub fn exists(&self) -> bool {
        self.root.join(CURRENT_FILE).is_file()
    }

    /// Load the live index from disk, or `None` if none was ever published.
    ///
    /// Always reads from disk; callers must not hold the result across
    /// requests if they want to observe later ingestions.
    pub fn load(&self) -> Result<Option<VectorIndex>> {
        // A concurrent publish may prune the generation we just resolved;
        // re-resolve once before reporting corruption.
        for _ in 0..2 {
            let generation = match self.read_current()? {
                Some(g) => g,
                None => return Ok(None),
            };
            match self.load_generation(&generation) {
                Ok(index) => return Ok(Some(index)),
                Err(e) => {
                    if self.read_current()?.as_deref() == Some(generation.as_str()) {
                        return Err(e);
                    }
                    tracing::debug!(%generation, "index generation replaced during load, retrying");
                }
            }
        }
        bail!("index at {} changed repeatedly while loading", self.root.display())
    }

    /// Publish `index` as the live generation, replacing any previous one.
    ///
    /// The new generation is fully written before `CURRENT` is swapped; if
    /// anything fails before the swap, the previous index stays live.
    pub fn replace(&self, index: &VectorIndex) -> Result<()> {
        let generations = self.root.join(GENERATIONS_DIR);
        std::fs::create_dir_all(&generations)
            .with_context(|| format!("Failed to create {}", generations.display()))?;

        let name = &index.manifest.generation;
        let tmp_dir = generations.join(format!("{}{}", name, TMP_SUFFIX));
        let final_dir = generations.join(name);

        if let Err(e) = write_generation(&tmp_dir, index) {
            let _ = std::fs::remove_dir_all(&tmp_dir);
            return Err(e);
        }
        std::fs::rename(&tmp_dir, &final_dir)
            .with_context(|| format!("Failed to finalize generation {}", name))?;

        let pointer_tmp = self.root.join(format!("{}{}", CURRENT_FILE, TMP_SUFFIX));
        write_synced(&pointer_tmp, name.as_bytes())?;
        std::fs::rename(&pointer_tmp, self.root.join(CURRENT_FILE))
            .context("Failed to swap CURRENT pointer")?;

        tracing::info!(
            generation = %name,
            chunks = index.len(),
            dims = index.dims(),
            "published vector index"
        );

        self.prune(name);
        Ok(())
    }

    fn read_current(&self) -> Result<Option<String>> {
        let path = self.root.join(CURRENT_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let name = raw.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("CURRENT pointer is malformed: {:?}", raw);
        }
        Ok(Some(name.to_string()))
    }

    fn load_generation(&self, generation: &str) -> Result<VectorIndex> {
        let dir = self.root.join(GENERATIONS_DIR).join(generation);

        let manifest: IndexManifest = serde_json::from_slice(
            &std::fs::read(dir.join(MANIFEST_FILE))
                .with_context(|| format!("Failed to read manifest for {}", generation))?,
        )
        .context("Index manifest is not valid JSON")?;
        if manifest.format_version != FORMAT_VERSION {
            bail!(
                "Unsupported index format version {} (expected {})",
                manifest.format_version,
                FORMAT_VERSION
            );
        }

        let chunks: Vec<DocumentChunk> = serde_json::from_slice(
            &std::fs::read(dir.join(CHUNKS_FILE))
                .with_context(|| format!("Failed to read chunks for {}", generation))?,
        )
        .context("Index chunks file is not valid JSON")?;

        let blob = std::fs::read(dir.join(VECTORS_FILE))
            .with_context(|| format!("Failed to read vectors for {}", generation))?;

        if chunks.len() != manifest.chunk_count {
            bail!(
                "Index is corrupt: manifest lists {} chunks, found {}",
                manifest.chunk_count,
                chunks.len()
            );
        }
        let expected_bytes = manifest
            .chunk_count
            .checked_mul(manifest.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Index is corrupt: manifest size {} x {} overflows",
                    manifest.chunk_count,
                    manifest.dims
                )
            })?;
        if manifest.dims == 0 || blob.len() != expected_bytes {
            bail!(
                "Index is corrupt: vectors.bin has {} bytes, expected {}",
                blob.len(),
                expected_bytes
            );
        }
        if batch_hash(&chunks) != manifest.content_hash {
            bail!("Index is corrupt: chunk content hash does not match manifest");
        }

        let vectors = blob
            .chunks_exact(manifest.dims * 4)
            .map(blob_to_vec)
            .collect();

        Ok(VectorIndex {
            manifest,
            chunks,
            vectors,
        })
    }

    /// Remove every generation except `keep`. Best effort.
    fn prune(&self, keep: &str) {
        let generations = self.root.join(GENERATIONS_DIR);
        let entries = match std::fs::read_dir(&generations) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            if entry.file_name().to_str() == Some(keep) {
                continue;
            }
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "failed to prune old index generation");
            }
        }
    }
}

fn write_generation(dir: &Path, index: &VectorIndex) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    write_synced(
        &dir.join(CHUNKS_FILE),
        &serde_json::to_vec(&index.chunks).context("Failed to serialize chunks")?,
    )?;

    let mut blob = Vec::with_capacity(index.len() * index.dims() * 4);
    for v in &index.vectors {
        blob.extend_from_slice(&vec_to_blob(v));
    }
    write_synced(&dir.join(VECTORS_FILE), &blob)?;

    // Manifest last: a generation directory without one is never loadable.
    write_synced(
        &dir.join(MANIFEST_FILE),
        &serde_json::to_vec_pretty(&index.manifest).context("Failed to serialize manifest")?,
    )?;
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::content_hash;

    fn chunk(source: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::new_v4().to_string(),
            source_file: source.to_string(),
            page: 1,
            chunk_index: 0,
            offset: 0,
            text: text.to_string(),
            hash: content_hash(text),
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            "test-model",
            vec![
                chunk("bio.pdf", "cells divide by mitosis"),
                chunk("bio.pdf", "photosynthesis makes glucose"),
                chunk("chem.pdf", "acids donate protons"),
            ],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap()
    }

    #[test]
    fn search_ranks_by_cosine() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "cells divide by mitosis");
        assert_eq!(hits[1].chunk.text, "acids donate protons");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn build_records_sources_in_order() {
        let index = sample_index();
        assert_eq!(index.manifest().sources, vec!["bio.pdf", "chem.pdf"]);
        assert_eq!(index.manifest().chunk_count, 3);
        assert_eq!(index.dims(), 2);
    }

    #[test]
    fn build_rejects_mismatched_input() {
        assert!(VectorIndex::build("m", vec![], vec![]).is_err());
        assert!(VectorIndex::build("m", vec![chunk("a", "x")], vec![]).is_err());
        assert!(VectorIndex::build(
            "m",
            vec![chunk("a", "x"), chunk("a", "y")],
            vec![vec![1.0], vec![1.0, 2.0]]
        )
        .is_err());
    }

    #[test]
    fn load_without_index_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("vector_store"));
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn replace_then_load_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("vector_store"));
        let index = sample_index();
        store.replace(&index).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.manifest(), index.manifest());
        assert_eq!(loaded.chunks(), index.chunks());
        assert_eq!(loaded.search(&[0.0, 1.0], 1)[0].chunk.text, "photosynthesis makes glucose");
    }

    #[test]
    fn replace_discards_previous_generation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let first = sample_index();
        store.replace(&first).unwrap();

        let second = VectorIndex::build(
            "test-model",
            vec![chunk("history.pdf", "the treaty was signed in 1648")],
            vec![vec![0.3, 0.9]],
        )
        .unwrap();
        store.replace(&second).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.manifest().sources, vec!["history.pdf"]);
        let remaining: Vec<_> = std::fs::read_dir(tmp.path().join(GENERATIONS_DIR))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn truncated_vectors_detected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let index = sample_index();
        store.replace(&index).unwrap();

        let vectors = tmp
            .path()
            .join(GENERATIONS_DIR)
            .join(&index.manifest().generation)
            .join(VECTORS_FILE);
        std::fs::write(&vectors, [0u8; 7]).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn oversized_manifest_dims_is_corruption() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let index = sample_index();
        store.replace(&index).unwrap();

        let manifest_path = tmp
            .path()
            .join(GENERATIONS_DIR)
            .join(&index.manifest().generation)
            .join(MANIFEST_FILE);
        let mut manifest = index.manifest().clone();
        manifest.dims = usize::MAX;
        std::fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("Index is corrupt"), "{}", err);
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn malformed_pointer_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CURRENT_FILE), "../../etc").unwrap();
        let store = IndexStore::new(tmp.path());
        assert!(store.load().is_err());
    }
}
