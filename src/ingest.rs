//! Ingestion pipeline orchestration.
//!
//! Turns a batch of uploaded documents into a freshly published vector index:
//! staging → extraction → chunking → embedding → build → atomic swap.
//!
//! Every call rebuilds the index from exactly the documents it was given; the
//! previous index stays live until the new one is completely written.

use anyhow::Context;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::chunk::chunk_page;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::EmbeddingProvider;
use crate::error::{AssistantError, AssistantResult};
use crate::extract::{extract_pages, DocumentKind};
use crate::index::{IndexStore, VectorIndex};
use crate::models::{DocumentChunk, UploadedDocument};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};

/// A document that contributed nothing to the index, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDocument {
    pub file: String,
    pub reason: String,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub attempted: usize,
    pub processed: usize,
    pub skipped: Vec<SkippedDocument>,
    pub pages: usize,
    pub chunks: usize,
    /// Generation name of the published index.
    pub generation: String,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully processed {} of {} files ({} chunks)",
            self.processed, self.attempted, self.chunks
        )?;
        if !self.skipped.is_empty() {
            write!(f, "; skipped {}", self.skipped.len())?;
        }
        Ok(())
    }
}

pub struct Ingestor {
    staging_dir: PathBuf,
    chunking: ChunkingConfig,
    batch_size: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    store: IndexStore,
    progress: Box<dyn IngestProgressReporter>,
}

impl Ingestor {
    pub fn new(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            staging_dir: config.paths.staging_dir.clone(),
            chunking: config.chunking.clone(),
            batch_size: config.embedding.batch_size.max(1),
            embedder,
            store: IndexStore::new(&config.paths.index_dir),
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Rebuild the index from `documents` and publish it.
    ///
    /// Unreadable or unsupported documents are skipped and listed in the
    /// report; the call fails only if nothing usable remains.
    pub async fn ingest(&self, documents: &[UploadedDocument]) -> AssistantResult<IngestReport> {
        self.embedder
            .ensure_configured()
            .map_err(|e| AssistantError::Config(format!("{:#}", e)))?;

        if documents.is_empty() {
            return Err(AssistantError::Ingestion("no documents supplied".to_string()));
        }

        let staged = self.stage(documents)?;

        let total = staged.len() as u64;
        let mut chunks: Vec<DocumentChunk> = Vec::new();
        let mut skipped = Vec::new();
        let mut processed = 0usize;
        let mut pages = 0usize;

        for (i, (name, doc)) in staged.iter().enumerate() {
            self.progress.report(IngestProgressEvent::Extracting {
                file: name.clone(),
                n: i as u64 + 1,
                total,
            });

            let extracted = match extract_pages(name, &doc.bytes) {
                Ok(p) if p.is_empty() => Err("no extractable text".to_string()),
                Ok(p) => Ok(p),
                Err(e) => Err(AssistantError::Parse(e.to_string()).to_string()),
            };

            match extracted {
                Ok(doc_pages) => {
                    processed += 1;
                    pages += doc_pages.len();
                    for page in &doc_pages {
                        chunks.extend(chunk_page(
                            name,
                            page.page,
                            &page.text,
                            self.chunking.chunk_size,
                            self.chunking.chunk_overlap,
                        ));
                    }
                    tracing::debug!(file = %name, pages = doc_pages.len(), "extracted document");
                }
                Err(reason) => {
                    tracing::warn!(file = %name, %reason, "skipping document");
                    skipped.push(SkippedDocument {
                        file: name.clone(),
                        reason,
                    });
                }
            }
        }

        if chunks.is_empty() {
            return Err(AssistantError::Ingestion("no valid text found".to_string()));
        }

        let vectors = self.embed_chunks(&chunks).await?;

        let index = VectorIndex::build(self.embedder.model_name(), chunks, vectors)
            .map_err(AssistantError::ingestion)?;
        self.progress.report(IngestProgressEvent::Publishing {
            chunks: index.len() as u64,
        });
        self.store
            .replace(&index)
            .map_err(AssistantError::ingestion)?;

        Ok(IngestReport {
            attempted: documents.len(),
            processed,
            skipped,
            pages,
            chunks: index.len(),
            generation: index.manifest().generation.clone(),
        })
    }

    /// Wipe the staging directory and write each upload under a sanitised,
    /// unique file name.
    fn stage<'a>(
        &self,
        documents: &'a [UploadedDocument],
    ) -> AssistantResult<Vec<(String, &'a UploadedDocument)>> {
        match std::fs::remove_dir_all(&self.staging_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(&self.staging_dir)?;

        let mut seen = HashSet::new();
        let mut staged = Vec::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            let name = unique_name(&mut seen, sanitize_file_name(&doc.name, i), i);
            std::fs::write(self.staging_dir.join(&name), &doc.bytes)?;
            staged.push((name, doc));
        }
        tracing::debug!(dir = %self.staging_dir.display(), files = staged.len(), "staged uploads");
        Ok(staged)
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> AssistantResult<Vec<Vec<f32>>> {
        let total = chunks.len() as u64;
        let mut vectors = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self
                .embedder
                .embed(&texts)
                .await
                .with_context(|| format!("embedding batch {} failed", batch_no + 1))
                .map_err(AssistantError::service)?;
            if embedded.len() != texts.len() {
                return Err(AssistantError::Service(format!(
                    "embedding batch {} returned {} vectors for {} chunks",
                    batch_no + 1,
                    embedded.len(),
                    texts.len()
                )));
            }
            if let Some(v) = embedded.first() {
                let expected = self.embedder.dims();
                if batch_no == 0 && expected != 0 && v.len() != expected {
                    tracing::warn!(
                        model = self.embedder.model_name(),
                        expected,
                        actual = v.len(),
                        "embedding size differs from the configured dims"
                    );
                }
            }
            vectors.extend(embedded);
            self.progress.report(IngestProgressEvent::Embedding {
                n: vectors.len() as u64,
                total,
            });
        }
        Ok(vectors)
    }
}

/// Strip any directory components from an upload name.
fn sanitize_file_name(name: &str, position: usize) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        format!("document-{}", position + 1)
    } else {
        base.to_string()
    }
}

/// Claim `name` in `seen`, prefixing the upload position (and then a counter)
/// until it no longer collides with an earlier upload.
fn unique_name(seen: &mut HashSet<String>, name: String, position: usize) -> String {
    if seen.insert(name.clone()) {
        return name;
    }
    let mut candidate = format!("{}-{}", position + 1, name);
    let mut k = 2;
    while !seen.insert(candidate.clone()) {
        candidate = format!("{}-{}-{}", position + 1, k, name);
        k += 1;
    }
    candidate
}

/// Load every supported document under `dir`, in file-name order.
pub fn collect_documents(dir: &Path) -> anyhow::Result<Vec<UploadedDocument>> {
    if !dir.is_dir() {
        anyhow::bail!("Documents directory not found: {}", dir.display());
    }
    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if DocumentKind::from_file_name(&file_name).is_none() {
            tracing::debug!(path = %entry.path().display(), "ignoring unsupported file");
            continue;
        }
        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        documents.push(UploadedDocument::new(file_name, bytes));
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd", 0), "passwd");
        assert_eq!(sanitize_file_name("C:\\notes\\week1.pdf", 0), "week1.pdf");
        assert_eq!(sanitize_file_name("lecture.pdf", 0), "lecture.pdf");
        assert_eq!(sanitize_file_name("uploads/", 2), "document-3");
        assert_eq!(sanitize_file_name("..", 0), "document-1");
    }

    #[test]
    fn unique_name_never_reuses_a_claimed_name() {
        let mut seen = HashSet::new();
        let names: Vec<_> = ["a.txt", "3-a.txt", "a.txt", "a.txt"]
            .iter()
            .enumerate()
            .map(|(i, n)| unique_name(&mut seen, n.to_string(), i))
            .collect();
        assert_eq!(names, vec!["a.txt", "3-a.txt", "3-2-a.txt", "4-a.txt"]);
    }

    #[test]
    fn report_display() {
        let mut report = IngestReport {
            attempted: 3,
            processed: 2,
            skipped: vec![],
            pages: 4,
            chunks: 17,
            generation: "g".into(),
        };
        assert_eq!(
            report.to_string(),
            "Successfully processed 2 of 3 files (17 chunks)"
        );
        report.skipped.push(SkippedDocument {
            file: "broken.pdf".into(),
            reason: "PDF extraction failed".into(),
        });
        assert_eq!(
            report.to_string(),
            "Successfully processed 2 of 3 files (17 chunks); skipped 1"
        );
    }

    #[test]
    fn collect_documents_filters_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "beta").unwrap();
        std::fs::write(tmp.path().join("a.md"), "alpha").unwrap();
        std::fs::write(tmp.path().join("image.png"), [0u8; 4]).unwrap();
        std::fs::create_dir(tmp.path().join("week2")).unwrap();
        std::fs::write(tmp.path().join("week2").join("c.txt"), "gamma").unwrap();

        let docs = collect_documents(tmp.path()).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.txt", "c.txt"]);
        assert_eq!(docs[0].bytes, b"alpha");
    }

    #[test]
    fn collect_documents_missing_dir_errors() {
        assert!(collect_documents(Path::new("/nonexistent/eduguide/docs")).is_err());
    }
}
