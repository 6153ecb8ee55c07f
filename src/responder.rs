//! Retrieval-augmented answering in tutor and advisor modes.
//!
//! The tutor retrieves the top-K chunks from the persisted index and asks the
//! model to answer only from them. The advisor skips retrieval and grounds the
//! answer in the student's formatted profile instead.
//!
//! The index is loaded from disk on every tutor call, so a completed ingestion
//! is visible to the next question without restarting anything.

use anyhow::Context;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{AssistantError, AssistantResult};
use crate::generation::GenerationProvider;
use crate::index::IndexStore;
use crate::profile::{format_for_prompt, ProfileRecord, StandingStatus, NO_PROFILE_TEXT};

/// Returned by the tutor when no index has been built yet.
pub const KNOWLEDGE_BASE_EMPTY: &str =
    "Knowledge base is empty. Please upload your course documents first.";

/// The exact reply the tutor is told to give when the notes lack the answer.
pub const NOT_IN_NOTES: &str = "I don't see that in your lecture notes.";

/// The profile material injected into an advisor prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorContext {
    pub formatted: String,
    pub standing: StandingStatus,
}

impl AdvisorContext {
    pub fn from_record(record: &ProfileRecord) -> Self {
        Self {
            formatted: format_for_prompt(record),
            standing: record.standing_status(),
        }
    }

    /// Context used when no profile is selected.
    pub fn none() -> Self {
        Self {
            formatted: NO_PROFILE_TEXT.to_string(),
            standing: StandingStatus::Unknown,
        }
    }
}

impl Default for AdvisorContext {
    fn default() -> Self {
        Self::none()
    }
}

/// What the responder should do with a question.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Tutor,
    Advisor(AdvisorContext),
}

pub struct Responder {
    store: IndexStore,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    top_k: usize,
}

impl Responder {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            store: IndexStore::new(&config.paths.index_dir),
            embedder,
            generator,
            top_k: config.retrieval.top_k.max(1),
        }
    }

    pub async fn answer(&self, mode: &Mode, question: &str) -> AssistantResult<String> {
        match mode {
            Mode::Tutor => self.tutor_answer(question).await,
            Mode::Advisor(context) => self.advisor_answer(question, context).await,
        }
    }

    /// Answer from the ingested course documents.
    pub async fn tutor_answer(&self, question: &str) -> AssistantResult<String> {
        let index = match self.store.load().map_err(AssistantError::ingestion)? {
            Some(index) => index,
            None => return Ok(KNOWLEDGE_BASE_EMPTY.to_string()),
        };

        self.embedder
            .ensure_configured()
            .map_err(|e| AssistantError::Config(format!("{:#}", e)))?;
        let query = embed_query(self.embedder.as_ref(), question)
            .await
            .context("failed to embed question")
            .map_err(AssistantError::service)?;

        if query.len() != index.dims() {
            return Err(AssistantError::Service(format!(
                "index was built with {}-dimension embeddings ({}) but {} produces {}; re-ingest your documents",
                index.dims(),
                index.manifest().embedding_model,
                self.embedder.model_name(),
                query.len()
            )));
        }

        let hits = index.search(&query, self.top_k);
        tracing::debug!(
            hits = hits.len(),
            best = ?hits.first().map(|h| h.score),
            "retrieved context"
        );
        let context = hits
            .iter()
            .map(|h| h.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        self.generate(&render_tutor_prompt(&context, question)).await
    }

    /// Answer from the student's profile. No retrieval.
    pub async fn advisor_answer(
        &self,
        question: &str,
        context: &AdvisorContext,
    ) -> AssistantResult<String> {
        self.generate(&render_advisor_prompt(context, question))
            .await
    }

    async fn generate(&self, prompt: &str) -> AssistantResult<String> {
        self.generator
            .ensure_configured()
            .map_err(|e| AssistantError::Config(format!("{:#}", e)))?;
        self.generator
            .generate(prompt)
            .await
            .with_context(|| format!("generation with {} failed", self.generator.model_name()))
            .map_err(AssistantError::service)
    }
}

pub fn render_tutor_prompt(context: &str, question: &str) -> String {
    format!(
        "You are EduGuide, a patient and encouraging tutor.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION: {question}\n\
         \n\
         RULES:\n\
         1. Answer based ONLY on the context above.\n\
         2. If the context does not contain the answer, reply exactly: \"{not_found}\"\n\
         3. Guide the student step by step. Ask what they already know, give hints and \
         check their reasoning instead of handing over the final solution.\n",
        context = context,
        question = question,
        not_found = NOT_IN_NOTES,
    )
}

pub fn render_advisor_prompt(context: &AdvisorContext, question: &str) -> String {
    let mut prompt = format!(
        "You are EduGuide, a caring academic advisor.\n\
         \n\
         STUDENT PROFILE:\n\
         {profile}\n\
         \n\
         QUESTION: {question}\n\
         \n\
         INSTRUCTIONS:\n\
         1. Bad news: if grades are low or failing, be empathetic and supportive.\n\
         2. Good news: celebrate high grades.\n\
         3. Actionable: always end with one specific, concrete next step.\n",
        profile = context.formatted.trim_end(),
        question = question,
    );
    match context.standing {
        StandingStatus::Warning => prompt.push_str(
            "FOCUS: GPA is below 2.5, lead with empathy before giving any advice.\n",
        ),
        StandingStatus::Good => prompt.push_str(
            "FOCUS: The student is in good standing, open by celebrating their progress.\n",
        ),
        StandingStatus::Unknown => {}
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::DisabledGenerator;
    use crate::profile::{load, ProfileSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationProvider for CountingGenerator {
        fn model_name(&self) -> &str {
            "counting"
        }
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {}", prompt.lines().count()))
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.index_dir = dir.join("vector_store");
        config
    }

    #[test]
    fn tutor_prompt_carries_rules() {
        let prompt = render_tutor_prompt("Derivatives measure rates of change.", "What is a derivative?");
        assert!(prompt.contains("Derivatives measure rates of change."));
        assert!(prompt.contains("QUESTION: What is a derivative?"));
        assert!(prompt.contains("ONLY on the context"));
        assert!(prompt.contains("\"I don't see that in your lecture notes.\""));
        assert!(prompt.contains("step by step"));
    }

    #[test]
    fn advisor_prompt_warning_focus() {
        let record = load(ProfileSource::Upload {
            name: "p.json",
            bytes: br#"{"name": "Sam", "gpa": 1.8, "academic_standing": "Probation"}"#,
        });
        let context = AdvisorContext::from_record(&record);
        assert_eq!(context.standing, StandingStatus::Warning);

        let prompt = render_advisor_prompt(&context, "Am I going to fail?");
        assert!(prompt.contains("GPA: 1.8 (Probation)"));
        assert!(prompt.contains("GPA is below 2.5, lead with empathy"));
        assert!(!prompt.contains("celebrating"));
    }

    #[test]
    fn advisor_prompt_good_and_unknown_focus() {
        let good = AdvisorContext {
            formatted: "GPA: 3.9 (Dean's List)".into(),
            standing: StandingStatus::Good,
        };
        assert!(render_advisor_prompt(&good, "q").contains("celebrating"));

        let none = render_advisor_prompt(&AdvisorContext::none(), "q");
        assert!(none.contains(NO_PROFILE_TEXT));
        assert!(!none.contains("FOCUS:"));
    }

    #[tokio::test]
    async fn tutor_without_index_skips_generation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let responder = Responder::new(&config_in(tmp.path()), Arc::new(UnitEmbedder), generator.clone());

        let answer = responder.answer(&Mode::Tutor, "What is osmosis?").await.unwrap();
        assert_eq!(answer, KNOWLEDGE_BASE_EMPTY);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn advisor_generates_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let responder = Responder::new(&config_in(tmp.path()), Arc::new(UnitEmbedder), generator.clone());

        let mode = Mode::Advisor(AdvisorContext::none());
        responder.answer(&mode, "Which class should I drop?").await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_generator_credential_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let responder = Responder::new(
            &config_in(tmp.path()),
            Arc::new(UnitEmbedder),
            Arc::new(DisabledGenerator::with_reason("GOOGLE_API_KEY environment variable not set")),
        );
        let err = responder
            .advisor_answer("hi", &AdvisorContext::none())
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config(ref m) if m.contains("GOOGLE_API_KEY")));
    }
}
