//! # EduGuide
//!
//! A retrieval-augmented study assistant with two modes: a Socratic tutor
//! grounded in ingested course documents, and an academic advisor grounded
//! in a student's profile.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ Documents  │──▶│ Extract + Chunk  │──▶│ Vector index │
//! │ PDF/DOCX…  │   │     + Embed      │   │ (generations)│
//! └────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                │ top-K
//!   message ──▶ Safety ──▶ Responder ◀───────────┘
//!                  │       (tutor | advisor) ◀── Student profile
//!                  ▼            │
//!              referral     Generation
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! eduguide ingest notes/week1.pdf notes/week2.docx
//! eduguide ask "What is a derivative?"
//! eduguide ask "How am I doing?" --mode advisor --profile student_1
//! eduguide chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`profile`] | Student profile loading and rendering |
//! | [`safety`] | Crisis-language gate |
//! | [`extract`] | Per-page text extraction (PDF, DOCX, PPTX, text) |
//! | [`chunk`] | Overlapping fixed-size chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Text generation provider abstraction |
//! | [`index`] | Persisted vector index with atomic replacement |
//! | [`ingest`] | Ingestion pipeline |
//! | [`responder`] | Tutor and advisor answering |
//! | [`session`] | Chat transcript orchestration |
//! | [`progress`] | Ingestion progress reporting |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
mod http;
pub mod index;
pub mod ingest;
pub mod models;
pub mod profile;
pub mod progress;
pub mod responder;
pub mod safety;
pub mod session;
