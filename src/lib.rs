//! # pdf2fields
//!
//! Batch-extract a fixed set of named fields from PDF documents into JSON.
//!
//! Each PDF in an input directory goes through two external services:
//! a layout-analysis service renders it to Markdown (text, headings and
//! tables), then a language model configured for JSON output picks the
//! target fields out of that Markdown. One record per PDF is collected and
//! the whole batch is written as a single JSON array.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. List    non-recursive scan, keep names ending in ".pdf"
//!  ├─ 2. Layout  PDF → Markdown (Azure AI Document Intelligence, submit + poll)
//!  ├─ 3. Fields  Markdown → JSON object (Azure OpenAI, JSON mode)
//!  └─ 4. Output  records → output.json (4-space pretty JSON array)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2fields::{run_batch_to_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from DOCUMENT_INTELLIGENCE_* and AZURE_OPENAI_* variables.
//!     let config = ExtractionConfig::builder()
//!         .input_dir("./scans")
//!         .fields(["invoice_number", "MAWB", "HAWB", "Name"])
//!         .build()?;
//!     let output = run_batch_to_file(&config).await?;
//!     eprintln!("{} records, {} parse failures",
//!         output.records.len(),
//!         output.stats.parse_failures);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure behaviour
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Layout service reports a failure / no content | empty Markdown, pipeline continues |
//! | Model reply is not a JSON object | `{"error": "Failed to parse JSON", "filename": …}` |
//! | Network, credentials, rate limit, file I/O | run aborts, no output file |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2fields` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, run_batch_sync, run_batch_to_file, write_output};
pub use config::{
    DocumentServiceConfig, ExtractionConfig, ExtractionConfigBuilder, LanguageModelConfig,
    SuffixMatch,
};
pub use error::{Pdf2FieldsError, ServiceKind};
pub use pipeline::layout::{AzureLayoutClient, LayoutAnalyzer};
pub use pipeline::llm::{AzureOpenAiClient, ChatClient, ChatCompletion, ChatMessage};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{BatchOutput, BatchStats, ExtractionRecord, PARSE_FAILURE_MESSAGE};
