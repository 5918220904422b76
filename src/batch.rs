//! Batch Orchestrator: drive the two-stage pipeline over an input directory.
//!
//! For each `.pdf` entry, in directory-listing order:
//!
//! 1. layout analysis → Markdown ([`crate::pipeline::layout`])
//! 2. field extraction → [`ExtractionRecord`] ([`crate::pipeline::llm`])
//!
//! Records are collected in memory and written as one JSON array only after
//! every file has been processed. An interrupted or aborted run writes
//! nothing.
//!
//! With the default `concurrency = 1` processing is strictly sequential: a
//! file's language-model call starts only after its layout analysis returned,
//! and the next file starts only after the previous record was appended.
//! Higher values overlap files but still emit records in listing order.

use crate::config::{DocumentServiceConfig, ExtractionConfig, LanguageModelConfig};
use crate::error::{Pdf2FieldsError, ServiceKind};
use crate::pipeline::input;
use crate::pipeline::layout::{self, AzureLayoutClient, LayoutAnalyzer};
use crate::pipeline::llm::{self, AzureOpenAiClient, ChatClient};
use crate::prompts;
use crate::record::{display_name, render_records, BatchOutput, BatchStats, ExtractionRecord};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Service handles and derived settings shared by every file in a run.
struct BatchContext<'a> {
    config: &'a ExtractionConfig,
    analyzer: Arc<dyn LayoutAnalyzer>,
    chat: Arc<dyn ChatClient>,
    system_prompt: String,
    total: usize,
}

/// What one file contributed to the batch.
struct FileOutcome {
    record: ExtractionRecord,
    prompt_tokens: u32,
    completion_tokens: u32,
    empty_content: bool,
}

/// Process every PDF in `config.input_dir` and return the records.
///
/// Nothing is written to disk; see [`run_batch_to_file`].
///
/// # Errors
/// The input directory cannot be listed, a service is not configured, or
/// (unless `continue_on_error` is set) any file hits a fatal error.
pub async fn run_batch(config: &ExtractionConfig) -> Result<BatchOutput, Pdf2FieldsError> {
    let start = Instant::now();
    info!("Starting batch over {}", config.input_dir.display());

    // ── Step 1: Enumerate inputs ─────────────────────────────────────────
    let files = input::list_pdf_files(&config.input_dir, config.suffix_match).await?;
    info!("Found {} PDF files", files.len());

    // ── Step 2: Resolve services ─────────────────────────────────────────
    let ctx = BatchContext {
        config,
        analyzer: resolve_layout_analyzer(config)?,
        chat: resolve_chat_client(config)?,
        system_prompt: config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::system_prompt(&config.fields)),
        total: files.len(),
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(files.len());
    }

    // ── Step 3: Run the pipeline per file ────────────────────────────────
    let outcomes = if config.concurrency <= 1 {
        process_sequential(&ctx, &files).await?
    } else {
        process_buffered(&ctx, &files).await?
    };

    // ── Step 4: Aggregate ────────────────────────────────────────────────
    let mut stats = BatchStats {
        total_files: files.len(),
        ..BatchStats::default()
    };
    let mut records = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome.record {
            ExtractionRecord::Extracted { .. } => stats.extracted += 1,
            ExtractionRecord::ParseFailed { .. } => stats.parse_failures += 1,
            ExtractionRecord::Failed { .. } => stats.errors += 1,
        }
        if outcome.empty_content {
            stats.empty_content += 1;
        }
        stats.total_prompt_tokens += u64::from(outcome.prompt_tokens);
        stats.total_completion_tokens += u64::from(outcome.completion_tokens);
        records.push(outcome.record);
    }
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Batch complete: {}/{} extracted, {} parse failures, {} errors, {}ms",
        stats.extracted, stats.total_files, stats.parse_failures, stats.errors, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(stats.total_files, stats.extracted);
    }

    Ok(BatchOutput { records, stats })
}

/// Run the batch and write the JSON array to `config.output_path`.
///
/// The file is replaced in full; nothing is written if the batch fails.
pub async fn run_batch_to_file(config: &ExtractionConfig) -> Result<BatchOutput, Pdf2FieldsError> {
    let output = run_batch(config).await?;
    write_output(&config.output_path, &output.records).await?;
    info!(
        "Wrote {} records to {}",
        output.records.len(),
        config.output_path.display()
    );
    Ok(output)
}

/// Synchronous wrapper around [`run_batch_to_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync(config: &ExtractionConfig) -> Result<BatchOutput, Pdf2FieldsError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2FieldsError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch_to_file(config))
}

/// Write `records` to `path` as a pretty-printed JSON array.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a
/// half-written array behind.
pub async fn write_output(path: &Path, records: &[ExtractionRecord]) -> Result<(), Pdf2FieldsError> {
    let bytes = render_records(records)?;
    let write_failed = |source: std::io::Error| Pdf2FieldsError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &bytes).await.map_err(write_failed)?;
    if let Err(source) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(source));
    }
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the layout analyzer, from most-specific to least-specific:
/// injected handle, explicit settings, then the environment.
fn resolve_layout_analyzer(
    config: &ExtractionConfig,
) -> Result<Arc<dyn LayoutAnalyzer>, Pdf2FieldsError> {
    if let Some(ref analyzer) = config.layout_analyzer {
        return Ok(Arc::clone(analyzer));
    }
    let settings = match config.document_service {
        Some(ref svc) => svc.clone(),
        None => DocumentServiceConfig::from_env()?,
    };
    require_endpoint(&settings.endpoint, ServiceKind::DocumentIntelligence)?;
    Ok(Arc::new(AzureLayoutClient::new(settings, config.api_timeout_secs)?))
}

/// Resolve the chat client with the same precedence as the layout analyzer.
fn resolve_chat_client(config: &ExtractionConfig) -> Result<Arc<dyn ChatClient>, Pdf2FieldsError> {
    if let Some(ref client) = config.chat_client {
        return Ok(Arc::clone(client));
    }
    let settings = match config.language_model {
        Some(ref llm) => llm.clone(),
        None => LanguageModelConfig::from_env()?,
    };
    require_endpoint(&settings.endpoint, ServiceKind::LanguageModel)?;
    if settings.deployment.trim().is_empty() {
        return Err(Pdf2FieldsError::ServiceNotConfigured {
            service: ServiceKind::LanguageModel,
            hint: "A deployment name is required.".into(),
        });
    }
    Ok(Arc::new(AzureOpenAiClient::new(settings, config.api_timeout_secs)?))
}

fn require_endpoint(endpoint: &str, service: ServiceKind) -> Result<(), Pdf2FieldsError> {
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        Ok(())
    } else {
        Err(Pdf2FieldsError::ServiceNotConfigured {
            service,
            hint: format!("Endpoint '{endpoint}' is not an http(s) URL."),
        })
    }
}

/// One file at a time, in listing order.
async fn process_sequential(
    ctx: &BatchContext<'_>,
    files: &[PathBuf],
) -> Result<Vec<FileOutcome>, Pdf2FieldsError> {
    let mut outcomes = Vec::with_capacity(files.len());
    for (i, path) in files.iter().enumerate() {
        outcomes.push(process_one(ctx, i + 1, path).await?);
    }
    Ok(outcomes)
}

/// Up to `concurrency` files in flight; `buffered` yields in input order.
async fn process_buffered(
    ctx: &BatchContext<'_>,
    files: &[PathBuf],
) -> Result<Vec<FileOutcome>, Pdf2FieldsError> {
    stream::iter(files.iter().enumerate())
        .map(|(i, path)| process_one(ctx, i + 1, path))
        .buffered(ctx.config.concurrency)
        .try_collect()
        .await
}

/// Run one file, applying the `continue_on_error` policy.
async fn process_one(
    ctx: &BatchContext<'_>,
    index: usize,
    path: &Path,
) -> Result<FileOutcome, Pdf2FieldsError> {
    let filename = display_name(path);
    match process_file(ctx, index, path, &filename).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            if let Some(ref cb) = ctx.config.progress_callback {
                cb.on_file_error(index, ctx.total, &filename, &e.to_string());
            }
            if ctx.config.continue_on_error {
                warn!("Failed to process {}: {}", filename, e);
                Ok(FileOutcome {
                    record: ExtractionRecord::Failed {
                        filename,
                        error: e.to_string(),
                    },
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    empty_content: false,
                })
            } else {
                error!("Failed to process {}: {}", filename, e);
                Err(e)
            }
        }
    }
}

async fn process_file(
    ctx: &BatchContext<'_>,
    index: usize,
    path: &Path,
    filename: &str,
) -> Result<FileOutcome, Pdf2FieldsError> {
    let cb = ctx.config.progress_callback.as_ref();
    info!("Processing {}...", filename);
    if let Some(cb) = cb {
        cb.on_file_start(index, ctx.total, filename);
    }

    let markdown = layout::extract_markdown(ctx.analyzer.as_ref(), path).await?;

    info!("OpenAI call started for {}...", filename);
    if let Some(cb) = cb {
        cb.on_field_extraction_start(filename, markdown.len());
    }

    let extraction = llm::extract_fields(
        ctx.chat.as_ref(),
        &ctx.system_prompt,
        &markdown,
        filename,
        ctx.config.coerce_values,
    )
    .await?;

    if let Some(cb) = cb {
        cb.on_file_complete(index, ctx.total, filename, extraction.record.is_success());
    }

    Ok(FileOutcome {
        record: extraction.record,
        prompt_tokens: extraction.prompt_tokens,
        completion_tokens: extraction.completion_tokens,
        empty_content: markdown.is_empty(),
    })
}
