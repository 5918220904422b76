//! Configuration types for a batch extraction run.
//!
//! Everything a run needs lives in one [`ExtractionConfig`], built once at
//! process start and passed by reference into each pipeline stage. Nothing is
//! read from ambient globals after that point; the CLI and the tests build
//! the same struct.

use crate::error::{Pdf2FieldsError, ServiceKind};
use crate::pipeline::layout::LayoutAnalyzer;
use crate::pipeline::llm::ChatClient;
use crate::progress::ProgressCallback;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Target Field Set used when none is configured.
pub const DEFAULT_FIELDS: [&str; 4] = ["invoice_number", "MAWB", "HAWB", "Name"];

/// Name of the aggregate output file, relative to the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "output.json";

/// Prebuilt layout model that renders tables and headings to Markdown.
pub const DEFAULT_LAYOUT_MODEL: &str = "prebuilt-layout";

/// Document Intelligence REST API version.
pub const DEFAULT_DOCUMENT_API_VERSION: &str = "2024-11-30";

/// Azure OpenAI API version; needs to be recent enough for JSON mode.
pub const DEFAULT_OPENAI_API_VERSION: &str = "2025-01-01-preview";

/// Environment variables consumed by [`DocumentServiceConfig::from_env`].
pub const ENV_DOCUMENT_ENDPOINT: &str = "DOCUMENT_INTELLIGENCE_ENDPOINT";
pub const ENV_DOCUMENT_KEY: &str = "DOCUMENT_INTELLIGENCE_KEY";

/// Environment variables consumed by [`LanguageModelConfig::from_env`].
pub const ENV_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_OPENAI_KEY: &str = "AZURE_OPENAI_KEY";
pub const ENV_OPENAI_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";

/// How the `.pdf` suffix filter compares file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixMatch {
    /// Only names ending in exactly `.pdf`. `report.PDF` is skipped (default).
    #[default]
    CaseSensitive,
    /// Any capitalisation of `.pdf`.
    IgnoreCase,
}

impl SuffixMatch {
    /// Whether `name` passes the filter.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            SuffixMatch::CaseSensitive => name.ends_with(".pdf"),
            SuffixMatch::IgnoreCase => name.to_ascii_lowercase().ends_with(".pdf"),
        }
    }
}

/// Connection settings for the layout-analysis service.
#[derive(Clone)]
pub struct DocumentServiceConfig {
    /// Resource endpoint, e.g. `https://my-resource.cognitiveservices.azure.com/`.
    pub endpoint: String,
    /// Subscription key sent as `Ocp-Apim-Subscription-Key`.
    pub key: String,
    /// Model used for analysis. Default: `prebuilt-layout`.
    pub model_id: String,
    pub api_version: String,
    /// Delay between polls when the service sends no `Retry-After`. Default: 1000.
    pub poll_interval_ms: u64,
    /// Give up polling after this long. Default: 300.
    pub analysis_timeout_secs: u64,
}

impl DocumentServiceConfig {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            model_id: DEFAULT_LAYOUT_MODEL.to_string(),
            api_version: DEFAULT_DOCUMENT_API_VERSION.to_string(),
            poll_interval_ms: 1000,
            analysis_timeout_secs: 300,
        }
    }

    /// Read endpoint and key from `DOCUMENT_INTELLIGENCE_ENDPOINT` / `_KEY`.
    pub fn from_env() -> Result<Self, Pdf2FieldsError> {
        let endpoint = require_env(ENV_DOCUMENT_ENDPOINT, ServiceKind::DocumentIntelligence)?;
        let key = require_env(ENV_DOCUMENT_KEY, ServiceKind::DocumentIntelligence)?;
        Ok(Self::new(endpoint, key))
    }
}

impl fmt::Debug for DocumentServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("api_version", &self.api_version)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("analysis_timeout_secs", &self.analysis_timeout_secs)
            .finish()
    }
}

/// Connection settings for the language-model service.
#[derive(Clone)]
pub struct LanguageModelConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com/`.
    pub endpoint: String,
    /// API key sent as `api-key`.
    pub key: String,
    /// Deployment name; also sent as the request `model`.
    pub deployment: String,
    pub api_version: String,
    /// Sampling temperature. `None` leaves the service default in place.
    pub temperature: Option<f32>,
}

impl LanguageModelConfig {
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_OPENAI_API_VERSION.to_string(),
            temperature: None,
        }
    }

    /// Read endpoint, key and deployment from the `AZURE_OPENAI_*` variables.
    pub fn from_env() -> Result<Self, Pdf2FieldsError> {
        let endpoint = require_env(ENV_OPENAI_ENDPOINT, ServiceKind::LanguageModel)?;
        let key = require_env(ENV_OPENAI_KEY, ServiceKind::LanguageModel)?;
        let deployment = require_env(ENV_OPENAI_DEPLOYMENT, ServiceKind::LanguageModel)?;
        Ok(Self::new(endpoint, key, deployment))
    }
}

impl fmt::Debug for LanguageModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageModelConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("temperature", &self.temperature)
            .finish()
    }
}

fn require_env(name: &str, service: ServiceKind) -> Result<String, Pdf2FieldsError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Pdf2FieldsError::ServiceNotConfigured {
            service,
            hint: format!("Set the {name} environment variable."),
        }),
    }
}

/// Configuration for one batch run.
///
/// Built via [`ExtractionConfig::builder()`].
///
/// # Example
/// ```rust
/// use pdf2fields::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .input_dir("./invoices")
///     .fields(["invoice_number", "total"])
///     .build()
///     .unwrap();
/// assert_eq!(config.fields.len(), 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Directory scanned (non-recursively) for PDFs.
    pub input_dir: PathBuf,

    /// Where the JSON array is written. Default: `output.json`.
    pub output_path: PathBuf,

    /// Target Field Set, in prompt order. Identical for every document.
    pub fields: Vec<String>,

    /// `.pdf` suffix comparison. Default: case-sensitive.
    pub suffix_match: SuffixMatch,

    /// Number of files in flight at once. Default: 1 (strictly sequential).
    ///
    /// Values above 1 still emit records in directory-listing order.
    pub concurrency: usize,

    /// Turn non-string scalar values into strings on receipt. Default: true.
    pub coerce_values: bool,

    /// Record per-file fatal errors and keep going. Default: false.
    ///
    /// When off, the first transport/auth/I/O error aborts the run and no
    /// output file is written.
    pub continue_on_error: bool,

    /// Replaces the prompt built from `fields` when set.
    pub system_prompt: Option<String>,

    /// Per-HTTP-request timeout for both services. Default: 120.
    pub api_timeout_secs: u64,

    /// Layout-analysis service settings. If None, read from the environment.
    pub document_service: Option<DocumentServiceConfig>,

    /// Language-model service settings. If None, read from the environment.
    pub language_model: Option<LanguageModelConfig>,

    /// Pre-constructed layout analyzer. Takes precedence over `document_service`.
    pub layout_analyzer: Option<Arc<dyn LayoutAnalyzer>>,

    /// Pre-constructed chat client. Takes precedence over `language_model`.
    pub chat_client: Option<Arc<dyn ChatClient>>,

    /// Receives per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            fields: DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect(),
            suffix_match: SuffixMatch::default(),
            concurrency: 1,
            coerce_values: true,
            continue_on_error: false,
            system_prompt: None,
            api_timeout_secs: 120,
            document_service: None,
            language_model: None,
            layout_analyzer: None,
            chat_client: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("input_dir", &self.input_dir)
            .field("output_path", &self.output_path)
            .field("fields", &self.fields)
            .field("suffix_match", &self.suffix_match)
            .field("concurrency", &self.concurrency)
            .field("coerce_values", &self.coerce_values)
            .field("continue_on_error", &self.continue_on_error)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("document_service", &self.document_service)
            .field("language_model", &self.language_model)
            .field(
                "layout_analyzer",
                &self.layout_analyzer.as_ref().map(|_| "<dyn LayoutAnalyzer>"),
            )
            .field("chat_client", &self.chat_client.as_ref().map(|_| "<dyn ChatClient>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn suffix_match(mut self, m: SuffixMatch) -> Self {
        self.config.suffix_match = m;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn coerce_values(mut self, v: bool) -> Self {
        self.config.coerce_values = v;
        self
    }

    pub fn continue_on_error(mut self, v: bool) -> Self {
        self.config.continue_on_error = v;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn document_service(mut self, svc: DocumentServiceConfig) -> Self {
        self.config.document_service = Some(svc);
        self
    }

    pub fn language_model(mut self, llm: LanguageModelConfig) -> Self {
        self.config.language_model = Some(llm);
        self
    }

    pub fn layout_analyzer(mut self, analyzer: Arc<dyn LayoutAnalyzer>) -> Self {
        self.config.layout_analyzer = Some(analyzer);
        self
    }

    pub fn chat_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.config.chat_client = Some(client);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2FieldsError> {
        let c = &self.config;
        if c.fields.is_empty() {
            return Err(Pdf2FieldsError::InvalidConfig(
                "At least one target field is required".into(),
            ));
        }
        if c.fields.iter().any(|f| f.trim().is_empty()) {
            return Err(Pdf2FieldsError::InvalidConfig(
                "Target field names must not be blank".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = c.fields.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(Pdf2FieldsError::InvalidConfig(format!(
                "Duplicate target field '{dup}'"
            )));
        }
        if c.fields.iter().any(|f| f == "filename") {
            return Err(Pdf2FieldsError::InvalidConfig(
                "'filename' is reserved for the source file name".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Pdf2FieldsError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if let Some(ref svc) = c.document_service {
            if svc.poll_interval_ms == 0 {
                return Err(Pdf2FieldsError::InvalidConfig(
                    "Poll interval must be ≥ 1ms".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_program() {
        let c = ExtractionConfig::default();
        assert_eq!(c.fields, vec!["invoice_number", "MAWB", "HAWB", "Name"]);
        assert_eq!(c.output_path, PathBuf::from("output.json"));
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.suffix_match, SuffixMatch::CaseSensitive);
        assert!(!c.continue_on_error);
    }

    #[test]
    fn suffix_match_case_sensitivity() {
        assert!(SuffixMatch::CaseSensitive.matches("a.pdf"));
        assert!(!SuffixMatch::CaseSensitive.matches("a.PDF"));
        assert!(!SuffixMatch::CaseSensitive.matches("notes.txt"));
        assert!(SuffixMatch::IgnoreCase.matches("a.PDF"));
        assert!(SuffixMatch::IgnoreCase.matches("a.Pdf"));
        assert!(!SuffixMatch::IgnoreCase.matches("a.pdf.txt"));
    }

    #[test]
    fn build_rejects_empty_and_duplicate_fields() {
        let empty = ExtractionConfig::builder().fields(Vec::<String>::new()).build();
        assert!(matches!(empty, Err(Pdf2FieldsError::InvalidConfig(_))));

        let dup = ExtractionConfig::builder().fields(["a", "b", "a"]).build();
        match dup {
            Err(Pdf2FieldsError::InvalidConfig(msg)) => assert!(msg.contains("'a'"), "got: {msg}"),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }

        let blank = ExtractionConfig::builder().fields(["a", "  "]).build();
        assert!(blank.is_err());

        let reserved = ExtractionConfig::builder().fields(["filename"]).build();
        assert!(reserved.is_err());
    }

    #[test]
    fn build_rejects_zero_concurrency() {
        assert!(ExtractionConfig::builder().concurrency(0).build().is_err());
        assert!(ExtractionConfig::builder().concurrency(4).build().is_ok());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let config = ExtractionConfig::builder()
            .document_service(DocumentServiceConfig::new("https://di.example", "di-secret"))
            .language_model(LanguageModelConfig::new("https://oai.example", "oai-secret", "gpt-4o"))
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("di-secret"));
        assert!(!dbg.contains("oai-secret"));
        assert!(dbg.contains("gpt-4o"));
    }
}
