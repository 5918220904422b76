//! Error types for the pdf2fields library.
//!
//! There is one fatal error type, [`Pdf2FieldsError`], but not every variant
//! is treated as fatal by the pipeline:
//!
//! * **Layout degradation**: the layout-analysis service answered but could
//!   not produce content (operation `failed`, HTTP 4xx/5xx other than auth,
//!   polling timeout). [`Pdf2FieldsError::degrades_to_empty_content`] returns
//!   `true`; the content extractor logs a warning and hands an empty Markdown
//!   string to the field extractor.
//!
//! * **Everything else**: transport failures, bad credentials, rate
//!   limiting, file I/O, unreadable service envelopes. These abort the batch
//!   (or, with `continue_on_error`, become a per-file failure record).
//!
//! A model reply that is not valid JSON is **not** an error at all: it is the
//! [`crate::record::ExtractionRecord::ParseFailed`] variant.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which external collaborator an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Document layout-analysis service (Azure AI Document Intelligence).
    DocumentIntelligence,
    /// Language-model service (Azure OpenAI chat completions).
    LanguageModel,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::DocumentIntelligence => write!(f, "document-intelligence"),
            ServiceKind::LanguageModel => write!(f, "azure-openai"),
        }
    }
}

/// All errors returned by the pdf2fields library.
#[derive(Debug, Error)]
pub enum Pdf2FieldsError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The configured input directory does not exist.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is a directory.")]
    InputDirNotFound { path: PathBuf },

    /// The input directory exists but could not be listed.
    #[error("Failed to list input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A matched PDF could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Service errors ────────────────────────────────────────────────────
    /// The service is not configured (missing endpoint, key or deployment).
    #[error("Service '{service}' is not configured.\n{hint}")]
    ServiceNotConfigured { service: ServiceKind, hint: String },

    /// The request never produced an HTTP response (DNS, TLS, connect, timeout).
    #[error("Request to '{service}' failed: {detail}")]
    Transport { service: ServiceKind, detail: String },

    /// HTTP 401/403; retrying will not help.
    #[error("Authentication error from '{service}' (HTTP {status}): {detail}")]
    AuthError {
        service: ServiceKind,
        status: u16,
        detail: String,
    },

    /// HTTP 429.
    #[error("Rate limit exceeded for '{service}'")]
    RateLimitExceeded {
        service: ServiceKind,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success HTTP status.
    #[error("'{service}' returned HTTP {status}: {body}")]
    ServiceError {
        service: ServiceKind,
        status: u16,
        body: String,
    },

    /// The analysis operation finished with status `failed` or `canceled`.
    #[error("Layout analysis failed: {detail}")]
    AnalysisFailed { detail: String },

    /// The analysis operation did not finish within the configured budget.
    #[error("Layout analysis did not complete within {secs}s")]
    AnalysisTimeout { secs: u64 },

    /// The submit call was accepted but carried no `Operation-Location` header.
    #[error("Layout analysis was accepted but no Operation-Location header was returned")]
    MissingOperationLocation,

    /// The HTTP body could not be decoded into the expected envelope.
    #[error("Unexpected response from '{service}': {detail}")]
    InvalidServiceResponse { service: ServiceKind, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not serialise the batch result.
    #[error("Failed to serialise results: {0}")]
    OutputSerializeFailed(#[from] serde_json::Error),

    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2FieldsError {
    /// Whether the content extractor should swallow this error and continue
    /// with empty Markdown.
    ///
    /// Only failures reported *by* the layout service qualify. Transport and
    /// credential problems are fatal: they would hit every following file too.
    pub fn degrades_to_empty_content(&self) -> bool {
        match self {
            Pdf2FieldsError::ServiceError { service, .. } => {
                *service == ServiceKind::DocumentIntelligence
            }
            Pdf2FieldsError::AnalysisFailed { .. }
            | Pdf2FieldsError::AnalysisTimeout { .. }
            | Pdf2FieldsError::MissingOperationLocation => true,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to the matching variant.
    pub(crate) fn from_status(
        service: ServiceKind,
        status: u16,
        body: String,
        retry_after_secs: Option<u64>,
    ) -> Self {
        match status {
            401 | 403 => Pdf2FieldsError::AuthError {
                service,
                status,
                detail: body,
            },
            429 => Pdf2FieldsError::RateLimitExceeded {
                service,
                retry_after_secs,
            },
            _ => Pdf2FieldsError::ServiceError {
                service,
                status,
                body,
            },
        }
    }

    /// Map a `reqwest` error that happened before a status was available.
    pub(crate) fn transport(service: ServiceKind, err: reqwest::Error) -> Self {
        let detail = if err.is_timeout() {
            format!("timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Pdf2FieldsError::Transport { service, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_service_errors_degrade() {
        let e = Pdf2FieldsError::ServiceError {
            service: ServiceKind::DocumentIntelligence,
            status: 400,
            body: "InvalidContent".into(),
        };
        assert!(e.degrades_to_empty_content());
        assert!(Pdf2FieldsError::AnalysisFailed { detail: "x".into() }.degrades_to_empty_content());
        assert!(Pdf2FieldsError::AnalysisTimeout { secs: 5 }.degrades_to_empty_content());
        assert!(Pdf2FieldsError::MissingOperationLocation.degrades_to_empty_content());
    }

    #[test]
    fn language_model_service_errors_are_fatal() {
        let e = Pdf2FieldsError::ServiceError {
            service: ServiceKind::LanguageModel,
            status: 500,
            body: "oops".into(),
        };
        assert!(!e.degrades_to_empty_content());
    }

    #[test]
    fn from_status_classifies_auth_and_rate_limit() {
        let auth = Pdf2FieldsError::from_status(
            ServiceKind::DocumentIntelligence,
            401,
            "bad key".into(),
            None,
        );
        assert!(matches!(auth, Pdf2FieldsError::AuthError { status: 401, .. }));
        assert!(!auth.degrades_to_empty_content());

        let limited =
            Pdf2FieldsError::from_status(ServiceKind::LanguageModel, 429, String::new(), Some(7));
        assert!(matches!(
            limited,
            Pdf2FieldsError::RateLimitExceeded {
                retry_after_secs: Some(7),
                ..
            }
        ));

        let other = Pdf2FieldsError::from_status(ServiceKind::LanguageModel, 502, "gw".into(), None);
        assert!(matches!(other, Pdf2FieldsError::ServiceError { status: 502, .. }));
    }

    #[test]
    fn auth_error_display() {
        let e = Pdf2FieldsError::AuthError {
            service: ServiceKind::LanguageModel,
            status: 401,
            detail: "invalid key".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("azure-openai"), "got: {msg}");
        assert!(msg.contains("invalid key"), "got: {msg}");
    }

    #[test]
    fn analysis_timeout_display() {
        let e = Pdf2FieldsError::AnalysisTimeout { secs: 300 };
        assert!(e.to_string().contains("300s"));
    }
}
