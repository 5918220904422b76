//! Document Content Extractor: PDF → Markdown via a layout-analysis service.
//!
//! The service is reached through the [`LayoutAnalyzer`] trait so the batch
//! orchestrator never depends on a concrete HTTP client. [`AzureLayoutClient`]
//! is the production implementation, speaking the Azure AI Document
//! Intelligence REST protocol:
//!
//! ```text
//! POST {endpoint}/documentintelligence/documentModels/{model}:analyze
//!      ?api-version=…&outputContentFormat=markdown     {"base64Source": "…"}
//!   ← 202 Accepted, Operation-Location: <operation url>
//! GET  <operation url>                                  (repeat until done)
//!   ← {"status": "running"} … {"status": "succeeded", "analyzeResult": {"content": "…"}}
//! ```
//!
//! [`extract_markdown`] wraps the analyzer with the fallback rule: when the
//! service reports a failure or returns no content, the document continues
//! through the pipeline with an empty Markdown string.

use crate::config::DocumentServiceConfig;
use crate::error::{Pdf2FieldsError, ServiceKind};
use crate::pipeline::{ensure_success, retry_after_secs};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const SERVICE: ServiceKind = ServiceKind::DocumentIntelligence;

/// Header carrying the Document Intelligence subscription key.
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Turns a PDF into Markdown.
///
/// `Ok(None)` means the service finished but its result had no content.
#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(&self, pdf: &[u8]) -> Result<Option<String>, Pdf2FieldsError>;
}

/// Read `path` and run it through `analyzer`, degrading to `""` on
/// service-side failures.
///
/// File I/O errors and errors for which
/// [`Pdf2FieldsError::degrades_to_empty_content`] is false are returned.
pub async fn extract_markdown(
    analyzer: &dyn LayoutAnalyzer,
    path: &Path,
) -> Result<String, Pdf2FieldsError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| Pdf2FieldsError::FileReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    match analyzer.analyze(&bytes).await {
        Ok(Some(markdown)) => Ok(markdown),
        Ok(None) => {
            warn!("{}: layout analysis returned no content", path.display());
            Ok(String::new())
        }
        Err(e) if e.degrades_to_empty_content() => {
            warn!("{}: {}; continuing with empty content", path.display(), e);
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

// ── Azure Document Intelligence ──────────────────────────────────────────

/// REST client for Azure AI Document Intelligence.
pub struct AzureLayoutClient {
    http: reqwest::Client,
    config: DocumentServiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    base64_source: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: OperationStatus,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ServiceErrorBody>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AzureLayoutClient {
    /// Build a client whose individual HTTP requests time out after `timeout_secs`.
    pub fn new(config: DocumentServiceConfig, timeout_secs: u64) -> Result<Self, Pdf2FieldsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Pdf2FieldsError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Submit the document and return the operation URL to poll.
    async fn submit(&self, pdf: &[u8]) -> Result<String, Pdf2FieldsError> {
        let url = analyze_url(&self.config);
        let encoded = STANDARD.encode(pdf);
        debug!("Submitting {} bytes to {}", pdf.len(), url);

        let response = self
            .http
            .post(&url)
            .header(KEY_HEADER, &self.config.key)
            .json(&AnalyzeRequest {
                base64_source: &encoded,
            })
            .send()
            .await
            .map_err(|e| Pdf2FieldsError::transport(SERVICE, e))?;
        let response = ensure_success(SERVICE, response).await?;

        response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(Pdf2FieldsError::MissingOperationLocation)
    }

    /// Poll the operation until it reaches a terminal state.
    async fn await_result(&self, operation_url: &str) -> Result<Option<String>, Pdf2FieldsError> {
        let budget = self.config.analysis_timeout_secs;
        let deadline = Instant::now() + Duration::from_secs(budget);
        let default_wait = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            let response = self
                .http
                .get(operation_url)
                .header(KEY_HEADER, &self.config.key)
                .send()
                .await
                .map_err(|e| Pdf2FieldsError::transport(SERVICE, e))?;
            let response = ensure_success(SERVICE, response).await?;
            let wait = retry_after_secs(response.headers())
                .map(Duration::from_secs)
                .unwrap_or(default_wait);
            let body = response
                .text()
                .await
                .map_err(|e| Pdf2FieldsError::transport(SERVICE, e))?;

            if let Some(result) = interpret_operation(&body)? {
                return Ok(result);
            }

            if Instant::now() + wait > deadline {
                return Err(Pdf2FieldsError::AnalysisTimeout { secs: budget });
            }
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl LayoutAnalyzer for AzureLayoutClient {
    async fn analyze(&self, pdf: &[u8]) -> Result<Option<String>, Pdf2FieldsError> {
        let start = std::time::Instant::now();
        let operation_url = self.submit(pdf).await?;
        let content = self.await_result(&operation_url).await?;
        info!(
            "Layout analysis finished in {}ms ({} chars)",
            start.elapsed().as_millis(),
            content.as_deref().map_or(0, str::len)
        );
        Ok(content)
    }
}

/// Analyze endpoint for the configured model, requesting Markdown output.
fn analyze_url(config: &DocumentServiceConfig) -> String {
    format!(
        "{}/documentintelligence/documentModels/{}:analyze?api-version={}&outputContentFormat=markdown",
        config.endpoint.trim_end_matches('/'),
        config.model_id,
        config.api_version
    )
}

/// Decode one poll response.
///
/// `Ok(None)` while the operation is still running, `Ok(Some(content))` once
/// it succeeded, `Err(AnalysisFailed)` when the service gave up.
fn interpret_operation(body: &str) -> Result<Option<Option<String>>, Pdf2FieldsError> {
    let op: AnalyzeOperation =
        serde_json::from_str(body).map_err(|e| Pdf2FieldsError::InvalidServiceResponse {
            service: SERVICE,
            detail: format!("analyze operation: {e}"),
        })?;

    match op.status {
        OperationStatus::NotStarted | OperationStatus::Running | OperationStatus::Unknown => {
            Ok(None)
        }
        OperationStatus::Succeeded => Ok(Some(
            op.analyze_result
                .and_then(|r| r.content)
                .filter(|c| !c.is_empty()),
        )),
        OperationStatus::Failed | OperationStatus::Canceled => {
            let detail = op
                .error
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.code.unwrap_or_else(|| "Unknown".into()),
                        e.message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| format!("operation status {:?}", op.status));
            Err(Pdf2FieldsError::AnalysisFailed { detail })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fake_http::{FakeServer, Reply as HttpReply};
    use std::io::Write;

    enum Reply {
        Content(&'static str),
        NoContent,
        Fail(fn() -> Pdf2FieldsError),
    }

    struct MockAnalyzer(Reply);

    #[async_trait]
    impl LayoutAnalyzer for MockAnalyzer {
        async fn analyze(&self, _pdf: &[u8]) -> Result<Option<String>, Pdf2FieldsError> {
            match &self.0 {
                Reply::Content(s) => Ok(Some(s.to_string())),
                Reply::NoContent => Ok(None),
                Reply::Fail(make) => Err(make()),
            }
        }
    }

    fn pdf_file() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        f
    }

    #[tokio::test]
    async fn returns_service_markdown() {
        let f = pdf_file();
        let md = extract_markdown(&MockAnalyzer(Reply::Content("# Invoice")), f.path())
            .await
            .unwrap();
        assert_eq!(md, "# Invoice");
    }

    #[tokio::test]
    async fn missing_content_becomes_empty_string() {
        let f = pdf_file();
        let md = extract_markdown(&MockAnalyzer(Reply::NoContent), f.path())
            .await
            .unwrap();
        assert_eq!(md, "");
    }

    #[tokio::test]
    async fn service_side_failure_becomes_empty_string() {
        let f = pdf_file();
        let analyzer = MockAnalyzer(Reply::Fail(|| Pdf2FieldsError::AnalysisFailed {
            detail: "InvalidContent".into(),
        }));
        let md = tokio_test::assert_ok!(extract_markdown(&analyzer, f.path()).await);
        assert!(md.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_is_propagated() {
        let f = pdf_file();
        let analyzer = MockAnalyzer(Reply::Fail(|| Pdf2FieldsError::AuthError {
            service: SERVICE,
            status: 401,
            detail: "bad key".into(),
        }));
        let err = tokio_test::assert_err!(extract_markdown(&analyzer, f.path()).await);
        assert!(matches!(err, Pdf2FieldsError::AuthError { .. }));
    }

    #[tokio::test]
    async fn unreadable_file_is_propagated() {
        let err = extract_markdown(
            &MockAnalyzer(Reply::Content("x")),
            Path::new("/definitely/not/here.pdf"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2FieldsError::FileReadFailed { .. }));
    }

    #[test]
    fn analyze_url_trims_trailing_slash() {
        let cfg = DocumentServiceConfig::new("https://di.example.com/", "k");
        assert_eq!(
            analyze_url(&cfg),
            "https://di.example.com/documentintelligence/documentModels/prebuilt-layout:analyze\
             ?api-version=2024-11-30&outputContentFormat=markdown"
        );
    }

    #[test]
    fn request_body_uses_base64_source() {
        let body = serde_json::to_string(&AnalyzeRequest {
            base64_source: "JVBERg==",
        })
        .unwrap();
        assert_eq!(body, r#"{"base64Source":"JVBERg=="}"#);
    }

    #[test]
    fn running_operation_is_not_terminal() {
        assert_eq!(interpret_operation(r#"{"status":"running"}"#).unwrap(), None);
        assert_eq!(interpret_operation(r#"{"status":"notStarted"}"#).unwrap(), None);
    }

    #[test]
    fn succeeded_operation_yields_content() {
        let body = r##"{"status":"succeeded","analyzeResult":{"content":"# Title\n\n| a | b |"}}"##;
        assert_eq!(
            interpret_operation(body).unwrap(),
            Some(Some("# Title\n\n| a | b |".to_string()))
        );
    }

    #[test]
    fn succeeded_without_content_yields_none() {
        let body = r#"{"status":"succeeded","analyzeResult":{"pages":[]}}"#;
        assert_eq!(interpret_operation(body).unwrap(), Some(None));
        let empty = r#"{"status":"succeeded","analyzeResult":{"content":""}}"#;
        assert_eq!(interpret_operation(empty).unwrap(), Some(None));
    }

    #[test]
    fn failed_operation_carries_service_error() {
        let body = r#"{"status":"failed","error":{"code":"InvalidRequest","message":"corrupt file"}}"#;
        let err = interpret_operation(body).unwrap_err();
        assert!(err.degrades_to_empty_content());
        assert!(err.to_string().contains("corrupt file"), "got: {err}");
    }

    #[test]
    fn garbage_poll_body_is_invalid_response() {
        let err = interpret_operation("<html>").unwrap_err();
        assert!(matches!(err, Pdf2FieldsError::InvalidServiceResponse { .. }));
    }

    // ── AzureLayoutClient against a loopback server ──────────────────────

    fn client_for(url: &str, poll_interval_ms: u64, timeout_secs: u64) -> AzureLayoutClient {
        let mut cfg = DocumentServiceConfig::new(url, "di-key");
        cfg.poll_interval_ms = poll_interval_ms;
        cfg.analysis_timeout_secs = timeout_secs;
        AzureLayoutClient::new(cfg, 10).unwrap()
    }

    #[tokio::test]
    async fn submit_then_poll_until_succeeded() {
        let server = FakeServer::bind().await;
        let client = client_for(&server.url, 1, 30);
        let op_url = format!("{}/op/1", server.url);
        let seen = server.serve(vec![
            HttpReply::new(202).header("Operation-Location", &op_url),
            HttpReply::new(200).json(r#"{"status":"running"}"#),
            HttpReply::new(200).json(r##"{"status":"succeeded","analyzeResult":{"content":"# Hi"}}"##),
        ]);

        let f = pdf_file();
        let md = extract_markdown(&client, f.path()).await.unwrap();
        assert_eq!(md, "# Hi");

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert!(
            seen[0].line.starts_with(
                "POST /documentintelligence/documentModels/prebuilt-layout:analyze\
                 ?api-version=2024-11-30&outputContentFormat=markdown "
            ),
            "got: {}",
            seen[0].line
        );
        assert_eq!(seen[0].header("ocp-apim-subscription-key"), Some("di-key"));
        assert_eq!(
            seen[0].body,
            format!(r#"{{"base64Source":"{}"}}"#, STANDARD.encode(b"%PDF-1.7\n"))
        );
        for poll in &seen[1..] {
            assert!(poll.line.starts_with("GET /op/1 "), "got: {}", poll.line);
            assert_eq!(poll.header("ocp-apim-subscription-key"), Some("di-key"));
        }
    }

    #[tokio::test]
    async fn retry_after_overrides_poll_interval() {
        let server = FakeServer::bind().await;
        // A one-minute default interval; Retry-After: 0 must win.
        let client = client_for(&server.url, 60_000, 30);
        let op_url = format!("{}/op/2", server.url);
        server.serve(vec![
            HttpReply::new(202).header("Operation-Location", &op_url),
            HttpReply::new(200)
                .header("Retry-After", "0")
                .json(r#"{"status":"notStarted"}"#),
            HttpReply::new(200).json(r#"{"status":"succeeded","analyzeResult":{"content":"ok"}}"#),
        ]);

        let result = tokio::time::timeout(Duration::from_secs(10), client.analyze(b"%PDF")).await;
        let content = tokio_test::assert_ok!(result.expect("poll ignored Retry-After"));
        assert_eq!(content.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn accepted_without_operation_location_degrades() {
        let server = FakeServer::bind().await;
        let client = client_for(&server.url, 1, 30);
        server.serve(vec![HttpReply::new(202)]);

        let err = client.analyze(b"%PDF").await.unwrap_err();
        assert!(matches!(err, Pdf2FieldsError::MissingOperationLocation));

        let server = FakeServer::bind().await;
        let client = client_for(&server.url, 1, 30);
        server.serve(vec![HttpReply::new(202)]);
        let f = pdf_file();
        assert_eq!(extract_markdown(&client, f.path()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn stuck_operation_times_out_to_empty_content() {
        let server = FakeServer::bind().await;
        let client = client_for(&server.url, 1, 0);
        let op_url = format!("{}/op/3", server.url);
        let seen = server.serve(vec![
            HttpReply::new(202).header("Operation-Location", &op_url),
            HttpReply::new(200).json(r#"{"status":"running"}"#),
        ]);

        let f = pdf_file();
        assert_eq!(extract_markdown(&client, f.path()).await.unwrap(), "");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn server_error_on_submit_degrades() {
        let server = FakeServer::bind().await;
        let client = client_for(&server.url, 1, 30);
        server.serve(vec![
            HttpReply::new(400).json(r#"{"error":{"code":"InvalidContent","message":"corrupt"}}"#),
        ]);

        let f = pdf_file();
        assert_eq!(extract_markdown(&client, f.path()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn bad_subscription_key_is_fatal() {
        let server = FakeServer::bind().await;
        let client = client_for(&server.url, 1, 30);
        server.serve(vec![HttpReply::new(401).json(r#"{"error":{"code":"401"}}"#)]);

        let f = pdf_file();
        let err = extract_markdown(&client, f.path()).await.unwrap_err();
        assert!(matches!(
            err,
            Pdf2FieldsError::AuthError {
                service: ServiceKind::DocumentIntelligence,
                status: 401,
                ..
            }
        ));
    }
}
