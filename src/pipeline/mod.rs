//! Internal pipeline stages.
//!
//! ```text
//! input dir ──► input::list_pdf_files
//!                   │  (per file, in listing order)
//!                   ▼
//!              layout::extract_markdown      PDF → Markdown (layout service)
//!                   │
//!                   ▼
//!              llm::extract_fields           Markdown → ExtractionRecord (language model)
//! ```
//!
//! Each stage is independently testable. The public entry points in
//! [`crate::batch`] compose them.

pub mod input;
pub mod layout;
pub mod llm;

use crate::error::{Pdf2FieldsError, ServiceKind};
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Pass a successful response through; turn any other status into an error.
pub(crate) async fn ensure_success(
    service: ServiceKind,
    response: reqwest::Response,
) -> Result<reqwest::Response, Pdf2FieldsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after_secs(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(Pdf2FieldsError::from_status(
        service,
        status.as_u16(),
        body,
        retry_after,
    ))
}

/// `Retry-After` in whole seconds, when present and numeric.
pub(crate) fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}
