//! Report rendering.
//!
//! [`render`] is a pure projection of an [`AnalysisResult`] into a PDF
//! artifact held entirely in memory: nothing is staged on disk, and equal
//! inputs produce byte-identical output.

pub mod layout;
mod pdf;

pub use layout::{LineStyle, ReportDocument, ReportLine, layout};
pub use pdf::MAX_PAGES;

use cxlens_schema::AnalysisResult;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const REPORT_MEDIA_TYPE: &str = "application/pdf";
pub const REPORT_FILENAME: &str = "complexity_report.pdf";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("report would exceed {limit} pages")]
    TooManyPages { limit: usize },
}

/// Rendered report bytes with their fixed media type and filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    bytes: Vec<u8>,
    page_count: usize,
}

impl ReportArtifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn media_type(&self) -> &'static str {
        REPORT_MEDIA_TYPE
    }

    pub fn filename(&self) -> &'static str {
        REPORT_FILENAME
    }

    /// `sha256:<hex>` over the artifact bytes.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(&self.bytes);
        let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
        format!("sha256:{hex}")
    }
}

pub fn render(result: &AnalysisResult) -> Result<ReportArtifact, RenderError> {
    let doc = layout(result);
    let pages = pdf::paginate(&doc)?;
    let bytes = pdf::encode(&pages, layout::REPORT_TITLE);
    Ok(ReportArtifact {
        bytes,
        page_count: pages.len(),
    })
}
