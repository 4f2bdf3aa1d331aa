//! Output types: sections, the persisted result document, and run stats.

use serde::{Deserialize, Serialize};

/// A labelled, inclusive page interval (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub name: String,
    pub start_page: u32,
    pub end_page: u32,
}

impl Section {
    pub fn new(name: impl Into<String>, start_page: u32, end_page: u32) -> Self {
        Self {
            name: name.into(),
            start_page,
            end_page,
        }
    }

    /// Number of pages covered, counting both ends.
    pub fn page_count(&self) -> u32 {
        self.end_page.saturating_sub(self.start_page) + 1
    }
}

/// The document written to disk: `{"sections": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionReport {
    pub sections: Vec<Section>,
}

/// Result of a full classification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationOutput {
    /// Final reconciled sections, sorted by start page. May be empty.
    pub sections: Vec<Section>,
    pub stats: ClassificationStats,
}

impl ClassificationOutput {
    /// The persisted form of the result, without stats.
    pub fn report(&self) -> SectionReport {
        SectionReport {
            sections: self.sections.clone(),
        }
    }
}

/// Counters and timings gathered while classifying one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Batches that produced a preview image and were sent for extraction.
    pub batches: usize,
    /// Batches whose text slot holds an error marker.
    pub failed_batches: usize,
    /// HTTP responses received from the backend (retries included).
    pub api_requests: u64,
    /// Chunk count of the strategy that produced the sections, if any.
    pub strategy_chunks: Option<usize>,
    pub render_duration_ms: u64,
    pub vision_duration_ms: u64,
    pub structure_duration_ms: u64,
    pub total_duration_ms: u64,
}
