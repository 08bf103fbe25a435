//! Markdown report assembly.
//!
//! ```text
//! # OCR Results for <display_name>
//!
//! **Engine:** <engine>
//! **Processing Time:** <secs>s
//! **Pages:** <n>
//! **SHA-256:** `<hash>`
//! **Request ID:** `<id>`
//!
//! ## Extracted Text
//!
//! ========== PAGE 1 ==========
//! <text>
//! ```

use std::fmt::Write as _;
use std::time::Duration;

/// Result of OCR for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Text(String),
    /// Inline marker standing in for text the backend could not produce.
    Failed(String),
}

impl PageOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) | Self::Failed(text) => text,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Ordered per-page outcomes for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrDocument {
    pages: Vec<(usize, PageOutcome)>,
}

impl OcrDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, number: usize, outcome: PageOutcome) {
        self.pages.push((number, outcome));
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|(_, o)| o.is_failed()).count()
    }

    /// Page sections joined by blank lines, trimmed.
    pub fn extracted_text(&self) -> String {
        self.pages
            .iter()
            .map(|(number, outcome)| format!("========== PAGE {number} ==========\n{}", outcome.as_str()))
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_string()
    }
}

/// Everything the report header needs.
#[derive(Debug, Clone)]
pub struct MarkdownReport<'a> {
    pub display_name: &'a str,
    pub engine: &'a str,
    pub processing_time: Duration,
    pub sha256: &'a str,
    pub request_id: &'a str,
}

impl MarkdownReport<'_> {
    pub fn render(&self, document: &OcrDocument) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "# OCR Results for {}\n\n**Engine:** {}\n**Processing Time:** {:.2}s\n**Pages:** {}\n",
            self.display_name,
            self.engine,
            self.processing_time.as_secs_f64(),
            document.page_count(),
        );
        if !self.sha256.is_empty() {
            let _ = writeln!(out, "**SHA-256:** `{}`", self.sha256);
        }
        if !self.request_id.is_empty() {
            let _ = writeln!(out, "**Request ID:** `{}`", self.request_id);
        }
        let _ = write!(out, "\n## Extracted Text\n\n{}", document.extracted_text());
        out
    }
}
