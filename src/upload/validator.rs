//! Upload validation.
//!
//! # Responsibilities
//! - Sanitize the client-supplied filename
//! - Enforce the extension allow-list and block double extensions
//! - Enforce size limits
//! - Sniff the real content type from magic bytes
//! - Scan the head of the file for script-like content
//! - Hash the accepted content
//!
//! # Design Decisions
//! - Checks run in a fixed order and stop at the first failure
//! - The declared filename is never trusted for anything but its extension
//! - Content type comes from the bytes, never from the multipart header

use std::collections::BTreeSet;

use axum::body::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::UploadConfig;
use crate::observability::metrics;

/// MIME types with a known magic-byte signature.
pub const KNOWN_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

const MAGIC_SIGNATURES: &[(&str, &[u8])] = &[
    ("application/pdf", b"%PDF"),
    ("image/jpeg", b"\xff\xd8\xff"),
    ("image/png", b"\x89PNG\r\n\x1a\n"),
];

/// Lowercase byte patterns that must not appear in the scanned head.
const MALICIOUS_PATTERNS: &[&[u8]] = &[
    b"<script",
    b"<?php",
    b"<%",
    b"#!/",
    b"eval(",
    b"exec(",
    b"import os",
    b"subprocess",
    b"__import__",
];

/// Extensions that must not hide behind an allowed final extension.
const DANGEROUS_EXTENSIONS: &[&str] = &[
    "php", "exe", "sh", "bat", "cmd", "ps1", "js", "vbs", "py", "rb", "pl", "cgi", "asp",
    "aspx", "jsp", "html", "htm", "svg",
];

const MIME_SNIFF_LEN: usize = 16;
const SCAN_LEN: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("No filename provided.")]
    MissingFilename,

    #[error("Unsupported file type. Allowed: {allowed}.")]
    UnsupportedExtension { allowed: String },

    #[error("File rejected: suspicious filename pattern.")]
    SuspiciousFilename,

    #[error("Empty file.")]
    Empty,

    #[error("File too large. Maximum: {max_mb} MB.")]
    TooLarge { max_mb: u64 },

    #[error("File content does not match an allowed type (PDF, JPEG, PNG).")]
    ContentMismatch,

    #[error("File rejected: suspicious content detected.")]
    SuspiciousContent,
}

impl UploadRejection {
    /// Metric label.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::MissingFilename => "missing_filename",
            Self::UnsupportedExtension { .. } => "extension",
            Self::SuspiciousFilename => "double_extension",
            Self::Empty => "empty",
            Self::TooLarge { .. } => "too_large",
            Self::ContentMismatch => "content_type",
            Self::SuspiciousContent => "malicious_content",
        }
    }
}

/// A validated upload.
#[derive(Debug, Clone)]
pub struct UploadEnvelope {
    pub content: Bytes,
    pub original_name: String,
    pub sanitized_name: String,
    pub mime_type: &'static str,
    pub extension: String,
    pub sha256: String,
}

/// Strip directories and unsafe characters from a client filename.
///
/// The result never contains `..`, `/` or `\` and is never empty.
pub fn sanitize_filename(filename: &str) -> String {
    let trimmed = filename.trim_end_matches(['/', '\\']);
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or_default();

    let name: String = base
        .replace("..", "")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() {
        "unnamed_file".to_string()
    } else {
        name
    }
}

/// Lowercased text after the last dot. Leading-dot names have no extension.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Detects `invoice.php.pdf` style names.
pub fn has_dangerous_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    let parts: Vec<&str> = lower.split('.').collect();
    if parts.len() <= 2 {
        return false;
    }
    parts[1..parts.len() - 1]
        .iter()
        .any(|part| DANGEROUS_EXTENSIONS.contains(part))
}

/// MIME type from magic bytes, if recognised.
pub fn detect_mime_type(header: &[u8]) -> Option<&'static str> {
    MAGIC_SIGNATURES
        .iter()
        .find(|(_, signature)| header.starts_with(signature))
        .map(|(mime, _)| *mime)
}

/// Case-insensitive search for script-like byte patterns.
pub fn scan_for_malicious_content(sample: &[u8]) -> bool {
    let lower = sample.to_ascii_lowercase();
    MALICIOUS_PATTERNS
        .iter()
        .any(|pattern| lower.windows(pattern.len()).any(|window| window == *pattern))
}

pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Upload policy built once from config.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    allowed_extensions: BTreeSet<String>,
    allowed_mime_types: Vec<String>,
    max_bytes: usize,
    max_mb: u64,
}

impl UploadValidator {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|mime| mime.trim().to_lowercase())
                .collect(),
            max_bytes: config.max_file_size_bytes(),
            max_mb: config.max_file_size_mb,
        }
    }

    fn allowed_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Run every check in order and count rejections.
    pub fn validate(
        &self,
        filename: Option<&str>,
        content: Bytes,
    ) -> Result<UploadEnvelope, UploadRejection> {
        self.check(filename, content).inspect_err(|rejection| {
            metrics::record_upload_rejected(rejection.reason_label());
        })
    }

    fn check(&self, filename: Option<&str>, content: Bytes) -> Result<UploadEnvelope, UploadRejection> {
        let original_name = filename
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(UploadRejection::MissingFilename)?;

        let sanitized_name = sanitize_filename(original_name);
        let extension = extension_of(&sanitized_name);

        if !self.allowed_extensions.contains(&extension) {
            return Err(UploadRejection::UnsupportedExtension {
                allowed: self.allowed_list(),
            });
        }

        if has_dangerous_extension(&sanitized_name) {
            tracing::warn!(filename = %sanitized_name, "Double-extension upload rejected");
            return Err(UploadRejection::SuspiciousFilename);
        }

        if content.is_empty() {
            return Err(UploadRejection::Empty);
        }
        if content.len() > self.max_bytes {
            return Err(UploadRejection::TooLarge { max_mb: self.max_mb });
        }

        let head = &content[..content.len().min(MIME_SNIFF_LEN)];
        let mime_type = detect_mime_type(head)
            .filter(|mime| self.allowed_mime_types.iter().any(|allowed| allowed == mime))
            .ok_or(UploadRejection::ContentMismatch)?;

        if scan_for_malicious_content(&content[..content.len().min(SCAN_LEN)]) {
            tracing::warn!(filename = %sanitized_name, "Malicious content detected in upload");
            return Err(UploadRejection::SuspiciousContent);
        }

        let sha256 = sha256_hex(&content);

        Ok(UploadEnvelope {
            content,
            original_name: original_name.to_string(),
            sanitized_name,
            mime_type,
            extension,
            sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn validator() -> UploadValidator {
        UploadValidator::from_config(&UploadConfig::default())
    }

    fn png_bytes() -> Bytes {
        let mut data = PNG_MAGIC.to_vec();
        data.extend_from_slice(&[0u8; 64]);
        Bytes::from(data)
    }

    #[test]
    fn test_sanitize_strips_directories_and_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\scan.pdf"), "scan.pdf");
        assert_eq!(sanitize_filename("my report (final).pdf"), "my_report__final_.pdf");
        assert_eq!(sanitize_filename("..\\..\\"), "unnamed_file");
        assert_eq!(sanitize_filename(".."), "unnamed_file");
        assert_eq!(sanitize_filename("résumé.png"), "résumé.png");
    }

    #[test]
    fn test_sanitized_names_are_always_safe() {
        let nasty = [
            "", "/", "\\", "..", "...", "....", "a/../b", "..././..pdf", "x\0y.pdf",
            "%2e%2e%2fetc", ".\\.\\.", "a....b", "\u{202e}fdp.exe", "con:aux.png",
        ];
        for input in nasty {
            let out = sanitize_filename(input);
            assert!(!out.is_empty(), "{input:?}");
            assert!(!out.contains(".."), "{input:?} -> {out:?}");
            assert!(!out.contains('/'), "{input:?} -> {out:?}");
            assert!(!out.contains('\\'), "{input:?} -> {out:?}");
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("scan.PDF"), "pdf");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of(".pdf"), "");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_double_extension_detection() {
        for dangerous in DANGEROUS_EXTENSIONS {
            assert!(has_dangerous_extension(&format!("x.{dangerous}.pdf")));
            assert!(has_dangerous_extension(&format!("x.{}.png", dangerous.to_uppercase())));
        }
        assert!(!has_dangerous_extension("report.pdf"));
        assert!(!has_dangerous_extension("report.v2.pdf"));
        assert!(!has_dangerous_extension("php.pdf"));
    }

    #[test]
    fn test_detect_mime_type() {
        assert_eq!(detect_mime_type(b"%PDF-1.7\n"), Some("application/pdf"));
        assert_eq!(detect_mime_type(b"\xff\xd8\xff\xe0"), Some("image/jpeg"));
        assert_eq!(detect_mime_type(PNG_MAGIC), Some("image/png"));
        assert_eq!(detect_mime_type(b"GIF89a"), None);
        assert_eq!(detect_mime_type(b""), None);
    }

    #[test]
    fn test_malicious_scan_is_case_insensitive() {
        assert!(scan_for_malicious_content(b"%PDF-1.4 <SCRIPT>alert(1)"));
        assert!(scan_for_malicious_content(b"#!/bin/sh"));
        assert!(scan_for_malicious_content(b"x = __IMPORT__('os')"));
        assert!(!scan_for_malicious_content(b"%PDF-1.4 plain text"));
    }

    #[test]
    fn test_accepts_valid_png() {
        let content = png_bytes();
        let envelope = validator().validate(Some("scan.PNG"), content.clone()).unwrap();
        assert_eq!(envelope.mime_type, "image/png");
        assert_eq!(envelope.extension, "png");
        assert_eq!(envelope.sanitized_name, "scan.PNG");
        assert_eq!(envelope.sha256, sha256_hex(&content));
        assert_eq!(envelope.sha256.len(), 64);
    }

    #[test]
    fn test_rejections_in_order() {
        let v = validator();

        assert_eq!(v.validate(None, png_bytes()).unwrap_err(), UploadRejection::MissingFilename);
        assert_eq!(v.validate(Some("   "), png_bytes()).unwrap_err(), UploadRejection::MissingFilename);

        let err = v.validate(Some("notes.txt"), png_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type. Allowed: jpeg, jpg, pdf, png.");

        assert_eq!(
            v.validate(Some("invoice.php.pdf"), png_bytes()).unwrap_err(),
            UploadRejection::SuspiciousFilename
        );
        assert_eq!(v.validate(Some("a.png"), Bytes::new()).unwrap_err(), UploadRejection::Empty);
    }

    #[test]
    fn test_bad_magic_rejected_regardless_of_extension() {
        let v = validator();
        for name in ["a.pdf", "a.png", "a.jpg", "a.jpeg"] {
            let err = v
                .validate(Some(name), Bytes::from_static(b"MZ\x90\x00 not a document"))
                .unwrap_err();
            assert_eq!(err, UploadRejection::ContentMismatch);
        }
    }

    #[test]
    fn test_mime_must_be_allowed() {
        let v = UploadValidator::from_config(&UploadConfig {
            allowed_mime_types: vec!["application/pdf".into()],
            ..UploadConfig::default()
        });
        assert_eq!(
            v.validate(Some("a.png"), png_bytes()).unwrap_err(),
            UploadRejection::ContentMismatch
        );
    }

    #[test]
    fn test_too_large() {
        let v = UploadValidator::from_config(&UploadConfig {
            max_file_size_mb: 1,
            ..UploadConfig::default()
        });
        let mut data = PNG_MAGIC.to_vec();
        data.resize(1024 * 1024 + 1, 0);
        let err = v.validate(Some("big.png"), Bytes::from(data)).unwrap_err();
        assert_eq!(err, UploadRejection::TooLarge { max_mb: 1 });
        assert_eq!(err.to_string(), "File too large. Maximum: 1 MB.");
    }

    #[test]
    fn test_script_in_head_rejected() {
        let mut data = b"%PDF-1.4\n".to_vec();
        data.extend_from_slice(b"<?php system($_GET['c']); ?>");
        let err = validator().validate(Some("a.pdf"), Bytes::from(data)).unwrap_err();
        assert_eq!(err, UploadRejection::SuspiciousContent);

        // Beyond the scanned head is not inspected.
        let mut data = b"%PDF-1.4\n".to_vec();
        data.resize(SCAN_LEN + 10, b' ');
        data.extend_from_slice(b"<script>");
        assert!(validator().validate(Some("a.pdf"), Bytes::from(data)).is_ok());
    }
}
