//! Recognized document formats and their content types.

/// MIME type for Word 2007+ documents.
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DOCUMENT_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("application/msword", "doc"),
    (DOCX_MIME, "docx"),
];

/// How a response body should be treated, judged by its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// A known document format with its file extension.
    Document(&'static str),
    /// Missing or `application/octet-stream`; the URL suffix decides.
    Unlabeled,
    /// Anything else, typically an HTML landing or login page.
    Other,
}

/// Lowercased MIME essence without parameters.
#[must_use]
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Classifies an optional `Content-Type` header value.
#[must_use]
pub fn classify_content_type(content_type: Option<&str>) -> ContentKind {
    let Some(content_type) = content_type else {
        return ContentKind::Unlabeled;
    };
    let mime = mime_essence(content_type);
    if mime.is_empty() || mime == "application/octet-stream" {
        return ContentKind::Unlabeled;
    }
    DOCUMENT_TYPES
        .iter()
        .find(|(known, _)| *known == mime)
        .map_or(ContentKind::Other, |(_, ext)| ContentKind::Document(ext))
}

/// Document extension carried by the last segment of a URL path or file name.
#[must_use]
pub fn document_extension(name: &str) -> Option<&'static str> {
    let last = name.rsplit('/').next().unwrap_or(name);
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    DOCUMENT_TYPES
        .iter()
        .map(|(_, known)| *known)
        .find(|known| *known == ext)
}
