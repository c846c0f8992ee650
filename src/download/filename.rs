//! Output naming for saved documents: `{ItemID}-{server name}.{ext}`.

use std::path::{Component, Path, PathBuf};

use url::Url;

use super::content_type::document_extension;

/// Stem used when the server offers no usable name.
const FALLBACK_STEM: &str = "document";

/// Longest stem kept from a server name, in characters.
const MAX_STEM_CHARS: usize = 120;

/// Builds the output file name for one document of an item.
///
/// The server name comes from `Content-Disposition` when present, else the last URL
/// path segment. A name that already ends in a document extension keeps it; otherwise
/// `content_extension` is appended.
#[must_use]
pub fn document_filename(
    item_id: &str,
    content_disposition: Option<&str>,
    url: &Url,
    content_extension: &str,
) -> String {
    let server_name = content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| last_path_segment(url))
        .map(|name| sanitize_filename(name.trim()))
        .filter(|name| !name.trim_matches(['_', '.', ' ']).is_empty());

    let (stem, extension) = match server_name {
        Some(name) => match document_extension(&name) {
            Some(ext) => {
                let stem_len = name.len() - ext.len() - 1;
                (name[..stem_len].to_string(), ext)
            }
            None => (name, content_extension),
        },
        None => (FALLBACK_STEM.to_string(), content_extension),
    };

    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = if stem.trim().is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    };
    format!("{item_id}-{stem}.{extension}")
}

fn last_path_segment(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    Some(
        urlencoding::decode(last)
            .map_or_else(|_| last.to_string(), std::borrow::Cow::into_owned),
    )
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name) {
                return Some(decoded.into_owned());
            }
        }
    }

    let pos = header.find("filename=")?;
    let value = header[pos + 9..].trim();
    if let Some(stripped) = value.strip_prefix('"') {
        let end = stripped.find('"')?;
        let name = &stripped[..end];
        return (!name.is_empty()).then(|| name.to_string());
    }
    let end = value.find(';').unwrap_or(value.len());
    let name = value[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

/// Resolves a unique file path, adding a numeric suffix if the file exists.
///
/// Example: `42-tese.pdf`, then `42-tese_1.pdf`, `42-tese_2.pdf`, ...
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = sanitize_filename(filename);
    let base_path = dir.join(&filename);
    if !base_path.exists() && !partial_path(&base_path).exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() && !partial_path(&candidate).exists() {
            return candidate;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

/// Temporary path a document streams into before being renamed into place.
#[must_use]
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn url(value: &str) -> Url {
        Url::parse(value).unwrap()
    }

    #[test]
    fn test_document_filename_from_url_segment() {
        let name = document_filename("42", None, &url("https://repo.example.org/f.pdf"), "pdf");
        assert_eq!(name, "42-f.pdf");
    }

    #[test]
    fn test_document_filename_prefers_content_disposition() {
        let name = document_filename(
            "7",
            Some(r#"attachment; filename="Dissertacao Final.PDF""#),
            &url("https://a.org/download.php?id_ficheiro=3"),
            "pdf",
        );
        assert_eq!(name, "7-Dissertacao Final.pdf");
    }

    #[test]
    fn test_document_filename_decodes_url_segment() {
        let name = document_filename(
            "9",
            None,
            &url("https://a.org/bitstream/1/Tese%20de%20Doutorado.pdf"),
            "pdf",
        );
        assert_eq!(name, "9-Tese de Doutorado.pdf");
    }

    #[test]
    fn test_document_filename_appends_content_extension() {
        let name = document_filename("5", None, &url("https://a.org/php/midia.php?tipo=1"), "docx");
        assert_eq!(name, "5-midia.php.docx");

        let name = document_filename("5", None, &url("https://a.org/"), "pdf");
        assert_eq!(name, "5-document.pdf");
    }

    #[test]
    fn test_document_filename_strips_path_separators() {
        let name = document_filename(
            "3",
            Some("attachment; filename=../../etc/passwd"),
            &url("https://a.org/x"),
            "pdf",
        );
        assert!(!name.contains('/'), "unexpected separator in {name}");
        assert!(name.starts_with("3-"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_parse_content_disposition_variants() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="example.pdf""#),
            Some("example.pdf".to_string())
        );
        assert_eq!(
            parse_content_disposition("attachment; filename=example.pdf; size=3"),
            Some("example.pdf".to_string())
        );
        assert_eq!(
            parse_content_disposition("attachment; filename*=UTF-8''tese%20final.pdf"),
            Some("tese final.pdf".to_string())
        );
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_resolve_unique_path_with_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let first = resolve_unique_path(temp_dir.path(), "42-f.pdf");
        assert_eq!(first, temp_dir.path().join("42-f.pdf"));

        std::fs::write(&first, b"x").unwrap();
        let second = resolve_unique_path(temp_dir.path(), "42-f.pdf");
        assert_eq!(second, temp_dir.path().join("42-f_1.pdf"));

        std::fs::write(partial_path(&second), b"x").unwrap();
        let third = resolve_unique_path(temp_dir.path(), "42-f.pdf");
        assert_eq!(third, temp_dir.path().join("42-f_2.pdf"));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/42-f.pdf")),
            PathBuf::from("/out/42-f.pdf.part")
        );
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("a:b?.pdf"), "a_b_.pdf");
    }
}
