//! File name inference, sanitization and collision handling for downloads.
//!
//! A download's name comes from the Content-Disposition header when the page
//! sent one, otherwise from the last URL path segment. Collisions inside the
//! downloads directory are resolved with a `" (n)"` suffix before the
//! extension.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use url::Url;

use super::constants::FALLBACK_FILE_NAME;

/// Highest `" (n)"` suffix tried before falling back to a timestamp.
const MAX_SUFFIX: u32 = 9999;

/// Infers the file name for a download.
///
/// Order: Content-Disposition `filename*=`/`filename=`, last non-empty URL
/// path segment (percent-decoded), then `downloadfile`. The result is
/// sanitized, and a name without an extension gets one from `mime_type`
/// (`.bin` when the type is unknown or absent).
#[must_use]
pub fn guess_file_name(
    url: &Url,
    content_disposition: Option<&str>,
    mime_type: Option<&str>,
) -> String {
    let raw = content_disposition
        .and_then(parse_content_disposition)
        .map(|name| last_path_component(&name).to_string())
        .filter(|name| !name.trim().is_empty())
        .or_else(|| name_from_url(url))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    let mut name = sanitize_filename(raw.trim());
    if name.trim_matches('_').is_empty() {
        name = FALLBACK_FILE_NAME.to_string();
    }
    if split_extension(&name).1.is_empty() {
        name.push_str(extension_from_mime(mime_type.unwrap_or_default()));
    }
    name
}

/// Picks a name in `dir` that neither exists on disk nor is in `reserved`.
///
/// `report.pdf` becomes `report (1).pdf`, then `report (2).pdf`, and so on.
#[must_use]
pub fn unique_file_name<S>(dir: &Path, name: &str, reserved: &HashSet<PathBuf, S>) -> String
where
    S: std::hash::BuildHasher,
{
    let taken = |candidate: &str| {
        let path = dir.join(candidate);
        reserved.contains(&path) || path.exists()
    };

    if !taken(name) {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    for n in 1..=MAX_SUFFIX {
        let candidate = format!("{stem} ({n}){ext}");
        if !taken(&candidate) {
            return candidate;
        }
    }

    let millis = super::record::now_millis();
    format!("{stem} ({millis}){ext}")
}

/// Extension (with leading dot) for a MIME type; `.bin` when unknown.
#[must_use]
pub fn extension_from_mime(mime_type: &str) -> &'static str {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "text/html" => ".html",
        "text/plain" => ".txt",
        "text/csv" => ".csv",
        "application/json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "application/pdf" => ".pdf",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "application/zip" => ".zip",
        "application/gzip" => ".gz",
        "application/vnd.android.package-archive" => ".apk",
        "text/css" => ".css",
        "text/javascript" | "application/javascript" => ".js",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "audio/mpeg" => ".mp3",
        _ => ".bin",
    }
}

/// MIME type for a file name's extension, used to open completed downloads.
#[must_use]
pub fn mime_from_extension(file_name: &str) -> Option<&'static str> {
    let ext = split_extension(file_name).1.trim_start_matches('.');
    let mime = match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "apk" => "application/vnd.android.package-archive",
        "css" => "text/css",
        "js" => "text/javascript",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        _ => return None,
    };
    Some(mime)
}

/// Parses a Content-Disposition header value for its file name.
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
///
/// Parameter names match case-insensitively (`FILENAME=`, `Filename*=`).
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets, so positions index `header` too.
    let lower = header.to_ascii_lowercase();
    if let Some(pos) = lower.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name)
                && !decoded.is_empty()
            {
                return Some(decoded.into_owned());
            }
        }
    }

    let pos = lower.find("filename=")?;
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

/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |` and control characters) with `_`.
pub(crate) fn sanitize_filename(name: &str) -> String {
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

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

fn name_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.rfind(|segment| !segment.is_empty())?;
    let decoded = urlencoding::decode(last)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| last.to_string());
    let name = last_path_component(&decoded).trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Keeps only what follows the last `/` or `\`.
fn last_path_component(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Splits `name` into stem and extension (with dot). Leading-dot names have no
/// extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}
