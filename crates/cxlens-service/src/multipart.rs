//! Just enough `multipart/form-data` to pull one file field out of a body.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultipartError {
    #[error("expected multipart/form-data, got `{0}`")]
    NotMultipart(String),
    #[error("multipart content type has no boundary")]
    MissingBoundary,
    #[error("malformed multipart body: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Boundary parameter of a `multipart/form-data` content type.
pub fn boundary(content_type: &str) -> Result<String, MultipartError> {
    let (mime, params) = match content_type.split_once(';') {
        Some((mime, params)) => (mime, params),
        None => (content_type, ""),
    };
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotMultipart(content_type.to_string()));
    }
    parse_params(params)
        .remove("boundary")
        .filter(|b| !b.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// First part whose form field name is `field`.
///
/// A part with an empty filename and no content (what browsers send for an
/// untouched file input) counts as absent.
pub fn find_file(
    body: &[u8],
    boundary: &str,
    field: &str,
) -> Result<Option<FilePart>, MultipartError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut pos = find(body, delimiter, 0)
        .ok_or_else(|| MultipartError::Malformed("opening boundary not found".to_string()))?
        + delimiter.len();

    loop {
        if body[pos..].starts_with(b"--") {
            return Ok(None);
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(MultipartError::Malformed(
                "boundary not followed by CRLF".to_string(),
            ));
        }
        pos += 2;

        let headers_end = find(body, b"\r\n\r\n", pos)
            .ok_or_else(|| MultipartError::Malformed("unterminated part headers".to_string()))?;
        let headers = String::from_utf8_lossy(&body[pos..headers_end]).into_owned();
        let content_start = headers_end + 4;

        let mut closing = Vec::with_capacity(delimiter.len() + 2);
        closing.extend_from_slice(b"\r\n");
        closing.extend_from_slice(delimiter);
        let content_end = find(body, &closing, content_start)
            .ok_or_else(|| MultipartError::Malformed("part is not terminated".to_string()))?;

        let disposition = disposition_params(&headers);
        if disposition.get("name").map(String::as_str) == Some(field) {
            let filename = disposition.get("filename").cloned();
            let bytes = body[content_start..content_end].to_vec();
            if bytes.is_empty() && filename.as_deref().is_none_or(str::is_empty) {
                return Ok(None);
            }
            return Ok(Some(FilePart { filename, bytes }));
        }

        pos = content_end + closing.len();
    }
}

fn disposition_params(headers: &str) -> BTreeMap<String, String> {
    headers
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-disposition"))
        .map(|(_, value)| match value.split_once(';') {
            Some((_, params)) => parse_params(params),
            None => BTreeMap::new(),
        })
        .unwrap_or_default()
}

/// Parse `; key=value; key="quoted value"` parameter lists.
fn parse_params(input: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ';') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() && chars.peek().is_none() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        other => value.push(other),
                    }
                }
            }
            while let Some(&c) = chars.peek() {
                if c == ';' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            out.insert(key, value.trim().to_string());
        }
    }
    out
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|idx| idx + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
        let mut out = String::new();
        for (name, filename, content) in parts {
            out.push_str("--XyZ\r\n");
            match filename {
                Some(f) => out.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: text/x-c++src\r\n\r\n"
                )),
                None => out.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            out.push_str(content);
            out.push_str("\r\n");
        }
        out.push_str("--XyZ--\r\n");
        out.into_bytes()
    }

    #[test]
    fn boundary_is_read_from_content_type() {
        assert_eq!(
            boundary("multipart/form-data; boundary=XyZ").expect("boundary"),
            "XyZ"
        );
        assert_eq!(
            boundary("Multipart/Form-Data; charset=utf-8; boundary=\"a b\"").expect("boundary"),
            "a b"
        );
        assert!(matches!(
            boundary("application/json"),
            Err(MultipartError::NotMultipart(_))
        ));
        assert_eq!(
            boundary("multipart/form-data"),
            Err(MultipartError::MissingBoundary)
        );
    }

    #[test]
    fn finds_named_file_among_other_fields() {
        let payload = body(&[
            ("note", None, "hello"),
            ("file", Some("main.cpp"), "int main() {\r\n  return 0;\r\n}"),
        ]);
        let part = find_file(&payload, "XyZ", "file")
            .expect("body should parse")
            .expect("file part should exist");
        assert_eq!(part.filename.as_deref(), Some("main.cpp"));
        assert_eq!(part.bytes, b"int main() {\r\n  return 0;\r\n}");
    }

    #[test]
    fn absent_or_untouched_field_is_none() {
        let payload = body(&[("note", None, "hello")]);
        assert_eq!(find_file(&payload, "XyZ", "file").expect("parse"), None);

        let payload = body(&[("file", Some(""), "")]);
        assert_eq!(find_file(&payload, "XyZ", "file").expect("parse"), None);
    }

    #[test]
    fn empty_named_file_is_still_a_submission() {
        let payload = body(&[("file", Some("empty.cpp"), "")]);
        let part = find_file(&payload, "XyZ", "file")
            .expect("parse")
            .expect("empty file is present");
        assert!(part.bytes.is_empty());
    }

    #[test]
    fn truncated_body_is_malformed() {
        let payload = b"--XyZ\r\nContent-Disposition: form-data; name=\"file\"\r\n\r\nint main";
        assert!(matches!(
            find_file(payload, "XyZ", "file"),
            Err(MultipartError::Malformed(_))
        ));
        assert!(matches!(
            find_file(b"garbage", "XyZ", "file"),
            Err(MultipartError::Malformed(_))
        ));
    }

    #[test]
    fn quoted_params_keep_semicolons() {
        let params = parse_params(r#" name="file"; filename="a;b \"c\".cpp""#);
        assert_eq!(params.get("name").map(String::as_str), Some("file"));
        assert_eq!(
            params.get("filename").map(String::as_str),
            Some(r#"a;b "c".cpp"#)
        );
    }
}
