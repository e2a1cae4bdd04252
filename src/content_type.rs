//! Construction-time parsing of the request's `Content-Type` header.
//!
//! Extracting `boundary` and an optional `charset` from the *top-level* `Content-Type` header
//! is a different problem from parsing a part's `Content-Disposition` line (see
//! [`crate::header`]): it is a single, well-formed MIME type, so this crate leans on the `mime`
//! crate rather than hand-rolling a second tokenizer.

use crate::error::HeaderError;
use http::HeaderMap;

/// The pieces pulled out of `Content-Type` that the decoder needs to get started.
pub(crate) struct ContentTypeInfo {
    pub(crate) boundary: Vec<u8>,
    pub(crate) charset: Option<String>,
}

/// Parses `headers`' `Content-Type`, requiring a `multipart/*` type and a non-empty
/// `boundary` parameter.
pub(crate) fn parse_content_type(headers: &HeaderMap) -> Result<ContentTypeInfo, HeaderError> {
    let value = headers.get(http::header::CONTENT_TYPE).ok_or(HeaderError::MissingContentType)?;
    let value_str = value.to_str().map_err(|e| HeaderError::InvalidContentType { reason: e.to_string() })?;

    let mime: mime::Mime = value_str.parse().map_err(|e: mime::FromStrError| HeaderError::InvalidContentType { reason: e.to_string() })?;

    if mime.type_() != mime::MULTIPART {
        return Err(HeaderError::NotMultipart(value_str.to_string()));
    }

    let boundary = mime.get_param(mime::BOUNDARY).ok_or(HeaderError::MissingBoundary)?;
    if boundary.as_str().is_empty() {
        return Err(HeaderError::EmptyBoundary);
    }

    let charset = mime.get_param(mime::CHARSET).map(|c| c.as_str().to_string());

    Ok(ContentTypeInfo { boundary: boundary.as_str().as_bytes().to_vec(), charset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn extracts_boundary_and_charset() {
        let headers = headers_with("multipart/form-data; boundary=ABC; charset=utf-8");
        let info = parse_content_type(&headers).unwrap();
        assert_eq!(info.boundary, b"ABC");
        assert_eq!(info.charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn missing_content_type_is_an_error() {
        let headers = HeaderMap::new();
        assert!(matches!(parse_content_type(&headers), Err(HeaderError::MissingContentType)));
    }

    #[test]
    fn non_multipart_is_an_error() {
        let headers = headers_with("application/json");
        assert!(matches!(parse_content_type(&headers), Err(HeaderError::NotMultipart(_))));
    }

    #[test]
    fn missing_boundary_is_an_error() {
        let headers = headers_with("multipart/form-data");
        assert!(matches!(parse_content_type(&headers), Err(HeaderError::MissingBoundary)));
    }
}
