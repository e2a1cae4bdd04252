//! The state machine: turns a sequence of offered byte chunks into an ordered stream of parts.
//!
//! [`MultipartDecoder`] is the one public type of this crate. It owns a [`ChunkBuffer`], a
//! [`BoundaryContext`], a [`PartSink`], and a [`PartFactory`]; `offer()` drives an internal
//! `decode_step` in a loop until a step returns [`Progress::NeedMore`], matching
//! `ChunkedDecoder`'s read-until-stuck dispatch loop but over the multipart grammar instead of
//! chunked-encoding framing.

use crate::buffer::{ChunkBuffer, DEFAULT_DISCARD_THRESHOLD};
use crate::content_type::parse_content_type;
use crate::error::{DecodeError, MultipartError};
use crate::factory::PartFactory;
use crate::header::{clean_string, parse_header_line, strip_quotes_raw, HeaderLine};
use crate::part::{BoundaryContext, FieldAttributeMap, Part, TransferMechanism};
use crate::scanner::{find_body_boundary, find_delimiter, read_delimiter, read_line, DelimiterOutcome, Progress};
use crate::sink::PartSink;
use encoding::Encoding;
use std::fmt;

/// The multipart grammar states driven by [`decode_step`](MultipartDecoder::decode_step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    HeaderDelimiter,
    Disposition,
    Field,
    FileUpload,
    MixedDelimiter,
    MixedDisposition,
    MixedFileUpload,
    PreEpilogue,
    Epilogue,
}

struct ParsedHeaders {
    headers: FieldAttributeMap,
    mixed_boundary: Option<Vec<u8>>,
}

fn resolve_encoding(label: &str) -> Result<&'static dyn Encoding, DecodeError> {
    match encoding::label::encoding_from_whatwg_label(label) {
        Some(enc) => Ok(enc as &'static dyn Encoding),
        None => Err(DecodeError::UnknownCharset(label.to_string())),
    }
}

/// Applies one already-tokenized header line to the in-progress headers map, recording a
/// `multipart/mixed` boundary separately so the caller can decide what to do with it (only
/// `Disposition` may act on one; `MixedDisposition` seeing one is a nested-mixed error).
fn apply_header(line: &HeaderLine, map: &mut FieldAttributeMap, mixed_boundary: &mut Option<Vec<u8>>) -> Result<(), DecodeError> {
    match line.name.to_ascii_lowercase().as_str() {
        "content-disposition" => {
            for param in &line.params {
                if let Some(key) = &param.key {
                    match key.to_ascii_lowercase().as_str() {
                        "filename" => map.insert("filename", strip_quotes_raw(&param.value).to_string()),
                        other => map.insert(other, clean_string(&param.value)),
                    }
                }
            }
        }
        "content-type" => {
            let mut is_mixed = false;
            let mut boundary: Option<Vec<u8>> = None;
            for param in &line.params {
                match param.key.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    None => {
                        map.insert("content-type", param.value.clone());
                        is_mixed = param.value.eq_ignore_ascii_case("multipart/mixed");
                    }
                    Some("boundary") => boundary = Some(clean_string(&param.value).into_bytes()),
                    Some("charset") => map.insert("charset", clean_string(&param.value)),
                    Some(_) => {}
                }
            }
            if is_mixed {
                let boundary = boundary.filter(|b| !b.is_empty()).ok_or_else(|| DecodeError::malformed("multipart/mixed content-type missing boundary"))?;
                *mixed_boundary = Some(boundary);
            }
        }
        "content-transfer-encoding" => {
            if let Some(param) = line.params.first() {
                map.insert("content-transfer-encoding", clean_string(&param.value));
            }
        }
        "content-length" => {
            if let Some(param) = line.params.first() {
                map.insert("content-length", clean_string(&param.value));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Incremental decoder for a `multipart/form-data` (or nested `multipart/mixed`) request body.
///
/// Construct with [`MultipartDecoder::new`], feed bytes with [`offer`](Self::offer) as they
/// arrive, and drain completed parts with [`next`](Self::next) or [`get_all`](Self::get_all).
/// `destroy()` releases any unread parts back to the factory and puts the decoder into a
/// terminal state in which every other public method fails.
pub struct MultipartDecoder {
    buffer: ChunkBuffer,
    factory: Box<dyn PartFactory>,
    boundary_context: BoundaryContext,
    /// The encoding resolved at construction time from `Content-Type`'s `charset`, or the
    /// caller-supplied default.
    encoding: &'static dyn Encoding,
    /// The encoding actually used to decode the attribute currently being built; may differ
    /// from `encoding` if the part's own headers named a `charset`.
    current_encoding: &'static dyn Encoding,
    state: State,
    field_attribute_map: FieldAttributeMap,
    current_part: Option<Part>,
    sink: PartSink,
    is_last_chunk: bool,
    destroyed: bool,
}

impl fmt::Debug for MultipartDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartDecoder")
            .field("state", &self.state)
            .field("current_part", &self.current_part)
            .field("is_last_chunk", &self.is_last_chunk)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl MultipartDecoder {
    /// Parses `headers`' `Content-Type` for `boundary` and an optional `charset`, then builds a
    /// decoder ready to receive body bytes via `offer()`. `default_encoding` is used to decode
    /// header lines and attribute values whose part did not itself declare a `charset`.
    pub fn new<F>(factory: F, headers: &http::HeaderMap, default_encoding: &'static dyn Encoding) -> Result<Self, MultipartError>
    where
        F: PartFactory + 'static,
    {
        let info = parse_content_type(headers)?;
        let encoding = match info.charset {
            Some(label) => resolve_encoding(&label)?,
            None => default_encoding,
        };
        Ok(Self {
            buffer: ChunkBuffer::new(DEFAULT_DISCARD_THRESHOLD),
            factory: Box::new(factory),
            boundary_context: BoundaryContext::new(info.boundary),
            encoding,
            current_encoding: encoding,
            state: State::HeaderDelimiter,
            field_attribute_map: FieldAttributeMap::default(),
            current_part: None,
            sink: PartSink::new(),
            is_last_chunk: false,
            destroyed: false,
        })
    }

    /// Appends `chunk` and runs the parser until it can make no further progress without more
    /// input. Set `is_last` on the final chunk of the body; offering bytes after that is an
    /// error.
    pub fn offer(&mut self, chunk: &[u8], is_last: bool) -> Result<(), MultipartError> {
        self.ensure_alive()?;
        if self.is_last_chunk {
            return Err(MultipartError::Decode(DecodeError::malformed("offer() called after is_last_chunk was already set")));
        }
        self.buffer.append(chunk);
        if is_last {
            self.is_last_chunk = true;
        }
        self.run()?;
        self.buffer.compact();
        Ok(())
    }

    fn run(&mut self) -> Result<(), MultipartError> {
        loop {
            match self.decode_step()? {
                Progress::Ready(()) => continue,
                Progress::NeedMore => return Ok(()),
            }
        }
    }

    /// Returns the next completed part after the iteration cursor, advancing the cursor.
    /// `Ok(None)` means no further part is available yet but the body is not finished; an
    /// [`MultipartError::EndOfData`] means the cursor has caught up and the body is finished.
    pub fn next(&mut self) -> Result<Option<&Part>, MultipartError> {
        self.ensure_alive()?;
        if let Some(part) = self.sink.iterate() {
            Ok(Some(part))
        } else if self.state == State::Epilogue {
            Err(MultipartError::EndOfData)
        } else {
            Ok(None)
        }
    }

    /// Whether a further `next()` call would return a part without erroring.
    pub fn has_next(&self) -> bool {
        !self.destroyed && self.sink.has_next()
    }

    pub fn get_all(&self, name: &str) -> Vec<&Part> {
        self.sink.get_all(name)
    }

    pub fn get_first(&self, name: &str) -> Option<&Part> {
        self.sink.get_first(name)
    }

    /// The part currently being filled (not yet terminated by a delimiter), if any.
    pub fn current_partial(&self) -> Option<&Part> {
        self.current_part.as_ref()
    }

    pub fn set_discard_threshold(&mut self, bytes: usize) {
        self.buffer.set_discard_threshold(bytes);
    }

    /// Releases every unread part back to the factory and transitions to a terminal state.
    /// Idempotent in effect: a second call fails with [`MultipartError::Destroyed`] without
    /// releasing anything further.
    pub fn destroy(&mut self) -> Result<(), MultipartError> {
        self.ensure_alive()?;
        self.sink.release_unread(self.factory.as_mut());
        if let Some(part) = self.current_part.take() {
            self.factory.release(&part);
        }
        self.destroyed = true;
        Ok(())
    }

    fn ensure_alive(&self) -> Result<(), MultipartError> {
        if self.destroyed {
            Err(MultipartError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Advances the state machine by exactly one step. `Ready(())` means progress was made and
    /// the caller should call again; `NeedMore` means the buffer is exhausted for now.
    fn decode_step(&mut self) -> Result<Progress<()>, DecodeError> {
        match self.state {
            State::HeaderDelimiter => {
                let boundary = self.boundary_context.outer.clone();
                match self.scan_delimiter(&boundary)? {
                    Progress::Ready(is_close) => {
                        self.state = if is_close { State::PreEpilogue } else { State::Disposition };
                        Ok(Progress::Ready(()))
                    }
                    Progress::NeedMore => Ok(Progress::NeedMore),
                }
            }
            State::Disposition => match self.parse_headers_block()? {
                Progress::NeedMore => Ok(Progress::NeedMore),
                Progress::Ready(parsed) => {
                    self.field_attribute_map = parsed.headers;
                    if let Some(inner) = parsed.mixed_boundary {
                        self.boundary_context.enter_mixed(inner);
                        self.state = State::MixedDelimiter;
                        return Ok(Progress::Ready(()));
                    }
                    let name = self.field_attribute_map.get("name").map(str::to_string);
                    match self.field_attribute_map.get("filename").map(str::to_string) {
                        Some(filename) => {
                            let name = name.ok_or(DecodeError::MissingDisposition)?;
                            self.build_file_upload(name, filename)?;
                            self.state = State::FileUpload;
                        }
                        None => {
                            let name = name.ok_or(DecodeError::MissingDisposition)?;
                            self.build_attribute(name)?;
                            self.state = State::Field;
                        }
                    }
                    Ok(Progress::Ready(()))
                }
            },
            State::Field => match self.load_field()? {
                Progress::Ready(()) => {
                    let part = self.current_part.take().expect("current attribute must be set in Field state");
                    self.sink.append(part);
                    self.state = State::HeaderDelimiter;
                    Ok(Progress::Ready(()))
                }
                Progress::NeedMore => Ok(Progress::NeedMore),
            },
            State::FileUpload => match self.read_file_body(false)? {
                Progress::Ready(()) => {
                    let part = self.current_part.take().expect("current file upload must be set in FileUpload state");
                    self.sink.append(part);
                    self.state = State::HeaderDelimiter;
                    Ok(Progress::Ready(()))
                }
                Progress::NeedMore => Ok(Progress::NeedMore),
            },
            State::MixedDelimiter => {
                let boundary = self.boundary_context.inner.clone().expect("inner boundary set while in mixed mode");
                match self.scan_delimiter(&boundary)? {
                    Progress::Ready(is_close) => {
                        if is_close {
                            self.exit_mixed_cleanup();
                            self.state = State::HeaderDelimiter;
                        } else {
                            self.state = State::MixedDisposition;
                        }
                        Ok(Progress::Ready(()))
                    }
                    Progress::NeedMore => Ok(Progress::NeedMore),
                }
            }
            State::MixedDisposition => match self.parse_headers_block()? {
                Progress::NeedMore => Ok(Progress::NeedMore),
                Progress::Ready(parsed) => {
                    if parsed.mixed_boundary.is_some() {
                        return Err(DecodeError::NestedMixed);
                    }
                    self.merge_headers(parsed.headers);
                    let name = self.field_attribute_map.get("name").map(str::to_string).ok_or(DecodeError::MissingDisposition)?;
                    let filename = self.field_attribute_map.get("filename").map(str::to_string).ok_or(DecodeError::MixedMissingFilename)?;
                    self.build_file_upload(name, filename)?;
                    self.state = State::MixedFileUpload;
                    Ok(Progress::Ready(()))
                }
            },
            State::MixedFileUpload => match self.read_file_body(true)? {
                Progress::Ready(()) => {
                    let part = self.current_part.take().expect("current file upload must be set in MixedFileUpload state");
                    self.sink.append(part);
                    self.state = State::MixedDelimiter;
                    Ok(Progress::Ready(()))
                }
                Progress::NeedMore => Ok(Progress::NeedMore),
            },
            State::PreEpilogue => {
                if self.buffer.readable() > 0 {
                    let n = self.buffer.readable();
                    self.buffer.advance_read(n);
                    Ok(Progress::Ready(()))
                } else if self.is_last_chunk {
                    self.state = State::Epilogue;
                    Ok(Progress::Ready(()))
                } else {
                    Ok(Progress::NeedMore)
                }
            }
            State::Epilogue => {
                if self.buffer.readable() > 0 {
                    let n = self.buffer.readable();
                    self.buffer.advance_read(n);
                    Ok(Progress::Ready(()))
                } else {
                    Ok(Progress::NeedMore)
                }
            }
        }
    }

    /// Locates `boundary` in the buffer, discarding any bytes before it (preamble, or content
    /// already fully consumed by `load_field`/`read_file_body`), then validates the delimiter
    /// grammar at that position. A raw occurrence of `boundary` that turns out not to be a real
    /// delimiter line (e.g. it is only a prefix of a longer token) is not an error: it is
    /// skipped and the search resumes past it within the same buffer.
    fn scan_delimiter(&mut self, boundary: &[u8]) -> Result<Progress<bool>, DecodeError> {
        loop {
            let remaining = self.buffer.remaining();
            match find_delimiter(remaining, boundary) {
                Ok(pos) => {
                    self.buffer.advance_read(pos);
                    match read_delimiter(&mut self.buffer, boundary) {
                        DelimiterOutcome::Ready(d) => return Ok(Progress::Ready(d.is_close)),
                        DelimiterOutcome::NeedMore => return Ok(Progress::NeedMore),
                        DelimiterOutcome::NotADelimiter => {
                            self.buffer.advance_read(1);
                            continue;
                        }
                    }
                }
                Err(safe_discard) => {
                    self.buffer.advance_read(safe_discard);
                    return Ok(Progress::NeedMore);
                }
            }
        }
    }

    /// Reads header lines until a blank line, tokenizing each with [`crate::header`] and
    /// folding recognized fields into a fresh [`FieldAttributeMap`]. Transactional over the
    /// whole block: a `NeedMore` mid-block rolls back every line read so far.
    fn parse_headers_block(&mut self) -> Result<Progress<ParsedHeaders>, DecodeError> {
        let snapshot = self.buffer.snapshot();
        let mut headers = FieldAttributeMap::default();
        let mut mixed_boundary = None;
        loop {
            match read_line(&mut self.buffer, self.encoding)? {
                Progress::NeedMore => {
                    self.buffer.restore(snapshot);
                    return Ok(Progress::NeedMore);
                }
                Progress::Ready(line) => {
                    if line.is_empty() {
                        break;
                    }
                    let parsed = parse_header_line(&line)?;
                    apply_header(&parsed, &mut headers, &mut mixed_boundary)?;
                }
            }
        }
        Ok(Progress::Ready(ParsedHeaders { headers, mixed_boundary }))
    }

    /// Folds a mixed sub-part's own headers into the outer field-attribute map, so fields set by
    /// the enclosing `Content-Disposition` (chiefly `name`) survive across sub-parts.
    fn merge_headers(&mut self, headers: FieldAttributeMap) {
        for (key, value) in headers.entries() {
            self.field_attribute_map.insert(key, value.to_string());
        }
    }

    /// Removes sub-part-specific headers from the field-attribute map on exiting mixed mode,
    /// preserving the outer part's own fields (chiefly `name`).
    fn exit_mixed_cleanup(&mut self) {
        self.field_attribute_map.remove("charset");
        self.field_attribute_map.remove("content-length");
        self.field_attribute_map.remove("content-transfer-encoding");
        self.field_attribute_map.remove("content-type");
        self.field_attribute_map.remove("filename");
        self.boundary_context.exit_mixed();
    }

    fn build_attribute(&mut self, name: String) -> Result<(), DecodeError> {
        let charset_label = self.field_attribute_map.get("charset").map(str::to_string);
        let declared_size = self.field_attribute_map.get("content-length").and_then(|s| s.parse::<u64>().ok());
        self.current_encoding = match &charset_label {
            Some(label) => resolve_encoding(label)?,
            None => self.encoding,
        };
        let attr = self.factory.create_attribute(name, charset_label, declared_size)?;
        self.current_part = Some(Part::Attribute(attr));
        Ok(())
    }

    fn build_file_upload(&mut self, name: String, filename: String) -> Result<(), DecodeError> {
        let content_type = self.field_attribute_map.get("content-type").map(str::to_string).unwrap_or_else(|| "application/octet-stream".to_string());
        let transfer_mechanism = match self.field_attribute_map.get("content-transfer-encoding") {
            Some(v) => TransferMechanism::parse(v)?,
            None => TransferMechanism::default(),
        };
        let charset = self.field_attribute_map.get("charset").map(str::to_string);
        let declared_size = self.field_attribute_map.get("content-length").and_then(|s| s.parse::<u64>().ok());
        let upload = self.factory.create_file_upload(name, filename, content_type, transfer_mechanism, charset, declared_size)?;
        self.current_part = Some(Part::FileUpload(upload));
        Ok(())
    }

    /// Scans forward for the outer boundary, appending confirmed-safe bytes to the current
    /// attribute on every call and marking it completed once the boundary is located.
    fn load_field(&mut self) -> Result<Progress<()>, DecodeError> {
        let boundary = self.boundary_context.outer.clone();
        let remaining = self.buffer.remaining();
        match find_body_boundary(remaining, &boundary) {
            Ok((value_len, term_len)) => {
                let bytes = self.buffer.copy(0, value_len);
                self.buffer.advance_read(value_len + term_len);
                let encoding = self.current_encoding;
                self.current_attribute_mut().add_content(&bytes, true, encoding)?;
                Ok(Progress::Ready(()))
            }
            Err(safe_len) => {
                let bytes = self.buffer.copy(0, safe_len);
                self.buffer.advance_read(safe_len);
                let encoding = self.current_encoding;
                self.current_attribute_mut().add_content(&bytes, false, encoding)?;
                Ok(Progress::NeedMore)
            }
        }
    }

    /// Identical scan to [`load_field`](Self::load_field), writing into the current file upload
    /// and matching against the inner boundary when `mixed` is set.
    fn read_file_body(&mut self, mixed: bool) -> Result<Progress<()>, DecodeError> {
        let boundary = if mixed {
            self.boundary_context.inner.clone().expect("inner boundary set while reading mixed file body")
        } else {
            self.boundary_context.outer.clone()
        };
        let remaining = self.buffer.remaining();
        match find_body_boundary(remaining, &boundary) {
            Ok((value_len, term_len)) => {
                let bytes = self.buffer.copy(0, value_len);
                self.buffer.advance_read(value_len + term_len);
                self.current_file_upload_mut().add_content(&bytes, true)?;
                Ok(Progress::Ready(()))
            }
            Err(safe_len) => {
                let bytes = self.buffer.copy(0, safe_len);
                self.buffer.advance_read(safe_len);
                self.current_file_upload_mut().add_content(&bytes, false)?;
                Ok(Progress::NeedMore)
            }
        }
    }

    fn current_attribute_mut(&mut self) -> &mut crate::part::Attribute {
        match self.current_part.as_mut() {
            Some(Part::Attribute(a)) => a,
            _ => unreachable!("decode_step invariant: Field state without a current attribute"),
        }
    }

    fn current_file_upload_mut(&mut self) -> &mut crate::part::FileUpload {
        match self.current_part.as_mut() {
            Some(Part::FileUpload(f)) => f,
            _ => unreachable!("decode_step invariant: FileUpload state without a current file upload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::InMemoryFactory;
    use http::{HeaderMap, HeaderValue};
    use indoc::indoc;

    fn headers_with_boundary(boundary: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}")).unwrap());
        headers
    }

    fn decode_all(body: &[u8], boundary: &str) -> MultipartDecoder {
        let headers = headers_with_boundary(boundary);
        let mut decoder = MultipartDecoder::new(InMemoryFactory, &headers, encoding::all::UTF_8).unwrap();
        decoder.offer(body, true).unwrap();
        decoder
    }

    #[test]
    fn simple_text_field() {
        let body = b"--ABC\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nhello\r\n--ABC--\r\n";
        let mut decoder = decode_all(body, "ABC");
        let part = decoder.next().unwrap().unwrap();
        let attr = part.as_attribute().unwrap();
        assert_eq!(attr.name(), "k");
        assert_eq!(attr.value(), "hello");
        assert!(attr.completed());
        assert!(matches!(decoder.next(), Err(MultipartError::EndOfData)));
    }

    #[test]
    fn two_fields_lf_only() {
        let body = b"--ABC\nContent-Disposition: form-data; name=\"a\"\n\n1\n--ABC\nContent-Disposition: form-data; name=\"b\"\n\n2\n--ABC--\n";
        let mut decoder = decode_all(body, "ABC");
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.name(), "a");
        assert_eq!(first.as_attribute().unwrap().value(), "1");
        let second = decoder.next().unwrap().unwrap();
        assert_eq!(second.name(), "b");
        assert_eq!(second.as_attribute().unwrap().value(), "2");
    }

    #[test]
    fn file_upload_with_binary_body() {
        let body = indoc! {"
            --ABC\r
            Content-Disposition: form-data; name=\"f\"; filename=\"f.txt\"\r
            Content-Type: text/plain\r
            \r
            AB\r
            CD\r
            --ABC--\r
        "}
        .replace('\n', "\r\n")
        .into_bytes();
        let mut decoder = decode_all(&body, "ABC");
        let part = decoder.next().unwrap().unwrap();
        let upload = part.as_file_upload().unwrap();
        assert_eq!(upload.filename(), "f.txt");
        assert_eq!(upload.content_type(), "text/plain");
        assert_eq!(upload.bytes().unwrap(), b"AB\r\nCD");
    }

    #[test]
    fn chunked_delivery_across_a_delimiter_matches_single_call() {
        let body = b"--ABC\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nhello\r\n--ABC--\r\n";
        let headers = headers_with_boundary("ABC");
        let mut decoder = MultipartDecoder::new(InMemoryFactory, &headers, encoding::all::UTF_8).unwrap();
        let split = 40usize.min(body.len() - 1);
        decoder.offer(&body[..split], false).unwrap();
        decoder.offer(&body[split..], true).unwrap();
        let part = decoder.next().unwrap().unwrap();
        assert_eq!(part.as_attribute().unwrap().value(), "hello");
    }

    #[test]
    fn multipart_mixed_nested_file_uploads() {
        let body = concat!(
            "--OUTER\r\n",
            "Content-Disposition: form-data; name=\"files\"\r\n",
            "Content-Type: multipart/mixed; boundary=INNER\r\n",
            "\r\n",
            "--INNER\r\n",
            "Content-Disposition: attachment; filename=\"a.txt\"\r\n",
            "\r\n",
            "AAA\r\n",
            "--INNER\r\n",
            "Content-Disposition: attachment; filename=\"b.txt\"\r\n",
            "\r\n",
            "BBB\r\n",
            "--INNER--\r\n",
            "--OUTER\r\n",
            "Content-Disposition: form-data; name=\"next\"\r\n",
            "\r\n",
            "field\r\n",
            "--OUTER--\r\n",
        )
        .as_bytes();
        let mut decoder = decode_all(body, "OUTER");

        let first = decoder.next().unwrap().unwrap();
        let first_upload = first.as_file_upload().unwrap();
        assert_eq!(first_upload.name(), "files");
        assert_eq!(first_upload.filename(), "a.txt");
        assert_eq!(first_upload.bytes().unwrap(), b"AAA");

        let second = decoder.next().unwrap().unwrap();
        let second_upload = second.as_file_upload().unwrap();
        assert_eq!(second_upload.name(), "files");
        assert_eq!(second_upload.filename(), "b.txt");
        assert_eq!(second_upload.bytes().unwrap(), b"BBB");

        let third = decoder.next().unwrap().unwrap();
        assert_eq!(third.name(), "next");
        assert_eq!(third.as_attribute().unwrap().value(), "field");
    }

    #[test]
    fn close_delimiter_without_trailing_crlf() {
        let body = b"--ABC\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nhello\r\n--ABC--";
        let mut decoder = decode_all(body, "ABC");
        let part = decoder.next().unwrap().unwrap();
        assert_eq!(part.as_attribute().unwrap().value(), "hello");
    }

    #[test]
    fn mixed_sub_part_without_filename_is_an_error() {
        let body = concat!(
            "--OUTER\r\n",
            "Content-Disposition: form-data; name=\"files\"\r\n",
            "Content-Type: multipart/mixed; boundary=INNER\r\n",
            "\r\n",
            "--INNER\r\n",
            "Content-Disposition: attachment\r\n",
            "\r\n",
            "AAA\r\n",
            "--INNER--\r\n",
            "--OUTER--\r\n",
        )
        .as_bytes();
        let headers = headers_with_boundary("OUTER");
        let mut decoder = MultipartDecoder::new(InMemoryFactory, &headers, encoding::all::UTF_8).unwrap();
        assert!(matches!(decoder.offer(body, true), Err(MultipartError::Decode(DecodeError::MixedMissingFilename))));
    }

    #[test]
    fn plain_field_without_filename_is_fine() {
        let body = b"--ABC\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nvalue\r\n--ABC--\r\n";
        let mut decoder = decode_all(body, "ABC");
        assert_eq!(decoder.next().unwrap().unwrap().as_attribute().unwrap().value(), "value");
    }

    #[test]
    fn get_all_and_get_first_are_case_insensitive() {
        let body = b"--ABC\r\nContent-Disposition: form-data; name=\"K\"\r\n\r\nv\r\n--ABC--\r\n";
        let decoder = decode_all(body, "ABC");
        assert_eq!(decoder.get_all("k").len(), 1);
        assert_eq!(decoder.get_first("k").unwrap().as_attribute().unwrap().value(), "v");
    }

    #[test]
    fn destroy_is_terminal() {
        let body = b"--ABC\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nv\r\n--ABC--\r\n";
        let mut decoder = decode_all(body, "ABC");
        decoder.destroy().unwrap();
        assert!(matches!(decoder.destroy(), Err(MultipartError::Destroyed)));
        assert!(matches!(decoder.next(), Err(MultipartError::Destroyed)));
    }

    #[test]
    fn missing_boundary_is_a_construction_error() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"));
        assert!(matches!(MultipartDecoder::new(InMemoryFactory, &headers, encoding::all::UTF_8), Err(MultipartError::Header(_))));
    }

    #[test]
    fn boundary_text_as_a_prefix_of_a_longer_token_is_not_an_error() {
        // The preamble contains a raw occurrence of "--ABC" that is actually a prefix of a
        // longer token ("--ABCnotreal"); it must be skipped rather than aborting the decode.
        let body = b"preamble --ABCnotreal more preamble\r\n--ABC\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nhello\r\n--ABC--\r\n";
        let mut decoder = decode_all(body, "ABC");
        let part = decoder.next().unwrap().unwrap();
        assert_eq!(part.as_attribute().unwrap().value(), "hello");
    }
}
