//! The data model: completed and in-progress form parts.
//!
//! A [`Part`] is either an [`Attribute`] (a name/value pair) or a [`FileUpload`] (a name,
//! filename, content-type, transfer mechanism, and payload bytes). Both carry a `completed`
//! flag that only becomes `true` once the part's terminating delimiter has been observed.

use crate::error::DecodeError;
use encoding::{DecoderTrap, Encoding};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static SPILL_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a fresh, uniquely-named file inside `dir` to spill one upload's content into.
fn create_spill_file(dir: &Path) -> Result<(PathBuf, std::fs::File), DecodeError> {
    let id = SPILL_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("part-{id}.bin"));
    let file = std::fs::File::create(&path)?;
    Ok((path, file))
}

/// `Content-Transfer-Encoding` values recognized on a file upload. No decoding of the
/// transfer encoding is performed by this crate — the tag is only recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMechanism {
    SevenBit,
    EightBit,
    Binary,
}

impl TransferMechanism {
    /// Parses a `Content-Transfer-Encoding` value, case-insensitively.
    pub(crate) fn parse(s: &str) -> Result<Self, DecodeError> {
        match s.to_ascii_lowercase().as_str() {
            "7bit" => Ok(TransferMechanism::SevenBit),
            "8bit" => Ok(TransferMechanism::EightBit),
            "binary" => Ok(TransferMechanism::Binary),
            other => Err(DecodeError::UnknownTransferEncoding(other.to_string())),
        }
    }
}

impl Default for TransferMechanism {
    fn default() -> Self {
        TransferMechanism::SevenBit
    }
}

/// A simple name/value attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    raw: Vec<u8>,
    value: String,
    charset: Option<String>,
    declared_size: Option<u64>,
    completed: bool,
}

impl Attribute {
    pub(crate) fn new(name: String, charset: Option<String>, declared_size: Option<u64>) -> Self {
        Self { name, raw: Vec::new(), value: String::new(), charset, declared_size, completed: false }
    }

    /// Accumulates raw bytes across possibly many calls and decodes the whole value under
    /// `encoding` only once, on the call that carries `is_last`. Decoding per chunk would split
    /// a multi-byte character that happens to straddle an `offer()` boundary and turn it into a
    /// stray replacement character, which would break chunking independence (§8).
    pub(crate) fn add_content(&mut self, bytes: &[u8], is_last: bool, encoding: &'static dyn Encoding) -> Result<(), DecodeError> {
        self.raw.extend_from_slice(bytes);
        if is_last {
            self.value = encoding.decode(&self.raw, DecoderTrap::Replace).map_err(DecodeError::charset_decoding)?;
            self.completed = true;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    pub fn completed(&self) -> bool {
        self.completed
    }
}

/// Where a [`FileUpload`]'s bytes actually live: kept in memory, or spilled to a temp file by
/// a [`crate::factory::PartFactory`] that decided the upload was too large to buffer.
pub(crate) enum PartStorage {
    Memory(Vec<u8>),
    Spilled {
        file: std::fs::File,
        path: PathBuf,
        // keeps the owning temp directory alive for as long as any spilled file in it is
        // reachable; dropping it removes the directory and everything in it.
        _dir: Arc<tempdir::TempDir>,
    },
}

impl fmt::Debug for PartStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartStorage::Memory(bytes) => f.debug_tuple("Memory").field(&bytes.len()).finish(),
            PartStorage::Spilled { path, .. } => f.debug_struct("Spilled").field("path", path).finish(),
        }
    }
}

/// A file upload: a name, a filename, a declared content-type and transfer mechanism, and the
/// payload bytes accumulated across possibly many `offer()` calls.
pub struct FileUpload {
    name: String,
    filename: String,
    content_type: String,
    transfer_mechanism: TransferMechanism,
    charset: Option<String>,
    declared_size: Option<u64>,
    completed: bool,
    storage: PartStorage,
    spill_policy: Option<SpillPolicy>,
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("transfer_mechanism", &self.transfer_mechanism)
            .field("charset", &self.charset)
            .field("declared_size", &self.declared_size)
            .field("completed", &self.completed)
            .field("storage", &self.storage)
            .finish()
    }
}

/// A factory's decision to spill a file upload's content to disk once it grows past
/// `threshold` bytes, and the temp directory new spill files are created under.
#[derive(Clone)]
pub(crate) struct SpillPolicy {
    pub(crate) threshold: usize,
    pub(crate) dir: Arc<tempdir::TempDir>,
}

impl FileUpload {
    pub(crate) fn new(
        name: String,
        filename: String,
        content_type: String,
        transfer_mechanism: TransferMechanism,
        charset: Option<String>,
        declared_size: Option<u64>,
        spill_policy: Option<SpillPolicy>,
    ) -> Self {
        Self {
            name,
            filename,
            content_type,
            transfer_mechanism,
            charset,
            declared_size,
            completed: false,
            storage: PartStorage::Memory(Vec::new()),
            spill_policy,
        }
    }

    /// Appends `bytes`, upgrading from in-memory to a spilled temp file the moment the
    /// accumulated size would cross the factory's spill threshold.
    pub(crate) fn add_content(&mut self, bytes: &[u8], is_last: bool) -> Result<(), DecodeError> {
        if let (PartStorage::Memory(buf), Some(policy)) = (&self.storage, &self.spill_policy) {
            if buf.len() + bytes.len() > policy.threshold {
                let (path, mut file) = create_spill_file(policy.dir.path())?;
                file.write_all(buf)?;
                file.write_all(bytes)?;
                tracing::debug!(name = %self.name, path = %path.display(), "spilled file upload to disk");
                self.storage = PartStorage::Spilled { file, path, _dir: policy.dir.clone() };
                if is_last {
                    self.completed = true;
                }
                return Ok(());
            }
        }
        match &mut self.storage {
            PartStorage::Memory(buf) => buf.extend_from_slice(bytes),
            PartStorage::Spilled { file, .. } => file.write_all(bytes)?,
        }
        if is_last {
            self.completed = true;
        }
        Ok(())
    }

    pub(crate) fn set_content_encoding(&mut self, mechanism: TransferMechanism) {
        self.transfer_mechanism = mechanism;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn transfer_mechanism(&self) -> TransferMechanism {
        self.transfer_mechanism
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    /// The in-memory payload, if this upload was not spilled to disk.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.storage {
            PartStorage::Memory(buf) => Some(buf),
            PartStorage::Spilled { .. } => None,
        }
    }

    /// The temp-file path holding the payload, if this upload was spilled to disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            PartStorage::Memory(_) => None,
            PartStorage::Spilled { path, .. } => Some(path),
        }
    }
}

/// A completed or in-progress form part: either an [`Attribute`] or a [`FileUpload`].
#[derive(Debug)]
pub enum Part {
    Attribute(Attribute),
    FileUpload(FileUpload),
}

impl Part {
    pub fn name(&self) -> &str {
        match self {
            Part::Attribute(a) => a.name(),
            Part::FileUpload(f) => f.name(),
        }
    }

    pub fn completed(&self) -> bool {
        match self {
            Part::Attribute(a) => a.completed(),
            Part::FileUpload(f) => f.completed(),
        }
    }

    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Part::Attribute(a) => Some(a),
            Part::FileUpload(_) => None,
        }
    }

    pub fn as_file_upload(&self) -> Option<&FileUpload> {
        match self {
            Part::FileUpload(f) => Some(f),
            Part::Attribute(_) => None,
        }
    }
}

/// An ordered pair `(outer_boundary, inner_boundary?)`. `inner_boundary` is set only while
/// parsing inside a `multipart/mixed` sub-part; exactly one level of nesting is permitted.
/// Both boundaries are stored with their leading `--` already attached.
#[derive(Debug, Clone)]
pub(crate) struct BoundaryContext {
    pub(crate) outer: Vec<u8>,
    pub(crate) inner: Option<Vec<u8>>,
}

impl BoundaryContext {
    pub(crate) fn new(outer: Vec<u8>) -> Self {
        let mut outer_with_dashes = b"--".to_vec();
        outer_with_dashes.extend_from_slice(&outer);
        Self { outer: outer_with_dashes, inner: None }
    }

    pub(crate) fn enter_mixed(&mut self, inner: Vec<u8>) {
        let mut inner_with_dashes = b"--".to_vec();
        inner_with_dashes.extend_from_slice(&inner);
        self.inner = Some(inner_with_dashes);
    }

    pub(crate) fn exit_mixed(&mut self) {
        self.inner = None;
    }

    pub(crate) fn in_mixed(&self) -> bool {
        self.inner.is_some()
    }
}

/// A case-insensitive mapping from header/parameter name to value, scoped to the part
/// currently being built. Keys are lower-cased at insertion, per the design's own suggestion.
#[derive(Debug, Default, Clone)]
pub(crate) struct FieldAttributeMap {
    entries: HashMap<String, String>,
}

impl FieldAttributeMap {
    pub(crate) fn insert(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_ascii_lowercase(), value);
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.entries.remove(&key.to_ascii_lowercase());
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_mechanism_is_case_insensitive() {
        assert_eq!(TransferMechanism::parse("7BIT").unwrap(), TransferMechanism::SevenBit);
        assert_eq!(TransferMechanism::parse("Binary").unwrap(), TransferMechanism::Binary);
        assert!(TransferMechanism::parse("quoted-printable").is_err());
    }

    #[test]
    fn field_attribute_map_is_case_insensitive() {
        let mut map = FieldAttributeMap::default();
        map.insert("Content-Type", "text/plain".to_string());
        assert_eq!(map.get("content-type"), Some("text/plain"));
        map.remove("CONTENT-TYPE");
        assert_eq!(map.get("content-type"), None);
    }

    #[test]
    fn attribute_accumulates_across_calls() {
        let mut attr = Attribute::new("k".to_string(), None, None);
        attr.add_content(b"hel", false, encoding::all::UTF_8).unwrap();
        attr.add_content(b"lo", true, encoding::all::UTF_8).unwrap();
        assert_eq!(attr.value(), "hello");
        assert!(attr.completed());
    }

    #[test]
    fn boundary_context_tracks_nesting() {
        let mut ctx = BoundaryContext::new(b"ABC".to_vec());
        assert_eq!(ctx.outer, b"--ABC");
        assert!(!ctx.in_mixed());
        ctx.enter_mixed(b"XYZ".to_vec());
        assert!(ctx.in_mixed());
        assert_eq!(ctx.inner.as_deref(), Some(&b"--XYZ"[..]));
        ctx.exit_mixed();
        assert!(!ctx.in_mixed());
    }
}
