//! Pluggable construction of [`Attribute`](crate::part::Attribute) and
//! [`FileUpload`](crate::part::FileUpload) values.
//!
//! The decoder never allocates a part's storage directly — it asks a [`PartFactory`] to build
//! one. The default [`InMemoryFactory`] never spills; [`SpillingFactory`] upgrades any file
//! upload past a configured size to a temp file, so a caller processing untrusted uploads can
//! bound worst-case memory use without the decoder itself knowing about the filesystem.

use crate::error::DecodeError;
use crate::part::{Attribute, FileUpload, SpillPolicy, TransferMechanism};
use std::sync::Arc;

/// Constructs the storage backing each part as the decoder discovers it.
///
/// Implementations decide *where* a part's bytes live; the decoder only ever calls
/// `add_content`/`completed` on the values returned here. `release` and `release_all` are best
/// effort hooks for reclaiming resources (e.g. deleting spilled temp files) for parts the caller
/// no longer wants — the default `InMemoryFactory` implementation of both is a no-op.
pub trait PartFactory {
    /// Creates a new attribute named `name`, decoded under `charset` if given.
    fn create_attribute(&mut self, name: String, charset: Option<String>, declared_size: Option<u64>) -> Result<Attribute, DecodeError>;

    /// Creates a new file upload.
    #[allow(clippy::too_many_arguments)]
    fn create_file_upload(
        &mut self,
        name: String,
        filename: String,
        content_type: String,
        transfer_mechanism: TransferMechanism,
        charset: Option<String>,
        declared_size: Option<u64>,
    ) -> Result<FileUpload, DecodeError>;

    /// Releases any resources held by `part`. Called when a caller discards a part without
    /// reading it (e.g. [`crate::sink::PartSink::release_unread`]).
    fn release(&mut self, _part: &crate::part::Part) {}

    /// Releases resources for every part still held by the decoder, e.g. on `destroy()`.
    fn release_all(&mut self, _parts: &[crate::part::Part]) {}
}

/// The default factory: every attribute and file upload is held entirely in memory for the
/// lifetime of the decoder. Simple, but gives an adversarial request no bound on memory use
/// beyond the decoder's own discard threshold.
#[derive(Debug, Default)]
pub struct InMemoryFactory;

impl PartFactory for InMemoryFactory {
    fn create_attribute(&mut self, name: String, charset: Option<String>, declared_size: Option<u64>) -> Result<Attribute, DecodeError> {
        Ok(Attribute::new(name, charset, declared_size))
    }

    fn create_file_upload(
        &mut self,
        name: String,
        filename: String,
        content_type: String,
        transfer_mechanism: TransferMechanism,
        charset: Option<String>,
        declared_size: Option<u64>,
    ) -> Result<FileUpload, DecodeError> {
        Ok(FileUpload::new(name, filename, content_type, transfer_mechanism, charset, declared_size, None))
    }
}

/// A factory that spills file upload content to a temp directory once a single upload's
/// accumulated size passes `threshold` bytes. Attributes are never spilled — see
/// `DESIGN.md`'s Open Question decision on this.
#[derive(Debug)]
pub struct SpillingFactory {
    threshold: usize,
    dir: Arc<tempdir::TempDir>,
}

impl SpillingFactory {
    /// Creates a new spilling factory backed by a fresh temp directory, spilling any file
    /// upload whose content grows past `threshold` bytes.
    pub fn new(threshold: usize) -> std::io::Result<Self> {
        let dir = tempdir::TempDir::new("micro-multipart")?;
        Ok(Self { threshold, dir: Arc::new(dir) })
    }

    /// The directory spilled files are created under.
    pub fn dir_path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

impl PartFactory for SpillingFactory {
    fn create_attribute(&mut self, name: String, charset: Option<String>, declared_size: Option<u64>) -> Result<Attribute, DecodeError> {
        Ok(Attribute::new(name, charset, declared_size))
    }

    fn create_file_upload(
        &mut self,
        name: String,
        filename: String,
        content_type: String,
        transfer_mechanism: TransferMechanism,
        charset: Option<String>,
        declared_size: Option<u64>,
    ) -> Result<FileUpload, DecodeError> {
        let policy = SpillPolicy { threshold: self.threshold, dir: self.dir.clone() };
        Ok(FileUpload::new(name, filename, content_type, transfer_mechanism, charset, declared_size, Some(policy)))
    }

    fn release(&mut self, part: &crate::part::Part) {
        if let crate::part::Part::FileUpload(f) = part {
            if let Some(path) = f.path() {
                if let Err(err) = std::fs::remove_file(path) {
                    tracing::debug!(?path, %err, "failed to remove spilled file on release");
                }
            }
        }
    }

    fn release_all(&mut self, parts: &[crate::part::Part]) {
        for part in parts {
            self.release(part);
        }
    }
}
