//! Incremental, streaming decoder for HTTP `multipart/form-data` request bodies (RFC 7578),
//! including the legacy `multipart/mixed` nested sub-part form some browsers use to batch file
//! uploads under one field name.
//!
//! Bytes arrive in arbitrary chunks via [`MultipartDecoder::offer`]; the decoder turns them into
//! an ordered sequence of [`Part`]s without buffering the full body and without re-scanning
//! bytes it has already consumed. See [`MultipartDecoder`] for the full public surface.

mod buffer;
mod content_type;
pub mod decoder;
pub mod error;
pub mod factory;
mod header;
pub mod part;
mod scanner;
mod sink;

pub use decoder::MultipartDecoder;
pub use error::{DecodeError, HeaderError, MultipartError};
pub use factory::{InMemoryFactory, PartFactory, SpillingFactory};
pub use part::{Attribute, FileUpload, Part, TransferMechanism};
