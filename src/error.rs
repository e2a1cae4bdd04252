//! Error types for multipart decoding.
//!
//! This module provides error types for handling various error conditions that may occur
//! while constructing a decoder and while feeding it bytes.
//!
//! # Error Types
//!
//! - [`MultipartError`]: The top-level error type returned from the public decoder surface
//!   - [`HeaderError`]: Construction-time errors (missing or malformed `Content-Type`)
//!   - [`DecodeError`]: Errors that occur while decoding an already-constructed body
//!
//! `NotEnoughData` from the design is intentionally not a variant here: it is modeled by
//! [`crate::scanner::Progress`] and never escapes a public call.
use std::io;
use thiserror::Error;

/// Errors raised while constructing a [`crate::MultipartDecoder`].
///
/// These can only happen once, at `new()` time, before any bytes have been offered.
#[derive(Error, Debug)]
pub enum HeaderError {
    /// The request carried no `Content-Type` header at all.
    #[error("missing content-type header")]
    MissingContentType,

    /// The `Content-Type` header's value could not be parsed as a MIME type.
    #[error("invalid content-type header: {reason}")]
    InvalidContentType { reason: String },

    /// The `Content-Type` is not `multipart/form-data` or `multipart/mixed`.
    #[error("content-type is not multipart: {0}")]
    NotMultipart(String),

    /// `Content-Type` was multipart but carried no `boundary` parameter.
    #[error("missing boundary parameter in content-type")]
    MissingBoundary,

    /// The `boundary` parameter was present but empty.
    #[error("boundary parameter is empty")]
    EmptyBoundary,
}

/// Errors raised while decoding an already-constructed body.
///
/// Corresponds to `ErrorDataDecoder` in the design: malformed input, unrecognized tokens,
/// or a factory that rejected a part.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The byte stream does not conform to the multipart grammar.
    #[error("malformed multipart body: {reason}")]
    Malformed { reason: String },

    /// A `Content-Transfer-Encoding` value other than `7bit`, `8bit`, or `binary`.
    #[error("unknown content-transfer-encoding: {0}")]
    UnknownTransferEncoding(String),

    /// A `charset` parameter naming an encoding this crate does not recognize.
    #[error("unknown charset: {0}")]
    UnknownCharset(String),

    /// Bytes in a header or field value could not be decoded under the active charset.
    #[error("charset decoding failed: {reason}")]
    CharsetDecoding { reason: String },

    /// A `multipart/mixed` sub-part had no `filename` parameter.
    #[error("multipart/mixed sub-part is missing filename")]
    MixedMissingFilename,

    /// A `multipart/mixed` section was encountered while already inside one.
    #[error("nested multipart/mixed is not supported")]
    NestedMixed,

    /// The header section of a part had no recognizable `Content-Disposition`.
    #[error("part is missing content-disposition header")]
    MissingDisposition,

    /// A header line could not be split into a name and a value.
    #[error("nonsensical header line: {0:?}")]
    InvalidHeaderLine(String),

    /// The data factory rejected a part (invalid name, invalid encoding, I/O failure, ...).
    #[error("factory error: {reason}")]
    Factory { reason: String },

    /// An I/O failure while spilling part content to disk.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl DecodeError {
    /// Creates a new [`DecodeError::Malformed`].
    pub fn malformed<S: ToString>(reason: S) -> Self {
        Self::Malformed { reason: reason.to_string() }
    }

    /// Creates a new [`DecodeError::CharsetDecoding`].
    pub fn charset_decoding<S: ToString>(reason: S) -> Self {
        Self::CharsetDecoding { reason: reason.to_string() }
    }

    /// Creates a new [`DecodeError::Factory`].
    pub fn factory<S: ToString>(reason: S) -> Self {
        Self::Factory { reason: reason.to_string() }
    }
}

/// The top-level error type for the public decoder surface.
#[derive(Error, Debug)]
pub enum MultipartError {
    /// Failed to construct a decoder from the request's headers.
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// Failed to decode bytes already offered to the decoder.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// `next()` was called after the last part at end of stream.
    #[error("end of data")]
    EndOfData,

    /// Any public operation after `destroy()`.
    #[error("decoder has been destroyed")]
    Destroyed,
}
