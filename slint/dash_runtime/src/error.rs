//! Error types for the dashboard runtime.
//!
//! None of these escalate past the engine: a failing command is logged and
//! dropped, leaving the model as it was before the command arrived.

use thiserror::Error;

/// Failures of the resilient document decoder.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The document is not well-formed.
    #[error("malformed document: {0}")]
    Syntax(#[source] serde_json::Error),

    /// The arena had to grow past the configured cap.
    #[error("document needs more than {limit} arena bytes (gave up after {attempts} attempts)")]
    ArenaLimit { limit: usize, attempts: u32 },
}

/// Shared buffer budget exhaustion.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("buffer budget exhausted: requested {requested} bytes, {available} of {capacity} available")]
    Exhausted {
        requested: usize,
        available: usize,
        capacity: usize,
    },
}

/// Failures while decoding an icon glyph.
#[derive(Error, Debug)]
pub enum GlyphError {
    #[error("glyph data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("glyph data too short: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    #[error("icon reference is missing '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Misuse of the chunked reassembly protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("fragment at offset {offset} without a transfer in progress")]
    NoTransfer { offset: usize },

    #[error("fragment out of order: expected offset {expected}, got {offset}")]
    OutOfOrder { expected: usize, offset: usize },

    #[error("fragment {offset}+{len} overruns total size {total}")]
    Overrun {
        offset: usize,
        len: usize,
        total: usize,
    },

    #[error("total size changed mid-transfer: {started} then {total}")]
    TotalMismatch { started: usize, total: usize },

    #[error("transfer already complete; a new one must start at offset 0")]
    AlreadyComplete,

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Rejections while turning a page document into a definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("page grid must be at least 1x1, got {cols}x{rows}")]
    EmptyGrid { cols: i64, rows: i64 },

    #[error("item {index} at ({col},{row}) span {cols}x{rows} exceeds the {page_cols}x{page_rows} grid")]
    OutOfBounds {
        index: usize,
        col: u16,
        row: u16,
        cols: u16,
        rows: u16,
        page_cols: u16,
        page_rows: u16,
    },

    #[error("page catalogue is full ({max} pages)")]
    CatalogueFull { max: usize },
}
