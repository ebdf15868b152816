//! Error types for reading and writing BSP tree files.

use std::io;

use thiserror::Error;

/// Errors that can occur while reading or writing a chunked BSP tree stream.
///
/// Everything except [`Io`](BspError::Io) means the data is corrupt; none of
/// them are recoverable.
#[derive(Debug, Error)]
pub enum BspError {
    /// Underlying stream error, including truncated data.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A chunk with a different name was found where one was required.
    #[error("expected chunk \"{expected}\", found \"{found}\"")]
    UnexpectedChunk { expected: String, found: String },

    /// The file was written by an incompatible format version.
    #[error("unsupported bsp tree version {found} (expected {expected})")]
    VersionMismatch { found: i32, expected: i32 },

    /// A polygon references a vertex outside the vertex pool.
    #[error("polygon {polygon} references invalid vertex {index}")]
    InvalidVertexIndex { polygon: usize, index: i32 },

    /// A node references a polygon outside the polygon pool.
    #[error("node references invalid polygon {0}")]
    InvalidPolygonIndex(i32),

    /// A polygon record is malformed or degenerate.
    #[error("invalid polygon {polygon}: {reason}")]
    InvalidPolygon { polygon: usize, reason: &'static str },

    /// A node has child flag bits other than positive/negative set.
    #[error("invalid node child flags {0:#x}")]
    InvalidChildFlags(i32),

    /// The stream holds more nodes than its header declared.
    #[error("more than {0} nodes in stream")]
    NodeCountExceeded(usize),

    /// A negative or otherwise impossible element count.
    #[error("invalid {what} count {count}")]
    InvalidCount { what: &'static str, count: i32 },

    /// A read ran past the end of the enclosing chunk.
    #[error("read past end of chunk \"{0}\"")]
    ChunkOverflow(String),

    /// A chunk header declared a negative payload length.
    #[error("invalid length {length} for chunk \"{name}\"")]
    InvalidChunkLength { name: String, length: i32 },

    /// `end_chunk` was called with no chunk open.
    #[error("end_chunk without matching begin_chunk")]
    UnpairedEndChunk,

    /// A chunk name or string is not valid UTF-8 or too long.
    #[error("invalid string: {0}")]
    InvalidString(&'static str),

    /// A variable-length integer does not fit in 32 bits.
    #[error("variable-length integer overflow")]
    VarIntOverflow,

    /// A float that must be finite is NaN or infinite.
    #[error("non-finite {0}")]
    NonFinite(&'static str),
}

/// Result type for BSP tree file operations.
pub type Result<T> = std::result::Result<T, BspError>;
