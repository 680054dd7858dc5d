//! BigFile open modes, file-name constants and top-level error types.

use std::io;
use std::path::PathBuf;

////////////////////////////////////////////////////////////////////////////////
// #region Constants

/// Block header file name (dtype, nmemb, per-file sizes and checksums).
pub const C_FILE_HEADER: &str = "header";
/// Block attribute file name (text format, one attribute per line).
pub const C_FILE_ATTR: &str = "attr-v2";

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// How a BigFile (and every block opened through it) may be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumBigFileMode {
    /// Blocks may be created and written.
    Create,
    /// Blocks may only be opened and read.
    ReadOnly,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Errors raised by BigFile / BigBlock operations.
#[derive(Debug, thiserror::Error)]
pub enum BigFileError {
    /// Underlying filesystem error, tagged with the offending path.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// BigFile root exists but is not a directory.
    #[error("BigFile root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),
    /// Dtype string could not be parsed.
    #[error("Invalid dtype `{0}`")]
    InvalidDtype(String),
    /// Header file is malformed.
    #[error("Invalid block header {}: {message}", .path.display())]
    InvalidHeader { path: PathBuf, message: String },
    /// Attribute file is malformed.
    #[error("Invalid attribute file {}: {message}", .path.display())]
    InvalidAttrFile { path: PathBuf, message: String },
    /// Attribute names must be non-empty and free of whitespace.
    #[error("Invalid attribute name `{0}`")]
    InvalidAttrName(String),
    /// Block name is empty or escapes the BigFile root.
    #[error("Invalid block name `{0}`")]
    InvalidBlockName(String),
    /// Block header already present at creation time.
    #[error("Block already exists: {0}")]
    BlockExists(String),
    /// No block header at the requested name.
    #[error("Block not found: {0}")]
    BlockNotFound(String),
    /// Mutation requested on a read-only handle.
    #[error("Block `{0}` is opened read-only")]
    ReadOnly(String),
    /// Row range does not fit into the block.
    #[error("Rows {start}..{end} out of bounds for block `{block}` of size {size}")]
    OutOfBounds {
        block: String,
        start: u64,
        end: u64,
        size: u64,
    },
    /// Buffer length is not a whole number of rows.
    #[error(
        "Buffer of {actual} bytes is not a whole number of {row_bytes}-byte rows for block `{block}`"
    )]
    LengthMismatch {
        block: String,
        actual: usize,
        row_bytes: usize,
    },
    /// Recomputed blob checksum differs from the header.
    #[error("Checksum mismatch in {}: header={expected} actual={actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
    /// Named attribute missing from the block.
    #[error("Attribute `{name}` not found on block `{block}`")]
    AttrNotFound { block: String, name: String },
    /// Typed access with a dtype that does not match the stored one.
    #[error("Dtype mismatch: expected {expected}, found {actual}")]
    DtypeMismatch { expected: String, actual: String },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
