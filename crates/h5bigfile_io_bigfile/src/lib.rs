//! `h5bigfile_io_bigfile` v1:
//! Rust-side reader/writer for the BigFile on-disk layout.
//!
//! Module layout:
//! - `file`   : BigFile root directory handle and block lookup
//! - `block`  : one block (header, blob files, checksums)
//! - `attrs`  : per-block attribute set (`attr-v2`)
//! - `dtype`  : numpy-style dtype strings
//! - `spec`   : enums/errors/constants
//! - `util`   : shared helper functions

pub mod attrs;
pub mod block;
pub mod dtype;
pub mod file;
pub mod spec;
mod util;

pub use attrs::{BigAttr, BigAttrSet};
pub use block::{BigBlock, calculate_nfile};
pub use dtype::{
    Dtype, ElementScalar, EnumByteOrder, EnumDtypeKind, decode_values, encode_values,
};
pub use file::BigFile;
pub use spec::{BigFileError, EnumBigFileMode};
