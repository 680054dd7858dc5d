use std::io;
use std::path::Path;

use crate::spec::BigFileError;

////////////////////////////////////////////////////////////////////////////////
// #region Checksums

/// SysV-style running byte sum (wrapping).
pub(crate) fn sysv_sum(checksum: u32, bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(checksum, |acc, b| acc.wrapping_add(u32::from(*b)))
}

/// Fold a raw byte sum into the 16-bit checksum printed next to it.
pub(crate) fn fold_checksum(sum: u32) -> u32 {
    let r = (sum & 0xffff) + (sum >> 16);
    (r & 0xffff) + (r >> 16)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Naming

/// Blob file name for file index `i` (`000000`, `00000A`, ...).
pub(crate) fn derive_blob_file_name(i: usize) -> String {
    format!("{i:06X}")
}

/// Canonical block name: components joined by `/`, no leading/trailing slash.
///
/// `/pos`, `pos` and `pos/` all name the same block.
pub(crate) fn normalize_block_name(name: &str) -> Result<String, BigFileError> {
    let l_parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
    if l_parts.is_empty() || l_parts.iter().any(|p| *p == "." || *p == "..") {
        return Err(BigFileError::InvalidBlockName(name.to_string()));
    }
    Ok(l_parts.join("/"))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Encoding

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    let mut txt = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        txt.push_str(&format!("{b:02X}"));
    }
    txt
}

pub(crate) fn decode_hex(txt: &str) -> Option<Vec<u8>> {
    if txt.len() % 2 != 0 {
        return None;
    }
    (0..txt.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(txt.get(i..i + 2)?, 16).ok())
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Layout

/// Split `size` rows over `nfile` blob files as evenly as possible.
pub(crate) fn split_rows_evenly(size: u64, nfile: usize) -> Vec<u64> {
    let n = nfile as u64;
    (0..n)
        .map(|i| size * (i + 1) / n - size * i / n)
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

pub(crate) fn map_io_error(path: &Path) -> impl FnOnce(io::Error) -> BigFileError + '_ {
    move |source| BigFileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
