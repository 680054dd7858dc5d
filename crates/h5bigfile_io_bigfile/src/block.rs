//! One BigFile block: a flat table of `size` rows x `nmemb` columns of `dtype`,
//! stored across `nfile` blob files next to a text header.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::attrs::{BigAttr, BigAttrSet};
use crate::dtype::{Dtype, ElementScalar, decode_values, encode_values};
use crate::spec::{BigFileError, C_FILE_ATTR, C_FILE_HEADER, EnumBigFileMode};
use crate::util::{
    derive_blob_file_name, fold_checksum, map_io_error, split_rows_evenly, sysv_sum,
};

/// Number of blob files for a block of `size` rows.
///
/// One file unless `bytes_per_file` is set, in which case the block is split so
/// that no file exceeds it (never fewer than one file).
pub fn calculate_nfile(size: u64, nmemb: usize, itemsize: usize, bytes_per_file: Option<u64>) -> usize {
    let Some(bytes_per_file) = bytes_per_file.filter(|n| *n > 0) else {
        return 1;
    };
    let n_bytes = size * (nmemb * itemsize) as u64;
    (n_bytes.div_ceil(bytes_per_file) as usize).max(1)
}

/// Open block handle.
///
/// Dirty headers/attributes are flushed by [`BigBlock::close`], or on drop as a
/// fallback (errors are only logged there).
#[derive(Debug)]
pub struct BigBlock {
    name: String,
    path_dir_block: PathBuf,
    dtype: Dtype,
    nmemb: usize,
    l_fsize: Vec<u64>,
    l_fchecksum: Vec<u32>,
    attrs: BigAttrSet,
    enum_mode: EnumBigFileMode,
    if_dirty: bool,
}

impl BigBlock {
    pub(crate) fn create(
        path_dir_block: PathBuf,
        name: String,
        dtype: Dtype,
        nmemb: usize,
        size: u64,
        nfile: usize,
    ) -> Result<Self, BigFileError> {
        let path_header = path_dir_block.join(C_FILE_HEADER);
        if path_header.exists() {
            return Err(BigFileError::BlockExists(name));
        }
        fs::create_dir_all(&path_dir_block).map_err(map_io_error(&path_dir_block))?;

        let nfile = nfile.max(1);
        let l_fsize = split_rows_evenly(size, nfile);
        let n_row_bytes = (nmemb * dtype.itemsize()) as u64;
        for (i, n_rows) in l_fsize.iter().enumerate() {
            let path_blob = path_dir_block.join(derive_blob_file_name(i));
            let file_blob = File::create(&path_blob).map_err(map_io_error(&path_blob))?;
            file_blob
                .set_len(n_rows * n_row_bytes)
                .map_err(map_io_error(&path_blob))?;
        }

        let mut block = Self {
            name,
            path_dir_block,
            dtype,
            nmemb,
            l_fchecksum: vec![0; l_fsize.len()],
            l_fsize,
            attrs: BigAttrSet::default(),
            enum_mode: EnumBigFileMode::Create,
            if_dirty: true,
        };
        block.flush()?;
        Ok(block)
    }

    pub(crate) fn open(
        path_dir_block: PathBuf,
        name: String,
        enum_mode: EnumBigFileMode,
    ) -> Result<Self, BigFileError> {
        let path_header = path_dir_block.join(C_FILE_HEADER);
        if !path_header.is_file() {
            return Err(BigFileError::BlockNotFound(name));
        }
        let txt_header = fs::read_to_string(&path_header).map_err(map_io_error(&path_header))?;
        let (dtype, nmemb, l_fsize, l_fchecksum) = parse_header(&txt_header, &path_header)?;
        let attrs = BigAttrSet::load(&path_dir_block.join(C_FILE_ATTR))?;

        Ok(Self {
            name,
            path_dir_block,
            dtype,
            nmemb,
            l_fsize,
            l_fchecksum,
            attrs,
            enum_mode,
            if_dirty: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path_dir_block
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn nmemb(&self) -> usize {
        self.nmemb
    }

    /// Total number of rows.
    pub fn size(&self) -> u64 {
        self.l_fsize.iter().sum()
    }

    pub fn nfile(&self) -> usize {
        self.l_fsize.len()
    }

    /// Bytes per row (`nmemb * itemsize`).
    pub fn row_bytes(&self) -> usize {
        self.nmemb * self.dtype.itemsize()
    }

    pub fn attrs(&self) -> &BigAttrSet {
        &self.attrs
    }

    /// Look up an attribute that must exist.
    pub fn attr(&self, name: &str) -> Result<&BigAttr, BigFileError> {
        self.attrs
            .get(name)
            .ok_or_else(|| BigFileError::AttrNotFound {
                block: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn set_attr(&mut self, name: &str, attr: BigAttr) -> Result<(), BigFileError> {
        self.ensure_writable()?;
        self.attrs.set(name, attr)
    }

    /// Write whole rows starting at `start_row`.
    ///
    /// Blob checksums are updated incrementally from the bytes being replaced.
    pub fn write(&mut self, start_row: u64, data: &[u8]) -> Result<(), BigFileError> {
        self.ensure_writable()?;
        let n_rows = self.count_rows(data.len())?;
        self.check_bounds(start_row, n_rows)?;
        let n_row_bytes = self.row_bytes() as u64;

        let mut n_offset_data = 0usize;
        for (i, (n_file_start, n_file_rows)) in self.file_ranges().into_iter().enumerate() {
            let Some((n_first, n_count)) =
                overlap_rows(start_row, n_rows, n_file_start, n_file_rows)
            else {
                continue;
            };
            let n_bytes = (n_count * n_row_bytes) as usize;
            let chunk_new = &data[n_offset_data..n_offset_data + n_bytes];
            let n_pos = (n_first - n_file_start) * n_row_bytes;

            let path_blob = self.path_dir_block.join(derive_blob_file_name(i));
            let mut file_blob = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path_blob)
                .map_err(map_io_error(&path_blob))?;
            let mut chunk_old = vec![0u8; n_bytes];
            file_blob
                .seek(SeekFrom::Start(n_pos))
                .and_then(|_| file_blob.read_exact(&mut chunk_old))
                .map_err(map_io_error(&path_blob))?;
            file_blob
                .seek(SeekFrom::Start(n_pos))
                .and_then(|_| file_blob.write_all(chunk_new))
                .map_err(map_io_error(&path_blob))?;

            self.l_fchecksum[i] = self.l_fchecksum[i]
                .wrapping_sub(sysv_sum(0, &chunk_old))
                .wrapping_add(sysv_sum(0, chunk_new));
            n_offset_data += n_bytes;
        }
        self.if_dirty = true;
        Ok(())
    }

    /// Read `n_rows` whole rows starting at `start_row`.
    pub fn read(&self, start_row: u64, n_rows: u64) -> Result<Vec<u8>, BigFileError> {
        self.check_bounds(start_row, n_rows)?;
        let n_row_bytes = self.row_bytes() as u64;
        let mut buf = Vec::with_capacity((n_rows * n_row_bytes) as usize);

        for (i, (n_file_start, n_file_rows)) in self.file_ranges().into_iter().enumerate() {
            let Some((n_first, n_count)) =
                overlap_rows(start_row, n_rows, n_file_start, n_file_rows)
            else {
                continue;
            };
            let path_blob = self.path_dir_block.join(derive_blob_file_name(i));
            let mut file_blob = File::open(&path_blob).map_err(map_io_error(&path_blob))?;
            let mut chunk = vec![0u8; (n_count * n_row_bytes) as usize];
            file_blob
                .seek(SeekFrom::Start((n_first - n_file_start) * n_row_bytes))
                .and_then(|_| file_blob.read_exact(&mut chunk))
                .map_err(map_io_error(&path_blob))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Read every row of the block.
    pub fn read_all(&self) -> Result<Vec<u8>, BigFileError> {
        self.read(0, self.size())
    }

    /// Typed write; `T` must match the block dtype.
    pub fn write_values<T: ElementScalar>(
        &mut self,
        start_row: u64,
        values: &[T],
    ) -> Result<(), BigFileError> {
        if T::dtype() != self.dtype {
            return Err(BigFileError::DtypeMismatch {
                expected: self.dtype.to_string(),
                actual: T::dtype().to_string(),
            });
        }
        self.write(start_row, &encode_values(values))
    }

    /// Typed read; `T` must match the block dtype.
    pub fn read_values<T: ElementScalar>(
        &self,
        start_row: u64,
        n_rows: u64,
    ) -> Result<Vec<T>, BigFileError> {
        if T::dtype() != self.dtype {
            return Err(BigFileError::DtypeMismatch {
                expected: self.dtype.to_string(),
                actual: T::dtype().to_string(),
            });
        }
        decode_values(self.dtype, &self.read(start_row, n_rows)?)
    }

    /// Recompute every blob checksum and compare it with the header.
    pub fn verify_checksums(&self) -> Result<(), BigFileError> {
        for (i, n_expected) in self.l_fchecksum.iter().enumerate() {
            let path_blob = self.path_dir_block.join(derive_blob_file_name(i));
            let bytes = fs::read(&path_blob).map_err(map_io_error(&path_blob))?;
            let n_actual = sysv_sum(0, &bytes);
            if n_actual != *n_expected {
                return Err(BigFileError::ChecksumMismatch {
                    path: path_blob,
                    expected: *n_expected,
                    actual: n_actual,
                });
            }
        }
        Ok(())
    }

    /// Persist header and attributes if they changed.
    pub fn flush(&mut self) -> Result<(), BigFileError> {
        if self.enum_mode == EnumBigFileMode::ReadOnly {
            return Ok(());
        }
        if self.if_dirty {
            let path_header = self.path_dir_block.join(C_FILE_HEADER);
            fs::write(&path_header, self.format_header()).map_err(map_io_error(&path_header))?;
            self.if_dirty = false;
        }
        if self.attrs.is_dirty() {
            self.attrs.store(&self.path_dir_block.join(C_FILE_ATTR))?;
        }
        Ok(())
    }

    /// Flush and release the block.
    pub fn close(mut self) -> Result<(), BigFileError> {
        self.flush()
    }

    fn ensure_writable(&self) -> Result<(), BigFileError> {
        match self.enum_mode {
            EnumBigFileMode::Create => Ok(()),
            EnumBigFileMode::ReadOnly => Err(BigFileError::ReadOnly(self.name.clone())),
        }
    }

    fn count_rows(&self, n_bytes: usize) -> Result<u64, BigFileError> {
        let n_row_bytes = self.row_bytes();
        let mismatch = || BigFileError::LengthMismatch {
            block: self.name.clone(),
            actual: n_bytes,
            row_bytes: n_row_bytes,
        };
        if n_row_bytes == 0 {
            return if n_bytes == 0 { Ok(0) } else { Err(mismatch()) };
        }
        if n_bytes % n_row_bytes != 0 {
            return Err(mismatch());
        }
        Ok((n_bytes / n_row_bytes) as u64)
    }

    fn check_bounds(&self, start_row: u64, n_rows: u64) -> Result<(), BigFileError> {
        let size = self.size();
        let end = start_row.saturating_add(n_rows);
        if end > size {
            return Err(BigFileError::OutOfBounds {
                block: self.name.clone(),
                start: start_row,
                end,
                size,
            });
        }
        Ok(())
    }

    /// `(first_row, n_rows)` of every blob file.
    fn file_ranges(&self) -> Vec<(u64, u64)> {
        let mut n_start = 0u64;
        self.l_fsize
            .iter()
            .map(|n_rows| {
                let range = (n_start, *n_rows);
                n_start += n_rows;
                range
            })
            .collect()
    }

    fn format_header(&self) -> String {
        let mut txt = format!(
            "DTYPE: {}\nNMEMB: {}\nNFILE: {}\n",
            self.dtype,
            self.nmemb,
            self.l_fsize.len()
        );
        for (i, (n_rows, n_sum)) in self.l_fsize.iter().zip(&self.l_fchecksum).enumerate() {
            txt.push_str(&format!(
                "{}: {n_rows} : {n_sum} : {}\n",
                derive_blob_file_name(i),
                fold_checksum(*n_sum)
            ));
        }
        txt
    }
}

impl Drop for BigBlock {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush block `{}` on drop: {e}", self.name);
        }
    }
}

fn overlap_rows(start: u64, n_rows: u64, file_start: u64, file_rows: u64) -> Option<(u64, u64)> {
    let first = start.max(file_start);
    let end = (start + n_rows).min(file_start + file_rows);
    (first < end).then(|| (first, end - first))
}

fn parse_header(
    txt: &str,
    path_header: &Path,
) -> Result<(Dtype, usize, Vec<u64>, Vec<u32>), BigFileError> {
    let invalid = |message: String| BigFileError::InvalidHeader {
        path: path_header.to_path_buf(),
        message,
    };

    let mut dtype: Option<Dtype> = None;
    let mut nmemb: Option<usize> = None;
    let mut nfile: Option<usize> = None;
    let mut l_fsize = Vec::new();
    let mut l_fchecksum = Vec::new();

    for line in txt.lines().filter(|l| !l.trim().is_empty()) {
        let Some((c_key, c_rest)) = line.split_once(':') else {
            return Err(invalid(format!("malformed line `{line}`")));
        };
        match c_key.trim() {
            "DTYPE" => dtype = Some(Dtype::parse(c_rest)?),
            "NMEMB" => {
                nmemb = Some(
                    c_rest
                        .trim()
                        .parse()
                        .map_err(|e| invalid(format!("bad NMEMB ({e})")))?,
                )
            }
            "NFILE" => {
                nfile = Some(
                    c_rest
                        .trim()
                        .parse()
                        .map_err(|e| invalid(format!("bad NFILE ({e})")))?,
                )
            }
            c_index => {
                let n_index = usize::from_str_radix(c_index, 16)
                    .map_err(|_| invalid(format!("unknown header key `{c_index}`")))?;
                if n_index != l_fsize.len() {
                    return Err(invalid(format!("file entries out of order at `{c_index}`")));
                }
                let l_parts: Vec<&str> = c_rest.split(':').map(str::trim).collect();
                let [c_size, c_sum, ..] = l_parts.as_slice() else {
                    return Err(invalid(format!("malformed file entry `{line}`")));
                };
                l_fsize.push(
                    c_size
                        .parse::<u64>()
                        .map_err(|e| invalid(format!("bad file size ({e})")))?,
                );
                l_fchecksum.push(
                    c_sum
                        .parse::<u32>()
                        .map_err(|e| invalid(format!("bad checksum ({e})")))?,
                );
            }
        }
    }

    let dtype = dtype.ok_or_else(|| invalid("missing DTYPE".to_string()))?;
    let nmemb = nmemb.ok_or_else(|| invalid("missing NMEMB".to_string()))?;
    let nfile = nfile.ok_or_else(|| invalid("missing NFILE".to_string()))?;
    if nfile != l_fsize.len() {
        return Err(invalid(format!(
            "NFILE={nfile} but {} file entries",
            l_fsize.len()
        )));
    }
    Ok((dtype, nmemb, l_fsize, l_fchecksum))
}
