//! BigFile root handle: a directory of blocks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::block::BigBlock;
use crate::dtype::Dtype;
use crate::spec::{BigFileError, C_FILE_HEADER, EnumBigFileMode};
use crate::util::{map_io_error, normalize_block_name};

/// An opened BigFile.
///
/// Block names are slash-delimited; leading, trailing and repeated slashes are
/// ignored, so `/pos` and `pos/` refer to the same block.
#[derive(Debug)]
pub struct BigFile {
    path_dir_root: PathBuf,
    enum_mode: EnumBigFileMode,
}

impl BigFile {
    /// Create (or reuse) the root directory for writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, BigFileError> {
        let path_dir_root = path.as_ref().to_path_buf();
        if path_dir_root.exists() && !path_dir_root.is_dir() {
            return Err(BigFileError::RootNotDirectory(path_dir_root));
        }
        fs::create_dir_all(&path_dir_root).map_err(map_io_error(&path_dir_root))?;
        Ok(Self {
            path_dir_root,
            enum_mode: EnumBigFileMode::Create,
        })
    }

    /// Open an existing BigFile read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BigFileError> {
        let path_dir_root = path.as_ref().to_path_buf();
        let meta_root = fs::metadata(&path_dir_root).map_err(map_io_error(&path_dir_root))?;
        if !meta_root.is_dir() {
            return Err(BigFileError::RootNotDirectory(path_dir_root));
        }
        Ok(Self {
            path_dir_root,
            enum_mode: EnumBigFileMode::ReadOnly,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path_dir_root
    }

    pub fn mode(&self) -> EnumBigFileMode {
        self.enum_mode
    }

    /// Create a new block; fails if one already exists under `name`.
    pub fn create_block(
        &self,
        name: &str,
        dtype: Dtype,
        nmemb: usize,
        size: u64,
        nfile: usize,
    ) -> Result<BigBlock, BigFileError> {
        let name_block = normalize_block_name(name)?;
        if self.enum_mode == EnumBigFileMode::ReadOnly {
            return Err(BigFileError::ReadOnly(name_block));
        }
        if !dtype.is_valid() {
            return Err(BigFileError::InvalidDtype(dtype.to_string()));
        }
        let path_dir_block = self.path_dir_root.join(&name_block);
        BigBlock::create(path_dir_block, name_block, dtype, nmemb, size, nfile)
    }

    pub fn open_block(&self, name: &str) -> Result<BigBlock, BigFileError> {
        let name_block = normalize_block_name(name)?;
        let path_dir_block = self.path_dir_root.join(&name_block);
        BigBlock::open(path_dir_block, name_block, self.enum_mode)
    }

    pub fn has_block(&self, name: &str) -> bool {
        normalize_block_name(name)
            .map(|n| self.path_dir_root.join(n).join(C_FILE_HEADER).is_file())
            .unwrap_or(false)
    }

    /// Names of every block under the root, sorted.
    pub fn list_blocks(&self) -> Result<Vec<String>, BigFileError> {
        let mut l_names = Vec::new();
        walk_blocks(&self.path_dir_root, "", &mut l_names)?;
        l_names.sort();
        Ok(l_names)
    }

    /// Release the handle. Blocks flush themselves when closed.
    pub fn close(self) -> Result<(), BigFileError> {
        Ok(())
    }
}

fn walk_blocks(path_dir: &Path, prefix: &str, l_names: &mut Vec<String>) -> Result<(), BigFileError> {
    for entry_res in fs::read_dir(path_dir).map_err(map_io_error(path_dir))? {
        let entry = entry_res.map_err(map_io_error(path_dir))?;
        let path_entry = entry.path();
        if !path_entry.is_dir() {
            continue;
        }
        let c_name = entry.file_name().to_string_lossy().to_string();
        let name_block = if prefix.is_empty() {
            c_name
        } else {
            format!("{prefix}/{c_name}")
        };
        if path_entry.join(C_FILE_HEADER).is_file() {
            l_names.push(name_block.clone());
        }
        walk_blocks(&path_entry, &name_block, l_names)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::attrs::BigAttr;
    use crate::dtype::{ElementScalar, EnumByteOrder, EnumDtypeKind};

    use super::*;

    fn f8() -> Dtype {
        f64::dtype()
    }

    #[test]
    fn block_round_trip_with_shape_attr() {
        let tmp = TempDir::new().expect("tempdir");
        let path_bf = tmp.path().join("out.bf");

        let values: Vec<f64> = (0..300).map(|i| i as f64 * 0.5).collect();
        {
            let bf = BigFile::create(&path_bf).expect("create bigfile");
            let mut block = bf.create_block("/pos", f8(), 3, 100, 1).expect("create block");
            block
                .set_attr("ndarray.shape", BigAttr::from_values(&[100i64, 3]))
                .expect("set attr");
            block.write_values(0, &values).expect("write");
            block.close().expect("close block");
            bf.close().expect("close bigfile");
        }

        let bf = BigFile::open(&path_bf).expect("open bigfile");
        assert_eq!(bf.mode(), EnumBigFileMode::ReadOnly);
        let block = bf.open_block("pos").expect("open block");
        assert_eq!(block.dtype(), f8());
        assert_eq!(block.nmemb(), 3);
        assert_eq!(block.size(), 100);
        assert_eq!(block.read_values::<f64>(0, 100).expect("read"), values);
        assert_eq!(
            block.attr("ndarray.shape").unwrap().to_i64s().unwrap(),
            vec![100, 3]
        );
        block.verify_checksums().expect("checksums");

        let txt_header = fs::read_to_string(path_bf.join("pos/header")).unwrap();
        assert!(txt_header.starts_with(&format!("DTYPE: {}\nNMEMB: 3\nNFILE: 1\n000000: 100 : ", f8())));
        assert!(path_bf.join("pos/000000").is_file());
        assert!(path_bf.join("pos/attr-v2").is_file());
    }

    #[test]
    fn multi_file_block_spans_file_boundaries() {
        let tmp = TempDir::new().expect("tempdir");
        let bf = BigFile::create(tmp.path().join("bf")).expect("create");

        let values: Vec<i32> = (0..10).collect();
        let mut block = bf
            .create_block("a/b/c", i32::dtype(), 1, 10, 3)
            .expect("create block");
        assert_eq!(block.nfile(), 3);
        block.write_values(0, &values[..5]).expect("write head");
        block.write_values(5, &values[5..]).expect("write tail");
        assert_eq!(block.read_values::<i32>(2, 6).unwrap(), vec![2, 3, 4, 5, 6, 7]);
        block.verify_checksums().expect("checksums after incremental writes");

        block.write_values(3, &[30, 40]).expect("overwrite");
        block.verify_checksums().expect("checksums after overwrite");
        block.close().expect("close");

        let bf = BigFile::open(tmp.path().join("bf")).expect("open");
        let block = bf.open_block("a/b/c/").expect("open");
        assert_eq!(
            block.read_values::<i32>(0, 10).unwrap(),
            vec![0, 1, 2, 30, 40, 5, 6, 7, 8, 9]
        );
        block.verify_checksums().expect("checksums on reopen");
    }

    #[test]
    fn create_twice_and_missing_block_are_errors() {
        let tmp = TempDir::new().expect("tempdir");
        let bf = BigFile::create(tmp.path()).expect("create");
        bf.create_block("x", f8(), 1, 4, 1)
            .expect("first create")
            .close()
            .expect("close");

        assert!(matches!(
            bf.create_block("/x/", f8(), 1, 4, 1),
            Err(BigFileError::BlockExists(_))
        ));
        assert!(matches!(
            bf.open_block("y"),
            Err(BigFileError::BlockNotFound(_))
        ));
    }

    #[test]
    fn read_only_handles_reject_writes() {
        let tmp = TempDir::new().expect("tempdir");
        {
            let bf = BigFile::create(tmp.path()).expect("create");
            bf.create_block("x", f8(), 1, 2, 1).expect("create").close().expect("close");
        }
        let bf = BigFile::open(tmp.path()).expect("open");
        assert!(matches!(
            bf.create_block("y", f8(), 1, 2, 1),
            Err(BigFileError::ReadOnly(_))
        ));
        let mut block = bf.open_block("x").expect("open");
        assert!(matches!(
            block.write_values(0, &[1.0f64]),
            Err(BigFileError::ReadOnly(_))
        ));
    }

    #[test]
    fn write_validates_bounds_length_and_dtype() {
        let tmp = TempDir::new().expect("tempdir");
        let bf = BigFile::create(tmp.path()).expect("create");
        let mut block = bf.create_block("v", f8(), 2, 3, 1).expect("create");

        assert!(matches!(
            block.write(0, &[0u8; 15]),
            Err(BigFileError::LengthMismatch { .. })
        ));
        assert!(matches!(
            block.write_values(2, &[1.0f64, 2.0, 3.0, 4.0]),
            Err(BigFileError::OutOfBounds { .. })
        ));
        assert!(matches!(
            block.write_values(0, &[1i64, 2]),
            Err(BigFileError::DtypeMismatch { .. })
        ));
        assert!(matches!(
            block.read(3, 1),
            Err(BigFileError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn corrupted_blob_fails_checksum() {
        let tmp = TempDir::new().expect("tempdir");
        let bf = BigFile::create(tmp.path()).expect("create");
        let mut block = bf.create_block("c", u8::dtype(), 1, 4, 1).expect("create");
        block.write_values(0, &[1u8, 2, 3, 4]).expect("write");
        block.close().expect("close");

        fs::write(tmp.path().join("c/000000"), [1u8, 2, 3, 5]).expect("corrupt");
        let block = bf.open_block("c").expect("open");
        assert!(matches!(
            block.verify_checksums(),
            Err(BigFileError::ChecksumMismatch { expected: 10, actual: 11, .. })
        ));
    }

    #[test]
    fn dropped_block_still_flushes_header() {
        let tmp = TempDir::new().expect("tempdir");
        let bf = BigFile::create(tmp.path()).expect("create");
        {
            let mut block = bf.create_block("d", u8::dtype(), 1, 2, 1).expect("create");
            block.write_values(0, &[7u8, 8]).expect("write");
            block
                .set_attr("note", BigAttr::from_text("dropped"))
                .expect("attr");
        }
        let block = bf.open_block("d").expect("open");
        block.verify_checksums().expect("header flushed on drop");
        assert_eq!(block.attr("note").unwrap().to_text().as_deref(), Some("dropped"));
    }

    #[test]
    fn list_blocks_walks_nested_names() {
        let tmp = TempDir::new().expect("tempdir");
        let bf = BigFile::create(tmp.path()).expect("create");
        for name in ["/pos", "particles/mass/", "particles/velocity/", "g1/g2/leaf"] {
            bf.create_block(name, f8(), 1, 1, 1)
                .expect("create")
                .close()
                .expect("close");
        }
        assert_eq!(
            bf.list_blocks().expect("list"),
            vec!["g1/g2/leaf", "particles/mass", "particles/velocity", "pos"]
        );
        assert!(bf.has_block("particles/mass/"));
        assert!(!bf.has_block("particles"));
    }

    #[test]
    fn create_block_rejects_unparseable_dtype() {
        let tmp = TempDir::new().expect("tempdir");
        let bf = BigFile::create(tmp.path()).expect("create");
        let dtype = Dtype::with_byte_order(EnumDtypeKind::Int, 16, EnumByteOrder::Little);
        assert!(matches!(
            bf.create_block("wide", dtype, 1, 2, 1),
            Err(BigFileError::InvalidDtype(_))
        ));
        assert!(!tmp.path().join("wide").exists());
    }
}
