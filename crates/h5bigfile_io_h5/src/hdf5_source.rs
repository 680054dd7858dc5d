//! HDF5 source backend (feature `hdf5`).
//!
//! Datatypes are classified straight from the file type through the C API so
//! that multi-dimensional array members keep their rank. Data is read with the
//! file type as memory type, so bytes arrive exactly as stored and compound
//! field offsets stay valid.

use std::ffi::CStr;
use std::path::Path;
use std::rc::Rc;

use h5bigfile_io_bigfile::{Dtype, EnumByteOrder, EnumDtypeKind};
use hdf5::{Dataset, File, Group, LocationType};
use hdf5_sys::h5::{H5free_memory, hsize_t};
use hdf5_sys::h5d::H5Dread;
use hdf5_sys::h5i::hid_t;
use hdf5_sys::h5p::H5P_DEFAULT;
use hdf5_sys::h5s::H5S_ALL;
use hdf5_sys::h5t::{
    H5T_class_t, H5T_order_t, H5T_sign_t, H5Tclose, H5Tget_array_dims2, H5Tget_array_ndims,
    H5Tget_class, H5Tget_member_name, H5Tget_member_offset, H5Tget_member_type,
    H5Tget_nmembers, H5Tget_order, H5Tget_sign, H5Tget_size, H5Tget_super, H5Tis_variable_str,
};
use log::debug;

use crate::source::{SourceDataset, SourceGroup, SourceNode};
use crate::spec::{CompoundField, ConvertError, ElementType};

impl From<hdf5::Error> for ConvertError {
    fn from(e: hdf5::Error) -> Self {
        ConvertError::Source(e.to_string())
    }
}

/// Read-only HDF5 file handle; closed on drop or explicitly via [`close`](Self::close).
pub struct Hdf5Source {
    file: File,
}

impl Hdf5Source {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    /// Root group as a source node.
    pub fn root(&self) -> Result<SourceNode, ConvertError> {
        let group: Group = (*self.file).clone();
        Ok(SourceNode::Group(Box::new(Hdf5Group { group })))
    }

    pub fn close(self) -> Result<(), ConvertError> {
        self.file.close()?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region Groups

struct Hdf5Group {
    group: Group,
}

impl SourceGroup for Hdf5Group {
    fn describe(&self) -> String {
        format!("<HDF5 group {:?}>", self.group.name())
    }

    fn member_names(&self) -> Result<Vec<String>, ConvertError> {
        let mut l_names = Vec::new();
        for name in self.group.member_names()? {
            match self.group.loc_type_by_name(&name)? {
                LocationType::Group | LocationType::Dataset => l_names.push(name),
                _ => debug!("Skipping {name:?} in {}: not a group or dataset", self.describe()),
            }
        }
        Ok(l_names)
    }

    fn member(&self, name: &str) -> Result<SourceNode, ConvertError> {
        match self.group.loc_type_by_name(name)? {
            LocationType::Group => Ok(SourceNode::Group(Box::new(Hdf5Group {
                group: self.group.group(name)?,
            }))),
            LocationType::Dataset => {
                let dataset = Hdf5Dataset::new(self.group.dataset(name)?)?;
                Ok(SourceNode::from_dataset(Rc::new(dataset)))
            }
            _ => Err(ConvertError::Source(format!(
                "{name:?} in {} is not a group or dataset",
                self.describe()
            ))),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Datasets

struct Hdf5Dataset {
    dataset: Dataset,
    name: String,
    element_type: ElementType,
    shape: Vec<usize>,
}

impl Hdf5Dataset {
    fn new(dataset: Dataset) -> Result<Self, ConvertError> {
        let name = dataset.name();
        let datatype = dataset.dtype()?;
        let element_type = element_type_from_id(datatype.id(), &name)?;
        let shape = dataset.shape();
        Ok(Self {
            dataset,
            name,
            element_type,
            shape,
        })
    }
}

impl SourceDataset for Hdf5Dataset {
    fn describe(&self) -> String {
        format!(
            "<HDF5 dataset {:?}: shape {:?}, type \"{}\">",
            self.name, self.shape, self.element_type
        )
    }

    fn element_type(&self) -> &ElementType {
        &self.element_type
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn read_flat(&self) -> Result<Vec<u8>, ConvertError> {
        let datatype = self.dataset.dtype()?;
        let mut buf = vec![0u8; self.size() as usize * self.element_type.size()];
        if buf.is_empty() {
            return Ok(buf);
        }
        // SAFETY: `buf` holds every element of the dataset in the file type.
        let status = unsafe {
            H5Dread(
                self.dataset.id(),
                datatype.id(),
                H5S_ALL,
                H5S_ALL,
                H5P_DEFAULT,
                buf.as_mut_ptr().cast(),
            )
        };
        if status < 0 {
            return Err(ConvertError::Source(format!(
                "H5Dread failed for {}",
                self.describe()
            )));
        }
        Ok(buf)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Datatypes

/// Closes a datatype id obtained from a `H5Tget_*` call.
struct TypeIdGuard(hid_t);

impl Drop for TypeIdGuard {
    fn drop(&mut self) {
        // SAFETY: the id was returned open by the C library and is closed once.
        unsafe {
            H5Tclose(self.0);
        }
    }
}

fn checked_type_id(type_id: hid_t, path: &str) -> Result<TypeIdGuard, ConvertError> {
    if type_id < 0 {
        return Err(ConvertError::Source(format!(
            "failed to inspect datatype of {path}"
        )));
    }
    Ok(TypeIdGuard(type_id))
}

fn unsupported(path: &str, dtype: &str, reason: &str) -> ConvertError {
    ConvertError::UnsupportedDatatype {
        path: path.to_string(),
        dtype: dtype.to_string(),
        reason: reason.to_string(),
    }
}

fn element_type_from_id(type_id: hid_t, path: &str) -> Result<ElementType, ConvertError> {
    // SAFETY: `type_id` is an open datatype id for the duration of this call.
    let (class, size) = unsafe { (H5Tget_class(type_id), H5Tget_size(type_id)) };

    match class {
        H5T_class_t::H5T_INTEGER => {
            // SAFETY: see above.
            let sign = unsafe { H5Tget_sign(type_id) };
            let kind = match sign {
                H5T_sign_t::H5T_SGN_NONE => EnumDtypeKind::Uint,
                _ => EnumDtypeKind::Int,
            };
            Ok(ElementType::scalar(Dtype::with_byte_order(
                kind,
                size,
                byte_order_from_id(type_id),
            )))
        }
        H5T_class_t::H5T_FLOAT => Ok(ElementType::scalar(Dtype::with_byte_order(
            EnumDtypeKind::Float,
            size,
            byte_order_from_id(type_id),
        ))),
        // Enums are stored as their base integer, h5py booleans as `|b1`.
        H5T_class_t::H5T_ENUM => {
            if is_bool_enum(type_id, size, path)? {
                return Ok(ElementType::scalar(Dtype::native(EnumDtypeKind::Bool, 1)));
            }
            // SAFETY: see above.
            let super_id = checked_type_id(unsafe { H5Tget_super(type_id) }, path)?;
            element_type_from_id(super_id.0, path)
        }
        H5T_class_t::H5T_STRING => {
            // SAFETY: see above.
            if unsafe { H5Tis_variable_str(type_id) } > 0 {
                return Err(unsupported(path, "vlen string", "variable-length data"));
            }
            Ok(ElementType::scalar(Dtype::native(EnumDtypeKind::Bytes, size)))
        }
        H5T_class_t::H5T_OPAQUE => Ok(ElementType::scalar(Dtype::native(
            EnumDtypeKind::Void,
            size,
        ))),
        H5T_class_t::H5T_COMPOUND => compound_from_id(type_id, size, path),
        H5T_class_t::H5T_ARRAY => array_from_id(type_id, path),
        H5T_class_t::H5T_VLEN => Err(unsupported(path, "vlen", "variable-length data")),
        H5T_class_t::H5T_REFERENCE => Err(unsupported(path, "reference", "object references")),
        H5T_class_t::H5T_TIME => Err(unsupported(path, "time", "HDF5 time type")),
        H5T_class_t::H5T_BITFIELD => Err(unsupported(path, "bitfield", "HDF5 bitfield type")),
        _ => Err(ConvertError::Source(format!(
            "failed to classify datatype of {path}"
        ))),
    }
}

fn byte_order_from_id(type_id: hid_t) -> EnumByteOrder {
    // SAFETY: `type_id` is an open atomic datatype id.
    match unsafe { H5Tget_order(type_id) } {
        H5T_order_t::H5T_ORDER_BE => EnumByteOrder::Big,
        H5T_order_t::H5T_ORDER_LE => EnumByteOrder::Little,
        _ => EnumByteOrder::native(),
    }
}

/// Name of member `index` of a compound or enum datatype.
fn member_name(type_id: hid_t, index: u32, path: &str) -> Result<String, ConvertError> {
    // SAFETY: `index` is a valid member index; the name is freed below.
    let ptr_name = unsafe { H5Tget_member_name(type_id, index) };
    if ptr_name.is_null() {
        return Err(ConvertError::Source(format!(
            "failed to read member name of {path}"
        )));
    }
    // SAFETY: non-null, NUL-terminated string owned by the C library.
    let name = unsafe { CStr::from_ptr(ptr_name) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: allocated by the C library for this call.
    unsafe {
        H5free_memory(ptr_name.cast());
    }
    Ok(name)
}

/// h5py writes `bool` as a one-byte enum with exactly the members `FALSE` and `TRUE`.
fn is_bool_enum(type_id: hid_t, size: usize, path: &str) -> Result<bool, ConvertError> {
    // SAFETY: `type_id` is an open enum datatype id.
    if size != 1 || unsafe { H5Tget_nmembers(type_id) } != 2 {
        return Ok(false);
    }
    let mut l_names = vec![member_name(type_id, 0, path)?, member_name(type_id, 1, path)?];
    l_names.sort();
    Ok(l_names == ["FALSE", "TRUE"])
}

fn compound_from_id(type_id: hid_t, size: usize, path: &str) -> Result<ElementType, ConvertError> {
    // SAFETY: `type_id` is an open compound datatype id.
    let n_members = unsafe { H5Tget_nmembers(type_id) };
    if n_members < 0 {
        return Err(ConvertError::Source(format!(
            "failed to list compound members of {path}"
        )));
    }

    let mut l_fields = Vec::with_capacity(n_members as usize);
    for i in 0..n_members as u32 {
        let name = member_name(type_id, i, path)?;
        // SAFETY: `i` is a valid member index.
        let offset = unsafe { H5Tget_member_offset(type_id, i) };
        let member_id = checked_type_id(unsafe { H5Tget_member_type(type_id, i) }, path)?;
        let element_type = element_type_from_id(member_id.0, &format!("{path}/{name}/"))?;
        l_fields.push(CompoundField {
            name,
            offset,
            element_type,
        });
    }
    Ok(ElementType::Compound {
        fields: l_fields,
        size,
    })
}

fn array_from_id(type_id: hid_t, path: &str) -> Result<ElementType, ConvertError> {
    // SAFETY: `type_id` is an open array datatype id.
    let n_dims = unsafe { H5Tget_array_ndims(type_id) };
    if n_dims < 0 {
        return Err(ConvertError::Source(format!(
            "failed to read array rank of {path}"
        )));
    }
    let mut l_dims: Vec<hsize_t> = vec![0; n_dims as usize];
    // SAFETY: `l_dims` has room for `n_dims` entries.
    if unsafe { H5Tget_array_dims2(type_id, l_dims.as_mut_ptr()) } < 0 {
        return Err(ConvertError::Source(format!(
            "failed to read array dims of {path}"
        )));
    }

    // SAFETY: see above.
    let super_id = checked_type_id(unsafe { H5Tget_super(type_id) }, path)?;
    match element_type_from_id(super_id.0, path)? {
        ElementType::Scalar { dtype, dims } => {
            let mut dims_all: Vec<usize> = l_dims.iter().map(|n| *n as usize).collect();
            dims_all.extend(dims);
            Ok(ElementType::Scalar {
                dtype,
                dims: dims_all,
            })
        }
        ElementType::Compound { .. } => Err(unsupported(
            path,
            "array of compound",
            "arrays of records have no flat representation",
        )),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::path::Path;
    use std::sync::Mutex;

    use h5bigfile_io_bigfile::{BigFile, EnumByteOrder};
    use hdf5_sys::h5::{H5open, herr_t};
    use hdf5_sys::h5d::{H5Dclose, H5Dcreate2, H5Dwrite};
    use hdf5_sys::h5f::{H5F_ACC_TRUNC, H5Fclose, H5Fcreate};
    use hdf5_sys::h5g::{H5Gclose, H5Gcreate2};
    use hdf5_sys::h5s::{H5Sclose, H5Screate_simple};
    use hdf5_sys::h5t::{
        H5T_IEEE_F32LE, H5T_IEEE_F64LE, H5T_STD_I8LE, H5T_STD_I32BE, H5T_STD_I32LE,
        H5Tarray_create2, H5Tcommit2, H5Tcopy, H5Tcreate, H5Tenum_create, H5Tenum_insert,
        H5Tinsert,
    };
    use tempfile::TempDir;

    use crate::copy::convert_hdf5_file;
    use crate::spec::{C_ATTR_NDARRAY_SHAPE, SpecConvertOptions};

    use super::*;

    // libhdf5 is not reentrant across threads without its own lock.
    static HDF5_LOCK: Mutex<()> = Mutex::new(());

    fn c_name(name: &str) -> CString {
        CString::new(name).expect("name without NUL")
    }

    fn check_id(id: hid_t, what: &str) -> hid_t {
        assert!(id >= 0, "{what} failed");
        id
    }

    fn check_status(status: herr_t, what: &str) {
        assert!(status >= 0, "{what} failed");
    }

    fn create_file(path: &Path) -> hid_t {
        let name = c_name(path.to_str().expect("utf-8 path"));
        unsafe {
            check_status(H5open(), "H5open");
            check_id(
                H5Fcreate(name.as_ptr(), H5F_ACC_TRUNC, H5P_DEFAULT, H5P_DEFAULT),
                "H5Fcreate",
            )
        }
    }

    fn create_group(loc_id: hid_t, name: &str) -> hid_t {
        let name = c_name(name);
        unsafe {
            check_id(
                H5Gcreate2(loc_id, name.as_ptr(), H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT),
                "H5Gcreate2",
            )
        }
    }

    /// Write `bytes`, already laid out in `type_id`, as a new dataset.
    fn write_dataset(loc_id: hid_t, name: &str, type_id: hid_t, dims: &[hsize_t], bytes: &[u8]) {
        let name = c_name(name);
        unsafe {
            let space_id = check_id(
                H5Screate_simple(dims.len() as i32, dims.as_ptr(), std::ptr::null()),
                "H5Screate_simple",
            );
            let dataset_id = check_id(
                H5Dcreate2(
                    loc_id,
                    name.as_ptr(),
                    type_id,
                    space_id,
                    H5P_DEFAULT,
                    H5P_DEFAULT,
                    H5P_DEFAULT,
                ),
                "H5Dcreate2",
            );
            check_status(
                H5Dwrite(
                    dataset_id,
                    type_id,
                    H5S_ALL,
                    H5S_ALL,
                    H5P_DEFAULT,
                    bytes.as_ptr().cast(),
                ),
                "H5Dwrite",
            );
            H5Dclose(dataset_id);
            H5Sclose(space_id);
        }
    }

    fn array_type(base_id: hid_t, dims: &[hsize_t]) -> TypeIdGuard {
        unsafe {
            TypeIdGuard(check_id(
                H5Tarray_create2(base_id, dims.len() as u32, dims.as_ptr()),
                "H5Tarray_create2",
            ))
        }
    }

    fn le_bytes_f64(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// `/pos` (4x3 f8), `/ids_be` (i4 big endian), `/particles` {mass f8, velocity (3,)f4},
    /// `/flags` (h5py bool), `/g1/g2/ids` and a committed datatype `/named_t`.
    fn write_sample_file(path: &Path) {
        let file_id = create_file(path);
        unsafe {
            let pos: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
            write_dataset(file_id, "pos", *H5T_IEEE_F64LE, &[4, 3], &le_bytes_f64(&pos));

            let ids_be: Vec<u8> = [1i32, -2, 300].iter().flat_map(|v| v.to_be_bytes()).collect();
            write_dataset(file_id, "ids_be", *H5T_STD_I32BE, &[3], &ids_be);

            let record_id = TypeIdGuard(check_id(
                H5Tcreate(H5T_class_t::H5T_COMPOUND, 20),
                "H5Tcreate",
            ));
            let velocity_id = array_type(*H5T_IEEE_F32LE, &[3]);
            check_status(
                H5Tinsert(record_id.0, c_name("mass").as_ptr(), 0, *H5T_IEEE_F64LE),
                "H5Tinsert mass",
            );
            check_status(
                H5Tinsert(record_id.0, c_name("velocity").as_ptr(), 8, velocity_id.0),
                "H5Tinsert velocity",
            );
            let mut particles = Vec::with_capacity(4 * 20);
            for i in 0..4 {
                particles.extend_from_slice(&(i as f64 + 1.0).to_le_bytes());
                for j in 0..3 {
                    particles.extend_from_slice(&((i * 3 + j) as f32).to_le_bytes());
                }
            }
            write_dataset(file_id, "particles", record_id.0, &[4], &particles);

            let bool_id = TypeIdGuard(check_id(H5Tenum_create(*H5T_STD_I8LE), "H5Tenum_create"));
            for (name, value) in [("FALSE", 0i8), ("TRUE", 1i8)] {
                check_status(
                    H5Tenum_insert(bool_id.0, c_name(name).as_ptr(), (&value as *const i8).cast()),
                    "H5Tenum_insert",
                );
            }
            write_dataset(file_id, "flags", bool_id.0, &[3], &[1, 0, 1]);

            let g1 = create_group(file_id, "g1");
            let g2 = create_group(g1, "g2");
            let ids: Vec<u8> = [5i32, 4, 3, 2, 1].iter().flat_map(|v| v.to_le_bytes()).collect();
            write_dataset(g2, "ids", *H5T_STD_I32LE, &[5], &ids);
            H5Gclose(g2);
            H5Gclose(g1);

            let named_id = TypeIdGuard(check_id(H5Tcopy(*H5T_STD_I32LE), "H5Tcopy"));
            check_status(
                H5Tcommit2(
                    file_id,
                    c_name("named_t").as_ptr(),
                    named_id.0,
                    H5P_DEFAULT,
                    H5P_DEFAULT,
                    H5P_DEFAULT,
                ),
                "H5Tcommit2",
            );
            H5Fclose(file_id);
        }
    }

    fn verify_options() -> SpecConvertOptions {
        SpecConvertOptions {
            if_verify: true,
            ..SpecConvertOptions::default()
        }
    }

    #[test]
    fn hdf5_file_converts_and_verifies() {
        let _guard = HDF5_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = TempDir::new().expect("tempdir");
        let path_h5 = tmp.path().join("sample.h5");
        let path_bf = tmp.path().join("out.bf");
        write_sample_file(&path_h5);

        let report = convert_hdf5_file(&path_h5, &path_bf, verify_options()).expect("convert");
        assert_eq!(report.cnt_scanned, 6);
        assert_eq!(report.cnt_copied, 6);
        assert_eq!(report.cnt_verified, 6);

        let bf = BigFile::open(&path_bf).expect("open bigfile");
        assert_eq!(
            bf.list_blocks().unwrap(),
            vec![
                "flags",
                "g1/g2/ids",
                "ids_be",
                "particles/mass",
                "particles/velocity",
                "pos",
            ]
        );
        assert!(!path_bf.join("named_t").exists());

        let pos = bf.open_block("pos").unwrap();
        assert_eq!(pos.dtype().to_string(), "<f8");
        assert_eq!(pos.size(), 12);
        assert_eq!(pos.attr(C_ATTR_NDARRAY_SHAPE).unwrap().to_i64s().unwrap(), vec![4, 3]);
        assert_eq!(pos.read(11, 1).unwrap(), 5.5f64.to_le_bytes());

        let ids_be = bf.open_block("ids_be").unwrap();
        assert_eq!(ids_be.dtype().byte_order(), EnumByteOrder::Big);
        assert_eq!(ids_be.dtype().to_string(), ">i4");
        assert_eq!(ids_be.read(2, 1).unwrap(), 300i32.to_be_bytes());

        let velocity = bf.open_block("particles/velocity").unwrap();
        assert_eq!(velocity.dtype().to_string(), "<f4");
        assert_eq!(velocity.nmemb(), 1);
        assert_eq!(velocity.size(), 12);
        assert_eq!(
            velocity.attr(C_ATTR_NDARRAY_SHAPE).unwrap().to_i64s().unwrap(),
            vec![4, 3]
        );
        assert_eq!(velocity.read(4, 1).unwrap(), 4.0f32.to_le_bytes());

        let mass = bf.open_block("particles/mass").unwrap();
        assert_eq!(mass.read(3, 1).unwrap(), 4.0f64.to_le_bytes());

        let flags = bf.open_block("flags").unwrap();
        assert_eq!(flags.dtype().to_string(), "|b1");
        assert_eq!(flags.read(0, 3).unwrap(), vec![1, 0, 1]);

        let ids = bf.open_block("g1/g2/ids").unwrap();
        assert_eq!(ids.read(0, 1).unwrap(), 5i32.to_le_bytes());
    }

    #[test]
    fn hdf5_tensor_dataset_is_rejected() {
        let _guard = HDF5_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = TempDir::new().expect("tempdir");
        let path_h5 = tmp.path().join("tensor.h5");
        let path_bf = tmp.path().join("out.bf");

        let file_id = create_file(&path_h5);
        let tensor_id = array_type(unsafe { *H5T_STD_I32LE }, &[2, 2]);
        let bytes: Vec<u8> = (0..8i32).flat_map(|v| v.to_le_bytes()).collect();
        write_dataset(file_id, "t", tensor_id.0, &[2], &bytes);
        drop(tensor_id);
        unsafe {
            H5Fclose(file_id);
        }

        let err = convert_hdf5_file(&path_h5, &path_bf, verify_options()).unwrap_err();
        match err {
            ConvertError::UnsupportedDatatype { path, .. } => assert_eq!(path, "/t"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!path_bf.join("t").exists());
    }
}
