//! Per-dataset actions applied by the tree walk.

use h5bigfile_io_bigfile::{BigAttr, BigFile, Dtype, calculate_nfile};
use log::info;

use crate::report::ReportConvertBuilder;
use crate::source::SourceDataset;
use crate::spec::{C_ATTR_NDARRAY_SHAPE, ConvertError, ElementType};

/// Action invoked once per terminal dataset with its destination path.
pub trait DatasetVisitor {
    fn visit(&mut self, dataset: &dyn SourceDataset, path: &str) -> Result<(), ConvertError>;
}

////////////////////////////////////////////////////////////////////////////////
// #region Helpers

/// `(dtype, nmemb)` of the block a dataset maps to.
///
/// Tensor sub-arrays (more than one dimension) have no flat representation,
/// and the dtype must survive a header round trip.
fn derive_block_layout(
    dataset: &dyn SourceDataset,
    path: &str,
) -> Result<(Dtype, usize), ConvertError> {
    let element_type = dataset.element_type();
    match element_type {
        ElementType::Scalar { dtype, .. } if !dtype.is_valid() => {
            Err(ConvertError::UnsupportedDatatype {
                path: path.to_string(),
                dtype: element_type.to_string(),
                reason: format!("no block dtype for {} bytes of this kind", dtype.itemsize()),
            })
        }
        ElementType::Scalar { dims, .. } if dims.len() > 1 => {
            Err(ConvertError::UnsupportedDatatype {
                path: path.to_string(),
                dtype: element_type.to_string(),
                reason: format!("sub-array with {} dimensions", dims.len()),
            })
        }
        ElementType::Scalar { dtype, .. } => Ok((*dtype, element_type.nmemb())),
        ElementType::Compound { .. } => Err(ConvertError::UnsupportedDatatype {
            path: path.to_string(),
            dtype: element_type.to_string(),
            reason: "compound records are stored field by field".to_string(),
        }),
    }
}

fn derive_shape_i64(dataset: &dyn SourceDataset) -> Vec<i64> {
    dataset.shape().iter().map(|n| *n as i64).collect()
}

fn read_checked(dataset: &dyn SourceDataset) -> Result<Vec<u8>, ConvertError> {
    let data = dataset.read_flat()?;
    let n_expected = dataset.size() as usize * dataset.element_type().size();
    if data.len() != n_expected {
        return Err(ConvertError::MalformedSource {
            name: dataset.describe(),
            message: format!("read {} bytes, expected {n_expected}", data.len()),
        });
    }
    Ok(data)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Create

/// Creates one block per dataset and writes its flattened data.
///
/// Without a destination (dry-run) it only logs and counts.
pub struct CreateVisitor<'a> {
    bigfile: Option<&'a BigFile>,
    bytes_per_file: Option<u64>,
    report: ReportConvertBuilder,
}

impl<'a> CreateVisitor<'a> {
    pub fn new(bigfile: &'a BigFile, bytes_per_file: Option<u64>) -> Self {
        Self {
            bigfile: Some(bigfile),
            bytes_per_file,
            report: ReportConvertBuilder::default(),
        }
    }

    pub fn new_dry_run() -> Self {
        Self {
            bigfile: None,
            bytes_per_file: None,
            report: ReportConvertBuilder::default(),
        }
    }

    /// Counters accumulated so far (`cnt_copied`, `cnt_elements`, `cnt_bytes`).
    pub fn into_report(self) -> ReportConvertBuilder {
        self.report
    }
}

impl DatasetVisitor for CreateVisitor<'_> {
    fn visit(&mut self, dataset: &dyn SourceDataset, path: &str) -> Result<(), ConvertError> {
        let (dtype, nmemb) = derive_block_layout(dataset, path)?;
        let size = dataset.size();
        let n_elements = size * nmemb as u64;
        let n_bytes = n_elements * dtype.itemsize() as u64;

        info!("Copying {} as {}", dataset.describe(), path);
        let Some(bigfile) = self.bigfile else {
            self.report.add_copied(n_elements, n_bytes);
            return Ok(());
        };

        let data = read_checked(dataset)?;
        let nfile = calculate_nfile(size, nmemb, dtype.itemsize(), self.bytes_per_file);
        let mut block = bigfile.create_block(path, dtype, nmemb, size, nfile)?;
        block.set_attr(
            C_ATTR_NDARRAY_SHAPE,
            BigAttr::from_values(&derive_shape_i64(dataset)),
        )?;
        block.write(0, &data)?;
        block.close()?;

        self.report.add_copied(n_elements, n_bytes);
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Verify

/// Reads each block back and compares it with the source dataset.
pub struct VerifyVisitor<'a> {
    bigfile: &'a BigFile,
    report: ReportConvertBuilder,
}

impl<'a> VerifyVisitor<'a> {
    pub fn new(bigfile: &'a BigFile) -> Self {
        Self {
            bigfile,
            report: ReportConvertBuilder::default(),
        }
    }

    /// Counters accumulated so far (`cnt_verified`).
    pub fn into_report(self) -> ReportConvertBuilder {
        self.report
    }
}

impl DatasetVisitor for VerifyVisitor<'_> {
    fn visit(&mut self, dataset: &dyn SourceDataset, path: &str) -> Result<(), ConvertError> {
        let mismatch = |message: String| ConvertError::VerificationMismatch {
            path: path.to_string(),
            message,
        };

        info!("Verifying {} against {}", path, dataset.describe());
        let (dtype, nmemb) = derive_block_layout(dataset, path)?;
        let block = self.bigfile.open_block(path)?;

        if block.dtype() != dtype || block.nmemb() != nmemb {
            return Err(mismatch(format!(
                "dtype differs: block has {} x {}, dataset has {dtype} x {nmemb}",
                block.dtype(),
                block.nmemb()
            )));
        }

        let shape_block = block.attr(C_ATTR_NDARRAY_SHAPE)?.to_i64s()?;
        let shape_dataset = derive_shape_i64(dataset);
        if shape_block != shape_dataset {
            return Err(mismatch(format!(
                "shape differs: block has {shape_block:?}, dataset has {shape_dataset:?}"
            )));
        }

        block.verify_checksums()?;

        let bytes_block = block.read_all()?;
        let bytes_dataset = read_checked(dataset)?;
        if bytes_block.len() != bytes_dataset.len() {
            return Err(mismatch(format!(
                "length differs: block has {} bytes, dataset has {}",
                bytes_block.len(),
                bytes_dataset.len()
            )));
        }
        // Byte-wise: NaN payloads compare equal to themselves.
        if let Some(pos) = bytes_block
            .iter()
            .zip(&bytes_dataset)
            .position(|(a, b)| a != b)
        {
            return Err(mismatch(format!(
                "data differs starting at element {}",
                pos / dtype.itemsize().max(1)
            )));
        }

        self.report.add_verified();
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
