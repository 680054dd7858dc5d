//! Conversion options, element type model and top-level error types.

use std::fmt;

use h5bigfile_io_bigfile::{BigFileError, Dtype};

////////////////////////////////////////////////////////////////////////////////
// #region Constants

/// Block attribute holding the original (pre-flatten) dataset shape.
pub const C_ATTR_NDARRAY_SHAPE: &str = "ndarray.shape";

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Pattern matching mode for include/exclude lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumConvertPatternMode {
    /// Shell-like wildcards (`*`, `?`, character classes).
    Glob,
    /// Regular expression pattern.
    Regex,
    /// Substring match.
    Literal,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ElementTypes

/// Per-element datatype of a source dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    /// Scalar element, or a fixed sub-array of scalars when `dims` is non-empty.
    Scalar { dtype: Dtype, dims: Vec<usize> },
    /// Record of named fields packed into `size` bytes.
    Compound {
        fields: Vec<CompoundField>,
        size: usize,
    },
}

/// One named member of a compound element type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundField {
    pub name: String,
    /// Byte offset inside the parent record.
    pub offset: usize,
    pub element_type: ElementType,
}

impl ElementType {
    /// Plain scalar element.
    pub fn scalar(dtype: Dtype) -> Self {
        Self::Scalar {
            dtype,
            dims: Vec::new(),
        }
    }

    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            Self::Scalar { dtype, dims } => dtype.itemsize() * dims.iter().product::<usize>(),
            Self::Compound { size, .. } => *size,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound { .. })
    }

    /// Columns per row once stored as a block (`dims` flattened; 1 for scalars).
    pub fn nmemb(&self) -> usize {
        match self {
            Self::Scalar { dims, .. } => dims.iter().product(),
            Self::Compound { .. } => 1,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar { dtype, dims } if dims.is_empty() => write!(f, "{dtype}"),
            Self::Scalar { dtype, dims } => write!(f, "({dtype}, {dims:?})"),
            Self::Compound { fields, .. } => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.element_type)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Input options for `copy_tree`.
#[derive(Debug, Clone)]
pub struct SpecConvertOptions {
    /// Include patterns applied to the destination path of each terminal dataset.
    pub patterns_include: Option<Vec<String>>,
    /// Exclude patterns applied to the destination path of each terminal dataset.
    pub patterns_exclude: Option<Vec<String>>,
    /// Pattern interpretation mode.
    pub rule_pattern: EnumConvertPatternMode,
    /// Split blocks into blob files of at most this many bytes (`None`: one file).
    pub bytes_per_file: Option<u64>,
    /// Re-open the destination read-only and compare against the source.
    pub if_verify: bool,
    /// Do not touch the destination; only traverse, log and count.
    pub if_dry_run: bool,
}

impl Default for SpecConvertOptions {
    fn default() -> Self {
        Self {
            patterns_include: None,
            patterns_exclude: None,
            rule_pattern: EnumConvertPatternMode::Glob,
            bytes_per_file: None,
            if_verify: false,
            if_dry_run: false,
        }
    }
}

/// Fatal conversion errors. Nothing is retried or downgraded.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Invalid option value.
    #[error("{0}")]
    InvalidOption(String),
    /// Invalid include/exclude pattern.
    #[error("Invalid pattern in include/exclude: {0}")]
    InvalidPattern(String),
    /// Element type the flat store cannot represent.
    #[error("bigfile cannot handle datatype {dtype} at `{path}`: {reason}")]
    UnsupportedDatatype {
        path: String,
        dtype: String,
        reason: String,
    },
    /// Destination differs from source.
    #[error("Verification failed for `{path}`: {message}")]
    VerificationMismatch { path: String, message: String },
    /// Source dataset data inconsistent with its declared type/shape.
    #[error("Malformed source dataset {name}: {message}")]
    MalformedSource { name: String, message: String },
    /// Error reported by the source container library.
    #[error("Source container error: {0}")]
    Source(String),
    /// Error reported by the destination store.
    #[error(transparent)]
    BigFile(#[from] BigFileError),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
