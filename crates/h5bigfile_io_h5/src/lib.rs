//! `h5bigfile_io_h5` v1:
//! Rust-side hierarchical-container to BigFile converter.
//!
//! Module layout:
//! - `copy`        : traversal and conversion orchestration
//! - `visit`       : create/verify actions per terminal dataset
//! - `source`      : source tree model (groups, scalar and compound datasets)
//! - `memory`      : in-memory source backend
//! - `hdf5_source` : HDF5 source backend (feature `hdf5`)
//! - `spec`        : enums/options/errors
//! - `report`      : run-time report model
//! - `util`        : shared helper functions

pub mod copy;
#[cfg(feature = "hdf5")]
pub mod hdf5_source;
pub mod memory;
pub mod report;
pub mod source;
pub mod spec;
mod util;
pub mod visit;

#[cfg(feature = "hdf5")]
pub use copy::convert_hdf5_file;
pub use copy::{copy_tree, traverse};
#[cfg(feature = "hdf5")]
pub use hdf5_source::Hdf5Source;
pub use memory::{MemoryDataset, MemoryField, MemoryGroup};
pub use report::{ReportConvert, ReportConvertBuilder};
pub use source::{SourceDataset, SourceGroup, SourceNode};
pub use spec::{
    C_ATTR_NDARRAY_SHAPE, CompoundField, ConvertError, ElementType, EnumConvertPatternMode,
    SpecConvertOptions,
};
pub use visit::{CreateVisitor, DatasetVisitor, VerifyVisitor};
