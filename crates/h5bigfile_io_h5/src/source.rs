//! Source tree model: explicit node kinds over any hierarchical container.

use std::rc::Rc;

use crate::spec::{CompoundField, ConvertError, ElementType};

/// Group-like node: enumerable named children.
pub trait SourceGroup {
    /// Human-readable identity for log lines.
    fn describe(&self) -> String;
    /// Child names in the container's enumeration order.
    fn member_names(&self) -> Result<Vec<String>, ConvertError>;
    /// Open one child and classify it.
    fn member(&self, name: &str) -> Result<SourceNode, ConvertError>;
}

/// Dataset-like node: typed, shaped element data.
pub trait SourceDataset {
    /// Human-readable identity for log lines.
    fn describe(&self) -> String;
    fn element_type(&self) -> &ElementType;
    fn shape(&self) -> &[usize];
    /// Packed row-major bytes of every element (`size() * element_type().size()`).
    fn read_flat(&self) -> Result<Vec<u8>, ConvertError>;

    /// Number of elements (1 for a scalar dataspace).
    fn size(&self) -> u64 {
        self.shape().iter().map(|n| *n as u64).product()
    }
}

/// One node of the source tree, classified once when opened.
pub enum SourceNode {
    Group(Box<dyn SourceGroup>),
    ScalarDataset(Rc<dyn SourceDataset>),
    CompoundDataset(Rc<dyn SourceDataset>),
}

impl SourceNode {
    /// Classify a dataset by its element type.
    pub fn from_dataset(dataset: Rc<dyn SourceDataset>) -> Self {
        if dataset.element_type().is_compound() {
            Self::CompoundDataset(dataset)
        } else {
            Self::ScalarDataset(dataset)
        }
    }

    /// `(field name, field node)` for every member of a compound dataset.
    ///
    /// Empty for groups and scalar datasets.
    pub fn compound_fields(&self) -> Vec<(String, SourceNode)> {
        let Self::CompoundDataset(dataset) = self else {
            return Vec::new();
        };
        let ElementType::Compound { fields, .. } = dataset.element_type() else {
            return Vec::new();
        };
        fields
            .iter()
            .map(|field| {
                let field_view = FieldDataset::new(Rc::clone(dataset), field.clone());
                (
                    field.name.clone(),
                    SourceNode::from_dataset(Rc::new(field_view)),
                )
            })
            .collect()
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Group(group) => group.describe(),
            Self::ScalarDataset(dataset) | Self::CompoundDataset(dataset) => dataset.describe(),
        }
    }
}

/// Projection of one compound field, read through its parent dataset.
///
/// A sub-array field is exposed as its base scalar with the sub-array
/// dimensions appended to the parent shape, so `(3,)f4` over `[N]` reads as
/// `f4` over `[N, 3]`.
struct FieldDataset {
    parent: Rc<dyn SourceDataset>,
    field: CompoundField,
    element_type: ElementType,
    shape: Vec<usize>,
}

impl FieldDataset {
    fn new(parent: Rc<dyn SourceDataset>, field: CompoundField) -> Self {
        let mut shape = parent.shape().to_vec();
        let element_type = match &field.element_type {
            ElementType::Scalar { dtype, dims } => {
                shape.extend_from_slice(dims);
                ElementType::scalar(*dtype)
            }
            other => other.clone(),
        };
        Self {
            parent,
            field,
            element_type,
            shape,
        }
    }
}

impl SourceDataset for FieldDataset {
    fn describe(&self) -> String {
        format!("{}[{:?}]", self.parent.describe(), self.field.name)
    }

    fn element_type(&self) -> &ElementType {
        &self.element_type
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn read_flat(&self) -> Result<Vec<u8>, ConvertError> {
        let n_record = self.parent.element_type().size();
        let n_field = self.field.element_type.size();
        if self.field.offset + n_field > n_record {
            return Err(ConvertError::MalformedSource {
                name: self.describe(),
                message: format!(
                    "field spans bytes {}..{} of a {n_record}-byte record",
                    self.field.offset,
                    self.field.offset + n_field
                ),
            });
        }

        let bytes_parent = self.parent.read_flat()?;
        let mut buf = Vec::with_capacity(self.parent.size() as usize * n_field);
        if n_record == 0 {
            return Ok(buf);
        }
        for record in bytes_parent.chunks_exact(n_record) {
            buf.extend_from_slice(&record[self.field.offset..self.field.offset + n_field]);
        }
        Ok(buf)
    }
}
