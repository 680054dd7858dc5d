//! In-memory source tree.
//!
//! Mirrors what an HDF5 file exposes (groups, scalar datasets, compound
//! datasets) without needing the native library. Used by the test suite and
//! by callers that already hold their arrays in memory.

use std::rc::Rc;

use h5bigfile_io_bigfile::{ElementScalar, encode_values};

use crate::source::{SourceDataset, SourceGroup, SourceNode};
use crate::spec::{CompoundField, ConvertError, ElementType};

////////////////////////////////////////////////////////////////////////////////
// #region Groups

enum MemoryMember {
    Group(Rc<MemoryGroup>),
    Dataset(Rc<MemoryDataset>),
}

/// Group node holding members in insertion order.
pub struct MemoryGroup {
    name: String,
    l_members: Vec<(String, MemoryMember)>,
}

impl MemoryGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            l_members: Vec::new(),
        }
    }

    /// Append a child group.
    pub fn with_group(mut self, name: &str, group: MemoryGroup) -> Self {
        self.l_members
            .push((name.to_string(), MemoryMember::Group(Rc::new(group))));
        self
    }

    /// Append a child dataset.
    pub fn with_dataset(mut self, name: &str, dataset: MemoryDataset) -> Self {
        self.l_members
            .push((name.to_string(), MemoryMember::Dataset(Rc::new(dataset))));
        self
    }

    pub fn into_node(self) -> SourceNode {
        SourceNode::Group(Box::new(Rc::new(self)))
    }
}

impl SourceGroup for Rc<MemoryGroup> {
    fn describe(&self) -> String {
        format!("<memory group {:?}>", self.name)
    }

    fn member_names(&self) -> Result<Vec<String>, ConvertError> {
        Ok(self.l_members.iter().map(|(n, _)| n.clone()).collect())
    }

    fn member(&self, name: &str) -> Result<SourceNode, ConvertError> {
        let Some((_, member)) = self.l_members.iter().find(|(n, _)| n == name) else {
            return Err(ConvertError::Source(format!(
                "{} has no member {name:?}",
                self.describe()
            )));
        };
        Ok(match member {
            MemoryMember::Group(group) => SourceNode::Group(Box::new(Rc::clone(group))),
            MemoryMember::Dataset(dataset) => {
                SourceNode::from_dataset(Rc::clone(dataset) as Rc<dyn SourceDataset>)
            }
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Datasets

/// Dataset node holding packed element bytes.
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    name: String,
    element_type: ElementType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl MemoryDataset {
    /// Dataset from raw packed bytes; `data` must hold exactly `prod(shape)` elements.
    pub fn new(
        name: &str,
        element_type: ElementType,
        shape: &[usize],
        data: Vec<u8>,
    ) -> Result<Self, ConvertError> {
        let n_expected = shape.iter().product::<usize>() * element_type.size();
        if data.len() != n_expected {
            return Err(ConvertError::MalformedSource {
                name: name.to_string(),
                message: format!(
                    "{} bytes given, shape {shape:?} of {element_type} needs {n_expected}",
                    data.len()
                ),
            });
        }
        Ok(Self {
            name: name.to_string(),
            element_type,
            shape: shape.to_vec(),
            data,
        })
    }

    /// Scalar-typed dataset of the given shape.
    pub fn from_values<T: ElementScalar>(
        name: &str,
        shape: &[usize],
        values: &[T],
    ) -> Result<Self, ConvertError> {
        Self::new(
            name,
            ElementType::scalar(T::dtype()),
            shape,
            encode_values(values),
        )
    }

    /// 1-D dataset whose elements are fixed sub-arrays of `dims` scalars.
    pub fn from_subarrays<T: ElementScalar>(
        name: &str,
        n_rows: usize,
        dims: &[usize],
        values: &[T],
    ) -> Result<Self, ConvertError> {
        let element_type = ElementType::Scalar {
            dtype: T::dtype(),
            dims: dims.to_vec(),
        };
        Self::new(name, element_type, &[n_rows], encode_values(values))
    }

    /// 1-D compound dataset; fields are packed in order without padding.
    pub fn from_fields(
        name: &str,
        n_rows: usize,
        fields: Vec<MemoryField>,
    ) -> Result<Self, ConvertError> {
        let (element_type, data) = pack_fields(name, n_rows, fields)?;
        Self::new(name, element_type, &[n_rows], data)
    }
}

impl SourceDataset for MemoryDataset {
    fn describe(&self) -> String {
        format!(
            "<memory dataset {:?}: shape {:?}, type \"{}\">",
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
        Ok(self.data.clone())
    }
}

/// Column of a compound dataset under construction.
#[derive(Debug, Clone)]
pub struct MemoryField {
    name: String,
    element_type: ElementType,
    data: Vec<u8>,
}

impl MemoryField {
    pub fn from_values<T: ElementScalar>(name: &str, values: &[T]) -> Self {
        Self {
            name: name.to_string(),
            element_type: ElementType::scalar(T::dtype()),
            data: encode_values(values),
        }
    }

    /// Field whose per-record value is a fixed sub-array of `dims` scalars.
    pub fn from_subarrays<T: ElementScalar>(name: &str, dims: &[usize], values: &[T]) -> Self {
        Self {
            name: name.to_string(),
            element_type: ElementType::Scalar {
                dtype: T::dtype(),
                dims: dims.to_vec(),
            },
            data: encode_values(values),
        }
    }

    /// Nested compound field.
    pub fn from_fields(
        name: &str,
        n_rows: usize,
        fields: Vec<MemoryField>,
    ) -> Result<Self, ConvertError> {
        let (element_type, data) = pack_fields(name, n_rows, fields)?;
        Ok(Self {
            name: name.to_string(),
            element_type,
            data,
        })
    }
}

/// Interleave column bytes into packed records.
fn pack_fields(
    name: &str,
    n_rows: usize,
    fields: Vec<MemoryField>,
) -> Result<(ElementType, Vec<u8>), ConvertError> {
    let mut l_fields = Vec::with_capacity(fields.len());
    let mut n_offset = 0usize;
    for field in &fields {
        let n_field = field.element_type.size();
        if field.data.len() != n_rows * n_field {
            return Err(ConvertError::MalformedSource {
                name: format!("{name}.{}", field.name),
                message: format!(
                    "{} bytes given, {n_rows} records of {} need {}",
                    field.data.len(),
                    field.element_type,
                    n_rows * n_field
                ),
            });
        }
        l_fields.push(CompoundField {
            name: field.name.clone(),
            offset: n_offset,
            element_type: field.element_type.clone(),
        });
        n_offset += n_field;
    }

    let n_record = n_offset;
    let mut data = Vec::with_capacity(n_rows * n_record);
    for i in 0..n_rows {
        for field in &fields {
            let n_field = field.element_type.size();
            data.extend_from_slice(&field.data[i * n_field..(i + 1) * n_field]);
        }
    }
    Ok((
        ElementType::Compound {
            fields: l_fields,
            size: n_record,
        },
        data,
    ))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use h5bigfile_io_bigfile::decode_values;

    use super::*;

    #[test]
    fn group_lists_members_in_insertion_order() {
        let root = MemoryGroup::new("/")
            .with_dataset("b", MemoryDataset::from_values("b", &[1], &[1i32]).unwrap())
            .with_group("a", MemoryGroup::new("a"));
        let SourceNode::Group(group) = root.into_node() else {
            panic!("root must be a group");
        };
        assert_eq!(group.member_names().unwrap(), vec!["b", "a"]);
        assert!(matches!(group.member("b").unwrap(), SourceNode::ScalarDataset(_)));
        assert!(matches!(group.member("a").unwrap(), SourceNode::Group(_)));
        assert!(matches!(group.member("zzz"), Err(ConvertError::Source(_))));
    }

    #[test]
    fn dataset_rejects_wrong_byte_count() {
        let err = MemoryDataset::from_values("x", &[2, 2], &[1.0f64, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedSource { .. }));
    }

    #[test]
    fn compound_fields_project_through_parent() {
        let dataset = MemoryDataset::from_fields(
            "particles",
            2,
            vec![
                MemoryField::from_values("mass", &[1.5f64, 2.5]),
                MemoryField::from_subarrays("velocity", &[3], &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]),
            ],
        )
        .unwrap();
        assert_eq!(dataset.element_type().size(), 20);

        let node = SourceNode::from_dataset(Rc::new(dataset));
        let l_fields = node.compound_fields();
        assert_eq!(
            l_fields.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            vec!["mass", "velocity"]
        );

        let SourceNode::ScalarDataset(velocity) = &l_fields[1].1 else {
            panic!("velocity must be scalar-typed");
        };
        assert_eq!(velocity.shape(), &[2, 3]);
        assert_eq!(velocity.element_type(), &ElementType::scalar(f32::dtype()));
        assert_eq!(velocity.size(), 6);
        let values: Vec<f32> = decode_values(f32::dtype(), &velocity.read_flat().unwrap()).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
