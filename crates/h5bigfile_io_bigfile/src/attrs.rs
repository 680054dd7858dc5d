//! Per-block attribute set, persisted as `attr-v2`.
//!
//! One attribute per line: `<name> <dtype> <nmemb> <hex bytes>`.

use std::fs;
use std::io;
use std::path::Path;

use crate::dtype::{
    Dtype, ElementScalar, EnumDtypeKind, decode_integers, decode_values, encode_values,
};
use crate::spec::BigFileError;
use crate::util::{decode_hex, encode_hex, map_io_error};

/// One attribute value: `nmemb` elements of `dtype`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigAttr {
    pub dtype: Dtype,
    pub nmemb: usize,
    pub data: Vec<u8>,
}

impl BigAttr {
    /// Attribute holding a native-typed vector.
    pub fn from_values<T: ElementScalar>(values: &[T]) -> Self {
        Self {
            dtype: T::dtype(),
            nmemb: values.len(),
            data: encode_values(values),
        }
    }

    /// Attribute holding a byte string (`|S1` x len).
    pub fn from_text(text: &str) -> Self {
        Self {
            dtype: Dtype::native(EnumDtypeKind::Bytes, 1),
            nmemb: text.len(),
            data: text.as_bytes().to_vec(),
        }
    }

    /// Decode as `T`; the stored dtype must be `T`'s native dtype.
    pub fn to_values<T: ElementScalar>(&self) -> Result<Vec<T>, BigFileError> {
        decode_values(self.dtype, &self.data)
    }

    /// Decode any integer attribute (any width, either byte order) as `i64`.
    pub fn to_i64s(&self) -> Result<Vec<i64>, BigFileError> {
        decode_integers(self.dtype, &self.data)
    }

    /// Decode a byte-string attribute.
    pub fn to_text(&self) -> Option<String> {
        if self.dtype.kind() != EnumDtypeKind::Bytes {
            return None;
        }
        String::from_utf8(self.data.clone()).ok()
    }
}

/// Ordered attribute set of one block.
#[derive(Debug, Default, Clone)]
pub struct BigAttrSet {
    l_attrs: Vec<(String, BigAttr)>,
    if_dirty: bool,
}

impl BigAttrSet {
    pub fn get(&self, name: &str) -> Option<&BigAttr> {
        self.l_attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, attr)| attr)
    }

    /// Insert or replace an attribute.
    pub fn set(&mut self, name: &str, attr: BigAttr) -> Result<(), BigFileError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(BigFileError::InvalidAttrName(name.to_string()));
        }
        match self.l_attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, attr_old)) => *attr_old = attr,
            None => self.l_attrs.push((name.to_string(), attr)),
        }
        self.if_dirty = true;
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.l_attrs.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.l_attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l_attrs.is_empty()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.if_dirty
    }

    /// Load from `path`; a missing file is an empty set.
    pub(crate) fn load(path: &Path) -> Result<Self, BigFileError> {
        match fs::read_to_string(path) {
            Ok(txt) => Self::parse(&txt, path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(map_io_error(path)(e)),
        }
    }

    pub(crate) fn store(&mut self, path: &Path) -> Result<(), BigFileError> {
        fs::write(path, self.format()).map_err(map_io_error(path))?;
        self.if_dirty = false;
        Ok(())
    }

    fn parse(txt: &str, path: &Path) -> Result<Self, BigFileError> {
        let invalid = |message: String| BigFileError::InvalidAttrFile {
            path: path.to_path_buf(),
            message,
        };

        let mut attrs = Self::default();
        for (n_line, line) in txt.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let l_fields: Vec<&str> = line.split_whitespace().collect();
            let (name, c_dtype, c_nmemb, c_data) = match l_fields.as_slice() {
                [name, c_dtype, c_nmemb] => (*name, *c_dtype, *c_nmemb, ""),
                [name, c_dtype, c_nmemb, c_data] => (*name, *c_dtype, *c_nmemb, *c_data),
                _ => return Err(invalid(format!("line {}: expected 4 fields", n_line + 1))),
            };
            let dtype = Dtype::parse(c_dtype)?;
            let nmemb = c_nmemb
                .parse::<usize>()
                .map_err(|e| invalid(format!("line {}: bad nmemb ({e})", n_line + 1)))?;
            let data = decode_hex(c_data)
                .ok_or_else(|| invalid(format!("line {}: bad hex payload", n_line + 1)))?;
            if data.len() != nmemb * dtype.itemsize() {
                return Err(invalid(format!(
                    "line {}: payload of {} bytes does not match {nmemb} x {dtype}",
                    n_line + 1,
                    data.len()
                )));
            }
            attrs.l_attrs.push((name.to_string(), BigAttr { dtype, nmemb, data }));
        }
        Ok(attrs)
    }

    fn format(&self) -> String {
        let mut txt = String::new();
        for (name, attr) in &self.l_attrs {
            txt.push_str(&format!(
                "{name} {} {} {}\n",
                attr.dtype,
                attr.nmemb,
                encode_hex(&attr.data)
            ));
        }
        txt
    }
}
