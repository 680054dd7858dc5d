//! Numpy-style dtype strings as stored in block headers and attributes.

use std::fmt;
use std::str::FromStr;

use crate::spec::BigFileError;

/// Byte order prefix of a dtype string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumByteOrder {
    /// `<`
    Little,
    /// `>`
    Big,
    /// `|`: single-byte and byte-string types.
    NotApplicable,
}

impl EnumByteOrder {
    /// Byte order of the running machine.
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Little => '<',
            Self::Big => '>',
            Self::NotApplicable => '|',
        }
    }
}

/// Element kind character of a dtype string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumDtypeKind {
    /// `i`
    Int,
    /// `u`
    Uint,
    /// `f`
    Float,
    /// `c`
    Complex,
    /// `b`
    Bool,
    /// `S`: fixed-length byte string.
    Bytes,
    /// `V`: opaque bytes.
    Void,
}

impl EnumDtypeKind {
    fn as_char(self) -> char {
        match self {
            Self::Int => 'i',
            Self::Uint => 'u',
            Self::Float => 'f',
            Self::Complex => 'c',
            Self::Bool => 'b',
            Self::Bytes => 'S',
            Self::Void => 'V',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::Int),
            'u' => Some(Self::Uint),
            'f' => Some(Self::Float),
            'c' => Some(Self::Complex),
            'b' | '?' => Some(Self::Bool),
            'S' | 'a' => Some(Self::Bytes),
            'V' => Some(Self::Void),
            _ => None,
        }
    }

    fn is_valid_itemsize(self, itemsize: usize) -> bool {
        match self {
            Self::Int | Self::Uint => matches!(itemsize, 1 | 2 | 4 | 8),
            Self::Float => matches!(itemsize, 2 | 4 | 8 | 16),
            Self::Complex => matches!(itemsize, 8 | 16 | 32),
            Self::Bool => itemsize == 1,
            Self::Bytes | Self::Void => itemsize >= 1,
        }
    }

    fn has_byte_order(self, itemsize: usize) -> bool {
        itemsize > 1 && !matches!(self, Self::Bytes | Self::Void | Self::Bool)
    }
}

/// One scalar element type: byte order, kind and item size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dtype {
    byte_order: EnumByteOrder,
    kind: EnumDtypeKind,
    itemsize: usize,
}

impl Dtype {
    /// Dtype in machine byte order (`|` for types where order is meaningless).
    pub fn native(kind: EnumDtypeKind, itemsize: usize) -> Self {
        Self::with_byte_order(kind, itemsize, EnumByteOrder::native())
    }

    /// Dtype with explicit byte order; normalized to `|` when order is meaningless.
    pub fn with_byte_order(kind: EnumDtypeKind, itemsize: usize, byte_order: EnumByteOrder) -> Self {
        let byte_order = if kind.has_byte_order(itemsize) {
            byte_order
        } else {
            EnumByteOrder::NotApplicable
        };
        Self {
            byte_order,
            kind,
            itemsize,
        }
    }

    pub fn byte_order(&self) -> EnumByteOrder {
        self.byte_order
    }

    pub fn kind(&self) -> EnumDtypeKind {
        self.kind
    }

    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    /// True when the header string of this dtype parses back to it.
    pub fn is_valid(&self) -> bool {
        self.kind.is_valid_itemsize(self.itemsize)
    }

    /// Parse `<f8`, `f8`, `=i4`, `|S5`, `?`, ...
    ///
    /// A missing or `=` prefix means machine byte order.
    pub fn parse(txt: &str) -> Result<Self, BigFileError> {
        let invalid = || BigFileError::InvalidDtype(txt.to_string());
        let txt_trimmed = txt.trim();
        let mut iter_chars = txt_trimmed.chars().peekable();

        let enum_byte_order = match iter_chars.peek() {
            Some('<') => Some(EnumByteOrder::Little),
            Some('>') => Some(EnumByteOrder::Big),
            Some('|') => Some(EnumByteOrder::NotApplicable),
            Some('=') => Some(EnumByteOrder::native()),
            _ => None,
        };
        if enum_byte_order.is_some() {
            iter_chars.next();
        }

        let c_kind = iter_chars.next().ok_or_else(invalid)?;
        let enum_kind = EnumDtypeKind::from_char(c_kind).ok_or_else(invalid)?;
        let txt_itemsize: String = iter_chars.collect();
        let itemsize = if txt_itemsize.is_empty() {
            match enum_kind {
                EnumDtypeKind::Bool | EnumDtypeKind::Bytes => 1,
                _ => return Err(invalid()),
            }
        } else {
            txt_itemsize.parse::<usize>().map_err(|_| invalid())?
        };
        if !enum_kind.is_valid_itemsize(itemsize) {
            return Err(invalid());
        }

        match enum_byte_order {
            Some(EnumByteOrder::NotApplicable) if enum_kind.has_byte_order(itemsize) => {
                Err(invalid())
            }
            Some(order) => Ok(Self::with_byte_order(enum_kind, itemsize, order)),
            None => Ok(Self::native(enum_kind, itemsize)),
        }
    }
}

impl FromStr for Dtype {
    type Err = BigFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.byte_order.as_char(),
            self.kind.as_char(),
            self.itemsize
        )
    }
}

/// Rust primitives that map 1:1 onto a native BigFile dtype.
pub trait ElementScalar: Copy + PartialEq + fmt::Debug {
    /// Native dtype of this primitive.
    fn dtype() -> Dtype;
    /// Append native-endian bytes.
    fn extend_ne_bytes(self, buf: &mut Vec<u8>);
    /// Decode from exactly `dtype().itemsize()` native-endian bytes.
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_element_scalar {
    ($($t:ty => $kind:expr),* $(,)?) => {
        $(
            impl ElementScalar for $t {
                fn dtype() -> Dtype {
                    Dtype::native($kind, std::mem::size_of::<$t>())
                }

                fn extend_ne_bytes(self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_ne_bytes());
                }

                fn from_ne_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_element_scalar!(
    i8 => EnumDtypeKind::Int,
    i16 => EnumDtypeKind::Int,
    i32 => EnumDtypeKind::Int,
    i64 => EnumDtypeKind::Int,
    u8 => EnumDtypeKind::Uint,
    u16 => EnumDtypeKind::Uint,
    u32 => EnumDtypeKind::Uint,
    u64 => EnumDtypeKind::Uint,
    f32 => EnumDtypeKind::Float,
    f64 => EnumDtypeKind::Float,
);

/// Encode a slice of primitives into a contiguous native-endian buffer.
pub fn encode_values<T: ElementScalar>(values: &[T]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * T::dtype().itemsize());
    for v in values {
        v.extend_ne_bytes(&mut buf);
    }
    buf
}

/// Decode a native-endian buffer whose dtype must equal `T::dtype()`.
pub fn decode_values<T: ElementScalar>(dtype: Dtype, bytes: &[u8]) -> Result<Vec<T>, BigFileError> {
    if dtype != T::dtype() {
        return Err(BigFileError::DtypeMismatch {
            expected: T::dtype().to_string(),
            actual: dtype.to_string(),
        });
    }
    Ok(bytes
        .chunks_exact(dtype.itemsize())
        .map(T::from_ne_slice)
        .collect())
}

/// Decode any integer dtype (either byte order, 1..=8 bytes) into `i64`.
pub(crate) fn decode_integers(dtype: Dtype, bytes: &[u8]) -> Result<Vec<i64>, BigFileError> {
    let n_size = dtype.itemsize();
    let b_signed = match dtype.kind() {
        EnumDtypeKind::Int => true,
        EnumDtypeKind::Uint => false,
        _ => {
            return Err(BigFileError::DtypeMismatch {
                expected: "integer".to_string(),
                actual: dtype.to_string(),
            });
        }
    };

    let l_values = bytes
        .chunks_exact(n_size)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            match dtype.byte_order() {
                EnumByteOrder::Big => {
                    for (i, b) in chunk.iter().rev().enumerate() {
                        raw[i] = *b;
                    }
                }
                _ => raw[..n_size].copy_from_slice(chunk),
            }
            let b_negative = b_signed && raw[n_size - 1] & 0x80 != 0;
            if b_negative {
                raw[n_size..].fill(0xff);
            }
            i64::from_le_bytes(raw)
        })
        .collect();
    Ok(l_values)
}
