//! The `.npy` preamble: magic, version, header length and the header dict.

use std::io::{Read, Write};

use serde::Deserialize;

use crate::{DType, NpzError};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGNMENT: usize = 64;

/// The metadata in front of every `.npy` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub dtype: DType,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

#[derive(Deserialize)]
struct RawHeader {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl NpyHeader {
    /// Creates a C ordered header.
    pub fn new(dtype: DType, shape: Vec<usize>) -> Self {
        Self {
            dtype,
            fortran_order: false,
            shape,
        }
    }

    /// The amount of elements the array holds, a shape of `()` holds one.
    ///
    /// Saturates at `usize::MAX`, parsed and written headers never get there.
    pub fn len(&self) -> usize {
        element_count(&self.shape).unwrap_or(usize::MAX)
    }

    /// Whether the shape has a zero sized dimension.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the preamble, leaving `reader` at the first data byte.
    ///
    /// # Errors
    /// Returns `NpzError::Format` for a bad magic string, an unknown version or
    /// an unparsable header dict, and `NpzError::UnsupportedDtype` when the
    /// declared element type is not handled.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, NpzError> {
        let mut preamble = [0; 8];
        reader
            .read_exact(&mut preamble)
            .map_err(|_| NpzError::format("truncated npy preamble"))?;

        if &preamble[..6] != MAGIC {
            return Err(NpzError::format("missing npy magic string"));
        }

        let header_len = match preamble[6] {
            1 => {
                let mut raw = [0; 2];
                reader.read_exact(&mut raw)?;
                u16::from_le_bytes(raw) as usize
            }
            2 | 3 => {
                let mut raw = [0; 4];
                reader.read_exact(&mut raw)?;
                u32::from_le_bytes(raw) as usize
            }
            major => return Err(NpzError::format(format!("unsupported npy version {major}"))),
        };

        let mut dict = vec![0; header_len];
        reader
            .read_exact(&mut dict)
            .map_err(|_| NpzError::format("truncated npy header"))?;

        let dict = str::from_utf8(&dict).map_err(|e| NpzError::format(e.to_string()))?;
        Self::parse_dict(dict)
    }

    /// Parses the python literal header dict.
    ///
    /// # Arguments
    /// * `dict` - Something like `{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }`.
    pub fn parse_dict(dict: &str) -> Result<Self, NpzError> {
        let json = python_literal_to_json(dict.trim());
        let raw: RawHeader = serde_json::from_str(&json)
            .map_err(|e| NpzError::format(format!("bad npy header {dict:?}: {e}")))?;

        let header = Self {
            dtype: DType::parse(&raw.descr)?,
            fortran_order: raw.fortran_order,
            shape: raw.shape,
        };
        header.check_size()?;
        Ok(header)
    }

    /// Checks the data section size, in bytes, fits a `usize`.
    ///
    /// # Errors
    /// Returns `NpzError::Format` naming the shape otherwise.
    pub fn check_size(&self) -> Result<(), NpzError> {
        element_count(&self.shape)
            .and_then(|count| count.checked_mul(self.dtype.size()))
            .map(|_| ())
            .ok_or_else(|| NpzError::format(format!("npy shape {:?} is too large", self.shape)))
    }

    /// Renders the header dict, without padding.
    pub fn dict(&self) -> String {
        let shape = match self.shape.as_slice() {
            [dim] => format!("({dim},)"),
            dims => {
                let dims: Vec<_> = dims.iter().map(usize::to_string).collect();
                format!("({})", dims.join(", "))
            }
        };

        let fortran_order = if self.fortran_order { "True" } else { "False" };

        format!(
            "{{'descr': '{}', 'fortran_order': {fortran_order}, 'shape': {shape}, }}",
            self.dtype
        )
    }

    /// Writes the preamble so that the data starts on a 64 byte boundary.
    ///
    /// Version 1.0 is used unless the header is too long for its `u16` length
    /// field, then version 2.0 is used.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), NpzError> {
        self.check_size()?;
        let mut dict = self.dict();

        let fixed_v1 = MAGIC.len() + 2 + size_of::<u16>();
        let padded_len = |fixed: usize| (fixed + dict.len() + 1).next_multiple_of(ALIGNMENT) - fixed;

        let (version, fixed) = match padded_len(fixed_v1) <= u16::MAX as usize {
            true => (1, fixed_v1),
            false => (2, MAGIC.len() + 2 + size_of::<u32>()),
        };

        let header_len = padded_len(fixed);
        dict.extend(std::iter::repeat_n(' ', header_len - dict.len() - 1));
        dict.push('\n');

        writer.write_all(MAGIC)?;
        writer.write_all(&[version, 0])?;

        match version {
            1 => writer.write_all(&(header_len as u16).to_le_bytes())?,
            _ => {
                let len = u32::try_from(header_len)
                    .map_err(|_| NpzError::format("npy header does not fit a u32 length"))?;
                writer.write_all(&len.to_le_bytes())?
            }
        }

        writer.write_all(dict.as_bytes())?;
        Ok(())
    }
}

fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |count, &dim| count.checked_mul(dim))
}

/// Rewrites the subset of python literal syntax numpy uses into JSON.
fn python_literal_to_json(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                for inner in chars.by_ref() {
                    if inner == c {
                        break;
                    }
                    if inner == '"' {
                        out.push('\\');
                    }
                    out.push(inner);
                }
                out.push('"');
            }
            '(' => out.push('['),
            ')' | ']' | '}' => {
                let trimmed = out.trim_end().trim_end_matches(',').len();
                out.truncate(trimmed);
                out.push(if c == ')' { ']' } else { c });
            }
            c if c.is_ascii_alphabetic() => {
                let mut ident = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() {
                        break;
                    }
                    ident.push(next);
                    chars.next();
                }

                out.push_str(match ident.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            c => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ElementKind;

    #[test]
    fn test_parse_numpy_dict() {
        let header =
            NpyHeader::parse_dict("{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }")
                .unwrap();

        assert_eq!(header.dtype, DType::little(ElementKind::F8));
        assert!(!header.fortran_order);
        assert_eq!(header.shape, [3]);
    }

    #[test]
    fn test_parse_scalar_and_matrix_shapes() {
        let scalar =
            NpyHeader::parse_dict("{'descr': '>i4', 'fortran_order': True, 'shape': (), }").unwrap();
        assert!(scalar.shape.is_empty());
        assert_eq!(scalar.len(), 1);
        assert!(scalar.fortran_order);

        let matrix =
            NpyHeader::parse_dict("{'descr': '<u2', 'fortran_order': False, 'shape': (2, 3)}")
                .unwrap();
        assert_eq!(matrix.shape, [2, 3]);
        assert_eq!(matrix.len(), 6);
    }

    #[test]
    fn test_dict_rendering_matches_numpy() {
        let header = NpyHeader::new(DType::little(ElementKind::F8), vec![3]);
        assert_eq!(
            header.dict(),
            "{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }"
        );

        let header = NpyHeader::new(DType::little(ElementKind::I4), vec![2, 5]);
        assert!(header.dict().contains("'shape': (2, 5)"));

        let header = NpyHeader::new(DType::little(ElementKind::F4), vec![]);
        assert!(header.dict().contains("'shape': ()"));
    }

    #[test]
    fn test_write_pads_to_alignment() {
        let header = NpyHeader::new(DType::little(ElementKind::F8), vec![3]);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();

        assert_eq!(buf.len() % ALIGNMENT, 0);
        assert_eq!(&buf[..8], b"\x93NUMPY\x01\x00");
        assert_eq!(buf.last(), Some(&b'\n'));

        let parsed = NpyHeader::read(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_huge_shape_switches_to_version_two() {
        let header = NpyHeader::new(DType::little(ElementKind::U1), vec![1; 30_000]);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();

        assert_eq!(buf[6], 2);
        assert_eq!(buf.len() % ALIGNMENT, 0);
        assert_eq!(NpyHeader::read(&mut buf.as_slice()).unwrap().shape.len(), 30_000);
    }

    #[test]
    fn test_bad_magic_is_a_format_error() {
        let buf = b"\x93NUMPX\x01\x00\x00\x00";
        assert!(matches!(
            NpyHeader::read(&mut buf.as_slice()),
            Err(NpzError::Format(_))
        ));
    }

    #[test]
    fn test_overflowing_shape_is_a_format_error() {
        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (4294967296, 4294967296), }";
        assert!(matches!(NpyHeader::parse_dict(dict), Err(NpzError::Format(_))));

        // The element count fits, its size in bytes does not.
        let dict = format!(
            "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
            usize::MAX / 2
        );
        assert!(matches!(NpyHeader::parse_dict(&dict), Err(NpzError::Format(_))));
    }

    #[test]
    fn test_overflowing_shape_is_never_written() {
        let header = NpyHeader::new(DType::little(ElementKind::U1), vec![usize::MAX, 2]);
        assert_eq!(header.len(), usize::MAX);

        let mut buf = Vec::new();
        assert!(matches!(header.write(&mut buf), Err(NpzError::Format(_))));
        assert!(buf.is_empty());
    }
}
