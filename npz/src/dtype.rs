use std::fmt;

use crate::NpzError;

/// The byte order prefix of a numpy type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
    /// `|`, only meaningful for single byte elements.
    NotApplicable,
}

/// The element types an archive array can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    F4,
    F8,
}

impl ElementKind {
    /// The width in bytes of a single element.
    pub fn size(self) -> usize {
        match self {
            Self::I1 | Self::U1 => 1,
            Self::I2 | Self::U2 => 2,
            Self::I4 | Self::U4 | Self::F4 => 4,
            Self::I8 | Self::U8 | Self::F8 => 8,
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::I1 => "i1",
            Self::I2 => "i2",
            Self::I4 => "i4",
            Self::I8 => "i8",
            Self::U1 => "u1",
            Self::U2 => "u2",
            Self::U4 => "u4",
            Self::U8 => "u8",
            Self::F4 => "f4",
            Self::F8 => "f8",
        }
    }
}

/// A numpy type descriptor such as `<f8` or `>i4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DType {
    pub kind: ElementKind,
    pub order: ByteOrder,
}

macro_rules! decode_as {
    ($ty:ty, $order:expr, $bytes:expr) => {{
        let mut raw = [0; size_of::<$ty>()];
        raw.copy_from_slice(&$bytes[..size_of::<$ty>()]);
        match $order {
            ByteOrder::Big => <$ty>::from_be_bytes(raw) as f64,
            _ => <$ty>::from_le_bytes(raw) as f64,
        }
    }};
}

macro_rules! encode_as {
    ($ty:ty, $order:expr, $value:expr, $out:expr) => {{
        let value = $value as $ty;
        let raw = match $order {
            ByteOrder::Big => value.to_be_bytes(),
            _ => value.to_le_bytes(),
        };
        $out[..size_of::<$ty>()].copy_from_slice(&raw);
    }};
}

impl DType {
    /// Creates a little-endian descriptor, or a byte order free one for single
    /// byte kinds.
    pub fn little(kind: ElementKind) -> Self {
        let order = match kind.size() {
            1 => ByteOrder::NotApplicable,
            _ => ByteOrder::Little,
        };

        Self { kind, order }
    }

    /// Parses a descriptor string as found in the `descr` header field.
    ///
    /// # Errors
    /// Returns `NpzError::UnsupportedDtype` for anything outside the signed,
    /// unsigned and floating point kinds, or for `|` on multi-byte kinds.
    pub fn parse(descr: &str) -> Result<Self, NpzError> {
        let unsupported = || NpzError::UnsupportedDtype(descr.to_string());

        let (order, code) = match descr.as_bytes().first() {
            Some(b'<') => (ByteOrder::Little, &descr[1..]),
            Some(b'>') => (ByteOrder::Big, &descr[1..]),
            Some(b'|') => (ByteOrder::NotApplicable, &descr[1..]),
            Some(b'=') => (ByteOrder::Little, &descr[1..]),
            _ => return Err(unsupported()),
        };

        let kind = match code {
            "i1" => ElementKind::I1,
            "i2" => ElementKind::I2,
            "i4" => ElementKind::I4,
            "i8" => ElementKind::I8,
            "u1" => ElementKind::U1,
            "u2" => ElementKind::U2,
            "u4" => ElementKind::U4,
            "u8" => ElementKind::U8,
            "f4" => ElementKind::F4,
            "f8" => ElementKind::F8,
            _ => return Err(unsupported()),
        };

        if order == ByteOrder::NotApplicable && kind.size() != 1 {
            return Err(unsupported());
        }

        Ok(Self { kind, order })
    }

    /// The width in bytes of a single element.
    pub fn size(&self) -> usize {
        self.kind.size()
    }

    /// Decodes one element and promotes it to `f64`.
    ///
    /// # Arguments
    /// * `bytes` - At least `self.size()` bytes holding the element.
    pub fn decode(&self, bytes: &[u8]) -> f64 {
        match self.kind {
            ElementKind::I1 => bytes[0] as i8 as f64,
            ElementKind::U1 => bytes[0] as f64,
            ElementKind::I2 => decode_as!(i16, self.order, bytes),
            ElementKind::I4 => decode_as!(i32, self.order, bytes),
            ElementKind::I8 => decode_as!(i64, self.order, bytes),
            ElementKind::U2 => decode_as!(u16, self.order, bytes),
            ElementKind::U4 => decode_as!(u32, self.order, bytes),
            ElementKind::U8 => decode_as!(u64, self.order, bytes),
            ElementKind::F4 => decode_as!(f32, self.order, bytes),
            ElementKind::F8 => decode_as!(f64, self.order, bytes),
        }
    }

    /// Encodes `value` with this descriptor's width and byte order.
    ///
    /// Integer kinds truncate toward zero and saturate at their bounds, `NaN`
    /// becomes zero.
    ///
    /// # Arguments
    /// * `value` - The element to write.
    /// * `out` - At least `self.size()` bytes to write the element into.
    pub fn encode(&self, value: f64, out: &mut [u8]) {
        match self.kind {
            ElementKind::I1 => out[0] = value as i8 as u8,
            ElementKind::U1 => out[0] = value as u8,
            ElementKind::I2 => encode_as!(i16, self.order, value, out),
            ElementKind::I4 => encode_as!(i32, self.order, value, out),
            ElementKind::I8 => encode_as!(i64, self.order, value, out),
            ElementKind::U2 => encode_as!(u16, self.order, value, out),
            ElementKind::U4 => encode_as!(u32, self.order, value, out),
            ElementKind::U8 => encode_as!(u64, self.order, value, out),
            ElementKind::F4 => encode_as!(f32, self.order, value, out),
            ElementKind::F8 => encode_as!(f64, self.order, value, out),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.order {
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
            ByteOrder::NotApplicable => '|',
        };

        write!(f, "{order}{}", self.kind.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_are_symmetric() {
        for descr in ["<f8", ">f4", "<i2", ">u8", "|u1", "|i1"] {
            assert_eq!(DType::parse(descr).unwrap().to_string(), descr);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_kinds() {
        for descr in ["<c16", "|b1", "<U10", "f8", "|f8", ""] {
            assert!(matches!(
                DType::parse(descr),
                Err(NpzError::UnsupportedDtype(_))
            ));
        }
    }

    #[test]
    fn test_big_endian_decode() {
        let dtype = DType::parse(">i4").unwrap();
        assert_eq!(dtype.decode(&[0xff, 0xff, 0xff, 0xfe]), -2.0);

        let dtype = DType::parse(">f8").unwrap();
        assert_eq!(dtype.decode(&1.5f64.to_be_bytes()), 1.5);
    }

    #[test]
    fn test_integer_encode_truncates_toward_zero() {
        let dtype = DType::little(ElementKind::I4);
        let mut out = [0; 4];

        dtype.encode(2.9, &mut out);
        assert_eq!(i32::from_le_bytes(out), 2);

        dtype.encode(-2.9, &mut out);
        assert_eq!(i32::from_le_bytes(out), -2);
    }

    #[test]
    fn test_unsigned_encode_saturates() {
        let dtype = DType::little(ElementKind::U1);
        let mut out = [0; 1];

        dtype.encode(-3.0, &mut out);
        assert_eq!(out[0], 0);

        dtype.encode(300.0, &mut out);
        assert_eq!(out[0], 255);
    }
}
