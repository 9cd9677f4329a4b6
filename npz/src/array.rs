//! Element-at-a-time access to the data section of a `.npy` array.

use std::io::{Read, Write};

use crate::{NpyHeader, NpzError};

/// Elements reserved up front by `read_all`, the rest grows as data arrives.
const MAX_PREALLOC: usize = 1 << 20;

/// Streams the elements of one array, promoted to `f64`.
pub struct NpyReader<R> {
    inner: R,
    header: NpyHeader,
    remaining: usize,
    scratch: [u8; 8],
}

impl<R: Read> NpyReader<R> {
    /// Reads the preamble of the array held by `inner`.
    ///
    /// # Errors
    /// Returns the header parsing errors of `NpyHeader::read`.
    pub fn new(mut inner: R) -> Result<Self, NpzError> {
        let header = NpyHeader::read(&mut inner)?;
        let remaining = header.len();

        Ok(Self {
            inner,
            header,
            remaining,
            scratch: [0; 8],
        })
    }

    pub fn header(&self) -> &NpyHeader {
        &self.header
    }

    /// The amount of elements not yet read.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Reads the next element in storage order.
    ///
    /// # Returns
    /// `None` once every element the shape declares has been read.
    ///
    /// # Errors
    /// Returns `NpzError::EndOfArray` if the data is shorter than the shape.
    pub fn next_value(&mut self) -> Result<Option<f64>, NpzError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let dtype = self.header.dtype;
        let bytes = &mut self.scratch[..dtype.size()];
        self.inner.read_exact(bytes)?;
        self.remaining -= 1;

        Ok(Some(dtype.decode(bytes)))
    }

    /// Reads every remaining element.
    pub fn read_all(mut self) -> Result<Vec<f64>, NpzError> {
        let mut values = Vec::with_capacity(self.remaining.min(MAX_PREALLOC));
        while let Some(value) = self.next_value()? {
            values.push(value);
        }

        Ok(values)
    }
}

/// Writes the elements of one array, narrowing each `f64` to the declared type.
pub struct NpyWriter<W: Write> {
    inner: W,
    header: NpyHeader,
    written: usize,
    scratch: [u8; 8],
}

impl<W: Write> NpyWriter<W> {
    /// Writes the preamble for `header` into `inner`.
    pub fn new(mut inner: W, header: NpyHeader) -> Result<Self, NpzError> {
        header.write(&mut inner)?;

        Ok(Self {
            inner,
            header,
            written: 0,
            scratch: [0; 8],
        })
    }

    pub fn header(&self) -> &NpyHeader {
        &self.header
    }

    /// Appends one element.
    ///
    /// # Errors
    /// Returns `NpzError::ElementCount` when the shape is already covered.
    pub fn write_value(&mut self, value: f64) -> Result<(), NpzError> {
        let expected = self.header.len();
        if self.written == expected {
            return Err(NpzError::ElementCount {
                expected,
                written: expected + 1,
            });
        }

        let dtype = self.header.dtype;
        let bytes = &mut self.scratch[..dtype.size()];
        dtype.encode(value, bytes);
        self.inner.write_all(bytes)?;
        self.written += 1;

        Ok(())
    }

    /// Checks every declared element was written and flushes the writer.
    ///
    /// # Returns
    /// The underlying writer.
    pub fn finish(mut self) -> Result<W, NpzError> {
        let expected = self.header.len();
        if self.written != expected {
            return Err(NpzError::ElementCount {
                expected,
                written: self.written,
            });
        }

        self.inner.flush()?;
        Ok(self.inner)
    }
}
