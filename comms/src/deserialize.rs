use std::io;

/// Types that can be read from a frame body.
pub trait Deserialize<'a>: Sized {
    /// Deserializes a value from the whole body of a frame.
    ///
    /// # Arguments
    /// * `buf` - The frame body, without the length header.
    ///
    /// # Errors
    /// Returns an `io::Error` of kind `InvalidData` if the body is malformed.
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}
