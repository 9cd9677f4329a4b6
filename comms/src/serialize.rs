/// Types that can be written into a frame body.
pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer where the framing header is already reserved, the
    ///           serialized prefix of the body is appended to it.
    ///
    /// # Returns
    /// An optional slice of bytes that follows the appended prefix and is
    /// written as is, without being copied into `buf`.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
