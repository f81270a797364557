//! Binary buffer with auto-growing capacity.

use std::ops::{Deref, DerefMut};

/// A contiguous byte buffer that grows automatically as needed.
///
/// Unlike a plain writer cursor, `Buffer` keeps a logical length that can
/// both grow and shrink: container encoders reserve header space up front
/// and give part of it back when the final header turns out smaller.
///
/// # Example
///
/// ```
/// use velocypack_buffers::Buffer;
///
/// let mut buf = Buffer::new();
/// buf.push(0x01);
/// buf.write(&[0x02, 0x03]);
/// let tail = buf.grow(2);
/// tail[0] = 0x04;
/// buf.shrink(1);
/// assert_eq!(buf.as_slice(), [0x01, 0x02, 0x03, 0x04]);
/// ```
#[derive(Default, Clone)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates an empty buffer with the given pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Returns the logical length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when no bytes have been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a single byte.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// Appends a byte slice.
    #[inline]
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Ensures capacity for at least `n` more bytes without changing the
    /// logical length.
    #[inline]
    pub fn reserve_space(&mut self, n: usize) {
        self.data.reserve(n);
    }

    /// Extends the logical length by `n` zero bytes and returns the new
    /// region for writing.
    ///
    /// The zero fill is observable: reserved header bytes that are never
    /// rewritten stay zero and act as padding that readers skip.
    pub fn grow(&mut self, n: usize) -> &mut [u8] {
        let old_len = self.data.len();
        self.data.resize(old_len + n, 0);
        &mut self.data[old_len..]
    }

    /// Decreases the logical length by `n` bytes.
    pub fn shrink(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.data.truncate(self.data.len().saturating_sub(n));
    }

    /// Drops all contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Returns the contents as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for Buffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Buffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer({} bytes)", self.data.len())
    }
}
