//! Circular byte buffer
//!
//! Fixed-capacity byte store backing the channel's receive and send
//! sides. Appends at the tail, drains from the head, never reallocates.
//! The receive side overwrites the oldest unread bytes when full; the
//! send side accepts only up to free capacity and reports a short count.

/// Fixed-capacity circular byte store
pub(crate) struct ByteRing {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl ByteRing {
    /// Create a ring with the given fixed capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Remaining free capacity
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Byte at logical index `i` (0 = oldest). Caller checks bounds.
    fn at(&self, i: usize) -> u8 {
        self.buf[(self.head + i) % self.capacity()]
    }

    /// Append one byte, overwriting the oldest when full
    fn push_overwrite(&mut self, byte: u8) {
        let cap = self.capacity();
        if self.len == cap {
            self.head = (self.head + 1) % cap;
            self.len -= 1;
        }
        self.buf[(self.head + self.len) % cap] = byte;
        self.len += 1;
    }

    /// Append all of `data`, overwriting the oldest unread bytes if the
    /// capacity is exceeded (receive side)
    pub fn extend_overwrite(&mut self, data: &[u8]) {
        for &b in data {
            self.push_overwrite(b);
        }
    }

    /// Append up to free capacity and return the accepted count; excess
    /// bytes are dropped (send side)
    pub fn extend_to_free(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        for &b in &data[..n] {
            self.push_overwrite(b);
        }
        n
    }

    /// Copy bytes starting at logical offset `from` into `out` without
    /// consuming them. Returns the count copied: `out.len()` when that
    /// many bytes exist past `from`, otherwise whatever remains.
    pub fn copy_from(&self, from: usize, out: &mut [u8]) -> usize {
        if from >= self.len {
            return 0;
        }
        let end = from + out.len();
        let to_copy = if self.len > end {
            out.len()
        } else {
            self.len - from
        };
        for (i, slot) in out[..to_copy].iter_mut().enumerate() {
            *slot = self.at(from + i);
        }
        to_copy
    }

    /// Discard up to `n` bytes from the head
    pub fn drain_front(&mut self, n: usize) {
        let n = n.min(self.len);
        self.head = (self.head + n) % self.capacity();
        self.len -= n;
    }

    /// Contiguous view of the oldest buffered bytes. May be shorter than
    /// `len()` when the content wraps; draining what it yields exposes
    /// the rest.
    pub fn front_chunk(&self) -> &[u8] {
        let end = (self.head + self.len).min(self.capacity());
        &self.buf[self.head..end]
    }

    /// Logical start index of the first occurrence of `needle` at or
    /// after `from`
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() || self.len < needle.len() {
            return None;
        }
        for start in from..=(self.len - needle.len()) {
            if (0..needle.len()).all(|i| self.at(start + i) == needle[i]) {
                return Some(start);
            }
        }
        None
    }
}
