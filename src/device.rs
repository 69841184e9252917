//! Owned accelerator-side byte buffers.
//!
//! [`DeviceBuffer`] stands in for a contiguous allocation in accelerator
//! memory. Stages hand buffers to each other by value: ingestion fills one,
//! normalization consumes it and produces another, and the tokenizer consumes
//! that. Nothing holds a reference to a buffer after passing it on.
//!
//! [`DeviceBufferPool`] is the fixed set of scratch buffers the planner uses
//! while probing sub-chunks for record delimiters.

use std::ops::Range;

/// An owned, contiguous device allocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceBuffer {
    data: Vec<u8>,
}

impl DeviceBuffer {
    /// Allocate an empty buffer able to hold `capacity` bytes without growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Move host bytes into a device buffer.
    #[must_use]
    pub fn from_host(bytes: Vec<u8>) -> Self {
        Self { data: bytes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Host-to-device copy appended at the end of the buffer.
    pub fn copy_from_host(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Device-to-device copy of `range` from `src`, appended at the end.
    ///
    /// # Panics
    /// Panics if `range` is out of bounds for `src`.
    pub fn copy_from_device(&mut self, src: &DeviceBuffer, range: Range<usize>) {
        self.data.extend_from_slice(&src.data[range]);
    }

    pub fn push(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// View the contents. Reading device memory from the host is only done by
    /// the tokenizer and by tests.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Device-to-host copy of the whole buffer.
    #[must_use]
    pub fn into_host(self) -> Vec<u8> {
        self.data
    }
}

/// Fixed-size pool of scratch buffers for sub-chunk probes.
///
/// Buffers are handed out round-robin; callers use one buffer at a time and
/// never hold it across probes.
#[derive(Debug)]
pub struct DeviceBufferPool {
    buffers: Vec<DeviceBuffer>,
    next: usize,
}

impl DeviceBufferPool {
    /// Pre-allocate `count` buffers of `buffer_size` bytes each.
    #[must_use]
    pub fn new(count: usize, buffer_size: usize) -> Self {
        Self {
            buffers: (0..count.max(1))
                .map(|_| DeviceBuffer::with_capacity(buffer_size))
                .collect(),
            next: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Next scratch buffer, cleared.
    pub fn next_buffer(&mut self) -> &mut DeviceBuffer {
        let idx = self.next;
        self.next = (self.next + 1) % self.buffers.len();
        let buf = &mut self.buffers[idx];
        buf.clear();
        buf
    }
}
