/// Fixed-capacity byte region with a narrowing view.
///
/// The backing storage is allocated once and never grows. The view starts at
/// the beginning of the storage; [`advance`](Self::advance) moves its start
/// forward and [`reset`](Self::reset) restores it to the full capacity.
#[derive(Clone)]
pub struct ScratchBuffer {
    storage: Box<[u8]>,
    offset: usize,
}

impl ScratchBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            offset: 0,
        }
    }

    /// Size of the backing storage.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes left in the current view.
    pub fn remaining(&self) -> usize {
        self.storage.len() - self.offset
    }

    /// Start of the current view, relative to the backing storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Narrow the view by `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`remaining`](Self::remaining).
    pub fn advance(&mut self, n: usize) {
        assert!(
            n <= self.remaining(),
            "scratch buffer advance out of bounds ({n} > {} remaining)",
            self.remaining()
        );
        self.offset += n;
    }

    /// The current view.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..]
    }

    /// The current view, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..]
    }

    /// Restore the view to the full backing storage.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("capacity", &self.capacity())
            .field("offset", &self.offset)
            .finish()
    }
}
