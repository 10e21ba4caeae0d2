//! Fixed-capacity circular byte queue.
//!
//! [`RingBuffer`] decouples the byte-oriented serial link (the producer) from the packet
//! layer (the consumer). It never allocates and every operation is O(1) except
//! [`find`](RingBuffer::find), which scans the unread bytes.
//!
//! ## Occupancy
//!
//! The queue holds at most `N` unread bytes. A push into a full queue is dropped rather
//! than overwriting unread data, so the consumer can never observe a byte that was not
//! written after its last read. Fullness is decided in one place,
//! [`is_full`](RingBuffer::is_full).

/// Circular byte queue with `N` slots.
///
/// Both cursors always stay within `[0, N)` and `len()` within `[0, N]`.
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    storage: [u8; N],
    write_cursor: usize,
    read_cursor: usize,
    size: usize,
    last_activity: u32,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            storage: [0; N],
            write_cursor: 0,
            read_cursor: 0,
            size: 0,
            last_activity: 0,
        }
    }

    /// Number of slots in the queue.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether there are no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether a further [`push`](RingBuffer::push) would be dropped.
    pub fn is_full(&self) -> bool {
        self.size >= N
    }

    /// Timestamp (milliseconds) of the most recently accepted byte.
    pub fn last_activity(&self) -> u32 {
        self.last_activity
    }

    /// Current read cursor.
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Current write cursor.
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Appends a byte received at `now` (milliseconds).
    ///
    /// # Returns
    /// `false` if the queue was full and the byte was dropped.
    pub fn push(&mut self, byte: u8, now: u32) -> bool {
        if self.is_full() {
            trace!("rx queue full, dropping {:#x}", byte);
            return false;
        }
        self.storage[self.write_cursor] = byte;
        self.write_cursor = Self::advance(self.write_cursor, 1);
        self.size += 1;
        self.last_activity = now;
        true
    }

    /// Removes and returns the byte under the read cursor.
    ///
    /// The slot is zeroed once read. Popping an empty queue returns that zeroed slot
    /// and leaves the occupancy at zero.
    pub fn pop_next(&mut self) -> u8 {
        let byte = self.storage[self.read_cursor];
        self.storage[self.read_cursor] = 0x00;
        self.read_cursor = Self::advance(self.read_cursor, 1);
        self.size = self.size.saturating_sub(1);
        byte
    }

    /// Returns the byte `offset` positions ahead of the read cursor without consuming it.
    pub fn peek_at(&self, offset: usize) -> u8 {
        self.storage[Self::advance(self.read_cursor, offset)]
    }

    /// Looks for `target` among the unread bytes.
    ///
    /// # Returns
    /// The number of bytes from the read cursor up to and including the first `target`,
    /// or `0` if it has not been received yet.
    pub fn find(&self, target: u8) -> usize {
        (0..self.size)
            .find(|&offset| self.peek_at(offset) == target)
            .map_or(0, |offset| offset + 1)
    }

    /// Drops every unread byte.
    pub fn reset(&mut self) {
        self.size = 0;
        self.write_cursor = 0;
        self.read_cursor = 0;
    }

    fn advance(cursor: usize, by: usize) -> usize {
        (cursor + by % N) % N
    }
}
