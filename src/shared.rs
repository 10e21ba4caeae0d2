//! Receive queue shared with a UART interrupt.
//!
//! For ports where bytes are taken off the UART in its receive interrupt, the interrupt
//! pushes into a [`SharedRxQueue`] and the control loop moves the bytes into the
//! transport's own queue with [`shared_rx_drain`] before decoding. Both sides run inside
//! `critical_section::with`, so the control loop never sees a byte the interrupt has not
//! finished storing.
//!
//! ```
//! use gwboot::{init_rx_queue, shared::{shared_rx_drain, shared_rx_push}, ring::RingBuffer};
//!
//! init_rx_queue!(64);
//!
//! // In the UART interrupt:
//! shared_rx_push(&RX_QUEUE, 0x02, 10);
//!
//! // In the control loop:
//! let mut rx: RingBuffer<256> = RingBuffer::new();
//! assert_eq!(shared_rx_drain(&RX_QUEUE, &mut rx), 1);
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use crate::ring::RingBuffer;

/// A receive queue that an interrupt handler and the control loop can both reach.
pub type SharedRxQueue<const N: usize> = Mutex<RefCell<RingBuffer<N>>>;

/// Creates an empty [`SharedRxQueue`], usable in a `static` initialiser.
///
/// # Example
/// ```rust
/// use gwboot::shared::{shared_rx_queue_init, SharedRxQueue};
///
/// static RX_QUEUE: SharedRxQueue<128> = shared_rx_queue_init();
/// ```
pub const fn shared_rx_queue_init<const N: usize>() -> SharedRxQueue<N> {
    Mutex::new(RefCell::new(RingBuffer::new()))
}

/// Stores a byte received at `now` (milliseconds). Call from the receive interrupt.
///
/// # Returns
/// `false` if the queue was full and the byte was dropped.
pub fn shared_rx_push<const N: usize>(
    queue: &'static SharedRxQueue<N>,
    byte: u8,
    now: u32,
) -> bool {
    critical_section::with(|cs| queue.borrow(cs).borrow_mut().push(byte, now))
}

/// Moves every byte stored by the interrupt into `rx`, oldest first.
///
/// Bytes that do not fit into `rx` stay in the shared queue for the next call. The
/// activity time of `rx` is taken over from the shared queue.
///
/// # Returns
/// The number of bytes moved.
pub fn shared_rx_drain<const N: usize, const M: usize>(
    queue: &'static SharedRxQueue<N>,
    rx: &mut RingBuffer<M>,
) -> usize {
    critical_section::with(|cs| {
        let mut shared = queue.borrow(cs).borrow_mut();
        let now = shared.last_activity();
        let mut moved = 0;
        while !shared.is_empty() && !rx.is_full() {
            let _ = rx.push(shared.pop_next(), now);
            moved += 1;
        }
        moved
    })
}

/// Declares a `static RX_QUEUE` of the given capacity for use with [`shared_rx_push`] and
/// [`shared_rx_drain`].
///
/// # Example
/// ```rust
/// gwboot::init_rx_queue!(256);
/// ```
#[macro_export]
macro_rules! init_rx_queue {
    ( $size:expr ) => {
        pub static RX_QUEUE: $crate::shared::SharedRxQueue<{ $size }> =
            $crate::shared::shared_rx_queue_init();
    };
}
