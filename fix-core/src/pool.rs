//! Message & Buffer Pool (C1).
//!
//! A process-wide, long-lived resource created at engine initialization
//! and torn down at disposal — not a module-level singleton. Composes
//! three [`Pool`](crate::perf::pools::Pool) instances: message envelopes,
//! max-message-size byte buffers, and large (batch I/O) buffers.

use crate::message::Envelope;
use crate::perf::pools::{Pool, Poolable, PoolStats};

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;
pub const DEFAULT_ENVELOPE_CAPACITY: usize = 10_000;
const LARGE_BUFFER_MULTIPLIER: usize = 10;

/// A pooled byte buffer. Wraps `Vec<u8>` so it can carry the `in_use`
/// flag the generic [`Pool`] needs for double-release detection.
#[derive(Debug, Clone)]
pub struct PooledBuffer {
    data: Vec<u8>,
    capacity: usize,
    in_use: bool,
}

impl PooledBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            in_use: false,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for PooledBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Poolable for PooledBuffer {
    fn in_use(&self) -> bool {
        self.in_use
    }
    fn set_in_use(&mut self, value: bool) {
        self.in_use = value;
    }
    fn reset(&mut self) {
        // Buffers are zeroed only here, on return to the shared buffer
        // pool — not when an envelope alone is released.
        self.data.clear();
        self.data.resize(self.capacity, 0);
        self.data.clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MessagePoolStats {
    pub envelopes: PoolStats,
    pub buffers: PoolStats,
    pub large_buffers: PoolStats,
}

/// Facade implementing the C1 contract: `acquire`, `acquire_with_buffer`,
/// `release`, `acquire_large_buffer`, `release_large_buffer`, `stats`.
pub struct MessagePool {
    envelopes: Pool<Envelope>,
    buffers: Pool<PooledBuffer>,
    large_buffers: Pool<PooledBuffer>,
    max_message_size: usize,
}

impl MessagePool {
    pub fn new(envelope_capacity: usize, max_message_size: usize) -> Self {
        Self {
            envelopes: Pool::new(envelope_capacity),
            buffers: Pool::new(envelope_capacity),
            large_buffers: Pool::new(envelope_capacity / 10 + 1),
            max_message_size,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Acquire a bare envelope with no backing buffer (for programmatic
    /// construction of outbound messages).
    pub fn acquire(&self) -> Envelope {
        self.envelopes.acquire()
    }

    /// Acquire an envelope plus a backing buffer of at least `size` bytes.
    pub fn acquire_with_buffer(&self, size: usize) -> Envelope {
        let mut env = self.envelopes.acquire();
        let buf = if size > self.max_message_size {
            self.acquire_large_buffer(size)
        } else {
            self.buffers.acquire()
        };
        env.buffer = Some(buf.data);
        env
    }

    /// Release an envelope: its backing buffer (if any) is detached,
    /// zeroed, and returned to the shared buffer pool, and the envelope
    /// itself goes back to the envelope pool with all fields cleared.
    pub fn release(&self, mut env: Envelope) {
        if let Some(data) = env.take_buffer() {
            let capacity = data.capacity();
            let target = if capacity > self.max_message_size {
                &self.large_buffers
            } else {
                &self.buffers
            };
            let mut buf = PooledBuffer::with_capacity(capacity);
            buf.data = data;
            buf.set_in_use(true);
            target.release(buf);
        }
        self.envelopes.release(env);
    }

    pub fn acquire_large_buffer(&self, min_size: usize) -> PooledBuffer {
        let mut buf = self.large_buffers.acquire();
        if buf.data.capacity() < min_size {
            buf.data.reserve(min_size - buf.data.capacity());
            buf.capacity = buf.data.capacity().max(min_size);
        }
        buf
    }

    pub fn release_large_buffer(&self, buf: PooledBuffer) {
        self.large_buffers.release(buf);
    }

    pub fn stats(&self) -> MessagePoolStats {
        MessagePoolStats {
            envelopes: self.envelopes.stats(),
            buffers: self.buffers.stats(),
            large_buffers: self.large_buffers.stats(),
        }
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new(DEFAULT_ENVELOPE_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_with_buffer_attaches_backing_storage() {
        let pool = MessagePool::new(4, 128);
        let env = pool.acquire_with_buffer(64);
        assert!(env.buffer.is_some());
        let stats = pool.stats();
        assert_eq!(stats.envelopes.in_use, 1);
        assert_eq!(stats.buffers.in_use, 1);
    }

    #[test]
    fn release_returns_buffer_and_envelope_separately() {
        let pool = MessagePool::new(4, 128);
        let env = pool.acquire_with_buffer(64);
        pool.release(env);
        let stats = pool.stats();
        assert_eq!(stats.envelopes.in_use, 0);
        assert_eq!(stats.buffers.in_use, 0);
        assert_eq!(stats.envelopes.rent_count, stats.envelopes.return_count);
    }

    #[test]
    fn oversized_request_uses_large_buffer_pool() {
        let pool = MessagePool::new(4, 128);
        let env = pool.acquire_with_buffer(4096);
        assert!(env.buffer.as_ref().unwrap().capacity() >= 4096);
        let stats = pool.stats();
        assert_eq!(stats.large_buffers.in_use, 1);
        assert_eq!(stats.buffers.in_use, 0);
    }

    #[test]
    fn pool_exhaustion_leaks_rather_than_fails() {
        let pool = MessagePool::new(1, 128);
        let _a = pool.acquire();
        let _b = pool.acquire(); // beyond cap: unpooled + leak counter
        assert_eq!(pool.stats().envelopes.leaked, 1);
    }
}
