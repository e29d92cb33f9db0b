//! Fixed-capacity circular byte store.
//!
//! [`ByteRing`] does no locking of its own; [`crate::queue::SharedRing`] wraps it together with
//! the flow-control state under one mutex.

use std::collections::TryReserveError;

/// Bounded FIFO of bytes backed by a single allocation made at construction.
///
/// Writes are all-or-nothing: a push that does not fit is rejected without touching the
/// contents. Reads return whatever is buffered, up to the caller's limit.
#[derive(Debug)]
pub struct ByteRing {
    data: Box<[u8]>,
    read: usize,
    len: usize,
}

impl ByteRing {
    /// Allocate the backing store, reporting failure instead of aborting.
    pub fn try_new(capacity: usize) -> Result<Self, TryReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        data.resize(capacity, 0u8);
        Ok(Self {
            data: data.into_boxed_slice(),
            read: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that can be pushed before the ring is full.
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append all of `bytes`, or nothing if they do not fit.
    pub fn push_all(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.free() {
            return false;
        }
        if bytes.is_empty() {
            return true;
        }

        let cap = self.capacity();
        let write = (self.read + self.len) % cap;
        let first = bytes.len().min(cap - write);
        self.data[write..write + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        if rest > 0 {
            self.data[..rest].copy_from_slice(&bytes[first..]);
        }
        self.len += bytes.len();
        true
    }

    /// Move up to `out.len()` of the oldest bytes into `out`. Returns the count moved.
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let take = out.len().min(self.len);
        if take == 0 {
            return 0;
        }

        let cap = self.capacity();
        let first = take.min(cap - self.read);
        out[..first].copy_from_slice(&self.data[self.read..self.read + first]);
        let rest = take - first;
        if rest > 0 {
            out[first..take].copy_from_slice(&self.data[..rest]);
        }
        self.read = (self.read + take) % cap;
        self.len -= take;
        if self.len == 0 {
            self.read = 0;
        }
        take
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rejects_without_partial_write() {
        let mut ring = ByteRing::try_new(8).unwrap();
        assert!(ring.push_all(&[1, 2, 3, 4, 5, 6]));
        assert!(!ring.push_all(&[7, 8, 9]));
        assert_eq!(ring.len(), 6);
        assert_eq!(ring.free(), 2);

        let mut out = [0u8; 8];
        assert_eq!(ring.pop_into(&mut out), 6);
        assert_eq!(&out[..6], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn pop_respects_limit_and_order() {
        let mut ring = ByteRing::try_new(16).unwrap();
        ring.push_all(&[1, 2, 3, 4, 5]);

        let mut out = [0u8; 2];
        assert_eq!(ring.pop_into(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(ring.pop_into(&mut out), 2);
        assert_eq!(out, [3, 4]);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn wraps_around_the_end() {
        let mut ring = ByteRing::try_new(6).unwrap();
        ring.push_all(&[1, 2, 3, 4]);
        let mut out = [0u8; 3];
        ring.pop_into(&mut out);
        assert!(ring.push_all(&[5, 6, 7, 8, 9]));
        assert_eq!(ring.free(), 0);

        let mut all = [0u8; 6];
        assert_eq!(ring.pop_into(&mut all), 6);
        assert_eq!(all, [4, 5, 6, 7, 8, 9]);
        assert!(ring.is_empty());
    }

    #[test]
    fn empty_ring_pops_nothing() {
        let mut ring = ByteRing::try_new(4).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(ring.pop_into(&mut out), 0);
        assert!(ring.push_all(&[]));
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn impossible_capacity_is_an_error() {
        assert!(ByteRing::try_new(usize::MAX / 2 + 1).is_err());
        assert_eq!(ByteRing::try_new(0).unwrap().capacity(), 0);
    }
}
