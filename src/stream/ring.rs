//! Fixed-capacity PCM byte ring.
//!
//! Cursors stay in `[0, capacity)` and
//! `available = (write - read + capacity) % capacity`. One frame is always
//! left empty so a full ring never looks empty. Transfers move whole
//! 4-byte stereo frames only.

use crate::dsp::pcm::FRAME_BYTES;

#[derive(Debug, Clone)]
pub struct PcmRing {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl PcmRing {
    /// Capacity is rounded down to whole frames, minimum two frames.
    pub fn new(capacity_bytes: usize) -> Self {
        let frames = (capacity_bytes / FRAME_BYTES).max(2);
        PcmRing {
            buf: vec![0; frames * FRAME_BYTES],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// A ring that starts with `slack_bytes` of queued silence.
    pub fn with_slack(capacity_bytes: usize, slack_bytes: usize) -> Self {
        let mut ring = Self::new(capacity_bytes);
        let slack = slack_bytes.min(ring.usable()) / FRAME_BYTES * FRAME_BYTES;
        ring.write_pos = slack;
        ring
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Most bytes the ring can hold at once.
    pub fn usable(&self) -> usize {
        self.capacity() - FRAME_BYTES
    }

    pub fn available(&self) -> usize {
        let cap = self.capacity();
        (self.write_pos + cap - self.read_pos) % cap
    }

    pub fn free(&self) -> usize {
        self.usable() - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Append as many whole frames of `data` as fit. Unread data is never
    /// overwritten; returns the number of bytes taken.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(self.free()) / FRAME_BYTES * FRAME_BYTES;
        let cap = self.capacity();
        let first = len.min(cap - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        self.buf[..len - first].copy_from_slice(&data[first..len]);
        self.write_pos = (self.write_pos + len) % cap;
        len
    }

    /// Dequeue `len` bytes (rounded down to whole frames). Whatever the ring
    /// cannot supply is zero-filled; the second value is how many bytes that was.
    pub fn read_chunk(&mut self, len: usize) -> (Vec<u8>, usize) {
        let len = len / FRAME_BYTES * FRAME_BYTES;
        let take = len.min(self.available());
        let cap = self.capacity();
        let mut out = Vec::with_capacity(len);

        let first = take.min(cap - self.read_pos);
        out.extend_from_slice(&self.buf[self.read_pos..self.read_pos + first]);
        out.extend_from_slice(&self.buf[..take - first]);
        self.read_pos = (self.read_pos + take) % cap;

        out.resize(len, 0);
        (out, len - take)
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        self.read_pos = self.write_pos;
    }
}
