//! Fixed-capacity sample ring for the segment driver.
//!
//! Continuous audio is written without blocking; segments are copied out
//! between indices with wraparound handled explicitly. Capacity is sized
//! from the maximum segment duration so an in-progress segment is never
//! overwritten before it is extracted.

pub struct SampleRing {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be nonzero");
        Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    pub fn write(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.buffer.len();
        }
    }

    /// Index `lookback` samples behind the current write position.
    pub fn index_behind(&self, lookback: usize) -> usize {
        let capacity = self.buffer.len();
        if lookback >= capacity {
            // More lookback than we retain: the oldest retained sample.
            self.write_pos
        } else if lookback <= self.write_pos {
            self.write_pos - lookback
        } else {
            capacity - (lookback - self.write_pos)
        }
    }

    /// Number of samples from `start` to the current write position.
    pub fn span_from(&self, start: usize) -> usize {
        if self.write_pos >= start {
            self.write_pos - start
        } else {
            (self.buffer.len() - start) + self.write_pos
        }
    }

    /// Copy out the samples from `start` up to the current write position.
    pub fn extract_from(&self, start: usize) -> Vec<f32> {
        let len = self.span_from(start);
        if len == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(len);
        if self.write_pos >= start {
            out.extend_from_slice(&self.buffer[start..self.write_pos]);
        } else {
            out.extend_from_slice(&self.buffer[start..]);
            out.extend_from_slice(&self.buffer[..self.write_pos]);
        }
        out
    }

    pub fn clear(&mut self) {
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_extract() {
        let mut ring = SampleRing::new(100);
        ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.write_position(), 5);
        assert_eq!(ring.extract_from(0), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.extract_from(3), vec![4.0, 5.0]);
    }

    #[test]
    fn test_span() {
        let mut ring = SampleRing::new(100);
        ring.write(&[1.0; 50]);
        assert_eq!(ring.span_from(0), 50);
        assert_eq!(ring.span_from(25), 25);
        assert_eq!(ring.span_from(50), 0);
    }

    #[test]
    fn test_wraparound_extract() {
        let mut ring = SampleRing::new(10);
        ring.write(&[1.0; 8]);
        ring.write(&[2.0; 5]); // wraps; write_pos at 3
        assert_eq!(ring.write_position(), 3);

        let segment = ring.extract_from(5);
        assert_eq!(segment.len(), 8);
        // 3 old samples survive before the wrap, then the 5 new ones.
        assert_eq!(&segment[..3], &[1.0, 1.0, 1.0]);
        assert_eq!(&segment[3..], &[2.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_index_behind() {
        let mut ring = SampleRing::new(100);
        ring.write(&[1.0; 50]);
        assert_eq!(ring.index_behind(10), 40);
        assert_eq!(ring.index_behind(50), 0);
        assert_eq!(ring.index_behind(0), 50);
        // Beyond what the ring retains clamps to the oldest sample.
        assert_eq!(ring.index_behind(200), 50);
    }

    #[test]
    fn test_index_behind_wraps() {
        let mut ring = SampleRing::new(10);
        ring.write(&[1.0; 13]); // write_pos at 3
        assert_eq!(ring.index_behind(5), 8);
    }

    #[test]
    fn test_clear() {
        let mut ring = SampleRing::new(10);
        ring.write(&[1.0; 4]);
        ring.clear();
        assert_eq!(ring.write_position(), 0);
        assert!(ring.extract_from(0).is_empty());
    }
}
