/// Samples held by one delay ring; a full 16-bit index range.
pub const RING_LEN: usize = 1 << 16;

/// Fixed-size circular buffer addressed with wrapping 16-bit positions.
///
/// Positions come straight from the synth's global sample clock truncated to
/// 16 bits, so `position - delay` wraps around for free and no write cursor
/// has to be stored.
#[derive(Clone)]
pub struct DelayRing {
    buffer: Box<[f32]>,
}

impl DelayRing {
    pub fn new() -> Self {
        Self {
            buffer: vec![0.0; RING_LEN].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn read(&self, position: u16) -> f32 {
        self.buffer[usize::from(position)]
    }

    #[inline]
    pub fn write(&mut self, position: u16, sample: f32) {
        self.buffer[usize::from(position)] = sample;
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

impl Default for DelayRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DelayRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayRing").field("len", &self.buffer.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_wrap_at_sixteen_bits() {
        let mut ring = DelayRing::new();
        ring.write(65535, 0.5);
        let now: u16 = 3;
        assert_eq!(ring.read(now.wrapping_sub(4)), 0.5);
        ring.reset();
        assert_eq!(ring.read(65535), 0.0);
    }
}
