use crate::MAX_STACK;

/// The signal stack of the machine. Offsets count down from the top, so
/// `peek(0)` is the most recent signal.
///
/// Reads below the bottom see silence and writes there are dropped; the
/// interpreter checks every unit's net effect before it runs, which is where
/// underflow and overflow are reported.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    cells: [f32; MAX_STACK],
    depth: usize,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    #[inline]
    pub fn peek(&self, offset: usize) -> f32 {
        self.depth
            .checked_sub(offset + 1)
            .and_then(|i| self.cells.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    #[inline]
    pub fn set(&mut self, offset: usize, value: f32) {
        if let Some(cell) = self
            .depth
            .checked_sub(offset + 1)
            .and_then(|i| self.cells.get_mut(i))
        {
            *cell = value;
        }
    }

    #[inline]
    pub fn update(&mut self, offset: usize, f: impl FnOnce(f32) -> f32) {
        let value = f(self.peek(offset));
        self.set(offset, value);
    }

    #[inline]
    pub fn swap(&mut self, a: usize, b: usize) {
        let (x, y) = (self.peek(a), self.peek(b));
        self.set(a, y);
        self.set(b, x);
    }

    /// Pushes `value`; a full stack keeps its cells and only counts.
    #[inline]
    pub fn push(&mut self, value: f32) {
        if let Some(cell) = self.cells.get_mut(self.depth) {
            *cell = value;
        }
        self.depth += 1;
    }

    #[inline]
    pub fn discard(&mut self, count: usize) {
        self.depth = self.depth.saturating_sub(count);
    }

    pub fn clear(&mut self) {
        self.depth = 0;
    }
}
