use std::collections::BTreeSet;

use super::Patch;

/// Hands out unit ids that are unique within a patch.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    used: BTreeSet<i32>,
    max_id: i32,
}

impl IdAllocator {
    pub fn from_patch(patch: &Patch) -> Self {
        let mut ids = Self::default();
        for unit in patch.units() {
            if unit.id != 0 {
                ids.claim(unit.id);
            }
        }
        ids
    }

    /// Marks `id` as taken. Returns false if it already was.
    pub fn claim(&mut self, id: i32) -> bool {
        self.max_id = self.max_id.max(id);
        self.used.insert(id)
    }

    pub fn is_used(&self, id: i32) -> bool {
        self.used.contains(&id)
    }

    pub fn max_id(&self) -> i32 {
        self.max_id
    }

    pub fn next_id(&mut self) -> i32 {
        let id = self.max_id + 1;
        self.claim(id);
        id
    }
}
