use serde::Serialize;

/// Global item cap for one scan and the fixed share each country may take.
///
/// The share is computed once from the country count and never re-derived,
/// so countries that under-use it leave capacity that only the remaining
/// global headroom can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanBudget {
    global_max: usize,
    per_country_share: usize,
    consumed: usize,
}

impl ScanBudget {
    pub fn new(global_max: usize, country_count: usize) -> Self {
        Self {
            global_max,
            per_country_share: (global_max / country_count.max(1)).max(1),
            consumed: 0,
        }
    }

    pub fn global_max(&self) -> usize {
        self.global_max
    }

    pub fn per_country_share(&self) -> usize {
        self.per_country_share
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.global_max.saturating_sub(self.consumed)
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.global_max
    }

    /// How many ids the next country may process.
    pub fn allowance(&self) -> usize {
        self.per_country_share.min(self.remaining())
    }

    /// Count one processed item. Refuses once the cap is reached.
    pub fn consume(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.consumed += 1;
        true
    }
}
