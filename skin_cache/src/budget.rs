//! Memory budget and admission control.
//!
//! Every admitted [`BufferSet`](crate::BufferSet) holds a [`MemoryCharge`]
//! for its footprint. Dropping the charge returns the bytes, so the used
//! counter always equals the sum of live footprints.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of asking the budget for room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request fits (or needed no new memory).
    Admitted,
    /// The request does not fit. The section falls back to the non-cached path.
    Rejected {
        /// Footprint that was refused.
        required_bytes: u64,
    },
}

impl Admission {
    /// Returns true for [`Admission::Admitted`].
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug, Default)]
struct Counters {
    used: AtomicU64,
    charges: AtomicU64,
}

/// Bytes reserved for one buffer set. Returned to the budget on drop.
#[derive(Debug)]
pub struct MemoryCharge {
    bytes: u64,
    counters: Arc<Counters>,
}

impl MemoryCharge {
    /// Reserved bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for MemoryCharge {
    fn drop(&mut self) {
        let previous = self.counters.used.fetch_sub(self.bytes, Ordering::AcqRel);
        debug_assert!(previous >= self.bytes, "skin cache memory budget underflow");
        self.counters.charges.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Per-scene memory budget.
///
/// Admission is refused when `used + size >= limit` and the limit is
/// enforced. Every refusal adds the refused size to the overflow counter,
/// which reports how much more memory would admit everything refused since
/// the last read.
#[derive(Debug)]
pub struct MemoryBudget {
    counters: Arc<Counters>,
    extra_required: u64,
    limit: u64,
    enforced: bool,
}

impl MemoryBudget {
    /// Create a budget of `limit` bytes.
    pub fn new(limit: u64, enforced: bool) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            extra_required: 0,
            limit,
            enforced,
        }
    }

    /// Reserve `bytes`, or record the overflow and refuse.
    pub fn try_reserve(&mut self, bytes: u64) -> Result<MemoryCharge, Admission> {
        let used = self.used_bytes();
        if self.enforced && used + bytes >= self.limit {
            self.extra_required += bytes;
            return Err(Admission::Rejected {
                required_bytes: bytes,
            });
        }
        self.counters.used.fetch_add(bytes, Ordering::AcqRel);
        self.counters.charges.fetch_add(1, Ordering::AcqRel);
        Ok(MemoryCharge {
            bytes,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Bytes held by live charges.
    pub fn used_bytes(&self) -> u64 {
        self.counters.used.load(Ordering::Acquire)
    }

    /// Number of live charges.
    pub fn charge_count(&self) -> u64 {
        self.counters.charges.load(Ordering::Acquire)
    }

    /// Budget limit in bytes.
    pub fn limit_bytes(&self) -> u64 {
        self.limit
    }

    /// Bytes left before the limit. Zero when over.
    pub fn available_bytes(&self) -> u64 {
        self.limit.saturating_sub(self.used_bytes())
    }

    /// Refused bytes accumulated since the last [`take_extra_required`](Self::take_extra_required).
    pub fn extra_required_bytes(&self) -> u64 {
        self.extra_required
    }

    /// Returns the overflow counter and resets it.
    pub fn take_extra_required(&mut self) -> u64 {
        std::mem::take(&mut self.extra_required)
    }

    /// Changes the limit. Live charges are kept.
    pub fn set_limit(&mut self, limit: u64, enforced: bool) {
        self.limit = limit;
        self.enforced = enforced;
    }

    /// Clears the overflow counter. Called on flush, after entries are torn down.
    pub fn reset(&mut self) {
        self.extra_required = 0;
    }
}

static_assertions::assert_impl_all!(MemoryCharge: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_drop() {
        let mut budget = MemoryBudget::new(1000, true);
        let charge = budget.try_reserve(400).unwrap();
        assert_eq!(budget.used_bytes(), 400);
        assert_eq!(budget.charge_count(), 1);
        drop(charge);
        assert_eq!(budget.used_bytes(), 0);
        assert_eq!(budget.charge_count(), 0);
    }

    #[test]
    fn test_rejection_at_limit() {
        let mut budget = MemoryBudget::new(1000, true);
        let _a = budget.try_reserve(600).unwrap();
        // used + size == limit is refused.
        let err = budget.try_reserve(400).unwrap_err();
        assert_eq!(err, Admission::Rejected { required_bytes: 400 });
        assert_eq!(budget.extra_required_bytes(), 400);
        assert_eq!(budget.used_bytes(), 600);

        assert!(budget.try_reserve(399).is_ok());
        assert_eq!(budget.take_extra_required(), 400);
        assert_eq!(budget.extra_required_bytes(), 0);
    }

    #[test]
    fn test_unenforced_budget_admits_everything() {
        let mut budget = MemoryBudget::new(10, false);
        let _a = budget.try_reserve(1000).unwrap();
        assert_eq!(budget.used_bytes(), 1000);
        assert_eq!(budget.available_bytes(), 0);
    }
}
