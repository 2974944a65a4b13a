//! Fork registry: the ring of fork slots and who holds them.
//!
//! Only the arbiter touches this type, and only while holding its lock.

use serde::Serialize;

/// Identity of a philosopher seat at the table.
///
/// Philosopher `i` needs forks `i` and `(i + 1) % forks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PhilosopherId(usize);

impl PhilosopherId {
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl From<usize> for PhilosopherId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PhilosopherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fork {
    Free,
    Busy(PhilosopherId),
}

pub(crate) struct Registry {
    forks: Vec<Fork>,
}

impl Registry {
    /// All forks start free. The caller guarantees `forks >= 2`.
    pub(crate) fn new(forks: usize) -> Self {
        debug_assert!(forks >= 2);
        Self {
            forks: vec![Fork::Free; forks],
        }
    }

    /// The two fork indices philosopher `id` eats with.
    pub(crate) fn pair_of(&self, id: PhilosopherId) -> (usize, usize) {
        let left = id.get() % self.forks.len();
        (left, (left + 1) % self.forks.len())
    }

    /// Mark both forks busy if both are free. Either both change or neither does.
    pub(crate) fn try_grant(&mut self, id: PhilosopherId) -> bool {
        let (left, right) = self.pair_of(id);
        if self.forks[left] != Fork::Free || self.forks[right] != Fork::Free {
            return false;
        }
        self.forks[left] = Fork::Busy(id);
        self.forks[right] = Fork::Busy(id);
        true
    }

    /// Free both forks of `id`.
    ///
    /// Returns `false` (and changes nothing) if `id` does not hold its pair.
    pub(crate) fn free(&mut self, id: PhilosopherId) -> bool {
        let (left, right) = self.pair_of(id);
        let held = Fork::Busy(id);
        if self.forks[left] != held || self.forks[right] != held {
            return false;
        }
        self.forks[left] = Fork::Free;
        self.forks[right] = Fork::Free;
        true
    }

    pub(crate) fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            holders: self
                .forks
                .iter()
                .map(|fork| match fork {
                    Fork::Free => None,
                    Fork::Busy(id) => Some(*id),
                })
                .collect(),
        }
    }
}

/// Point-in-time view of the table, taken under the arbiter lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    /// Holder of each fork, indexed by fork number.
    pub holders: Vec<Option<PhilosopherId>>,
}

impl TableSnapshot {
    /// Philosophers currently holding their pair, in ascending order.
    pub fn diners(&self) -> Vec<PhilosopherId> {
        let mut diners: Vec<_> = self.holders.iter().flatten().copied().collect();
        diners.sort_unstable();
        diners.dedup();
        diners
    }

    pub fn free_forks(&self) -> usize {
        self.holders.iter().filter(|h| h.is_none()).count()
    }

    /// Every holder owns exactly its own two adjacent forks and nothing else.
    pub fn is_consistent(&self) -> bool {
        let n = self.holders.len();
        self.holders.iter().enumerate().all(|(fork, holder)| {
            let Some(id) = holder else {
                return true;
            };
            let left = id.get() % n;
            let right = (left + 1) % n;
            (fork == left || fork == right)
                && self.holders[left] == Some(*id)
                && self.holders[right] == Some(*id)
        })
    }
}
