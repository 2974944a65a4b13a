//! The arbiter: a single lock-guarded decision point for fork pairs.
//!
//! Waiters follow monitor semantics on a [`Notify`]: register interest, test
//! the grant predicate under the lock, and only then suspend. Releases free
//! the pair and broadcast while still holding the lock, so a waiter that
//! observed the pair busy is always registered before the release that frees
//! it, and no wakeup is lost. Every wake re-tests the predicate; there is no
//! ordering among waiters.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use super::grant::ForkGrant;
use super::registry::{PhilosopherId, Registry, TableSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArbiterError {
    #[error("a table needs at least 2 forks, got {0}")]
    TooFewForks(usize),
    #[error("philosopher {id} has no seat at a table of {forks}")]
    OutOfRange { id: PhilosopherId, forks: usize },
    #[error("no forks granted within {0:?}")]
    Timeout(Duration),
}

pub(super) struct Shared {
    registry: Mutex<Registry>,
    released: Notify,
    forks: usize,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        // The registry is only mutated through all-or-nothing updates, so a
        // panic elsewhere cannot leave it half-written.
        self.registry.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Fork registry lock poisoned - recovering");
            poisoned.into_inner()
        })
    }

    /// Free the pair of `id` and wake every waiter before unlocking.
    pub(super) fn release(&self, id: PhilosopherId) {
        let mut registry = self.registry();
        let (left, right) = registry.pair_of(id);
        if !registry.free(id) {
            debug_assert!(false, "philosopher {id} released forks it does not hold");
            tracing::error!(philosopher = %id, left, right, "Bug: release of forks not held");
            return;
        }
        tracing::info!(philosopher = %id, left, right, "Forks released");
        self.released.notify_waiters();
        drop(registry);
    }
}

/// Centralized fork arbiter. Cheap to clone; all clones share one table.
#[derive(Clone)]
pub struct Arbiter {
    shared: Arc<Shared>,
}

impl Arbiter {
    pub fn new(forks: usize) -> Result<Self, ArbiterError> {
        if forks < 2 {
            return Err(ArbiterError::TooFewForks(forks));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::new(forks)),
                released: Notify::new(),
                forks,
            }),
        })
    }

    pub fn forks(&self) -> usize {
        self.shared.forks
    }

    /// The two fork indices `id` eats with, or an error if it has no seat.
    pub fn pair_of(&self, id: PhilosopherId) -> Result<(usize, usize), ArbiterError> {
        self.check_seat(id)?;
        Ok(self.shared.registry().pair_of(id))
    }

    fn check_seat(&self, id: PhilosopherId) -> Result<(), ArbiterError> {
        if id.get() >= self.shared.forks {
            return Err(ArbiterError::OutOfRange {
                id,
                forks: self.shared.forks,
            });
        }
        Ok(())
    }

    /// One grant attempt under the lock.
    fn attempt(&self, id: PhilosopherId) -> Option<ForkGrant> {
        let mut registry = self.shared.registry();
        if !registry.try_grant(id) {
            return None;
        }
        let (left, right) = registry.pair_of(id);
        tracing::info!(philosopher = %id, left, right, "Forks granted");
        Some(ForkGrant::new(Arc::clone(&self.shared), id))
    }

    /// Take both forks of `id` if they are free right now.
    pub fn try_acquire(&self, id: PhilosopherId) -> Result<Option<ForkGrant>, ArbiterError> {
        self.check_seat(id)?;
        Ok(self.attempt(id))
    }

    /// Wait until both forks of `id` are free and take them together.
    ///
    /// Dropping the returned future abandons the wait without holding anything.
    pub async fn acquire(&self, id: PhilosopherId) -> Result<ForkGrant, ArbiterError> {
        self.check_seat(id)?;
        let mut announced = false;
        loop {
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            // Register before testing, so a release between the test and the
            // await still wakes us.
            notified.as_mut().enable();

            if let Some(grant) = self.attempt(id) {
                return Ok(grant);
            }
            if !announced {
                tracing::debug!(philosopher = %id, "Forks busy, waiting for a release");
                announced = true;
            }

            notified.await;
        }
    }

    /// [`acquire`](Self::acquire) bounded by `limit`.
    pub async fn acquire_timeout(
        &self,
        id: PhilosopherId,
        limit: Duration,
    ) -> Result<ForkGrant, ArbiterError> {
        match tokio::time::timeout(limit, self.acquire(id)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(philosopher = %id, timeout = ?limit, "Gave up waiting for forks");
                Err(ArbiterError::Timeout(limit))
            }
        }
    }

    /// Acquire with an optional bound; `None` waits indefinitely.
    pub async fn acquire_within(
        &self,
        id: PhilosopherId,
        limit: Option<Duration>,
    ) -> Result<ForkGrant, ArbiterError> {
        match limit {
            Some(limit) => self.acquire_timeout(id, limit).await,
            None => self.acquire(id).await,
        }
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.shared.registry().snapshot()
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("forks", &self.shared.forks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    const BLOCKED: Duration = Duration::from_millis(50);
    const PATIENCE: Duration = Duration::from_secs(5);

    fn id(n: usize) -> PhilosopherId {
        PhilosopherId::new(n)
    }

    #[test]
    fn rejects_tiny_tables() {
        assert_eq!(Arbiter::new(1).unwrap_err(), ArbiterError::TooFewForks(1));
        assert_eq!(Arbiter::new(0).unwrap_err(), ArbiterError::TooFewForks(0));
        assert!(Arbiter::new(2).is_ok());
    }

    #[tokio::test]
    async fn rejects_unseated_philosopher() {
        let arbiter = Arbiter::new(5).unwrap();
        let err = arbiter.acquire(id(5)).await.unwrap_err();
        assert_eq!(err, ArbiterError::OutOfRange { id: id(5), forks: 5 });
        assert!(arbiter.try_acquire(id(7)).is_err());
    }

    #[tokio::test]
    async fn sequential_handoff() {
        let arbiter = Arbiter::new(5).unwrap();

        let two = arbiter.acquire(id(2)).await.unwrap();

        let waiter = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move { arbiter.acquire(id(3)).await })
        };
        tokio::time::sleep(BLOCKED).await;
        assert!(!waiter.is_finished(), "philosopher 3 must wait for fork 3");

        two.release();

        let three = tokio::time::timeout(PATIENCE, waiter)
            .await
            .expect("philosopher 3 was never woken")
            .unwrap()
            .unwrap();
        assert_eq!(three.philosopher(), id(3));
        assert_eq!(arbiter.snapshot().diners(), vec![id(3)]);
    }

    #[tokio::test]
    async fn simultaneous_contention_grants_exactly_one() {
        let arbiter = Arbiter::new(5).unwrap();

        let zero = tokio::spawn({
            let arbiter = arbiter.clone();
            async move { arbiter.acquire(id(0)).await }
        });
        let one = tokio::spawn({
            let arbiter = arbiter.clone();
            async move { arbiter.acquire(id(1)).await }
        });
        tokio::time::sleep(BLOCKED).await;

        let (first, second) = match (zero.is_finished(), one.is_finished()) {
            (true, false) => (zero, one),
            (false, true) => (one, zero),
            other => panic!("expected exactly one grant, got {other:?}"),
        };
        assert_eq!(arbiter.snapshot().diners().len(), 1);

        let grant = first.await.unwrap().unwrap();
        grant.release();

        let other = tokio::time::timeout(PATIENCE, second)
            .await
            .expect("loser was never woken")
            .unwrap()
            .unwrap();
        assert_eq!(arbiter.snapshot().diners(), vec![other.philosopher()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn at_most_two_of_five_eat_at_once() {
        let arbiter = Arbiter::new(5).unwrap();
        let eating = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for seat in 0..5 {
            let arbiter = arbiter.clone();
            let eating = Arc::clone(&eating);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let grant = arbiter.acquire(id(seat)).await.unwrap();
                    let now = eating.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);

                    let snapshot = arbiter.snapshot();
                    assert!(snapshot.is_consistent(), "torn table: {snapshot:?}");
                    assert!(snapshot.diners().len() <= 2);

                    tokio::task::yield_now().await;
                    eating.fetch_sub(1, Ordering::SeqCst);
                    drop(grant);
                }
            }));
        }

        for task in tasks {
            tokio::time::timeout(PATIENCE, task)
                .await
                .expect("philosophers stalled")
                .unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(arbiter.snapshot().free_forks(), 5);
    }

    #[tokio::test]
    async fn dropped_grant_releases_forks() {
        let arbiter = Arbiter::new(5).unwrap();
        {
            let _grant = arbiter.acquire(id(4)).await.unwrap();
            assert_eq!(arbiter.snapshot().holders[0], Some(id(4)));
        }
        assert_eq!(arbiter.snapshot().free_forks(), 5);
        assert!(arbiter.try_acquire(id(0)).unwrap().is_some());
    }

    #[tokio::test]
    async fn timeout_leaves_nothing_held() {
        let arbiter = Arbiter::new(5).unwrap();
        let _one = arbiter.acquire(id(1)).await.unwrap();

        let err = arbiter.acquire_timeout(id(0), BLOCKED).await.unwrap_err();
        assert_eq!(err, ArbiterError::Timeout(BLOCKED));
        assert_eq!(arbiter.snapshot().diners(), vec![id(1)]);
    }

    #[tokio::test]
    async fn abandoned_wait_does_not_block_a_live_waiter() {
        // 1 holds {1,2}; 0 waits on fork 1 then gives up, 2 keeps waiting on fork 2.
        let arbiter = Arbiter::new(5).unwrap();
        let one = arbiter.acquire(id(1)).await.unwrap();

        let abandoned = tokio::spawn({
            let arbiter = arbiter.clone();
            async move { arbiter.acquire(id(0)).await }
        });
        let live = tokio::spawn({
            let arbiter = arbiter.clone();
            async move { arbiter.acquire(id(2)).await }
        });
        tokio::time::sleep(BLOCKED).await;
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());
        assert!(!live.is_finished());

        one.release();
        let two = tokio::time::timeout(PATIENCE, live)
            .await
            .expect("live waiter was never woken")
            .unwrap()
            .unwrap();
        assert_eq!(two.philosopher(), id(2));
        assert_eq!(arbiter.snapshot().diners(), vec![id(2)]);
        assert_eq!(arbiter.snapshot().holders[0], None);
    }

    #[tokio::test]
    async fn one_release_wakes_every_satisfiable_waiter() {
        // 0 holds {0,1}; 4 waits on fork 0 and 1 waits on fork 1. They do not
        // conflict with each other, so a single release lets both eat.
        let arbiter = Arbiter::new(5).unwrap();
        let zero = arbiter.acquire(id(0)).await.unwrap();

        let four = tokio::spawn({
            let arbiter = arbiter.clone();
            async move { arbiter.acquire(id(4)).await }
        });
        let one = tokio::spawn({
            let arbiter = arbiter.clone();
            async move { arbiter.acquire(id(1)).await }
        });
        tokio::time::sleep(BLOCKED).await;
        assert!(!four.is_finished());
        assert!(!one.is_finished());

        zero.release();
        let four = tokio::time::timeout(PATIENCE, four).await.unwrap().unwrap().unwrap();
        let one = tokio::time::timeout(PATIENCE, one).await.unwrap().unwrap().unwrap();
        assert_eq!(
            arbiter.snapshot().diners(),
            vec![one.philosopher(), four.philosopher()]
        );
    }
}
