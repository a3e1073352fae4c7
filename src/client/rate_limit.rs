//! Per-operation-class rate limiting
//!
//! Two independent token buckets, one for queries and one for mutations,
//! each enforcing a minimum delay between requests of that class. The pair
//! is owned by the client and shared by every operation it issues, so
//! concurrent reconciliations of different resources contend on the same
//! buckets and outbound pacing is serialized across the process.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// The two classes of GraphQL operations, paced independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Query,
    Mutation,
}

/// The query/mutation limiter pair.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    query: Bucket,
    mutation: Bucket,
}

#[derive(Debug)]
struct Bucket {
    delay: Duration,
    /// Earliest instant the next request may fire. Lazily set on first
    /// acquisition; the mutex guards concurrent first use.
    next_ready: Mutex<Option<Instant>>,
}

impl Bucket {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_ready: Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        if self.delay.is_zero() {
            return;
        }

        // Reserve a slot under the lock, then sleep outside it so waiters
        // queue behind each other instead of stampeding.
        let wait = {
            let mut next_ready = self.next_ready.lock().await;
            let now = Instant::now();
            let ready = next_ready.unwrap_or(now).max(now);
            *next_ready = Some(ready + self.delay);
            ready - now
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

impl RateLimiterRegistry {
    pub fn new(query_delay: Duration, mutation_delay: Duration) -> Self {
        Self {
            query: Bucket::new(query_delay),
            mutation: Bucket::new(mutation_delay),
        }
    }

    /// Block until the given operation class is allowed to send.
    pub async fn acquire(&self, class: OpClass) {
        match class {
            OpClass::Query => self.query.acquire().await,
            OpClass::Mutation => self.mutation.acquire().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn k_acquires_take_k_minus_one_delays() {
        let registry = RateLimiterRegistry::new(Duration::from_millis(100), Duration::ZERO);

        let start = Instant::now();
        for _ in 0..4 {
            registry.acquire(OpClass::Query).await;
        }
        assert!(Instant::now() - start >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_disables_limiting() {
        let registry = RateLimiterRegistry::new(Duration::ZERO, Duration::ZERO);

        let start = Instant::now();
        for _ in 0..10 {
            registry.acquire(OpClass::Query).await;
            registry.acquire(OpClass::Mutation).await;
        }
        assert_eq!(Instant::now() - start, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn classes_are_paced_independently() {
        let registry =
            RateLimiterRegistry::new(Duration::from_millis(100), Duration::from_millis(400));

        // The first acquisition of each class is free.
        let start = Instant::now();
        registry.acquire(OpClass::Query).await;
        registry.acquire(OpClass::Mutation).await;
        assert_eq!(Instant::now() - start, Duration::ZERO);

        // The second mutation waits the mutation delay, unaffected by the
        // query bucket's shorter delay.
        registry.acquire(OpClass::Mutation).await;
        assert!(Instant::now() - start >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_serialize() {
        use std::sync::Arc;

        let registry = Arc::new(RateLimiterRegistry::new(
            Duration::from_millis(50),
            Duration::ZERO,
        ));

        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.acquire(OpClass::Query).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(Instant::now() - start >= Duration::from_millis(100));
    }
}
