//! # Tradew Inventory Testing
//!
//! Testing utilities for the inventory write side.
//!
//! This crate provides:
//! - [`InMemoryItemStore`]: the storage contract over a `HashMap`, with call
//!   counters and one-shot failure injection
//! - [`RecordingPublisher`]: captures published envelopes, can be told to fail
//! - [`FixedClock`] and [`SequentialIdGenerator`]: deterministic environment
//! - [`properties`]: proptest strategies for domain values
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tradew_inventory_testing::{InMemoryItemStore, SequentialIdGenerator, test_clock};
//! use tradew_inventory_core::environment::IdGenerator;
//!
//! let store = Arc::new(InMemoryItemStore::new());
//! let ids = SequentialIdGenerator::new("item");
//! assert_eq!(ids.next_id(), "item-1");
//! assert!(store.is_empty());
//! ```

use chrono::{DateTime, Utc};
use tradew_inventory_core::environment::{Clock, IdGenerator};

pub mod item_store;
pub mod publisher;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tradew_inventory_testing::mocks::FixedClock;
    /// use tradew_inventory_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `"{prefix}-1"`, `"{prefix}-2"`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start counting at 1 under `prefix`.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }
}

/// Test helpers.
pub mod helpers {
    /// Route `tracing` output to the test harness (honours `RUST_LOG`).
    ///
    /// Safe to call from every test; only the first call installs a subscriber.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing strategies for domain values.
pub mod properties {
    use proptest::prelude::*;

    /// Names that pass validation: 3 to 24 visible characters, optional padding.
    pub fn valid_name() -> impl Strategy<Value = String> {
        ("[A-Za-z][A-Za-z0-9 ]{1,22}[A-Za-z0-9]", " {0,2}")
            .prop_map(|(name, padding)| format!("{padding}{name}{padding}"))
    }

    /// Strictly positive request quantities.
    pub fn positive_quantity() -> impl Strategy<Value = i64> {
        1i64..=1_000
    }

    /// Zero or negative request quantities.
    pub fn non_positive_quantity() -> impl Strategy<Value = i64> {
        -1_000i64..=0
    }

    /// A stack total and a lock that fits in it.
    pub fn total_and_fitting_lock() -> impl Strategy<Value = (i64, i64)> {
        (1i64..=1_000).prop_flat_map(|total| (Just(total), 1..=total))
    }
}

// Re-export commonly used items
pub use item_store::{InMemoryItemStore, StoreOperation};
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use publisher::RecordingPublisher;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tradew_inventory_core::{ItemName, ItemQuantity};

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIdGenerator::new("minted");
        assert_eq!(ids.next_id(), "minted-1");
        assert_eq!(ids.next_id(), "minted-2");
    }

    proptest! {
        #[test]
        fn generated_names_are_valid(name in properties::valid_name()) {
            prop_assert!(ItemName::new(&name).is_ok());
        }

        #[test]
        fn non_positive_quantities_are_rejected(q in properties::non_positive_quantity()) {
            prop_assert!(ItemQuantity::new(q).is_err());
        }
    }
}
