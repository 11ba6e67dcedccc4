//! Memory Entry Module
//!
//! Defines the structure for entries held in the in-memory tier.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

// == Memory Entry ==
/// A single in-memory cache entry: insertion time plus a type-erased value.
///
/// The value is stored without static type information and recovered with a
/// checked downcast at read time. A mismatch between the stored type and the
/// requested type is surfaced by [`MemoryEntry::downcast`] returning `None`,
/// never by a panic.
#[derive(Clone)]
pub struct MemoryEntry {
    /// When the value entered the cache
    inserted_at: DateTime<Utc>,
    /// The stored value, type-erased
    value: Arc<dyn Any + Send + Sync>,
}

impl MemoryEntry {
    // == Constructor ==
    /// Creates a new entry holding `value`, inserted at `inserted_at`.
    pub fn new<T>(inserted_at: DateTime<Utc>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            inserted_at,
            value: Arc::new(value),
        }
    }

    // == Insertion Time ==
    /// Returns the insertion timestamp.
    pub fn inserted_at(&self) -> DateTime<Utc> {
        self.inserted_at
    }

    // == Age ==
    /// Returns the elapsed time between insertion and `now`.
    ///
    /// A `now` earlier than the insertion time (clock adjustment) clamps
    /// to zero rather than going negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.inserted_at).to_std().unwrap_or(Duration::ZERO)
    }

    // == Downcast ==
    /// Returns a clone of the stored value as `T`, or `None` if the entry
    /// holds a value of a different type.
    pub fn downcast<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.value.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for MemoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEntry")
            .field("inserted_at", &self.inserted_at)
            .field("value", &"<opaque>")
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_age() {
        let inserted = Utc::now();
        let entry = MemoryEntry::new(inserted, 42u32);

        let later = inserted + chrono::Duration::milliseconds(250);
        assert_eq!(entry.age(later), Duration::from_millis(250));
    }

    #[test]
    fn test_entry_age_clamps_to_zero() {
        let inserted = Utc::now();
        let entry = MemoryEntry::new(inserted, 42u32);

        let earlier = inserted - chrono::Duration::seconds(5);
        assert_eq!(entry.age(earlier), Duration::ZERO);
    }

    #[test]
    fn test_entry_downcast_matching_type() {
        let entry = MemoryEntry::new(Utc::now(), "hello".to_string());

        let value: Option<String> = entry.downcast();
        assert_eq!(value, Some("hello".to_string()));
    }

    #[test]
    fn test_entry_downcast_wrong_type() {
        let entry = MemoryEntry::new(Utc::now(), 42u32);

        let value: Option<String> = entry.downcast();
        assert!(value.is_none());
    }

    #[test]
    fn test_entry_clone_shares_value() {
        let entry = MemoryEntry::new(Utc::now(), vec![1, 2, 3]);
        let cloned = entry.clone();

        assert_eq!(cloned.downcast::<Vec<i32>>(), Some(vec![1, 2, 3]));
        assert_eq!(cloned.inserted_at(), entry.inserted_at());
    }
}
