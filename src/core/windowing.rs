//! Time-bounded ordered buffers.
//!
//! Every stage keeps its recent samples in a [`WindowStore`] and evicts
//! entries once they fall out of its trailing window. Items are expected in
//! non-decreasing timestamp order; an out-of-order item is accepted but its
//! position is not corrected.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Anything that can be placed on a time axis.
pub trait Timestamped {
    /// The instant used for eviction and lookback filtering.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// An ordered buffer of timestamped items with a trailing retention window.
#[derive(Debug, Clone)]
pub struct WindowStore<T> {
    items: VecDeque<T>,
    window: Duration,
}

impl<T: Timestamped> WindowStore<T> {
    /// Create an empty store retaining items for `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            items: VecDeque::new(),
            window,
        }
    }

    /// Retention window of this store.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append an item at the back.
    pub fn append(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove every item stamped at or before `cutoff`. Returns how many were removed.
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.items.len();

        // Fast path for the ordered case
        while self
            .items
            .front()
            .is_some_and(|item| item.timestamp() <= cutoff)
        {
            self.items.pop_front();
        }

        // Out-of-order stragglers behind a newer front
        if self.items.iter().any(|item| item.timestamp() <= cutoff) {
            self.items.retain(|item| item.timestamp() > cutoff);
        }

        before - self.items.len()
    }

    /// Oldest timestamp still inside the window at `now`.
    ///
    /// `None` when the window reaches past the earliest representable time,
    /// in which case nothing has expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.window)
    }

    /// Evict everything outside the store's own window relative to `now`.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        match self.cutoff(now) {
            Some(cutoff) => self.evict_older_than(cutoff),
            None => 0,
        }
    }

    /// Items stamped strictly after `now - lookback`, in insertion order.
    ///
    /// A lookback reaching past the earliest representable time yields every item.
    pub fn recent(&self, lookback: Duration, now: DateTime<Utc>) -> impl Iterator<Item = &T> + '_ {
        let cutoff = now.checked_sub_signed(lookback);
        self.items
            .iter()
            .filter(move |item| cutoff.map_or(true, |cutoff| item.timestamp() > cutoff))
    }

    /// Replace every item sharing `key` with `item`, which goes to the back.
    ///
    /// Returns the last replaced item, if any. After this call exactly one
    /// item with that key is present.
    pub fn upsert_by<K, F>(&mut self, item: T, key: F) -> Option<T>
    where
        K: PartialEq,
        F: Fn(&T) -> K,
    {
        let new_key = key(&item);
        let mut replaced = None;
        let mut kept = VecDeque::with_capacity(self.items.len() + 1);

        for existing in self.items.drain(..) {
            if key(&existing) == new_key {
                replaced = Some(existing);
            } else {
                kept.push_back(existing);
            }
        }

        kept.push_back(item);
        self.items = kept;
        replaced
    }

    /// Iterate over all retained items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    /// Earliest inserted item still retained.
    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    /// Most recently inserted item.
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Number of retained items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
