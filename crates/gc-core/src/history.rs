//! Fixed-capacity circular history of recent observations.
//!
//! The buffer keeps the `capacity` most recent values. Slot order is an
//! implementation detail: callers address entries by recency through
//! [`CircularHistory::get_nth_latest`] and friends.

/// Ring buffer with whole-buffer and most-recent-`n` averages.
#[derive(Debug, Clone)]
pub struct CircularHistory<T> {
    slots: Vec<T>,
    /// Next slot to write.
    cursor: usize,
    /// Set once the cursor has wrapped since creation or the last reset.
    full: bool,
}

impl<T: Copy + Default> CircularHistory<T> {
    /// Create an empty history holding at most `capacity` values.
    ///
    /// # Panics
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be at least 1");
        Self {
            slots: vec![T::default(); capacity],
            cursor: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid entries.
    pub fn len(&self) -> usize {
        if self.full {
            self.slots.len()
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Overwrite the slot at the cursor and advance it.
    pub fn insert(&mut self, value: T) {
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.slots.len();
        if self.cursor == 0 {
            self.full = true;
        }
    }

    /// Value inserted `n` steps before the most recent one (0 = most recent).
    ///
    /// Returns `None` when fewer than `n + 1` values are held.
    ///
    /// # Panics
    /// Panics if `n >= capacity`.
    pub fn get_nth_latest(&self, n: usize) -> Option<T> {
        let capacity = self.slots.len();
        assert!(
            n < capacity,
            "get_nth_latest({}) out of bounds for capacity {}",
            n,
            capacity
        );
        if n >= self.len() {
            return None;
        }
        Some(self.slots[(self.cursor + capacity - n - 1) % capacity])
    }

    /// Most recently inserted value.
    pub fn latest(&self) -> Option<T> {
        self.get_nth_latest(0)
    }

    /// Iterate over held values, newest first.
    pub fn iter_latest(&self) -> impl Iterator<Item = T> + '_ {
        let capacity = self.slots.len();
        (0..self.len()).map(move |n| self.slots[(self.cursor + capacity - n - 1) % capacity])
    }

    /// Change the capacity, keeping the most recent entries.
    ///
    /// Growing keeps every entry and clears `full`. Shrinking keeps the
    /// `new_capacity` most recent entries.
    ///
    /// # Panics
    /// Panics if `new_capacity == 0`.
    pub fn resize(&mut self, new_capacity: usize) {
        assert!(new_capacity > 0, "history capacity must be at least 1");
        if new_capacity == self.slots.len() {
            return;
        }

        let kept = self.len().min(new_capacity);
        // Oldest kept entry first
        let mut chronological: Vec<T> = self.iter_latest().take(kept).collect();
        chronological.reverse();

        let mut slots = vec![T::default(); new_capacity];
        slots[..kept].copy_from_slice(&chronological);

        self.slots = slots;
        self.cursor = kept % new_capacity;
        self.full = kept == new_capacity;
    }

    /// Forget every entry. Capacity is unchanged.
    pub fn reset(&mut self) {
        self.slots.fill(T::default());
        self.cursor = 0;
        self.full = false;
    }
}

impl<T: Copy + Default + Into<f64>> CircularHistory<T> {
    /// Mean of all held values, `None` when empty.
    pub fn average(&self) -> Option<f64> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let valid = if self.full {
            &self.slots[..]
        } else {
            &self.slots[..self.cursor]
        };
        let sum: f64 = valid.iter().map(|&v| v.into()).sum();
        Some(sum / len as f64)
    }

    /// Mean of the `n` most recent values.
    ///
    /// `None` when fewer than `n` values are held or `n == 0`.
    pub fn average_of(&self, n: usize) -> Option<f64> {
        if n == 0 || self.len() < n {
            return None;
        }
        let sum: f64 = self.iter_latest().take(n).map(Into::into).sum();
        Some(sum / n as f64)
    }
}
