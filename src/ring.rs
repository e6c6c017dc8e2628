//! Fixed-capacity ring store - the uniform storage primitive
//!
//! Every time-series entity in the engine (candles, liquidity points,
//! setups, signals, session windows, micro windows) lives in one of these:
//! a fixed-capacity, insertion-ordered ring buffer with newest-first
//! indexing and an id-based secondary index. When a full store accepts a
//! new item the oldest one is silently evicted and its id is pruned from
//! the index in the same operation, so the index can never go stale.

use std::collections::HashMap;

/// Anything stored in a [`RingStore`] carries a stable numeric id.
pub trait StoreItem {
    fn id(&self) -> u64;
}

/// Fixed-capacity, newest-first ring buffer with O(1) id lookup.
///
/// Index 0 is always the most recently added item. Capacity is fixed at
/// construction and never resized. All read accessors are silent no-ops on
/// out-of-range indices or unknown ids - callers check the returned
/// `Option`.
#[derive(Debug, Clone)]
pub struct RingStore<T> {
    slots: Vec<Option<T>>,
    capacity: usize,
    start: usize,
    size: usize,
    index: HashMap<u64, usize>,
}

impl<T: StoreItem> RingStore<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring store capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            capacity,
            start: 0,
            size: 0,
            index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Add an item, evicting the oldest one when full.
    ///
    /// Eviction and index pruning happen inside this one call; there is no
    /// separate cleanup step for callers to forget.
    pub fn push(&mut self, item: T) -> &T {
        self.start = (self.start + self.capacity - 1) % self.capacity;
        if let Some(evicted) = self.slots[self.start].take() {
            self.index.remove(&evicted.id());
        } else {
            self.size += 1;
        }
        self.index.insert(item.id(), self.start);
        self.slots[self.start] = Some(item);
        self.slots[self.start]
            .as_ref()
            .unwrap_or_else(|| unreachable!("slot was just filled"))
    }

    /// Get by age offset: 0 = newest, `len() - 1` = oldest.
    pub fn get(&self, age: usize) -> Option<&T> {
        if age >= self.size {
            return None;
        }
        self.slots[(self.start + age) % self.capacity].as_ref()
    }

    pub fn get_by_id(&self, id: u64) -> Option<&T> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_ref().filter(|item| item.id() == id)
    }

    pub fn newest(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn oldest(&self) -> Option<&T> {
        if self.size == 0 {
            return None;
        }
        self.get(self.size - 1)
    }

    /// Iterate newest-first over every retained item.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.size).filter_map(move |age| self.get(age))
    }

    /// All retained items, newest-first.
    pub fn all(&self) -> Vec<&T> {
        self.iter().collect()
    }

    /// All retained items matching a predicate, newest-first.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<&T> {
        self.iter().filter(|item| pred(item)).collect()
    }

    /// Items from age offset `from`, newest-first, at most `take` of them
    /// (`None` or zero means "through the oldest").
    pub fn range(&self, from: usize, take: Option<usize>) -> Vec<&T> {
        if from >= self.size {
            return Vec::new();
        }
        let rest = self.size - from;
        let count = match take {
            Some(n) if n > 0 => n.min(rest),
            _ => rest,
        };
        (from..from + count).filter_map(|age| self.get(age)).collect()
    }

    /// Mutate the item at an age offset in place. No-op when out of range.
    pub fn update(&mut self, age: usize, f: impl FnOnce(&mut T)) {
        if age >= self.size {
            return;
        }
        if let Some(item) = self.slots[(self.start + age) % self.capacity].as_mut() {
            f(item);
        }
    }

    /// Mutate the item with the given id in place. No-op on unknown ids.
    pub fn update_by_id(&mut self, id: u64, f: impl FnOnce(&mut T)) {
        let Some(&slot) = self.index.get(&id) else {
            return;
        };
        if let Some(item) = self.slots[slot].as_mut() {
            if item.id() == id {
                f(item);
            }
        }
    }
}
