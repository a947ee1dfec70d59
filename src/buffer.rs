// Fixed-capacity ordered history with eviction on overflow

use std::collections::VecDeque;

/// Which end holds the newest element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Append at the tail, evict from the head (snapshot history).
    OldestFirst,
    /// Insert at the head, truncate the tail (anomaly list).
    NewestFirst,
}

/// Ordered sequence with `len() <= capacity()` at all times.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    order: Order,
}

impl<T> HistoryBuffer<T> {
    /// `capacity` of zero is bumped to one; an empty-only buffer is never useful.
    pub fn new(capacity: usize, order: Order) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            order,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Admit a new element, evicting the oldest one when full. Returns the evicted element.
    pub fn push(&mut self, item: T) -> Option<T> {
        match self.order {
            Order::OldestFirst => {
                let evicted = if self.items.len() == self.capacity {
                    self.items.pop_front()
                } else {
                    None
                };
                self.items.push_back(item);
                evicted
            }
            Order::NewestFirst => {
                self.items.push_front(item);
                if self.items.len() > self.capacity {
                    self.items.pop_back()
                } else {
                    None
                }
            }
        }
    }

    /// Replace the whole contents. `items` must already be in this buffer's order;
    /// when there are too many, the newest `capacity` are kept.
    pub fn replace<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut incoming: VecDeque<T> = items.into_iter().collect();
        let excess = incoming.len().saturating_sub(self.capacity);
        match self.order {
            Order::OldestFirst => {
                incoming.drain(..excess);
            }
            Order::NewestFirst => incoming.truncate(self.capacity),
        }
        self.items = incoming;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Most recently admitted element.
    pub fn newest(&self) -> Option<&T> {
        match self.order {
            Order::OldestFirst => self.items.back(),
            Order::NewestFirst => self.items.front(),
        }
    }

    /// Iterates in buffer order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }
}

impl<T: Clone> HistoryBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
