//! Fixed-capacity ring buffer used for event histories and metric series
//!
//! Slots are allocated once at construction. Inserting into a full buffer
//! overwrites the oldest element in place, so steady-state appends never
//! reallocate or shift elements.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Bounded FIFO buffer with index-based insert/evict
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index of the oldest element
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` elements
    ///
    /// A capacity of zero is bumped to one so the buffer can always hold the
    /// most recent element.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append an element, returning the evicted oldest element if the buffer
    /// was full
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.capacity();
        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = Some(value);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(value);
            self.head = (self.head + 1) % capacity;
            evicted
        }
    }

    /// Element at logical position `index` (0 = oldest)
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let slot = (self.head + index) % self.capacity();
        self.slots[slot].as_ref()
    }

    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    #[must_use]
    pub fn newest(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            buffer: self,
            front: 0,
            back: self.len,
        }
    }

    /// Drop every element while keeping the allocated slots
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the contents, oldest first
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// Oldest-to-newest iterator over a [`RingBuffer`]
pub struct Iter<'a, T> {
    buffer: &'a RingBuffer<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let item = self.buffer.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.buffer.get(self.back)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Serialize, Deserialize)]
struct RingBufferRepr<T> {
    capacity: usize,
    items: Vec<T>,
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Serialized oldest-first so the logical order survives a round trip
        let repr = RingBufferRepr {
            capacity: self.capacity(),
            items: self.iter().collect::<Vec<_>>(),
        };
        repr.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RingBuffer<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = RingBufferRepr::<T>::deserialize(deserializer)?;
        let mut buffer = RingBuffer::with_capacity(repr.capacity);
        for item in repr.items {
            buffer.push(item);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut ring = RingBuffer::with_capacity(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.to_vec(), vec![2, 3, 4]);
        assert_eq!(ring.oldest(), Some(&2));
        assert_eq!(ring.newest(), Some(&4));
    }

    #[test]
    fn reverse_iteration_yields_newest_first() {
        let mut ring = RingBuffer::with_capacity(2);
        for i in 0..5 {
            ring.push(i);
        }
        let newest_first: Vec<_> = ring.iter().rev().copied().collect();
        assert_eq!(newest_first, vec![4, 3]);
    }

    #[test]
    fn clear_resets_positions() {
        let mut ring = RingBuffer::with_capacity(2);
        ring.push("a");
        ring.push("b");
        ring.push("c");
        ring.clear();
        assert!(ring.is_empty());
        ring.push("d");
        assert_eq!(ring.to_vec(), vec!["d"]);
    }

    #[test]
    fn serde_preserves_logical_order() {
        let mut ring = RingBuffer::with_capacity(3);
        for i in 0..5 {
            ring.push(i);
        }
        let json = serde_json::to_string(&ring).unwrap();
        let restored: RingBuffer<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.capacity(), 3);
        assert_eq!(restored.to_vec(), vec![2, 3, 4]);
    }
}
