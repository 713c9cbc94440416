/// An ordered collection whose elements can be taken out one at a time while
/// the remaining elements keep their original indices.
#[derive(Debug, Clone)]
pub struct WorkingSet<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> WorkingSet<T> {
    pub fn new(items: Vec<T>) -> Self {
        let remaining = items.len();
        Self {
            slots: items.into_iter().map(Some).collect(),
            remaining,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Remaining elements with their original indices, in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (i, item)))
    }

    /// Indices of the remaining elements. Collected so callers may take
    /// elements while walking the list.
    pub fn indices(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }

    pub fn take(&mut self, index: usize) -> Option<T> {
        let item = self.slots.get_mut(index)?.take();
        if item.is_some() {
            self.remaining -= 1;
        }
        item
    }

    /// Remove every remaining element matching `pred`, in order.
    pub fn take_where<F>(&mut self, mut pred: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut taken = Vec::new();
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(&mut pred) {
                if let Some(item) = slot.take() {
                    taken.push(item);
                }
            }
        }
        self.remaining -= taken.len();
        taken
    }

    /// Consume the set, yielding the remaining elements in order.
    pub fn into_remaining(self) -> Vec<T> {
        self.slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_keeps_indices_stable() {
        let mut set = WorkingSet::new(vec!["a", "b", "c", "d"]);
        assert_eq!(set.take(1), Some("b"));
        assert_eq!(set.take(1), None);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(2), Some(&"c"));
        assert_eq!(set.indices(), vec![0, 2, 3]);
    }

    #[test]
    fn test_take_out_of_range() {
        let mut set = WorkingSet::new(vec![1]);
        assert_eq!(set.take(5), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_take_where_and_remaining_order() {
        let mut set = WorkingSet::new(vec![1, 2, 3, 4, 5, 6]);
        set.take(0);
        let evens = set.take_where(|n| n % 2 == 0);
        assert_eq!(evens, vec![2, 4, 6]);
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
        assert_eq!(set.into_remaining(), vec![3, 5]);
    }

    #[test]
    fn test_empty() {
        let mut set: WorkingSet<i32> = WorkingSet::new(Vec::new());
        assert!(set.is_empty());
        assert!(set.take_where(|_| true).is_empty());
        assert!(set.into_remaining().is_empty());
    }
}
