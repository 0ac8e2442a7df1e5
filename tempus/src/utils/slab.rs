use std::mem::MaybeUninit;

/// A slab of reusable slots.
///
/// The reactor stores one entry per registered socket here and uses the
/// slot index as the poller token, so indices stay small and are reused
/// once a socket is closed.
///
/// Internally, it keeps track of:
/// - initialized slots,
/// - free indices,
/// - and uninitialized memory using [`MaybeUninit`].
pub(crate) struct Slab<T> {
    /// Storage for items (may contain uninitialized slots).
    items: Vec<MaybeUninit<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Marks whether a slot is currently initialized.
    used: Vec<bool>,
    /// Number of initialized slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with `size` free slots.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| MaybeUninit::<T>::uninit()).collect();
        let free = (0..size).rev().collect();
        let used = vec![false; size];

        Self {
            items,
            free,
            used,
            len: 0,
        }
    }

    /// Inserts a value and returns its index.
    ///
    /// A free slot is reused when available; otherwise the slab doubles.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items
                .extend((len..new_len).map(|_| MaybeUninit::<T>::uninit()));
            self.free.extend(((len + 1)..new_len).rev());
            self.used.resize(new_len, false);

            len
        };

        self.items[index] = MaybeUninit::new(item);
        self.used[index] = true;
        self.len += 1;

        index
    }

    /// Removes and returns the value stored at `index`, if any.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        if !self.contains(index) {
            return None;
        }

        self.free.push(index);
        self.used[index] = false;
        self.len -= 1;

        // SAFETY: `used[index]` was true, so the slot is initialized, and it
        // is marked free before anyone can observe it again.
        let item = unsafe { self.items[index].assume_init_read() };
        self.items[index] = MaybeUninit::uninit();

        Some(item)
    }

    /// Returns a reference to the value at `index`, if any.
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        if !self.contains(index) {
            return None;
        }

        // SAFETY: checked above that the slot is initialized.
        Some(unsafe { self.items[index].assume_init_ref() })
    }

    /// Returns a mutable reference to the value at `index`, if any.
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if !self.contains(index) {
            return None;
        }

        // SAFETY: checked above that the slot is initialized.
        Some(unsafe { self.items[index].assume_init_mut() })
    }

    /// Returns `true` if `index` holds a value.
    pub(crate) fn contains(&self, index: usize) -> bool {
        self.used.get(index).copied().unwrap_or(false)
    }

    /// Returns the indices of all occupied slots.
    pub(crate) fn indices(&self) -> Vec<usize> {
        self.used
            .iter()
            .enumerate()
            .filter_map(|(i, &used)| used.then_some(i))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl<T> Drop for Slab<T> {
    /// Drops all initialized elements stored in the slab.
    fn drop(&mut self) {
        for (slot, &used) in self.items.iter_mut().zip(self.used.iter()) {
            if used {
                // SAFETY: `used` marks exactly the initialized slots.
                unsafe {
                    slot.assume_init_drop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Slab;

    #[test]
    fn test_slab_reuses_freed_slots() {
        let mut slab = Slab::new(2);

        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_eq!(slab.len(), 2);

        assert_eq!(slab.remove(a), Some("a"));
        assert!(!slab.contains(a));

        let c = slab.insert("c");
        assert_eq!(c, a);
        assert_eq!(slab.get_mut(b).copied(), Some("b"));
    }

    #[test]
    fn test_slab_grows_past_initial_capacity() {
        let mut slab = Slab::new(1);

        let indices: Vec<_> = (0..5).map(|i| slab.insert(i)).collect();
        assert_eq!(slab.len(), 5);

        let mut occupied = slab.indices();
        occupied.sort();
        let mut expected = indices.clone();
        expected.sort();
        assert_eq!(occupied, expected);
    }

    #[test]
    fn test_slab_remove_missing_is_none() {
        let mut slab: Slab<u8> = Slab::new(4);

        assert_eq!(slab.remove(3), None);
        assert_eq!(slab.remove(42), None);
        assert!(slab.get_mut(0).is_none());
    }
}
