use crate::error::PbdError;
use crate::Result;

/// A handle type that can be minted by a storage
pub trait StorageHandle: Copy + Eq + Ord + std::fmt::Debug {
    /// Builds a handle from its raw id
    fn from_raw(id: u32) -> Self;

    /// Returns the raw id of the handle
    fn raw(self) -> u32;
}

/// Generic storage trait for solver objects
pub trait Storage<T, H> {
    /// Creates a new empty storage
    fn new() -> Self;

    /// Adds an item to the storage and returns its handle
    fn add(&mut self, item: T) -> H;

    /// Gets a reference to an item by its handle
    fn get(&self, handle: H) -> Option<&T>;

    /// Gets a mutable reference to an item by its handle
    fn get_mut(&mut self, handle: H) -> Option<&mut T>;

    /// Removes an item from the storage
    fn remove(&mut self, handle: H) -> Option<T>;

    /// Returns the number of items in the storage
    fn len(&self) -> usize;

    /// Returns whether the storage is empty
    fn is_empty(&self) -> bool;

    /// Clears all items from the storage
    fn clear(&mut self);

    /// Returns all handles in insertion order
    fn handles(&self) -> Vec<H>;

    /// Returns an iterator over all items in insertion order
    fn iter<'a>(&'a self) -> impl Iterator<Item = (H, &'a T)> + 'a where T: 'a;

    /// Returns a mutable iterator over all items in insertion order
    fn iter_mut<'a>(&'a mut self) -> impl Iterator<Item = (H, &'a mut T)> + 'a where T: 'a;
}

/// Append / remove-by-handle storage that preserves insertion order.
///
/// Handles are minted from a monotonically increasing counter, so the handle
/// list stays sorted and lookups are a binary search. Removing an item only
/// invalidates its own handle. Items are kept contiguous so the solver can
/// visit them as a slice.
#[derive(Debug, Clone)]
pub struct OrderedStorage<H, T> {
    handles: Vec<H>,
    items: Vec<T>,
    next_id: u32,
    revision: u64,
}

impl<H: StorageHandle, T> Storage<T, H> for OrderedStorage<H, T> {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            items: Vec::new(),
            next_id: 1, // Start at 1, so 0 can represent invalid handle
            revision: 0,
        }
    }

    fn add(&mut self, item: T) -> H {
        let handle = H::from_raw(self.next_id);
        self.next_id += 1;
        self.handles.push(handle);
        self.items.push(item);
        self.revision += 1;
        handle
    }

    fn get(&self, handle: H) -> Option<&T> {
        self.position(handle).map(|i| &self.items[i])
    }

    fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.position(handle).map(move |i| &mut self.items[i])
    }

    fn remove(&mut self, handle: H) -> Option<T> {
        let index = self.position(handle)?;
        self.handles.remove(index);
        self.revision += 1;
        Some(self.items.remove(index))
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn clear(&mut self) {
        self.handles.clear();
        self.items.clear();
        self.revision += 1;
    }

    fn handles(&self) -> Vec<H> {
        self.handles.clone()
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (H, &'a T)> + 'a where T: 'a {
        self.handles.iter().copied().zip(self.items.iter())
    }

    fn iter_mut<'a>(&'a mut self) -> impl Iterator<Item = (H, &'a mut T)> + 'a where T: 'a {
        self.handles.iter().copied().zip(self.items.iter_mut())
    }
}

impl<H: StorageHandle, T> Default for OrderedStorage<H, T> {
    fn default() -> Self {
        <Self as Storage<T, H>>::new()
    }
}

impl<H: StorageHandle, T> OrderedStorage<H, T> {
    fn position(&self, handle: H) -> Option<usize> {
        self.handles.binary_search(&handle).ok()
    }

    /// Returns the items as a contiguous slice in insertion order
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Returns the items as a contiguous mutable slice in insertion order
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// A counter bumped on every structural change (add, remove, clear)
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Gets an item by its handle, returning an error if not found
    pub fn get_checked(&self, handle: H) -> Result<&T> {
        self.get(handle)
            .ok_or_else(|| PbdError::UnknownHandle(format!("{:?}", handle)))
    }

    /// Gets a mutable reference to an item by its handle, returning an error if not found
    pub fn get_checked_mut(&mut self, handle: H) -> Result<&mut T> {
        self.get_mut(handle)
            .ok_or_else(|| PbdError::UnknownHandle(format!("{:?}", handle)))
    }
}
