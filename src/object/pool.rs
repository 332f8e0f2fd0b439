//! Generic recycling pool (spec.md §4.2).
//!
//! Grounded on `include/babeltrace/object-pool-internal.h`: a bounded LIFO
//! of freed objects of one type, fronted by a new-object factory. `create`
//! pops a recycled object if the pool is non-empty, else allocates a fresh
//! one; `recycle` resets the object and pushes it back, destroying it
//! instead if the pool is already at capacity.
//!
//! The Rust realization is a smart pointer, [`Recycled<T>`], whose `Drop`
//! impl performs the recycle step automatically when the last strong
//! reference goes away — the caller never calls `recycle` by hand, the
//! same way a C caller never manually decrements a refcount to zero and
//! then separately remembers to call the pool's recycle function.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, Weak};

/// Implemented by pooled payload types. `reset` must release whatever
/// inner references the object holds and clear transient fields — in
/// particular, per spec.md §4.2 and §9, an object's strong back-reference
/// to its owning class must be cleared here, *before* the object is pushed
/// into that class's pool, or the class can never be dropped.
pub trait Recyclable: Sized {
    fn reset(&mut self);
}

struct Shared<T> {
    free: Mutex<Vec<T>>,
    capacity: usize,
}

/// A bounded, per-type object pool.
pub struct ObjectPool<T: Recyclable> {
    shared: Arc<Shared<T>>,
}

impl<T: Recyclable> ObjectPool<T> {
    pub fn new(capacity: usize) -> Self {
        ObjectPool {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::with_capacity(capacity.min(64))),
                capacity,
            }),
        }
    }

    /// Number of recycled objects currently sitting in the pool.
    pub fn len(&self) -> usize {
        self.shared.free.lock().expect("pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a new handle: pops a recycled object if one is available
    /// (reusing its allocation), else calls `init` to allocate a fresh one.
    /// The caller is responsible for filling in the object's fields after
    /// this returns, exactly as `bt_object_pool_create_object`'s doc
    /// comment requires of its callers.
    pub fn create(&self, init: impl FnOnce() -> T) -> Recycled<T> {
        let recycled = self.shared.free.lock().expect("pool lock poisoned").pop();
        let data = recycled.unwrap_or_else(init);
        Recycled(Arc::new(RecycledInner {
            data: ManuallyDrop::new(data),
            pool: Arc::downgrade(&self.shared),
        }))
    }
}

struct RecycledInner<T: Recyclable> {
    data: ManuallyDrop<T>,
    pool: Weak<Shared<T>>,
}

impl<T: Recyclable> Drop for RecycledInner<T> {
    fn drop(&mut self) {
        // SAFETY: `data` is read exactly once, here, as the inner is being
        // torn down (last strong reference to this allocation is gone).
        let mut data = unsafe { ManuallyDrop::take(&mut self.data) };
        if let Some(pool) = self.pool.upgrade() {
            data.reset();
            let mut free = pool.free.lock().expect("pool lock poisoned");
            if free.len() < pool.capacity {
                free.push(data);
                return;
            }
        }
        // Pool is gone or at capacity: `data` drops normally here.
    }
}

/// A refcounted handle to a pooled object. Cloning bumps the strong count;
/// when the last clone drops, the payload is reset and returned to its
/// pool (or destroyed, if the pool has since been dropped or is full).
pub struct Recycled<T: Recyclable>(Arc<RecycledInner<T>>);

impl<T: Recyclable> Recycled<T> {
    /// Mutable access, available only while this is the sole handle —
    /// exactly the window between `create` and handing the object off.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        Arc::get_mut(&mut self.0).map(|inner| &mut *inner.data)
    }

    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }
}

impl<T: Recyclable> Clone for Recycled<T> {
    fn clone(&self) -> Self {
        Recycled(self.0.clone())
    }
}

impl<T: Recyclable> std::ops::Deref for Recycled<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0.data
    }
}

impl<T: Recyclable + std::fmt::Debug> std::fmt::Debug for Recycled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Recycled").field(&*self.0.data).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone)]
    struct Item {
        class_ref: Option<u64>,
        value: u32,
    }

    impl Recyclable for Item {
        fn reset(&mut self) {
            self.class_ref = None;
            self.value = 0;
        }
    }

    #[test]
    fn create_allocates_when_empty_then_reuses_on_recycle() {
        let pool: ObjectPool<Item> = ObjectPool::new(4);
        assert_eq!(pool.len(), 0);

        {
            let mut handle = pool.create(|| Item {
                class_ref: Some(1),
                value: 42,
            });
            assert_eq!(handle.get_mut().unwrap().value, 42);
        }
        // Dropped: reset and returned to the pool.
        assert_eq!(pool.len(), 1);

        let handle = pool.create(|| panic!("should reuse recycled object"));
        assert_eq!(handle.value, 0, "recycled object was reset");
        assert_eq!(handle.class_ref, None, "class back-ref cleared on reset");
    }

    #[test]
    fn respects_capacity() {
        let pool: ObjectPool<Item> = ObjectPool::new(1);
        let a = pool.create(Item::default);
        let b = pool.create(Item::default);
        drop(a);
        drop(b);
        assert_eq!(pool.len(), 1, "second recycle exceeds capacity and is dropped");
    }

    #[test]
    fn refcounted_handle_only_recycles_on_last_drop() {
        let pool: ObjectPool<Item> = ObjectPool::new(2);
        let a = pool.create(Item::default);
        let b = a.clone();
        drop(a);
        assert_eq!(pool.len(), 0, "still one outstanding handle");
        drop(b);
        assert_eq!(pool.len(), 1);
    }
}
