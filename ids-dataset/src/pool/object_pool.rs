//! Fixed-size object pool.
//!
//! Slots are created in batches of `count`. Each slot carries an application
//! object and a payload buffer of `payload_len` elements. Objects are
//! constructed once per slot and [reset](Reusable::reset) on every
//! acquisition, so callers must not rely on state left by a previous user.

use crate::common::*;

/// An object that lives in a [ObjectPool] slot.
pub trait Reusable
where
    Self: Sized + Send + 'static,
{
    type Context: Send + Sync + 'static;

    /// Called once when the slot is created.
    fn construct(context: &Self::Context) -> Self;

    /// Called on every acquisition.
    fn reset(&mut self, context: &Self::Context);
}

impl Reusable for () {
    type Context = ();

    fn construct(_context: &()) -> Self {}

    fn reset(&mut self, _context: &()) {}
}

#[derive(Debug, Clone)]
pub struct ObjectPoolInit {
    /// Number of payload elements per slot.
    pub payload_len: usize,
    /// Number of slots allocated at once.
    pub count: usize,
    /// Forbid allocating slots beyond the first batch.
    pub no_new_alloc: bool,
}

impl ObjectPoolInit {
    pub fn build<T, E>(self, context: T::Context) -> Result<ObjectPool<T, E>>
    where
        T: Reusable,
        E: Copy + Default + Send + 'static,
    {
        let Self {
            payload_len,
            count,
            no_new_alloc,
        } = self;
        ensure!(count > 0, "count must be positive");

        let shared = Arc::new(PoolShared {
            payload_len,
            count,
            no_new_alloc,
            context,
            state: Mutex::new(PoolState {
                free: vec![],
                num_slots: 0,
            }),
        });
        {
            let mut state = shared.lock_state()?;
            shared.grow(&mut state);
        }

        Ok(ObjectPool { shared })
    }
}

/// The thread-safe pool handle. Cloning it shares the same slots.
pub struct ObjectPool<T, E>
where
    T: Reusable,
{
    shared: Arc<PoolShared<T, E>>,
}

impl<T, E> ObjectPool<T, E>
where
    T: Reusable,
    E: Copy + Default + Send + 'static,
{
    /// Takes a free slot, growing the pool if allowed.
    pub fn alloc(&self) -> Result<Pooled<T, E>> {
        let shared = &self.shared;
        let mut slot = {
            let mut state = shared.lock_state()?;

            if state.free.is_empty() {
                ensure!(
                    !shared.no_new_alloc,
                    "object pool exhausted, all {} slots are in use",
                    state.num_slots
                );
                shared.grow(&mut state);
                debug!("object pool grew to {} slots", state.num_slots);
            }

            state
                .free
                .pop()
                .ok_or_else(|| format_err!("object pool has no free slot"))?
        };

        slot.object.reset(&shared.context);

        Ok(Pooled {
            slot: Some(slot),
            pool: shared.clone(),
        })
    }

    pub fn payload_len(&self) -> usize {
        self.shared.payload_len
    }

    pub fn num_slots(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.num_slots)
            .unwrap_or(0)
    }

    pub fn num_free(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.free.len())
            .unwrap_or(0)
    }
}

impl<T, E> Clone for ObjectPool<T, E>
where
    T: Reusable,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> Debug for ObjectPool<T, E>
where
    T: Reusable,
    E: Copy + Default + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("payload_len", &self.shared.payload_len)
            .field("num_slots", &self.num_slots())
            .field("num_free", &self.num_free())
            .finish()
    }
}

/// An acquired slot. Dropping it returns the slot to its pool.
pub struct Pooled<T, E>
where
    T: Reusable,
{
    slot: Option<Slot<T, E>>,
    pool: Arc<PoolShared<T, E>>,
}

impl<T, E> Pooled<T, E>
where
    T: Reusable,
{
    pub fn payload(&self) -> &[E] {
        &self.slot().payload
    }

    pub fn payload_mut(&mut self) -> &mut [E] {
        &mut self.slot_mut().payload
    }

    /// Borrows the object and the payload at the same time.
    pub fn split_mut(&mut self) -> (&mut T, &mut [E]) {
        let Slot { object, payload } = self.slot_mut();
        (object, payload)
    }

    fn slot(&self) -> &Slot<T, E> {
        // the slot is only taken in drop()
        self.slot.as_ref().unwrap_or_else(|| unreachable!())
    }

    fn slot_mut(&mut self) -> &mut Slot<T, E> {
        self.slot.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T, E> Deref for Pooled<T, E>
where
    T: Reusable,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.slot().object
    }
}

impl<T, E> DerefMut for Pooled<T, E>
where
    T: Reusable,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot_mut().object
    }
}

impl<T, E> Debug for Pooled<T, E>
where
    T: Reusable + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("object", self.deref())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

impl<T, E> Drop for Pooled<T, E>
where
    T: Reusable,
{
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            match self.pool.state.lock() {
                Ok(mut state) => state.free.push(slot),
                Err(mut poisoned) => poisoned.get_mut().free.push(slot),
            }
        }
    }
}

struct Slot<T, E> {
    object: T,
    payload: Box<[E]>,
}

struct PoolState<T, E> {
    free: Vec<Slot<T, E>>,
    num_slots: usize,
}

struct PoolShared<T, E>
where
    T: Reusable,
{
    payload_len: usize,
    count: usize,
    no_new_alloc: bool,
    context: T::Context,
    state: Mutex<PoolState<T, E>>,
}

impl<T, E> PoolShared<T, E>
where
    T: Reusable,
    E: Copy + Default,
{
    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, PoolState<T, E>>> {
        self.state
            .lock()
            .map_err(|_| format_err!("object pool lock is poisoned"))
    }

    fn grow(&self, state: &mut PoolState<T, E>) {
        let Self {
            payload_len,
            count,
            ref context,
            ..
        } = *self;

        state.free.extend((0..count).map(|_| Slot {
            object: T::construct(context),
            payload: vec![E::default(); payload_len].into_boxed_slice(),
        }));
        state.num_slots += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter {
        constructed: usize,
        resets: usize,
    }

    impl Reusable for Counter {
        type Context = usize;

        fn construct(context: &usize) -> Self {
            Self {
                constructed: *context,
                resets: 0,
            }
        }

        fn reset(&mut self, _context: &usize) {
            self.resets += 1;
        }
    }

    #[test]
    fn capacity_without_growth() -> Result<()> {
        let pool: ObjectPool<Counter, u8> = ObjectPoolInit {
            payload_len: 16,
            count: 4,
            no_new_alloc: true,
        }
        .build(7)?;

        let items: Vec<_> = (0..4).map(|_| pool.alloc()).collect::<Result<_>>()?;
        assert!(items.iter().all(|item| item.payload().len() == 16));
        assert!(items.iter().all(|item| item.constructed == 7));
        assert!(pool.alloc().is_err());
        assert_eq!(pool.num_slots(), 4);

        drop(items);
        assert_eq!(pool.num_free(), 4);
        assert!(pool.alloc().is_ok());
        Ok(())
    }

    #[test]
    fn capacity_with_growth() -> Result<()> {
        let pool: ObjectPool<Counter, f32> = ObjectPoolInit {
            payload_len: 2,
            count: 3,
            no_new_alloc: false,
        }
        .build(0)?;

        let items: Vec<_> = (0..4).map(|_| pool.alloc()).collect::<Result<_>>()?;
        assert_eq!(pool.num_slots(), 6);
        assert_eq!(pool.num_free(), 2);
        drop(items);
        assert_eq!(pool.num_free(), 6);
        Ok(())
    }

    #[test]
    fn reset_on_every_acquire() -> Result<()> {
        let pool: ObjectPool<Counter, u8> = ObjectPoolInit {
            payload_len: 1,
            count: 1,
            no_new_alloc: true,
        }
        .build(0)?;

        for round in 1..=3 {
            let mut item = pool.alloc()?;
            assert_eq!(item.resets, round);
            item.payload_mut()[0] = round as u8;
        }
        Ok(())
    }

    #[test]
    fn shared_handle_returns_on_last_drop() -> Result<()> {
        let pool: ObjectPool<(), u8> = ObjectPoolInit {
            payload_len: 8,
            count: 1,
            no_new_alloc: true,
        }
        .build(())?;

        let item = Arc::new(pool.alloc()?);
        let views: Vec<_> = (0..3).map(|_| item.clone()).collect();
        drop(item);
        assert_eq!(pool.num_free(), 0);
        drop(views);
        assert_eq!(pool.num_free(), 1);
        Ok(())
    }

    #[test]
    fn concurrent_alloc() -> Result<()> {
        let pool: ObjectPool<(), u32> = ObjectPoolInit {
            payload_len: 4,
            count: 8,
            no_new_alloc: true,
        }
        .build(())?;

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let pool = pool.clone();
                thread::spawn(move || -> Result<()> {
                    for _ in 0..100 {
                        let mut item = pool.alloc()?;
                        item.payload_mut().fill(index);
                        assert!(item.payload().iter().all(|&value| value == index));
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().map_err(|_| format_err!("thread panicked"))??;
        }
        assert_eq!(pool.num_free(), 8);
        Ok(())
    }
}
