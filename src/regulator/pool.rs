//! Fixed-capacity slot pool shared by the control tick and telemetry readers.
//!
//! Slots cycle `Idle -> Filling -> Active -> Taken -> Idle`. Active slots are
//! kept in publish order in an index ring; when no slot is idle the producer
//! reclaims the oldest active one, so a slow reader loses its oldest unread
//! samples instead of stalling the tick.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

use crate::state::RegulatorState;

/// Handle to one slot of a [`PoolBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(u8);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Idle,
    Filling,
    Active,
    Taken,
}

pub struct PoolBuffer<T, const N: usize> {
    slots: [T; N],
    states: [SlotState; N],
    /// Published slots, oldest at the front.
    active: Deque<u8, N>,
    evicted: u32,
}

impl<T: Copy, const N: usize> PoolBuffer<T, N> {
    /// Every slot starts idle and holding `fill`.
    pub const fn new(fill: T) -> Self {
        Self {
            slots: [fill; N],
            states: [SlotState::Idle; N],
            active: Deque::new(),
            evicted: 0,
        }
    }

    /// An idle slot, or the oldest active one if none is idle.
    ///
    /// Only returns `None` when every slot is checked out by a reader or
    /// already being filled.
    pub fn acquire(&mut self) -> Option<SlotId> {
        let idx = match self.states.iter().position(|s| *s == SlotState::Idle) {
            Some(idx) => idx,
            None => {
                let idx = self.active.pop_front()? as usize;
                self.evicted = self.evicted.wrapping_add(1);
                trace!("telemetry slot {} overwritten", idx);
                idx
            }
        };
        self.states[idx] = SlotState::Filling;
        Some(SlotId(idx as u8))
    }

    pub fn slot_mut(&mut self, id: SlotId) -> &mut T {
        &mut self.slots[id.index()]
    }

    pub fn slot(&self, id: SlotId) -> &T {
        &self.slots[id.index()]
    }

    /// Appends a filled slot to the active FIFO. Ignored for slots that were
    /// not acquired.
    pub fn publish(&mut self, id: SlotId) {
        let idx = id.index();
        if self.states[idx] != SlotState::Filling {
            return;
        }
        // A filling slot is never in the ring, so there is always room.
        if self.active.push_back(id.0).is_ok() {
            self.states[idx] = SlotState::Active;
        }
    }

    /// Removes the least recently published slot from the active set.
    pub fn take_oldest(&mut self) -> Option<SlotId> {
        let idx = self.active.pop_front()?;
        self.states[idx as usize] = SlotState::Taken;
        Some(SlotId(idx))
    }

    /// Returns a taken (or abandoned filling) slot to the idle set.
    pub fn release(&mut self, id: SlotId) {
        let state = &mut self.states[id.index()];
        if matches!(*state, SlotState::Taken | SlotState::Filling) {
            *state = SlotState::Idle;
        }
    }

    /// Drops everything pending and marks every slot idle.
    pub fn clear(&mut self) {
        self.active.clear();
        self.states = [SlotState::Idle; N];
        self.evicted = 0;
    }

    pub fn pending(&self) -> usize {
        self.active.len()
    }

    /// Samples lost to overwrite-oldest since the last clear.
    pub fn evicted(&self) -> u32 {
        self.evicted
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

/// Telemetry snapshots behind a critical-section mutex.
///
/// Each call holds the lock only for index bookkeeping and one snapshot copy.
pub struct TelemetryPool<const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<PoolBuffer<RegulatorState, N>>>,
}

impl<const N: usize> TelemetryPool<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PoolBuffer::new(RegulatorState::EMPTY))),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut PoolBuffer<RegulatorState, N>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Producer side: fill a slot in place and publish it.
    pub fn record(&self, fill: impl FnOnce(&mut RegulatorState)) {
        self.with(|pool| {
            if let Some(id) = pool.acquire() {
                fill(pool.slot_mut(id));
                pool.publish(id);
            }
        })
    }

    /// Copies out and frees the oldest pending snapshot.
    pub fn take_oldest(&self) -> Option<RegulatorState> {
        self.with(|pool| {
            let id = pool.take_oldest()?;
            let state = *pool.slot(id);
            pool.release(id);
            Some(state)
        })
    }

    /// Oldest pending snapshot, or [`RegulatorState::EMPTY`] when none is.
    pub fn read(&self) -> RegulatorState {
        self.take_oldest().unwrap_or(RegulatorState::EMPTY)
    }

    /// Everything pending, oldest first. Locks once per snapshot.
    pub fn drain(&self) -> heapless::Vec<RegulatorState, N> {
        let mut out = heapless::Vec::new();
        while let Some(state) = self.take_oldest() {
            if out.push(state).is_err() {
                break;
            }
        }
        out
    }

    pub fn reset(&self) {
        self.with(|pool| pool.clear())
    }

    pub fn pending(&self) -> usize {
        self.with(|pool| pool.pending())
    }

    pub fn evicted(&self) -> u32 {
        self.with(|pool| pool.evicted())
    }
}

impl<const N: usize> Default for TelemetryPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(pool: &mut PoolBuffer<u32, 5>, value: u32) {
        let id = pool.acquire().unwrap();
        *pool.slot_mut(id) = value;
        pool.publish(id);
    }

    fn take(pool: &mut PoolBuffer<u32, 5>) -> Option<u32> {
        let id = pool.take_oldest()?;
        let value = *pool.slot(id);
        pool.release(id);
        Some(value)
    }

    #[test]
    fn test_fifo_order() {
        let mut pool = PoolBuffer::<u32, 5>::new(0);
        for v in 1..=3 {
            publish(&mut pool, v);
        }
        assert_eq!(pool.pending(), 3);
        assert_eq!(take(&mut pool), Some(1));
        assert_eq!(take(&mut pool), Some(2));
        assert_eq!(take(&mut pool), Some(3));
        assert_eq!(take(&mut pool), None);
    }

    #[test]
    fn test_sixth_publish_evicts_first() {
        let mut pool = PoolBuffer::<u32, 5>::new(0);
        for v in 1..=6 {
            publish(&mut pool, v);
        }
        assert_eq!(pool.evicted(), 1);
        assert_eq!(pool.pending(), 5);
        for expected in 2..=6 {
            assert_eq!(take(&mut pool), Some(expected));
        }
        assert_eq!(take(&mut pool), None);
    }

    #[test]
    fn test_taken_slot_is_never_reclaimed() {
        let mut pool = PoolBuffer::<u32, 5>::new(0);
        for v in 1..=5 {
            publish(&mut pool, v);
        }
        let held = pool.take_oldest().unwrap();
        for v in 6..=20 {
            publish(&mut pool, v);
        }
        assert_eq!(*pool.slot(held), 1);
        pool.release(held);
        assert_eq!(take(&mut pool), Some(17));
    }

    #[test]
    fn test_acquire_fails_only_when_everything_is_checked_out() {
        let mut pool = PoolBuffer::<u32, 5>::new(0);
        for v in 1..=5 {
            publish(&mut pool, v);
        }
        let held: [SlotId; 5] = core::array::from_fn(|_| pool.take_oldest().unwrap());
        assert_eq!(pool.acquire(), None);
        pool.release(held[2]);
        assert_eq!(pool.acquire(), Some(held[2]));
    }

    #[test]
    fn test_publish_requires_acquire() {
        let mut pool = PoolBuffer::<u32, 5>::new(0);
        pool.publish(SlotId(0));
        assert_eq!(pool.pending(), 0);

        let id = pool.acquire().unwrap();
        pool.publish(id);
        pool.publish(id);
        assert_eq!(pool.pending(), 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut pool = PoolBuffer::<u32, 5>::new(0);
        for v in 1..=7 {
            publish(&mut pool, v);
        }
        pool.clear();
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.evicted(), 0);
        assert_eq!(take(&mut pool), None);
        assert_eq!(pool.capacity(), 5);
    }

    #[test]
    fn test_shared_pool_reads_empty_snapshot() {
        let pool = TelemetryPool::<5>::new();
        assert_eq!(pool.read(), RegulatorState::EMPTY);
    }

    #[test]
    fn test_shared_pool_drains_in_order() {
        let pool = TelemetryPool::<5>::new();
        for t in 0..8 {
            pool.record(|s| {
                *s = RegulatorState::EMPTY;
                s.time = t;
            });
        }
        assert_eq!(pool.evicted(), 3);
        let drained = pool.drain();
        let times: heapless::Vec<u32, 5> = drained.iter().map(|s| s.time).collect();
        assert_eq!(times.as_slice(), &[3, 4, 5, 6, 7]);
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.read(), RegulatorState::EMPTY);
    }
}
