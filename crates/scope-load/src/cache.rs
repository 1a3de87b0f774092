//! Fixed-capacity frame cache keyed by frame index. The cache index (frame →
//! slot mapping, LRU ticks, reservation state) lives under one mutex; frame
//! data lives in per-slot reader/writer locks. `find_or_reserve` is the one
//! atomic step everything hinges on: a frame is either served from a slot
//! under a read lock, or the caller receives a reserved slot under a write
//! lock and is obligated to populate it — dropping the reservation without
//! committing clears it so the next caller can retry.
//!
//! Eviction is strict least-recently-used by access tick, decided under the
//! index mutex, which makes replay deterministic on a single thread.

use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fxhash::FxHashMap;
use scope_core::{CoreError, CoreResult, FrameData};

#[derive(Default)]
struct Slot {
    frame: FrameData,
    frame_index: Option<usize>,
    populated: bool,
}

struct CacheIndex {
    map: FxHashMap<usize, usize>,
    /// Frame each slot is assigned to, reserved or populated.
    assigned: Vec<Option<usize>>,
    /// Slot has an in-flight writer; never picked as an eviction victim.
    reserved: Vec<bool>,
    populated_flags: Vec<bool>,
    last_access: Vec<u64>,
    tick: u64,
    populated: usize,
}

impl CacheIndex {
    fn touch(&mut self, slot: usize) {
        self.tick += 1;
        self.last_access[slot] = self.tick;
    }

    /// Non-reserved slots, least recently used first.
    fn eviction_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.assigned.len())
            .filter(|&i| !self.reserved[i])
            .collect();
        order.sort_by_key(|&i| (self.last_access[i], i));
        order
    }
}

pub struct FrameCache {
    slots: Vec<RwLock<Slot>>,
    index: Mutex<CacheIndex>,
}

/// Result of `find_or_reserve`: either the frame is present and readable, or
/// the caller owns a reservation it must populate.
pub enum FrameSlot<'a> {
    Hit(FrameRef<'a>),
    Miss(ReservedFrame<'a>),
}

pub struct FrameRef<'a> {
    guard: RwLockReadGuard<'a, Slot>,
}

impl FrameRef<'_> {
    pub fn frame(&self) -> &FrameData {
        &self.guard.frame
    }
}

pub struct ReservedFrame<'a> {
    cache: &'a FrameCache,
    slot_no: usize,
    frame_index: usize,
    guard: Option<RwLockWriteGuard<'a, Slot>>,
    committed: bool,
}

impl ReservedFrame<'_> {
    pub fn frame(&self) -> &FrameData {
        &self.guard.as_ref().expect("reservation guard").frame
    }

    pub fn frame_mut(&mut self) -> &mut FrameData {
        &mut self.guard.as_mut().expect("reservation guard").frame
    }

    /// Mark the slot populated and publish it. The write lock is released
    /// before the index bookkeeping so blocked readers wake into a valid
    /// slot.
    pub fn commit(mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.populated = true;
            drop(guard);
        }
        if let Ok(mut index) = self.cache.index.lock() {
            if index.assigned[self.slot_no] == Some(self.frame_index) && index.reserved[self.slot_no]
            {
                index.reserved[self.slot_no] = false;
                index.populated_flags[self.slot_no] = true;
                index.populated += 1;
            }
        }
        self.committed = true;
    }
}

impl Drop for ReservedFrame<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Populate failed: invalidate the slot and withdraw the mapping so a
        // later call can retry the decode.
        if let Some(mut guard) = self.guard.take() {
            guard.populated = false;
            drop(guard);
        }
        if let Ok(mut index) = self.cache.index.lock() {
            if index.assigned[self.slot_no] == Some(self.frame_index) && index.reserved[self.slot_no]
            {
                index.map.remove(&self.frame_index);
                index.assigned[self.slot_no] = None;
                index.reserved[self.slot_no] = false;
            }
        }
    }
}

impl FrameCache {
    /// `capacity` slots, preallocated; the cache never grows and never
    /// allocates on the lookup path.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| RwLock::new(Slot::default())).collect(),
            index: Mutex::new(CacheIndex {
                map: FxHashMap::default(),
                assigned: vec![None; capacity],
                reserved: vec![false; capacity],
                populated_flags: vec![false; capacity],
                last_access: vec![0; capacity],
                tick: 0,
                populated: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Populated frame count.
    pub fn num_frames(&self) -> usize {
        self.index.lock().map(|index| index.populated).unwrap_or(0)
    }

    /// Drop every cached frame. Callers must hold no slot locks. In-flight
    /// reservations are disowned: their decode completes for the caller that
    /// started it, but commit no longer publishes into the mapping.
    pub fn clear(&self) {
        if let Ok(mut index) = self.index.lock() {
            index.map.clear();
            for i in 0..index.assigned.len() {
                index.assigned[i] = None;
                index.reserved[i] = false;
                index.populated_flags[i] = false;
                index.last_access[i] = 0;
            }
            index.tick = 0;
            index.populated = 0;
        }
    }

    pub fn find_or_reserve(&self, frame_index: usize) -> CoreResult<FrameSlot<'_>> {
        loop {
            let read_slot = {
                let mut index = self.lock_index()?;
                if let Some(&slot_no) = index.map.get(&frame_index) {
                    index.touch(slot_no);
                    Some(slot_no)
                } else {
                    // Miss: claim an eviction victim. The slot's write lock
                    // is taken while the index is still held, so publishing
                    // the mapping and owning the slot are one atomic step;
                    // commit and abort release the slot lock before touching
                    // the index, which keeps this free of lock-order cycles.
                    let mut claimed = None;
                    for victim in index.eviction_order() {
                        if let Ok(guard) = self.slots[victim].try_write() {
                            claimed = Some((victim, guard));
                            break;
                        }
                    }
                    match claimed {
                        Some((victim, mut guard)) => {
                            if let Some(old) = index.assigned[victim] {
                                index.map.remove(&old);
                            }
                            if index.populated_flags[victim] {
                                index.populated_flags[victim] = false;
                                index.populated -= 1;
                            }
                            index.assigned[victim] = Some(frame_index);
                            index.reserved[victim] = true;
                            index.map.insert(frame_index, victim);
                            index.touch(victim);
                            guard.frame_index = Some(frame_index);
                            guard.populated = false;
                            return Ok(FrameSlot::Miss(ReservedFrame {
                                cache: self,
                                slot_no: victim,
                                frame_index,
                                guard: Some(guard),
                                committed: false,
                            }));
                        }
                        // Every candidate is locked; wait one out.
                        None => None,
                    }
                }
            };

            match read_slot {
                Some(slot_no) => {
                    let guard = self.slots[slot_no]
                        .read()
                        .map_err(|_| poisoned())?;
                    if guard.populated && guard.frame_index == Some(frame_index) {
                        return Ok(FrameSlot::Hit(FrameRef { guard }));
                    }
                    // The writer failed or the slot was repurposed between
                    // the index lookup and the lock; take another pass.
                    drop(guard);
                    std::thread::yield_now();
                }
                None => std::thread::yield_now(),
            }
        }
    }

    fn lock_index(&self) -> CoreResult<std::sync::MutexGuard<'_, CacheIndex>> {
        self.index.lock().map_err(|_| poisoned())
    }
}

fn poisoned() -> CoreError {
    CoreError::Invalid("frame cache lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn populate(reservation: &mut ReservedFrame<'_>, frame_index: usize, value: f32) {
        let frame = reservation.frame_mut();
        frame.reset(1);
        frame.header.step = frame_index as i64;
        frame.x[0] = value;
    }

    #[test]
    fn miss_then_hit_same_index() {
        let cache = FrameCache::new(4);
        match cache.find_or_reserve(7).unwrap() {
            FrameSlot::Miss(mut res) => {
                populate(&mut res, 7, 1.25);
                res.commit();
            }
            FrameSlot::Hit(_) => panic!("empty cache cannot hit"),
        }
        match cache.find_or_reserve(7).unwrap() {
            FrameSlot::Hit(hit) => assert_eq!(hit.frame().x[0], 1.25),
            FrameSlot::Miss(_) => panic!("populated frame must hit"),
        }
        assert_eq!(cache.num_frames(), 1);
    }

    #[test]
    fn dropped_reservation_allows_retry() {
        let cache = FrameCache::new(2);
        match cache.find_or_reserve(3).unwrap() {
            FrameSlot::Miss(res) => drop(res),
            FrameSlot::Hit(_) => panic!(),
        }
        assert_eq!(cache.num_frames(), 0);
        // The failed reservation must not leave a phantom entry behind.
        match cache.find_or_reserve(3).unwrap() {
            FrameSlot::Miss(mut res) => {
                populate(&mut res, 3, 0.5);
                res.commit();
            }
            FrameSlot::Hit(_) => panic!("aborted reservation must not hit"),
        }
        assert_eq!(cache.num_frames(), 1);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = FrameCache::new(2);
        for idx in [0usize, 1] {
            match cache.find_or_reserve(idx).unwrap() {
                FrameSlot::Miss(mut res) => {
                    populate(&mut res, idx, idx as f32);
                    res.commit();
                }
                FrameSlot::Hit(_) => panic!(),
            }
        }
        // Touch frame 0 so frame 1 becomes the LRU victim.
        assert!(matches!(cache.find_or_reserve(0).unwrap(), FrameSlot::Hit(_)));
        match cache.find_or_reserve(2).unwrap() {
            FrameSlot::Miss(mut res) => {
                populate(&mut res, 2, 2.0);
                res.commit();
            }
            FrameSlot::Hit(_) => panic!(),
        }
        assert!(matches!(cache.find_or_reserve(0).unwrap(), FrameSlot::Hit(_)));
        assert!(matches!(
            cache.find_or_reserve(1).unwrap(),
            FrameSlot::Miss(_)
        ));
    }

    #[test]
    fn capacity_one_always_decodes_on_alternation() {
        let cache = FrameCache::new(1);
        for idx in [0usize, 1, 0, 1] {
            match cache.find_or_reserve(idx).unwrap() {
                FrameSlot::Miss(mut res) => {
                    populate(&mut res, idx, 0.0);
                    res.commit();
                }
                FrameSlot::Hit(_) => panic!("capacity 1 cannot retain both frames"),
            }
        }
        assert_eq!(cache.num_frames(), 1);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = FrameCache::new(4);
        for idx in 0..3 {
            if let FrameSlot::Miss(mut res) = cache.find_or_reserve(idx).unwrap() {
                populate(&mut res, idx, 0.0);
                res.commit();
            }
        }
        assert_eq!(cache.num_frames(), 3);
        cache.clear();
        assert_eq!(cache.num_frames(), 0);
        assert!(matches!(
            cache.find_or_reserve(0).unwrap(),
            FrameSlot::Miss(_)
        ));
    }

    #[test]
    fn num_frames_never_exceeds_capacity() {
        let cache = FrameCache::new(3);
        for idx in 0..10 {
            if let FrameSlot::Miss(mut res) = cache.find_or_reserve(idx).unwrap() {
                populate(&mut res, idx, 0.0);
                res.commit();
            }
        }
        assert_eq!(cache.num_frames(), 3);
    }

    #[test]
    fn concurrent_same_frame_decodes_once() {
        const THREADS: usize = 8;
        let cache = FrameCache::new(4);
        let decodes = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    barrier.wait();
                    match cache.find_or_reserve(3).unwrap() {
                        FrameSlot::Miss(mut res) => {
                            decodes.fetch_add(1, Ordering::SeqCst);
                            populate(&mut res, 3, 9.5);
                            res.commit();
                        }
                        FrameSlot::Hit(hit) => {
                            assert_eq!(hit.frame().x[0], 9.5);
                        }
                    }
                });
            }
        });

        assert_eq!(decodes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.num_frames(), 1);
    }

    #[test]
    fn concurrent_distinct_frames_all_populate() {
        let cache = FrameCache::new(8);
        std::thread::scope(|scope| {
            for idx in 0..8usize {
                let cache = &cache;
                scope.spawn(move || match cache.find_or_reserve(idx).unwrap() {
                    FrameSlot::Miss(mut res) => {
                        populate(&mut res, idx, idx as f32);
                        res.commit();
                    }
                    FrameSlot::Hit(_) => panic!("distinct indices cannot collide"),
                });
            }
        });
        assert_eq!(cache.num_frames(), 8);
        for idx in 0..8usize {
            match cache.find_or_reserve(idx).unwrap() {
                FrameSlot::Hit(hit) => assert_eq!(hit.frame().x[0], idx as f32),
                FrameSlot::Miss(_) => panic!("frame {idx} lost"),
            }
        }
    }
}
