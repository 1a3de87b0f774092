//! The cached trajectory: a `Trajectory` implementor wrapping another one.
//! Frame fetches stream an 8-byte frame index as the blob; decode goes
//! through the frame cache, pulling the backend and applying the configured
//! post-decode transforms only on a miss. Because the wrapper exposes the
//! same capability set as a backend, callers cannot tell the two apart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use scope_core::{apply_frame_transforms, AtomMask, CoreError, CoreResult, FrameData, Molecule};
use scope_io::{Trajectory, TrajectoryHeader};

use crate::cache::{FrameCache, FrameSlot};

pub struct CachedTrajectory {
    backend: Box<dyn Trajectory>,
    molecule: Arc<Molecule>,
    cache: FrameCache,
    recenter: RwLock<AtomMask>,
    deperiodize: AtomicBool,
}

impl CachedTrajectory {
    pub fn new(
        backend: Box<dyn Trajectory>,
        molecule: Arc<Molecule>,
        cache_capacity: usize,
    ) -> Self {
        let mask = AtomMask::new(molecule.atom_count());
        Self {
            backend,
            molecule,
            cache: FrameCache::new(cache_capacity),
            recenter: RwLock::new(mask),
            deperiodize: AtomicBool::new(false),
        }
    }

    pub fn molecule(&self) -> &Arc<Molecule> {
        &self.molecule
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn num_cache_frames(&self) -> usize {
        self.cache.num_frames()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Select the atom subset whose center-of-mass is moved to the box
    /// center (origin without a cell); `None` disables recentering. A
    /// changed target invalidates the cache, otherwise later reads would mix
    /// frames transformed under different targets.
    pub fn set_recenter_target(&self, mask: Option<&AtomMask>) -> CoreResult<()> {
        let new = match mask {
            Some(mask) => {
                if mask.len() != self.molecule.atom_count() {
                    return Err(CoreError::Mismatch(format!(
                        "recenter mask covers {} atoms, molecule has {}",
                        mask.len(),
                        self.molecule.atom_count()
                    )));
                }
                mask.clone()
            }
            None => AtomMask::new(self.molecule.atom_count()),
        };
        let mut current = self
            .recenter
            .write()
            .map_err(|_| CoreError::Invalid("recenter mask lock poisoned".into()))?;
        if *current != new {
            *current = new;
            drop(current);
            self.cache.clear();
        }
        Ok(())
    }

    /// Toggle unwrapping of bonded structures across periodic boundaries.
    /// Flipping the flag invalidates the cache.
    pub fn set_deperiodize(&self, on: bool) {
        if self.deperiodize.swap(on, Ordering::AcqRel) != on {
            self.cache.clear();
        }
    }

    pub fn deperiodize(&self) -> bool {
        self.deperiodize.load(Ordering::Acquire)
    }

    fn check_bounds(&self, idx: usize) -> CoreResult<()> {
        let n = self.backend.num_frames();
        if idx >= n {
            return Err(CoreError::Invalid(format!("frame {idx} of {n}")));
        }
        Ok(())
    }

    fn decode_into_slot(&self, idx: usize, frame: &mut FrameData) -> CoreResult<()> {
        let size = self.backend.fetch_frame(idx, None)?;
        let mut scratch = Vec::with_capacity(size);
        self.backend.fetch_frame(idx, Some(&mut scratch))?;
        self.backend.decode_frame(&scratch, frame)?;

        let mask = self
            .recenter
            .read()
            .map_err(|_| CoreError::Invalid("recenter mask lock poisoned".into()))?;
        apply_frame_transforms(frame, &self.molecule, &mask, self.deperiodize())
    }
}

impl Trajectory for CachedTrajectory {
    fn num_atoms(&self) -> usize {
        self.backend.num_atoms()
    }

    fn num_frames(&self) -> usize {
        self.backend.num_frames()
    }

    fn header(&self) -> TrajectoryHeader {
        self.backend.header()
    }

    fn fetch_frame(&self, idx: usize, out: Option<&mut Vec<u8>>) -> CoreResult<usize> {
        self.check_bounds(idx)?;
        Ok(scope_io::index_blob(idx, out))
    }

    fn decode_frame(&self, data: &[u8], out: &mut FrameData) -> CoreResult<()> {
        let idx = scope_io::index_from_blob(data)? as usize;
        self.check_bounds(idx)?;

        match self.cache.find_or_reserve(idx)? {
            FrameSlot::Hit(hit) => {
                out.clone_from(hit.frame());
                Ok(())
            }
            FrameSlot::Miss(mut reservation) => {
                // Any failure drops the reservation, which clears it so the
                // decode can be retried by a later call.
                self.decode_into_slot(idx, reservation.frame_mut())?;
                out.clone_from(reservation.frame());
                reservation.commit();
                Ok(())
            }
        }
    }
}
