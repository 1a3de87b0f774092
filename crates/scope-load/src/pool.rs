//! Table of open trajectories, owned by whoever drives the access layer
//! (one per application context). Handles are opaque integers; lookups are a
//! linear scan over at most eight entries. Open and close take `&mut self`
//! and are therefore serialized by the borrow; reconfiguration goes through
//! the entry's own synchronization and works from `&self`.

use std::path::Path;
use std::sync::Arc;

use scope_core::{AtomMask, FrameData, Molecule};
use scope_io::{Trajectory, TrajectoryLoader};
use tracing::{debug, error};

use crate::config::{cache_capacity, physical_ram_bytes, CacheBudget};
use crate::error::{LoadError, LoadResult};
use crate::registry::{extension_of, traj_loader_from_ext};
use crate::traj::CachedTrajectory;

pub const MAX_OPEN_TRAJECTORIES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrajHandle(u64);

impl std::fmt::Display for TrajHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct PoolEntry {
    handle: TrajHandle,
    traj: Arc<CachedTrajectory>,
}

pub struct TrajectoryPool {
    entries: Vec<PoolEntry>,
    next_handle: u64,
    budget: CacheBudget,
    physical_ram: u64,
}

impl Default for TrajectoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TrajectoryPool {
    pub fn new() -> Self {
        Self::with_budget(CacheBudget::default())
    }

    pub fn with_budget(budget: CacheBudget) -> Self {
        Self {
            entries: Vec::with_capacity(MAX_OPEN_TRAJECTORIES),
            next_handle: 1,
            budget,
            physical_ram: physical_ram_bytes(),
        }
    }

    /// Open `path` as a cached trajectory bound to `molecule`. With no
    /// explicit loader the registry picks one by extension. The backend must
    /// agree with the molecule on the atom count, and at most
    /// `MAX_OPEN_TRAJECTORIES` trajectories can be open at once.
    pub fn open_file(
        &mut self,
        path: &Path,
        loader: Option<&dyn TrajectoryLoader>,
        molecule: &Arc<Molecule>,
    ) -> LoadResult<TrajHandle> {
        if self.entries.len() >= MAX_OPEN_TRAJECTORIES {
            return Err(LoadError::CapacityExceeded);
        }

        let loader = match loader {
            Some(loader) => loader,
            None => extension_of(path)
                .and_then(traj_loader_from_ext)
                .ok_or_else(|| {
                    LoadError::UnsupportedExtension(path.display().to_string())
                })?,
        };

        let backend = loader
            .open_trajectory(path)
            .map_err(|source| LoadError::BackendCreateFailed {
                path: path.to_path_buf(),
                source,
            })?;

        if backend.num_atoms() != molecule.atom_count() {
            return Err(LoadError::TopologyMismatch {
                trajectory: backend.num_atoms(),
                molecule: molecule.atom_count(),
            });
        }

        let capacity = cache_capacity(
            backend.num_frames(),
            molecule.atom_count(),
            self.budget.bytes(),
            self.physical_ram,
        );
        debug!(capacity, frames = backend.num_frames(), "initializing frame cache");

        let handle = TrajHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(PoolEntry {
            handle,
            traj: Arc::new(CachedTrajectory::new(backend, molecule.clone(), capacity)),
        });
        Ok(handle)
    }

    /// Close a trajectory, releasing its cache and backend. Swap-remove
    /// keeps the table dense.
    pub fn close(&mut self, handle: TrajHandle) -> LoadResult<()> {
        match self.entries.iter().position(|e| e.handle == handle) {
            Some(pos) => {
                self.entries.swap_remove(pos);
                Ok(())
            }
            None => {
                error!(%handle, "close on a trajectory this pool does not own");
                Err(LoadError::UnknownHandle(handle.0))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cached trajectory behind a handle, usable anywhere a backend
    /// trajectory is.
    pub fn get(&self, handle: TrajHandle) -> Option<&Arc<CachedTrajectory>> {
        self.entries
            .iter()
            .find(|e| e.handle == handle)
            .map(|e| &e.traj)
    }

    fn lookup(&self, handle: TrajHandle) -> LoadResult<&Arc<CachedTrajectory>> {
        self.get(handle).ok_or_else(|| {
            error!(%handle, "operation on a trajectory this pool does not own");
            LoadError::UnknownHandle(handle.0)
        })
    }

    pub fn set_recenter_target(
        &self,
        handle: TrajHandle,
        mask: Option<&AtomMask>,
    ) -> LoadResult<()> {
        self.lookup(handle)?
            .set_recenter_target(mask)
            .map_err(LoadError::Core)
    }

    pub fn set_deperiodize(&self, handle: TrajHandle, on: bool) -> LoadResult<()> {
        self.lookup(handle)?.set_deperiodize(on);
        Ok(())
    }

    pub fn clear_cache(&self, handle: TrajHandle) -> LoadResult<()> {
        self.lookup(handle)?.clear_cache();
        Ok(())
    }

    pub fn num_cache_frames(&self, handle: TrajHandle) -> LoadResult<usize> {
        Ok(self.lookup(handle)?.num_cache_frames())
    }

    /// Load one frame through the cache by handle.
    pub fn load_frame(
        &self,
        handle: TrajHandle,
        idx: usize,
        frame: &mut FrameData,
    ) -> LoadResult<()> {
        self.lookup(handle)?
            .load_frame(idx, frame)
            .map_err(LoadError::DecodeFailed)
    }
}
