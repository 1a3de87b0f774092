pub mod cache;
pub mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod state;
pub mod traj;

pub use scope_core::{AtomMask, FrameData, FrameHeader, Molecule, UnitCell};

pub use cache::{FrameCache, FrameSlot};
pub use config::{CacheBudget, DEFAULT_FRAME_CACHE_MB};
pub use error::{LoadError, LoadResult};
pub use pool::{TrajHandle, TrajectoryPool, MAX_OPEN_TRAJECTORIES};
pub use state::{LoaderFlags, LoaderState};
pub use traj::CachedTrajectory;
