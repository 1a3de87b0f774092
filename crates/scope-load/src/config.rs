use serde::{Deserialize, Serialize};

/// Default frame-cache budget in MiB. The effective budget is clamped at
/// runtime to `[4 MiB, physical_ram / 4]`.
pub const DEFAULT_FRAME_CACHE_MB: u64 = 512;

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CacheBudget {
    #[serde(default = "default_cache_mb")]
    pub size_mb: u64,
}

fn default_cache_mb() -> u64 {
    DEFAULT_FRAME_CACHE_MB
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            size_mb: DEFAULT_FRAME_CACHE_MB,
        }
    }
}

impl CacheBudget {
    pub fn bytes(&self) -> u64 {
        self.size_mb.saturating_mul(MIB)
    }
}

/// Number of cache slots for a trajectory: bounded by the frame count and by
/// how many approximate frames fit in the clamped budget, never below one.
pub fn cache_capacity(
    num_frames: usize,
    num_atoms: usize,
    budget_bytes: u64,
    physical_ram: u64,
) -> usize {
    let floor = 4 * MIB;
    let ceil = (physical_ram / 4).max(floor);
    let available = budget_bytes.clamp(floor, ceil);
    let approx_frame_bytes = (num_atoms as u64) * 3 * std::mem::size_of::<f32>() as u64;
    let budget_frames = if approx_frame_bytes == 0 {
        num_frames
    } else {
        (available / approx_frame_bytes) as usize
    };
    num_frames.min(budget_frames).max(1)
}

pub fn physical_ram_bytes() -> u64 {
    use sysinfo::{MemoryRefreshKind, RefreshKind, System};
    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
    );
    sys.total_memory()
}
