pub mod gro;
pub mod lammps;
pub mod mmcif;
pub mod pdb;
pub mod xdr;
pub mod xyz;

use std::path::Path;

use scope_core::{CoreResult, FrameData, Molecule};

/// Outcome of a molecule backend's pre-open probe on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    /// Backend can open the file as-is.
    Ready,
    /// Backend sniffed an argument it wants passed back to `load_molecule`
    /// (e.g. the LAMMPS atom style).
    Arg(String),
    /// The file is ambiguous; the caller must ask the user before opening.
    NeedsDialogue,
}

pub trait MoleculeLoader: Send + Sync {
    /// Parse a topology file into a molecule. `arg` is the backend-specific
    /// hint a preflight recorded, if any.
    fn load_molecule(&self, path: &Path, arg: Option<&str>) -> CoreResult<Molecule>;

    /// Cheap probe run before committing to a load. Backends without
    /// ambiguity keep the default.
    fn preflight(&self, _path: &Path) -> CoreResult<Preflight> {
        Ok(Preflight::Ready)
    }
}

pub trait TrajectoryLoader: Send + Sync {
    fn open_trajectory(&self, path: &Path) -> CoreResult<Box<dyn Trajectory>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrajectoryHeader {
    pub num_frames: usize,
    pub num_atoms: usize,
    /// Upper bound on the blob size `fetch_frame` produces for any frame.
    pub max_frame_size: usize,
    /// Time per reported timestamp unit in picoseconds; 0 when unknown.
    pub time_unit_ps: f64,
}

/// Capability set every trajectory implementor exposes. The cached wrapper in
/// the access layer implements the same trait, so callers cannot tell a
/// backend from a wrapped backend.
pub trait Trajectory: Send + Sync {
    fn num_atoms(&self) -> usize;

    fn num_frames(&self) -> usize;

    fn header(&self) -> TrajectoryHeader;

    /// Two-phase frame fetch. With `out == None` returns the byte size of
    /// frame `idx`'s raw blob; with `Some`, clears and fills the buffer and
    /// returns the bytes written. The blob is only meaningful to this
    /// implementor's `decode_frame`.
    fn fetch_frame(&self, idx: usize, out: Option<&mut Vec<u8>>) -> CoreResult<usize>;

    /// Decode a blob produced by `fetch_frame`, resizing `frame` to this
    /// trajectory's atom count.
    fn decode_frame(&self, data: &[u8], frame: &mut FrameData) -> CoreResult<()>;

    /// Convenience wrapper: fetch then decode.
    fn load_frame(&self, idx: usize, frame: &mut FrameData) -> CoreResult<()> {
        let size = self.fetch_frame(idx, None)?;
        let mut blob = Vec::with_capacity(size);
        self.fetch_frame(idx, Some(&mut blob))?;
        self.decode_frame(&blob, frame)
    }
}

/// Write the 8-byte little-endian frame-index blob used by trajectories that
/// stream by index rather than by raw bytes; returns the blob size.
pub fn index_blob(idx: usize, out: Option<&mut Vec<u8>>) -> usize {
    if let Some(out) = out {
        out.clear();
        out.extend_from_slice(&(idx as u64).to_le_bytes());
    }
    std::mem::size_of::<u64>()
}

/// Read back a blob produced by [`index_blob`].
pub fn index_from_blob(data: &[u8]) -> CoreResult<u64> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| scope_core::CoreError::Invalid(format!("frame blob of {} bytes", data.len())))?;
    Ok(u64::from_le_bytes(bytes))
}
