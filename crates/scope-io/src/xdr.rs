//! GROMACS XTC/TRR trajectories through the `xdrfile` crate. The library
//! reads sequentially from the file handle, so open makes one indexing pass
//! to record the byte offset of every frame; random access then seeks before
//! reading. `fetch_frame` hands out the frame index as the blob (the library
//! cannot decode from a caller-supplied buffer), and `decode_frame` does the
//! seek + read under the reader mutex.

use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use xdrfile::{Frame, Trajectory as XdrRead, TRRTrajectory, XTCTrajectory};

use scope_core::{CoreError, CoreResult, FrameData, UnitCell};

use crate::{index_blob, index_from_blob, Trajectory, TrajectoryHeader, TrajectoryLoader};

const NM_TO_ANGSTROM: f32 = 10.0;

pub struct XtcTrajectoryLoader;

impl TrajectoryLoader for XtcTrajectoryLoader {
    fn open_trajectory(&self, path: &Path) -> CoreResult<Box<dyn Trajectory>> {
        let reader = XTCTrajectory::open_read(path).map_err(map_xdr_err)?;
        Ok(Box::new(XdrTrajectory::index(reader)?))
    }
}

pub struct TrrTrajectoryLoader;

impl TrajectoryLoader for TrrTrajectoryLoader {
    fn open_trajectory(&self, path: &Path) -> CoreResult<Box<dyn Trajectory>> {
        let reader = TRRTrajectory::open_read(path).map_err(map_xdr_err)?;
        Ok(Box::new(XdrTrajectory::index(reader)?))
    }
}

struct XdrState<T> {
    reader: T,
    frame: Frame,
    /// Frame the reader will yield next without seeking.
    next_index: Option<usize>,
}

// SAFETY: the wrapped XDR handle is a plain C file stream; it is only ever
// touched while holding the surrounding mutex, never concurrently.
unsafe impl<T: XdrRead + Seek> Send for XdrState<T> {}

pub struct XdrTrajectory<T: XdrRead + Seek> {
    state: Mutex<XdrState<T>>,
    offsets: Vec<u64>,
    n_atoms: usize,
}

impl<T: XdrRead + Seek> XdrTrajectory<T> {
    /// Index the stream: one sequential pass recording where every frame
    /// starts, validating a constant atom count.
    fn index(mut reader: T) -> CoreResult<Self> {
        let n_atoms = reader.get_num_atoms().map_err(map_xdr_err)?;
        if n_atoms == 0 {
            return Err(CoreError::Parse("trajectory reports zero atoms".into()));
        }
        let mut frame = Frame::with_len(n_atoms);
        let mut offsets = Vec::new();
        loop {
            let pos = reader.stream_position()?;
            match reader.read(&mut frame) {
                Ok(()) => offsets.push(pos),
                Err(err) => {
                    if err.is_eof() {
                        break;
                    }
                    return Err(map_xdr_err(err));
                }
            }
        }
        if offsets.is_empty() {
            return Err(CoreError::Parse("trajectory contains no frames".into()));
        }
        Ok(Self {
            state: Mutex::new(XdrState {
                reader,
                frame,
                next_index: None,
            }),
            offsets,
            n_atoms,
        })
    }
}

impl<T: XdrRead + Seek + 'static> Trajectory for XdrTrajectory<T> {
    fn num_atoms(&self) -> usize {
        self.n_atoms
    }

    fn num_frames(&self) -> usize {
        self.offsets.len()
    }

    fn header(&self) -> TrajectoryHeader {
        TrajectoryHeader {
            num_frames: self.offsets.len(),
            num_atoms: self.n_atoms,
            max_frame_size: std::mem::size_of::<u64>(),
            time_unit_ps: 1.0,
        }
    }

    fn fetch_frame(&self, idx: usize, out: Option<&mut Vec<u8>>) -> CoreResult<usize> {
        if idx >= self.offsets.len() {
            return Err(CoreError::Invalid(format!(
                "frame {idx} of {}",
                self.offsets.len()
            )));
        }
        Ok(index_blob(idx, out))
    }

    fn decode_frame(&self, data: &[u8], out: &mut FrameData) -> CoreResult<()> {
        let idx = index_from_blob(data)? as usize;
        let offset = *self
            .offsets
            .get(idx)
            .ok_or_else(|| CoreError::Invalid(format!("frame {idx} of {}", self.offsets.len())))?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| CoreError::Invalid("xdr reader lock poisoned".into()))?;
        let XdrState {
            reader,
            frame,
            next_index,
        } = &mut *state;
        if *next_index != Some(idx) {
            reader.seek(SeekFrom::Start(offset))?;
        }
        *next_index = None;
        reader.read(frame).map_err(map_xdr_err)?;
        *next_index = Some(idx + 1);

        if frame.coords.len() != self.n_atoms {
            return Err(CoreError::Mismatch(format!(
                "frame {idx} has {} atoms, trajectory has {}",
                frame.coords.len(),
                self.n_atoms
            )));
        }

        out.reset(self.n_atoms);
        out.header.step = frame.step as i64;
        out.header.timestamp = frame.time as f64;
        out.header.cell = cell_from_box(frame.box_vector);
        for (i, src) in frame.coords.iter().enumerate() {
            out.x[i] = src[0] * NM_TO_ANGSTROM;
            out.y[i] = src[1] * NM_TO_ANGSTROM;
            out.z[i] = src[2] * NM_TO_ANGSTROM;
        }
        Ok(())
    }
}

fn cell_from_box(box_vec: [[f32; 3]; 3]) -> UnitCell {
    let mut basis = [[0.0f32; 3]; 3];
    for (row, src) in basis.iter_mut().zip(box_vec.iter()) {
        for (dst, v) in row.iter_mut().zip(src.iter()) {
            *dst = v * NM_TO_ANGSTROM;
        }
    }
    UnitCell::from_basis(basis)
}

fn map_xdr_err(err: xdrfile::Error) -> CoreError {
    CoreError::Parse(format!("xdr error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use xdrfile::FileMode;

    fn write_two_frame_xtc(path: &std::path::Path) {
        let mut traj = XTCTrajectory::open(path, FileMode::Write).unwrap();
        let mut frame = Frame::with_len(2);
        frame.step = 0;
        frame.time = 0.0;
        frame.box_vector = [[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0]];
        frame.coords[0] = [0.1, 0.2, 0.3];
        frame.coords[1] = [0.4, 0.5, 0.6];
        traj.write(&frame).unwrap();
        frame.step = 10;
        frame.time = 2.0;
        frame.coords[0] = [0.7, 0.8, 0.9];
        traj.write(&frame).unwrap();
        traj.flush().unwrap();
    }

    #[test]
    fn xtc_indexes_and_reads_out_of_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.xtc");
        write_two_frame_xtc(&path);

        let traj = XtcTrajectoryLoader.open_trajectory(&path).unwrap();
        assert_eq!(traj.num_frames(), 2);
        assert_eq!(traj.num_atoms(), 2);

        let mut frame = FrameData::default();
        traj.load_frame(1, &mut frame).unwrap();
        assert_eq!(frame.header.step, 10);
        assert!((frame.x[0] - 7.0).abs() < 1e-3);

        traj.load_frame(0, &mut frame).unwrap();
        assert_eq!(frame.header.step, 0);
        assert!((frame.x[0] - 1.0).abs() < 1e-3);
        assert_eq!(
            frame.header.cell,
            UnitCell::orthorhombic(10.0, 20.0, 30.0)
        );
    }

    #[test]
    fn fetch_blob_is_the_frame_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob.xtc");
        write_two_frame_xtc(&path);
        let traj = XtcTrajectoryLoader.open_trajectory(&path).unwrap();

        let size = traj.fetch_frame(1, None).unwrap();
        assert_eq!(size, 8);
        let mut blob = Vec::new();
        traj.fetch_frame(1, Some(&mut blob)).unwrap();
        assert_eq!(u64::from_le_bytes(blob.as_slice().try_into().unwrap()), 1);
        assert!(traj.fetch_frame(2, None).is_err());
    }

    #[test]
    fn trr_round_trips_through_loader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.trr");
        let mut traj = TRRTrajectory::open(&path, FileMode::Write).unwrap();
        let mut frame = Frame::with_len(1);
        frame.step = 3;
        frame.time = 1.5;
        frame.box_vector = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        frame.coords[0] = [0.25, 0.5, 0.75];
        traj.write(&frame).unwrap();
        traj.flush().unwrap();

        let opened = TrrTrajectoryLoader.open_trajectory(&path).unwrap();
        assert_eq!(opened.num_frames(), 1);
        let mut out = FrameData::default();
        opened.load_frame(0, &mut out).unwrap();
        assert!((out.x[0] - 2.5).abs() < 1e-4);
        assert!((out.header.timestamp - 1.5).abs() < 1e-6);
    }

    #[test]
    fn decode_rejects_malformed_blob() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.xtc");
        write_two_frame_xtc(&path);
        let traj = XtcTrajectoryLoader.open_trajectory(&path).unwrap();
        let mut out = FrameData::default();
        assert!(traj.decode_frame(&[1, 2, 3], &mut out).is_err());
        let huge = u64::MAX.to_le_bytes();
        assert!(traj.decode_frame(&huge, &mut out).is_err());
    }
}
