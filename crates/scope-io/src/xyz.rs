use std::fs;
use std::ops::Range;
use std::path::Path;

use scope_core::elements::{element_from_atom_name, mass_from_element};
use scope_core::{CoreError, CoreResult, FrameData, Molecule, StructureSet};

use crate::{MoleculeLoader, Trajectory, TrajectoryHeader, TrajectoryLoader};

pub struct XyzMoleculeLoader;

impl MoleculeLoader for XyzMoleculeLoader {
    fn load_molecule(&self, path: &Path, _arg: Option<&str>) -> CoreResult<Molecule> {
        let text = fs::read_to_string(path)?;
        let block = first_block(&text)?;
        let mut labels = Vec::new();
        let mut masses = Vec::new();
        for line in block.body_lines(&text) {
            let atom = parse_xyz_atom(line)?;
            masses.push(mass_from_element(&atom.element).unwrap_or(0.0));
            labels.push(atom.element);
        }
        if labels.is_empty() {
            return Err(CoreError::Parse("no atoms found in xyz".into()));
        }
        let structures = StructureSet::from_bonds(labels.len(), &[])?;
        Molecule::new(labels, masses, structures)
    }
}

pub struct XyzTrajectoryLoader;

impl TrajectoryLoader for XyzTrajectoryLoader {
    fn open_trajectory(&self, path: &Path) -> CoreResult<Box<dyn Trajectory>> {
        Ok(Box::new(XyzTrajectory::open(path)?))
    }
}

/// Multi-frame XYZ (also xmol and Tinker arc): repeated count/comment/atom
/// blocks. Frame byte ranges are indexed at open; decode parses one block.
pub struct XyzTrajectory {
    text: String,
    frames: Vec<Range<usize>>,
    n_atoms: usize,
    max_frame_size: usize,
}

impl XyzTrajectory {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut frames = Vec::new();
        let mut n_atoms = 0usize;
        let mut max_frame_size = 0usize;
        let mut cursor = 0usize;
        while cursor < text.len() {
            let rest = &text[cursor..];
            if rest.trim().is_empty() {
                break;
            }
            if rest.starts_with('\n') || rest.starts_with("\r\n") {
                cursor += 1;
                continue;
            }
            let block = first_block(rest)?;
            let count = block.n_atoms;
            if frames.is_empty() {
                n_atoms = count;
            } else if count != n_atoms {
                return Err(CoreError::Parse(format!(
                    "frame {} has {count} atoms, frame 0 has {n_atoms}",
                    frames.len()
                )));
            }
            let range = cursor..cursor + block.byte_len;
            max_frame_size = max_frame_size.max(range.len());
            frames.push(range);
            cursor += block.byte_len;
        }
        if n_atoms == 0 {
            return Err(CoreError::Parse("no atoms found in xyz".into()));
        }
        Ok(Self {
            text,
            frames,
            n_atoms,
            max_frame_size,
        })
    }
}

impl Trajectory for XyzTrajectory {
    fn num_atoms(&self) -> usize {
        self.n_atoms
    }

    fn num_frames(&self) -> usize {
        self.frames.len()
    }

    fn header(&self) -> TrajectoryHeader {
        TrajectoryHeader {
            num_frames: self.frames.len(),
            num_atoms: self.n_atoms,
            max_frame_size: self.max_frame_size,
            time_unit_ps: 0.0,
        }
    }

    fn fetch_frame(&self, idx: usize, out: Option<&mut Vec<u8>>) -> CoreResult<usize> {
        let range = self
            .frames
            .get(idx)
            .ok_or_else(|| CoreError::Invalid(format!("frame {idx} of {}", self.frames.len())))?
            .clone();
        if let Some(out) = out {
            out.clear();
            out.extend_from_slice(self.text[range.clone()].as_bytes());
        }
        Ok(range.len())
    }

    fn decode_frame(&self, data: &[u8], frame: &mut FrameData) -> CoreResult<()> {
        let block_text = std::str::from_utf8(data)
            .map_err(|_| CoreError::Parse("xyz frame blob is not utf-8".into()))?;
        let block = first_block(block_text)?;
        if block.n_atoms != self.n_atoms {
            return Err(CoreError::Parse(format!(
                "frame block has {} atoms, expected {}",
                block.n_atoms, self.n_atoms
            )));
        }
        frame.reset(self.n_atoms);
        for (i, line) in block.body_lines(block_text).enumerate() {
            let atom = parse_xyz_atom(line)?;
            frame.x[i] = atom.position[0];
            frame.y[i] = atom.position[1];
            frame.z[i] = atom.position[2];
        }
        Ok(())
    }
}

struct XyzBlock {
    n_atoms: usize,
    body_start: usize,
    byte_len: usize,
}

impl XyzBlock {
    fn body_lines<'a>(&self, text: &'a str) -> impl Iterator<Item = &'a str> {
        text[self.body_start..self.byte_len]
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(self.n_atoms)
    }
}

/// Measure one count/comment/atoms block at the start of `text`.
fn first_block(text: &str) -> CoreResult<XyzBlock> {
    let mut offset = 0usize;
    let mut lines = text.split_inclusive('\n');
    let count_line = lines
        .next()
        .ok_or_else(|| CoreError::Parse("xyz missing atom count".into()))?;
    offset += count_line.len();
    let n_atoms: usize = count_line
        .split_whitespace()
        .next()
        .unwrap_or("")
        .parse()
        .map_err(|_| CoreError::Parse(format!("invalid xyz count: {}", count_line.trim())))?;

    // Tinker xyz/arc has no comment line; its count line carries a title and
    // the next line is already an atom record.
    let mut body_start = offset;
    if let Some(line) = lines.next() {
        if parse_xyz_atom(line.trim_end()).is_err() {
            body_start = offset + line.len();
            offset = body_start;
        }
    }
    let mut consumed = 0usize;
    let mut byte_len = body_start;
    for line in text[body_start..].split_inclusive('\n') {
        if consumed == n_atoms {
            break;
        }
        byte_len += line.len();
        if !line.trim().is_empty() {
            consumed += 1;
        }
    }
    if consumed != n_atoms {
        return Err(CoreError::Parse(format!(
            "xyz block declares {n_atoms} atoms, found {consumed}"
        )));
    }
    Ok(XyzBlock {
        n_atoms,
        body_start,
        byte_len,
    })
}

struct XyzAtom {
    element: String,
    position: [f32; 3],
}

/// One atom record, either plain (`El x y z`) or Tinker style
/// (`idx El x y z type bonds...`).
fn parse_xyz_atom(line: &str) -> CoreResult<XyzAtom> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(CoreError::Parse(format!("bad xyz atom line: {line}")));
    }
    let tinker = parts[0].parse::<i64>().is_ok() && parts.len() >= 5;
    let base = if tinker { 1 } else { 0 };
    let raw = parts[base];
    let element = element_from_atom_name(raw)
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string());
    let x = parse_float(parts[base + 1])?;
    let y = parse_float(parts[base + 2])?;
    let z = parse_float(parts[base + 3])?;
    Ok(XyzAtom {
        element,
        position: [x, y, z],
    })
}

fn parse_float(token: &str) -> CoreResult<f32> {
    token
        .parse::<f32>()
        .map_err(|_| CoreError::Parse(format!("invalid xyz coordinate: {token}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn molecule_reads_first_frame() {
        let file = write_temp(".xyz", "2\ncomment\nC 0.0 0.0 0.0\nO 1.0 0.0 0.0\n");
        let mol = XyzMoleculeLoader.load_molecule(file.path(), None).unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.labels()[1], "O");
        assert_eq!(mol.structures().count(), 2);
    }

    #[test]
    fn trajectory_indexes_repeated_blocks() {
        let file = write_temp(
            ".xyz",
            "1\nframe 0\nC 0.0 0.0 0.0\n1\nframe 1\nC 1.5 0.0 0.0\n",
        );
        let traj = XyzTrajectory::open(file.path()).unwrap();
        assert_eq!(traj.num_frames(), 2);
        let mut frame = FrameData::default();
        traj.load_frame(1, &mut frame).unwrap();
        assert!((frame.x[0] - 1.5).abs() < 1e-6);
        assert!(!frame.header.cell.is_set());
    }

    #[test]
    fn tinker_arc_records_parse() {
        let file = write_temp(
            ".arc",
            "2 water dimer\n1 O 0.0 0.0 0.0 1 2\n2 H 0.95 0.0 0.0 2 1\n",
        );
        let traj = XyzTrajectory::open(file.path()).unwrap();
        assert_eq!(traj.num_atoms(), 2);
        let mol = XyzMoleculeLoader.load_molecule(file.path(), None).unwrap();
        assert_eq!(mol.labels()[0], "O");
        assert!((mol.masses()[1] - 1.008).abs() < 1e-4);
    }

    #[test]
    fn inconsistent_frame_sizes_fail_open() {
        let file = write_temp(
            ".xyz",
            "1\nframe 0\nC 0.0 0.0 0.0\n2\nframe 1\nC 1.0 0.0 0.0\nO 2.0 0.0 0.0\n",
        );
        assert!(XyzTrajectory::open(file.path()).is_err());
    }

    #[test]
    fn truncated_block_fails() {
        let file = write_temp(".xyz", "3\ncomment\nC 0.0 0.0 0.0\n");
        assert!(XyzTrajectory::open(file.path()).is_err());
    }
}
