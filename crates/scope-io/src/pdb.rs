use std::fs;
use std::ops::Range;
use std::path::Path;

use fxhash::FxHashMap;
use scope_core::elements::{element_from_atom_name, mass_from_element};
use scope_core::{CoreError, CoreResult, FrameData, Molecule, StructureSet, UnitCell};

use crate::{MoleculeLoader, Trajectory, TrajectoryHeader, TrajectoryLoader};

pub struct PdbMoleculeLoader;

impl MoleculeLoader for PdbMoleculeLoader {
    fn load_molecule(&self, path: &Path, _arg: Option<&str>) -> CoreResult<Molecule> {
        let text = fs::read_to_string(path)?;
        let mut labels = Vec::new();
        let mut masses = Vec::new();
        let mut serial_to_index = FxHashMap::default();
        let mut bonds = Vec::new();
        let mut models_seen = 0usize;

        for line in text.lines() {
            if line.starts_with("MODEL") {
                models_seen += 1;
                continue;
            }
            // Topology comes from the first model; CONECT records after the
            // last ENDMDL still apply.
            let in_later_model = models_seen > 1;
            if !in_later_model {
                if let Some(atom) = parse_atom_line(line)? {
                    if let Ok(serial) = slice_trim(line, 6, 11).parse::<usize>() {
                        serial_to_index.insert(serial, labels.len());
                    }
                    masses.push(atom.mass);
                    labels.push(atom.name);
                    continue;
                }
            }
            if line.starts_with("CONECT") {
                parse_conect_line(line, &serial_to_index, &mut bonds);
            }
        }

        if labels.is_empty() {
            return Err(CoreError::Parse("no atoms found in pdb".into()));
        }
        let structures = StructureSet::from_bonds(labels.len(), &bonds)?;
        Molecule::new(labels, masses, structures)
    }
}

pub struct PdbTrajectoryLoader;

impl TrajectoryLoader for PdbTrajectoryLoader {
    fn open_trajectory(&self, path: &Path) -> CoreResult<Box<dyn Trajectory>> {
        Ok(Box::new(PdbTrajectory::open(path)?))
    }
}

/// PDB as a trajectory: one frame per MODEL block (the whole file when no
/// MODEL records are present). Frames are indexed as byte ranges at open;
/// `fetch_frame` hands out the raw text block and `decode_frame` parses it.
pub struct PdbTrajectory {
    text: String,
    frames: Vec<Range<usize>>,
    n_atoms: usize,
    cell: UnitCell,
    max_frame_size: usize,
}

impl PdbTrajectory {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut cell = UnitCell::None;
        let mut frames: Vec<Range<usize>> = Vec::new();
        let mut block_start: Option<usize> = None;

        let mut offset = 0usize;
        for line in text.split_inclusive('\n') {
            let start = offset;
            offset += line.len();
            let line = line.trim_end();
            if line.starts_with("CRYST1") {
                cell = parse_cryst1(line);
            } else if line.starts_with("MODEL") {
                block_start = Some(start);
            } else if line.starts_with("ENDMDL") {
                if let Some(s) = block_start.take() {
                    frames.push(s..offset);
                }
            }
        }
        if frames.is_empty() {
            // No MODEL records: the file is a single frame.
            frames.push(0..text.len());
        }

        let mut n_atoms = 0usize;
        let mut max_frame_size = 0usize;
        for (i, range) in frames.iter().enumerate() {
            let count = count_atom_lines(&text[range.clone()])?;
            if i == 0 {
                n_atoms = count;
            } else if count != n_atoms {
                return Err(CoreError::Parse(format!(
                    "frame {i} has {count} atoms, frame 0 has {n_atoms}"
                )));
            }
            max_frame_size = max_frame_size.max(range.len());
        }
        if n_atoms == 0 {
            return Err(CoreError::Parse("no atoms found in pdb".into()));
        }

        Ok(Self {
            text,
            frames,
            n_atoms,
            cell,
            max_frame_size,
        })
    }
}

impl Trajectory for PdbTrajectory {
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
        let block = std::str::from_utf8(data)
            .map_err(|_| CoreError::Parse("pdb frame blob is not utf-8".into()))?;
        frame.reset(self.n_atoms);
        frame.header.cell = self.cell;

        let mut count = 0usize;
        for line in block.lines() {
            if line.starts_with("MODEL") {
                if let Ok(step) = slice_trim(line, 6, line.len().min(14)).parse::<i64>() {
                    frame.header.step = step;
                }
                continue;
            }
            if let Some(atom) = parse_atom_line(line)? {
                if count >= self.n_atoms {
                    return Err(CoreError::Parse(format!(
                        "frame block has more than {} atoms",
                        self.n_atoms
                    )));
                }
                frame.x[count] = atom.position[0];
                frame.y[count] = atom.position[1];
                frame.z[count] = atom.position[2];
                count += 1;
            }
        }
        if count != self.n_atoms {
            return Err(CoreError::Parse(format!(
                "frame block has {count} atoms, expected {}",
                self.n_atoms
            )));
        }
        Ok(())
    }
}

struct ParsedAtom {
    name: String,
    mass: f32,
    position: [f32; 3],
}

fn parse_atom_line(line: &str) -> CoreResult<Option<ParsedAtom>> {
    if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
        return Ok(None);
    }
    let alt_loc = line.chars().nth(16).unwrap_or(' ');
    if alt_loc != ' ' && alt_loc != 'A' {
        return Ok(None);
    }
    let name = slice_trim(line, 12, 16).to_string();
    let x = parse_float(slice_trim(line, 30, 38), "x")?;
    let y = parse_float(slice_trim(line, 38, 46), "y")?;
    let z = parse_float(slice_trim(line, 46, 54), "z")?;
    let element = {
        let col = slice_trim(line, 76, 78);
        if col.is_empty() {
            element_from_atom_name(&name).unwrap_or("C").to_string()
        } else {
            col.to_string()
        }
    };
    let mass = mass_from_element(&element).unwrap_or(0.0);
    Ok(Some(ParsedAtom {
        name,
        mass,
        position: [x, y, z],
    }))
}

fn parse_conect_line(
    line: &str,
    serial_to_index: &FxHashMap<usize, usize>,
    bonds: &mut Vec<(usize, usize)>,
) {
    let lookup = |serial: usize| serial_to_index.get(&serial).copied();
    let from = match slice_trim(line, 6, 11).parse::<usize>().ok().and_then(lookup) {
        Some(idx) => idx,
        None => return,
    };
    for col in 0..4 {
        let start = 11 + col * 5;
        if let Some(to) = slice_trim(line, start, start + 5)
            .parse::<usize>()
            .ok()
            .and_then(lookup)
        {
            if from < to {
                bonds.push((from, to));
            }
        }
    }
}

fn count_atom_lines(block: &str) -> CoreResult<usize> {
    let mut count = 0;
    for line in block.lines() {
        if parse_atom_line(line)?.is_some() {
            count += 1;
        }
    }
    Ok(count)
}

/// CRYST1 cell parameters to a basis. The all-ones placeholder many tools
/// emit for non-periodic structures maps to no cell.
fn parse_cryst1(line: &str) -> UnitCell {
    let a = slice_trim(line, 6, 15).parse::<f32>().unwrap_or(0.0);
    let b = slice_trim(line, 15, 24).parse::<f32>().unwrap_or(0.0);
    let c = slice_trim(line, 24, 33).parse::<f32>().unwrap_or(0.0);
    let alpha = slice_trim(line, 33, 40).parse::<f32>().unwrap_or(90.0);
    let beta = slice_trim(line, 40, 47).parse::<f32>().unwrap_or(90.0);
    let gamma = slice_trim(line, 47, 54).parse::<f32>().unwrap_or(90.0);
    if a <= 0.0 || b <= 0.0 || c <= 0.0 {
        return UnitCell::None;
    }
    if (a - 1.0).abs() < 1e-6 && (b - 1.0).abs() < 1e-6 && (c - 1.0).abs() < 1e-6 {
        return UnitCell::None;
    }
    let (ca, cb, cg) = (
        alpha.to_radians().cos(),
        beta.to_radians().cos(),
        gamma.to_radians().cos(),
    );
    let sg = gamma.to_radians().sin();
    if sg.abs() < 1e-6 {
        return UnitCell::None;
    }
    let bx = b * cg;
    let by = b * sg;
    let cx = c * cb;
    let cy = c * (ca - cb * cg) / sg;
    let cz = (c * c - cx * cx - cy * cy).max(0.0).sqrt();
    UnitCell::from_basis([[a, 0.0, 0.0], [bx, by, 0.0], [cx, cy, cz]])
}

fn slice_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_float(token: &str, label: &str) -> CoreResult<f32> {
    token
        .parse::<f32>()
        .map_err(|_| CoreError::Parse(format!("invalid {label} coordinate: {token}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".pdb").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const TWO_ATOMS: &str = "\
ATOM      1  C   MOL A   1       0.000   0.000   0.000           C
ATOM      2  O   MOL A   1       1.000   0.000   0.000           O
CONECT    1    2
END
";

    #[test]
    fn molecule_reads_atoms_and_conect() {
        let file = write_temp(TWO_ATOMS);
        let mol = PdbMoleculeLoader.load_molecule(file.path(), None).unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert!((mol.masses()[0] - 12.011).abs() < 1e-4);
        assert_eq!(mol.structures().count(), 1);
        assert_eq!(mol.structures().structure(0), &[0, 1]);
    }

    #[test]
    fn trajectory_splits_models_into_frames() {
        let file = write_temp(
            "CRYST1   10.000   10.000   10.000  90.00  90.00  90.00 P 1           1\n\
MODEL        1\n\
ATOM      1  C   MOL A   1       1.000   2.000   3.000           C\n\
ENDMDL\n\
MODEL        2\n\
ATOM      1  C   MOL A   1       4.000   5.000   6.000           C\n\
ENDMDL\n\
END\n",
        );
        let traj = PdbTrajectory::open(file.path()).unwrap();
        assert_eq!(traj.num_frames(), 2);
        assert_eq!(traj.num_atoms(), 1);

        let mut frame = FrameData::default();
        traj.load_frame(1, &mut frame).unwrap();
        assert_eq!(frame.header.step, 2);
        assert!((frame.x[0] - 4.0).abs() < 1e-6);
        assert_eq!(
            frame.header.cell,
            UnitCell::orthorhombic(10.0, 10.0, 10.0)
        );
    }

    #[test]
    fn trajectory_without_models_is_single_frame() {
        let file = write_temp(TWO_ATOMS);
        let traj = PdbTrajectory::open(file.path()).unwrap();
        assert_eq!(traj.num_frames(), 1);
        assert_eq!(traj.num_atoms(), 2);
        let mut frame = FrameData::default();
        traj.load_frame(0, &mut frame).unwrap();
        assert!(!frame.header.cell.is_set());
        assert!((frame.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn frame_atom_count_mismatch_fails_open() {
        let file = write_temp(
            "MODEL        1\n\
ATOM      1  C   MOL A   1       1.000   2.000   3.000           C\n\
ENDMDL\n\
MODEL        2\n\
ATOM      1  C   MOL A   1       4.000   5.000   6.000           C\n\
ATOM      2  O   MOL A   1       5.000   5.000   6.000           O\n\
ENDMDL\n",
        );
        assert!(PdbTrajectory::open(file.path()).is_err());
    }

    #[test]
    fn fetch_frame_reports_size_then_fills() {
        let file = write_temp(TWO_ATOMS);
        let traj = PdbTrajectory::open(file.path()).unwrap();
        let size = traj.fetch_frame(0, None).unwrap();
        let mut blob = Vec::new();
        let written = traj.fetch_frame(0, Some(&mut blob)).unwrap();
        assert_eq!(size, written);
        assert_eq!(blob.len(), size);
        assert!(traj.fetch_frame(1, None).is_err());
    }

    #[test]
    fn altloc_b_records_are_skipped() {
        let file = write_temp(
            "ATOM      1  C  AMOL A   1       0.000   0.000   0.000           C\n\
ATOM      2  C  BMOL A   1       0.100   0.000   0.000           C\n\
END\n",
        );
        let mol = PdbMoleculeLoader.load_molecule(file.path(), None).unwrap();
        assert_eq!(mol.atom_count(), 1);
    }
}
