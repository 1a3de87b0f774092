//! Compile-time format table routing a file extension to its molecule and/or
//! trajectory backend. Lookup is a linear scan over nine entries; extension
//! matching is case-insensitive and accepts semicolon-delimited token lists.

use std::path::Path;

use scope_io::gro::GroMoleculeLoader;
use scope_io::lammps::LammpsMoleculeLoader;
use scope_io::mmcif::MmcifMoleculeLoader;
use scope_io::pdb::{PdbMoleculeLoader, PdbTrajectoryLoader};
use scope_io::xdr::{TrrTrajectoryLoader, XtcTrajectoryLoader};
use scope_io::xyz::{XyzMoleculeLoader, XyzTrajectoryLoader};
use scope_io::{MoleculeLoader, TrajectoryLoader};

pub struct FormatEntry {
    pub name: &'static str,
    pub extensions: &'static str,
    mol: Option<&'static dyn MoleculeLoader>,
    traj: Option<&'static dyn TrajectoryLoader>,
}

static PDB_MOL: PdbMoleculeLoader = PdbMoleculeLoader;
static GRO_MOL: GroMoleculeLoader = GroMoleculeLoader;
static XYZ_MOL: XyzMoleculeLoader = XyzMoleculeLoader;
static MMCIF_MOL: MmcifMoleculeLoader = MmcifMoleculeLoader;
static LAMMPS_MOL: LammpsMoleculeLoader = LammpsMoleculeLoader;

static PDB_TRAJ: PdbTrajectoryLoader = PdbTrajectoryLoader;
static XTC_TRAJ: XtcTrajectoryLoader = XtcTrajectoryLoader;
static TRR_TRAJ: TrrTrajectoryLoader = TrrTrajectoryLoader;
static XYZ_TRAJ: XyzTrajectoryLoader = XyzTrajectoryLoader;

static TABLE: [FormatEntry; 9] = [
    FormatEntry {
        name: "Standard Protein Data Bank (pdb)",
        extensions: "pdb",
        mol: Some(&PDB_MOL),
        traj: Some(&PDB_TRAJ),
    },
    FormatEntry {
        name: "Gromacs Structure (gro)",
        extensions: "gro",
        mol: Some(&GRO_MOL),
        traj: None,
    },
    FormatEntry {
        name: "Gromacs Compressed Trajectory (xtc)",
        extensions: "xtc",
        mol: None,
        traj: Some(&XTC_TRAJ),
    },
    FormatEntry {
        name: "Gromacs Lossless Trajectory (trr)",
        extensions: "trr",
        mol: None,
        traj: Some(&TRR_TRAJ),
    },
    FormatEntry {
        name: "xyz (xyz)",
        extensions: "xyz",
        mol: Some(&XYZ_MOL),
        traj: Some(&XYZ_TRAJ),
    },
    FormatEntry {
        name: "xyz (xmol)",
        extensions: "xmol",
        mol: Some(&XYZ_MOL),
        traj: Some(&XYZ_TRAJ),
    },
    FormatEntry {
        name: "xyz (arc)",
        extensions: "arc",
        mol: Some(&XYZ_MOL),
        traj: Some(&XYZ_TRAJ),
    },
    FormatEntry {
        name: "PDBx/mmCIF (cif)",
        extensions: "cif",
        mol: Some(&MMCIF_MOL),
        traj: None,
    },
    FormatEntry {
        name: "LAMMPS (data)",
        extensions: "data",
        mol: Some(&LAMMPS_MOL),
        traj: None,
    },
];

pub fn loader_count() -> usize {
    TABLE.len()
}

pub fn loader_names() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|e| e.name)
}

pub fn loader_extensions() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|e| e.extensions)
}

pub fn entries() -> &'static [FormatEntry] {
    &TABLE
}

pub fn mol_loader_from_ext(ext: &str) -> Option<&'static dyn MoleculeLoader> {
    TABLE
        .iter()
        .find(|e| e.mol.is_some() && ext_matches(e.extensions, ext))
        .and_then(|e| e.mol)
}

pub fn traj_loader_from_ext(ext: &str) -> Option<&'static dyn TrajectoryLoader> {
    TABLE
        .iter()
        .find(|e| e.traj.is_some() && ext_matches(e.extensions, ext))
        .and_then(|e| e.traj)
}

impl FormatEntry {
    pub fn loads_molecules(&self) -> bool {
        self.mol.is_some()
    }

    pub fn loads_trajectories(&self) -> bool {
        self.traj.is_some()
    }
}

pub fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

fn ext_matches(list: &str, ext: &str) -> bool {
    list.split(';')
        .any(|token| token.trim().eq_ignore_ascii_case(ext))
}
