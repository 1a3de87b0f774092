use std::path::Path;

use bitflags::bitflags;
use scope_io::{MoleculeLoader, Preflight, TrajectoryLoader};

use crate::error::{LoadError, LoadResult};
use crate::registry::{extension_of, mol_loader_from_ext, traj_loader_from_ext};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LoaderFlags: u32 {
        /// The UI must ask the user to disambiguate before committing to a
        /// load (e.g. a LAMMPS data file with an unrecognized atom style).
        const REQUIRES_DIALOGUE = 1 << 0;
    }
}

/// Ephemeral result of routing a path through the format registry: which
/// backends can take the file, plus whatever a preflight sniffed out of it.
pub struct LoaderState {
    pub mol_loader: Option<&'static dyn MoleculeLoader>,
    pub traj_loader: Option<&'static dyn TrajectoryLoader>,
    /// Backend-specific argument recorded by a preflight, passed back to
    /// `MoleculeLoader::load_molecule` (e.g. the sniffed LAMMPS atom style).
    pub backend_arg: Option<String>,
    pub flags: LoaderFlags,
}

impl std::fmt::Debug for LoaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderState")
            .field("mol_loader", &self.mol_loader.is_some())
            .field("traj_loader", &self.traj_loader.is_some())
            .field("backend_arg", &self.backend_arg)
            .field("flags", &self.flags)
            .finish()
    }
}

impl LoaderState {
    /// Consult the registry for both backend kinds and run the molecule
    /// backend's preflight. Fails without side effects when the extension is
    /// missing or matches no backend.
    pub fn from_path(path: &Path) -> LoadResult<Self> {
        let ext = extension_of(path)
            .ok_or_else(|| LoadError::UnsupportedExtension(path.display().to_string()))?;
        let mol_loader = mol_loader_from_ext(ext);
        let traj_loader = traj_loader_from_ext(ext);
        if mol_loader.is_none() && traj_loader.is_none() {
            return Err(LoadError::UnsupportedExtension(ext.to_string()));
        }

        let mut state = Self {
            mol_loader,
            traj_loader,
            backend_arg: None,
            flags: LoaderFlags::empty(),
        };
        if let Some(loader) = mol_loader {
            match loader.preflight(path)? {
                Preflight::Ready => {}
                Preflight::Arg(arg) => state.backend_arg = Some(arg),
                Preflight::NeedsDialogue => state.flags |= LoaderFlags::REQUIRES_DIALOGUE,
            }
        }
        Ok(state)
    }

    pub fn requires_dialogue(&self) -> bool {
        self.flags.contains(LoaderFlags::REQUIRES_DIALOGUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_extension_is_unsupported() {
        let err = LoaderState::from_path(Path::new("/tmp/no_extension")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedExtension(_)));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = LoaderState::from_path(Path::new("/tmp/file.docx")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedExtension(_)));
    }

    #[test]
    fn xtc_resolves_trajectory_backend_only() {
        let state = LoaderState::from_path(Path::new("/tmp/run.xtc")).unwrap();
        assert!(state.mol_loader.is_none());
        assert!(state.traj_loader.is_some());
        assert!(!state.requires_dialogue());
        assert!(state.backend_arg.is_none());
    }

    #[test]
    fn lammps_preflight_sniffs_atom_style() {
        let mut file = tempfile::Builder::new().suffix(".data").tempfile().unwrap();
        file.write_all(b"2 atoms\n\nAtoms # full\n\n1 1 1 0.0 0.0 0.0 0.0\n2 1 1 0.0 1.0 0.0 0.0\n")
            .unwrap();
        let state = LoaderState::from_path(file.path()).unwrap();
        assert_eq!(state.backend_arg.as_deref(), Some("full"));
        assert!(!state.requires_dialogue());
    }

    #[test]
    fn lammps_unknown_style_requires_dialogue() {
        let mut file = tempfile::Builder::new().suffix(".data").tempfile().unwrap();
        file.write_all(b"1 atoms\n\nAtoms\n\n1 1 1 0.0 0.0 0.0\n").unwrap();
        let state = LoaderState::from_path(file.path()).unwrap();
        assert!(state.backend_arg.is_none());
        assert!(state.requires_dialogue());
    }
}
