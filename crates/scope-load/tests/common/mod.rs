#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use scope_load::{LoaderState, Molecule};

pub fn temp_path(label: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let label_path = Path::new(label);
    let stem = label_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(label);
    let ext = label_path.extension().and_then(|s| s.to_str());
    let filename = if let Some(ext) = ext {
        format!("scope_test_{stem}_{}_{}.{}", std::process::id(), nanos, ext)
    } else {
        format!("scope_test_{label}_{}_{}", std::process::id(), nanos)
    };
    path.push(filename);
    path
}

pub fn write_text(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write temp file");
}

/// Multi-model PDB where frame f places atom a at (f + a / 10, 0.5, 1.5).
pub fn pdb_trajectory_text(n_frames: usize, n_atoms: usize, cell: Option<[f32; 3]>) -> String {
    let mut out = String::new();
    if let Some([a, b, c]) = cell {
        out.push_str(&format!(
            "CRYST1{a:>9.3}{b:>9.3}{c:>9.3}{:>7.2}{:>7.2}{:>7.2} P 1           1\n",
            90.0, 90.0, 90.0
        ));
    }
    for f in 0..n_frames {
        out.push_str(&format!("MODEL     {:>4}\n", f + 1));
        for a in 0..n_atoms {
            let x = f as f32 + a as f32 * 0.1;
            out.push_str(&pdb_atom_line(a + 1, [x, 0.5, 1.5]));
        }
        out.push_str("ENDMDL\n");
    }
    out.push_str("END\n");
    out
}

pub fn pdb_atom_line(serial: usize, pos: [f32; 3]) -> String {
    format!(
        "ATOM  {serial:>5}  C   MOL A{:>4}    {:>8.3}{:>8.3}{:>8.3}           C\n",
        1, pos[0], pos[1], pos[2]
    )
}

/// Load the molecule for a path through the registry, the way the UI layer
/// would.
pub fn molecule_for(path: &Path) -> Arc<Molecule> {
    let state = LoaderState::from_path(path).expect("loader state");
    let loader = state.mol_loader.expect("molecule backend");
    Arc::new(
        loader
            .load_molecule(path, state.backend_arg.as_deref())
            .expect("load molecule"),
    )
}

pub fn remove(path: &Path) {
    let _ = fs::remove_file(path);
}
