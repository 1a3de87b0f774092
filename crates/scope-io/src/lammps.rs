use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use fxhash::FxHashMap;
use scope_core::elements::element_from_mass;
use scope_core::{CoreError, CoreResult, Molecule, StructureSet};

use crate::{MoleculeLoader, Preflight};

const KNOWN_STYLES: &[&str] = &["full", "atomic", "charge", "molecular"];

pub struct LammpsMoleculeLoader;

impl MoleculeLoader for LammpsMoleculeLoader {
    fn load_molecule(&self, path: &Path, arg: Option<&str>) -> CoreResult<Molecule> {
        let style = match arg {
            Some(style) => Some(style.to_string()),
            None => sniff_atom_style(path)?,
        };
        read_data_file(path, style.as_deref())
    }

    /// LAMMPS data files do not always name their atom style; a recognized
    /// `Atoms # style` comment is handed back as the loader argument, and an
    /// absent or unknown style asks the caller to disambiguate.
    fn preflight(&self, path: &Path) -> CoreResult<Preflight> {
        match sniff_atom_style(path)? {
            Some(style) => Ok(Preflight::Arg(style)),
            None => Ok(Preflight::NeedsDialogue),
        }
    }
}

/// Scan the data file for the `Atoms # <style>` section comment. Returns the
/// style only when it is one this reader knows how to lay out.
pub fn sniff_atom_style(path: &Path) -> CoreResult<Option<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if section_name(trimmed) == Some("Atoms") {
            let style = trimmed
                .split('#')
                .nth(1)
                .map(|s| s.trim().to_ascii_lowercase());
            return Ok(style.filter(|s| KNOWN_STYLES.contains(&s.as_str())));
        }
    }
    Ok(None)
}

fn read_data_file(path: &Path, style: Option<&str>) -> CoreResult<Molecule> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    #[derive(Clone, Copy, PartialEq)]
    enum Section {
        None,
        Masses,
        Atoms,
        Bonds,
        Other,
    }

    let mut section = Section::None;
    let mut type_masses: FxHashMap<i64, f32> = FxHashMap::default();
    let mut atom_rows: Vec<(i64, i64)> = Vec::new(); // (atom id, type)
    let mut bonds_raw: Vec<(i64, i64)> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(name) = section_name(trimmed) {
            section = match name {
                "Masses" => Section::Masses,
                "Atoms" => Section::Atoms,
                "Bonds" => Section::Bonds,
                _ => Section::Other,
            };
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        let body = trimmed.split('#').next().unwrap_or("").trim();
        if body.is_empty() {
            continue;
        }
        match section {
            Section::Masses => {
                let fields: Vec<&str> = body.split_whitespace().collect();
                if fields.len() >= 2 {
                    if let (Ok(t), Ok(m)) = (fields[0].parse::<i64>(), fields[1].parse::<f32>()) {
                        type_masses.insert(t, m);
                    }
                }
            }
            Section::Atoms => {
                if let Some(row) = parse_atom_row(body, style)? {
                    atom_rows.push(row);
                }
            }
            Section::Bonds => {
                let fields: Vec<&str> = body.split_whitespace().collect();
                if fields.len() >= 4 {
                    if let (Ok(a), Ok(b)) = (fields[2].parse::<i64>(), fields[3].parse::<i64>()) {
                        bonds_raw.push((a, b));
                    }
                }
            }
            Section::None | Section::Other => {}
        }
    }

    if atom_rows.is_empty() {
        return Err(CoreError::Parse("no atoms found in lammps data".into()));
    }

    // Atom ids are arbitrary; order atoms by id so frames and topology agree.
    atom_rows.sort_by_key(|&(id, _)| id);
    let mut id_to_index: FxHashMap<i64, usize> = FxHashMap::default();
    let mut labels = Vec::with_capacity(atom_rows.len());
    let mut masses = Vec::with_capacity(atom_rows.len());
    for (i, &(id, atom_type)) in atom_rows.iter().enumerate() {
        if id_to_index.insert(id, i).is_some() {
            return Err(CoreError::Parse(format!("duplicate lammps atom id {id}")));
        }
        let mass = type_masses.get(&atom_type).copied().unwrap_or(0.0);
        let label = element_from_mass(mass)
            .map(str::to_string)
            .unwrap_or_else(|| format!("T{atom_type}"));
        labels.push(label);
        masses.push(mass);
    }

    let mut bonds = Vec::with_capacity(bonds_raw.len());
    for (a_id, b_id) in bonds_raw {
        if let (Some(&a), Some(&b)) = (id_to_index.get(&a_id), id_to_index.get(&b_id)) {
            bonds.push((a, b));
        }
    }
    let structures = StructureSet::from_bonds(labels.len(), &bonds)?;
    Molecule::new(labels, masses, structures)
}

fn section_name(line: &str) -> Option<&'static str> {
    let token = line.split_whitespace().next()?;
    match token {
        "Masses" => Some("Masses"),
        "Atoms" => Some("Atoms"),
        "Bonds" => Some("Bonds"),
        "Angles" | "Dihedrals" | "Impropers" | "Velocities" => Some("Other"),
        // Coefficient sections ("Pair Coeffs", "Bond Coeffs", ...) must not
        // leak rows into whatever section came before them.
        "Pair" | "PairIJ" | "Bond" | "Angle" | "Dihedral" | "Improper" => Some("Other"),
        _ => None,
    }
}

/// One Atoms-section row to `(id, type)`. Column layout depends on the atom
/// style; without one, fall back to inference by column count.
fn parse_atom_row(body: &str, style: Option<&str>) -> CoreResult<Option<(i64, i64)>> {
    let parts: Vec<&str> = body.split_whitespace().collect();
    if parts.len() < 5 {
        return Ok(None);
    }
    let id = parts[0]
        .parse::<i64>()
        .map_err(|_| CoreError::Parse(format!("bad lammps atom id: {}", parts[0])))?;
    let type_col = match style.unwrap_or("") {
        "full" | "molecular" => 2,
        "atomic" | "charge" => 1,
        _ => {
            // Unknown style: full/molecular have a molecule id in column 1,
            // atomic/charge put the type there.
            if parts.len() >= 7 {
                2
            } else {
                1
            }
        }
    };
    let atom_type = parts
        .get(type_col)
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or_else(|| CoreError::Parse(format!("bad lammps atom line: {body}")))?;
    Ok(Some((id, atom_type)))
}
