use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use scope_core::elements::mass_from_element;
use scope_core::{CoreError, CoreResult, Molecule, StructureSet};

use crate::MoleculeLoader;

pub struct MmcifMoleculeLoader;

impl MoleculeLoader for MmcifMoleculeLoader {
    fn load_molecule(&self, path: &Path, _arg: Option<&str>) -> CoreResult<Molecule> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut in_loop = false;
        let mut atom_site = false;
        let mut columns: Vec<String> = Vec::new();
        let mut labels = Vec::new();
        let mut masses = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with("loop_") {
                in_loop = true;
                atom_site = false;
                columns.clear();
                continue;
            }
            if in_loop && line.starts_with('_') {
                let col = line.split_whitespace().next().unwrap_or("").to_string();
                if col.starts_with("_atom_site.") {
                    atom_site = true;
                }
                columns.push(col);
                continue;
            }
            if in_loop && atom_site {
                if line.starts_with('_') || line.starts_with("data_") {
                    in_loop = false;
                    continue;
                }
                let row: Vec<&str> = line.split_whitespace().collect();
                if row.len() < columns.len() {
                    continue;
                }
                if let Some((label, element)) = atom_from_row(&columns, &row) {
                    masses.push(mass_from_element(&element).unwrap_or(0.0));
                    labels.push(label);
                }
            }
        }

        if labels.is_empty() {
            return Err(CoreError::Parse("no atoms found in mmcif".into()));
        }
        let structures = StructureSet::from_bonds(labels.len(), &[])?;
        Molecule::new(labels, masses, structures)
    }
}

fn atom_from_row(columns: &[String], row: &[&str]) -> Option<(String, String)> {
    let pick = |name: &str| {
        columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| row.get(i))
            .copied()
    };
    // Require parsable coordinates so stray loop rows are skipped.
    pick("_atom_site.Cartn_x")?.parse::<f32>().ok()?;
    pick("_atom_site.Cartn_y")?.parse::<f32>().ok()?;
    pick("_atom_site.Cartn_z")?.parse::<f32>().ok()?;

    let name = pick("_atom_site.label_atom_id")
        .or_else(|| pick("_atom_site.auth_atom_id"))
        .unwrap_or("X");
    let element = pick("_atom_site.type_symbol").unwrap_or(name);
    Some((name.to_string(), element.to_string()))
}
