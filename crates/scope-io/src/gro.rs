use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use scope_core::elements::{element_from_atom_name, mass_from_element};
use scope_core::{CoreError, CoreResult, Molecule, StructureSet};

use crate::MoleculeLoader;

pub struct GroMoleculeLoader;

impl MoleculeLoader for GroMoleculeLoader {
    fn load_molecule(&self, path: &Path, _arg: Option<&str>) -> CoreResult<Molecule> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let _title = lines
            .next()
            .ok_or_else(|| CoreError::Parse("gro missing title line".into()))??;
        let count_line = lines
            .next()
            .ok_or_else(|| CoreError::Parse("gro missing atom count".into()))??;
        let n_atoms: usize = count_line
            .trim()
            .parse()
            .map_err(|_| CoreError::Parse(format!("invalid gro count: {}", count_line.trim())))?;

        let mut labels = Vec::with_capacity(n_atoms);
        let mut masses = Vec::with_capacity(n_atoms);
        for _ in 0..n_atoms {
            let line = lines
                .next()
                .ok_or_else(|| CoreError::Parse("gro file truncated".into()))??;
            let name = slice_trim(&line, 10, 15).to_string();
            // Coordinates (cols 20..44, nm) are topology-irrelevant here but
            // validate the record shape.
            parse_float(slice_trim(&line, 20, 28), "x")?;
            parse_float(slice_trim(&line, 28, 36), "y")?;
            parse_float(slice_trim(&line, 36, 44), "z")?;
            let element = element_from_atom_name(&name).unwrap_or("C");
            masses.push(mass_from_element(element).unwrap_or(0.0));
            labels.push(name);
        }

        if labels.is_empty() {
            return Err(CoreError::Parse("no atoms found in gro".into()));
        }
        let structures = StructureSet::from_bonds(labels.len(), &[])?;
        Molecule::new(labels, masses, structures)
    }
}

fn slice_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_float(token: &str, label: &str) -> CoreResult<f32> {
    token
        .parse::<f32>()
        .map_err(|_| CoreError::Parse(format!("invalid gro {label}: {token}")))
}
