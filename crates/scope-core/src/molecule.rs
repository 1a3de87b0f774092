use crate::error::{CoreError, CoreResult};

/// Bonded connected components, stored as offsets into one flat index array.
/// Structure `i` covers `indices[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, Default)]
pub struct StructureSet {
    offsets: Vec<u32>,
    indices: Vec<u32>,
}

impl StructureSet {
    /// Partition `num_atoms` atoms into connected components under the given
    /// bond list. Atoms without bonds become singleton structures. Bond
    /// endpoints out of range are rejected.
    pub fn from_bonds(num_atoms: usize, bonds: &[(usize, usize)]) -> CoreResult<Self> {
        let mut parent: Vec<u32> = (0..num_atoms as u32).collect();

        fn find(parent: &mut [u32], i: u32) -> u32 {
            let mut root = i;
            while parent[root as usize] != root {
                root = parent[root as usize];
            }
            let mut cur = i;
            while parent[cur as usize] != root {
                let next = parent[cur as usize];
                parent[cur as usize] = root;
                cur = next;
            }
            root
        }

        for &(a, b) in bonds {
            if a >= num_atoms || b >= num_atoms {
                return Err(CoreError::Invalid(format!(
                    "bond ({a}, {b}) out of range for {num_atoms} atoms"
                )));
            }
            let ra = find(&mut parent, a as u32);
            let rb = find(&mut parent, b as u32);
            if ra != rb {
                parent[rb as usize] = ra;
            }
        }

        // Bucket atoms by root, keeping structures ordered by first member.
        let mut root_slot: Vec<u32> = vec![u32::MAX; num_atoms];
        let mut members: Vec<Vec<u32>> = Vec::new();
        for i in 0..num_atoms as u32 {
            let root = find(&mut parent, i);
            let slot = root_slot[root as usize];
            if slot == u32::MAX {
                root_slot[root as usize] = members.len() as u32;
                members.push(vec![i]);
            } else {
                members[slot as usize].push(i);
            }
        }

        let mut offsets = Vec::with_capacity(members.len() + 1);
        let mut indices = Vec::with_capacity(num_atoms);
        offsets.push(0);
        for group in &members {
            indices.extend_from_slice(group);
            offsets.push(indices.len() as u32);
        }
        Ok(Self { offsets, indices })
    }

    pub fn count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn structure(&self, i: usize) -> &[u32] {
        let start = self.offsets[i] as usize;
        let end = self.offsets[i + 1] as usize;
        &self.indices[start..end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u32]> + '_ {
        (0..self.count()).map(move |i| self.structure(i))
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// Loaded molecular topology, read-only to the access layer. Trajectories
/// hold a shared reference and never outlive it.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    labels: Vec<String>,
    masses: Vec<f32>,
    structures: StructureSet,
}

impl Molecule {
    pub fn new(labels: Vec<String>, masses: Vec<f32>, structures: StructureSet) -> CoreResult<Self> {
        if labels.len() != masses.len() {
            return Err(CoreError::Mismatch(format!(
                "{} labels for {} masses",
                labels.len(),
                masses.len()
            )));
        }
        Ok(Self {
            labels,
            masses,
            structures,
        })
    }

    pub fn atom_count(&self) -> usize {
        self.masses.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn structures(&self) -> &StructureSet {
        &self.structures
    }
}
