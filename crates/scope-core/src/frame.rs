use crate::cell::UnitCell;
use crate::error::{CoreError, CoreResult};

/// Per-frame header as reported by a trajectory backend.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameHeader {
    pub num_atoms: usize,
    pub step: i64,
    pub timestamp: f64,
    pub cell: UnitCell,
}

/// One decoded snapshot: header plus split coordinate arrays. The arrays are
/// always sized to `header.num_atoms`; `validate` checks the invariant after
/// a backend has filled the frame in place.
#[derive(Debug, Clone, Default)]
pub struct FrameData {
    pub header: FrameHeader,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
}

impl FrameData {
    pub fn with_atom_count(num_atoms: usize) -> Self {
        Self {
            header: FrameHeader {
                num_atoms,
                ..FrameHeader::default()
            },
            x: vec![0.0; num_atoms],
            y: vec![0.0; num_atoms],
            z: vec![0.0; num_atoms],
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.header.num_atoms
    }

    /// Resize all coordinate arrays for a new atom count, keeping the header
    /// consistent.
    pub fn reset(&mut self, num_atoms: usize) {
        self.header = FrameHeader {
            num_atoms,
            ..FrameHeader::default()
        };
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.x.resize(num_atoms, 0.0);
        self.y.resize(num_atoms, 0.0);
        self.z.resize(num_atoms, 0.0);
    }

    pub fn validate(&self) -> CoreResult<()> {
        let n = self.header.num_atoms;
        if self.x.len() != n || self.y.len() != n || self.z.len() != n {
            return Err(CoreError::Mismatch(format!(
                "frame arrays sized {}/{}/{} for {} atoms",
                self.x.len(),
                self.y.len(),
                self.z.len(),
                n
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_atom_count_sizes_arrays() {
        let frame = FrameData::with_atom_count(5);
        assert_eq!(frame.num_atoms(), 5);
        assert_eq!(frame.x.len(), 5);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_arrays() {
        let mut frame = FrameData::with_atom_count(5);
        frame.y.pop();
        assert!(frame.validate().is_err());
    }

    #[test]
    fn reset_clears_header() {
        let mut frame = FrameData::with_atom_count(2);
        frame.header.timestamp = 12.5;
        frame.header.cell = UnitCell::orthorhombic(1.0, 1.0, 1.0);
        frame.reset(3);
        assert_eq!(frame.num_atoms(), 3);
        assert_eq!(frame.header.timestamp, 0.0);
        assert!(!frame.header.cell.is_set());
    }
}
