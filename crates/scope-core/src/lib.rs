#![forbid(unsafe_code)]

pub mod cell;
pub mod elements;
pub mod error;
pub mod frame;
pub mod mask;
pub mod molecule;
pub mod transform;

pub use cell::UnitCell;
pub use error::{CoreError, CoreResult};
pub use frame::{FrameData, FrameHeader};
pub use mask::AtomMask;
pub use molecule::{Molecule, StructureSet};
pub use transform::{
    apply_frame_transforms, center_of_mass, center_of_mass_periodic, deperiodize_point,
};
