//! Post-decode coordinate transforms: recentering the system on the
//! center-of-mass of a selected atom subset and unwrapping bonded structures
//! across periodic boundaries. Applied in place on a freshly decoded frame,
//! before it becomes visible to readers.

use crate::error::{CoreError, CoreResult};
use crate::frame::FrameData;
use crate::mask::AtomMask;
use crate::molecule::Molecule;

/// Mass-weighted mean position over `indices`. Accumulates in f64.
pub fn center_of_mass(
    x: &[f32],
    y: &[f32],
    z: &[f32],
    masses: &[f32],
    indices: &[usize],
) -> [f64; 3] {
    let mut sum = [0.0f64; 3];
    let mut mass_sum = 0.0f64;
    for &i in indices {
        let m = masses[i] as f64;
        sum[0] += x[i] as f64 * m;
        sum[1] += y[i] as f64 * m;
        sum[2] += z[i] as f64 * m;
        mass_sum += m;
    }
    if mass_sum == 0.0 {
        return [0.0, 0.0, 0.0];
    }
    [sum[0] / mass_sum, sum[1] / mass_sum, sum[2] / mass_sum]
}

/// Periodic center-of-mass over an orthorhombic extent, via the circular
/// mean: each coordinate maps to an angle on its axis, the mass-weighted
/// mean angle maps back. Stable for subsets split across the boundary.
/// Axes with a non-positive extent fall back to the plain mean.
pub fn center_of_mass_periodic(
    x: &[f32],
    y: &[f32],
    z: &[f32],
    masses: &[f32],
    indices: &[usize],
    extent: [f32; 3],
) -> [f64; 3] {
    let plain = center_of_mass(x, y, z, masses, indices);
    let mut com = [0.0f64; 3];
    for axis in 0..3 {
        let ext = extent[axis] as f64;
        if ext <= 0.0 {
            com[axis] = plain[axis];
            continue;
        }
        let coords = match axis {
            0 => x,
            1 => y,
            _ => z,
        };
        let mut cos_sum = 0.0f64;
        let mut sin_sum = 0.0f64;
        let mut mass_sum = 0.0f64;
        for &i in indices {
            let m = masses[i] as f64;
            let theta = coords[i] as f64 / ext * std::f64::consts::TAU;
            cos_sum += theta.cos() * m;
            sin_sum += theta.sin() * m;
            mass_sum += m;
        }
        if mass_sum == 0.0 {
            continue;
        }
        let angle = (sin_sum / mass_sum).atan2(cos_sum / mass_sum);
        com[axis] = angle / std::f64::consts::TAU * ext;
    }
    com
}

/// Shift `value` by whole periods so it lands within half an extent of
/// `reference`. No-op for a non-positive extent.
pub fn deperiodize_point(value: f64, reference: f64, extent: f64) -> f64 {
    if extent <= 0.0 {
        return value;
    }
    value - ((value - reference) / extent).round() * extent
}

/// Apply the configured post-decode transforms to a decoded frame, in the
/// order the access layer guarantees: recenter on the mask target first,
/// then deperiodize bonded structures. The frame's own unit cell decides
/// whether periodic forms are used.
pub fn apply_frame_transforms(
    frame: &mut FrameData,
    molecule: &Molecule,
    recenter: &AtomMask,
    deperiodize: bool,
) -> CoreResult<()> {
    frame.validate()?;
    if frame.num_atoms() != molecule.atom_count() {
        return Err(CoreError::Mismatch(format!(
            "frame has {} atoms, molecule has {}",
            frame.num_atoms(),
            molecule.atom_count()
        )));
    }

    let cell = frame.header.cell;
    let have_cell = cell.is_set();
    let ext = cell.extent();

    if !recenter.is_empty() {
        let indices = recenter.indices();
        let com = if indices.len() == 1 {
            let i = indices[0];
            [frame.x[i] as f64, frame.y[i] as f64, frame.z[i] as f64]
        } else if have_cell {
            let raw = center_of_mass_periodic(
                &frame.x,
                &frame.y,
                &frame.z,
                molecule.masses(),
                &indices,
                ext,
            );
            [
                deperiodize_point(raw[0], ext[0] as f64 * 0.5, ext[0] as f64),
                deperiodize_point(raw[1], ext[1] as f64 * 0.5, ext[1] as f64),
                deperiodize_point(raw[2], ext[2] as f64 * 0.5, ext[2] as f64),
            ]
        } else {
            center_of_mass(&frame.x, &frame.y, &frame.z, molecule.masses(), &indices)
        };

        let trans = if have_cell {
            [
                (ext[0] as f64 * 0.5 - com[0]) as f32,
                (ext[1] as f64 * 0.5 - com[1]) as f32,
                (ext[2] as f64 * 0.5 - com[2]) as f32,
            ]
        } else {
            [-com[0] as f32, -com[1] as f32, -com[2] as f32]
        };
        translate(frame, trans);
    }

    if deperiodize && have_cell {
        deperiodize_structures(frame, molecule, ext);
    }

    Ok(())
}

fn translate(frame: &mut FrameData, t: [f32; 3]) {
    for v in frame.x.iter_mut() {
        *v += t[0];
    }
    for v in frame.y.iter_mut() {
        *v += t[1];
    }
    for v in frame.z.iter_mut() {
        *v += t[2];
    }
}

/// Unwrap each bonded structure around its own periodic center-of-mass so
/// chains are contiguous instead of split across images. Correct as long as
/// a structure's radius stays below half the extent.
fn deperiodize_structures(frame: &mut FrameData, molecule: &Molecule, ext: [f32; 3]) {
    let mut scratch: Vec<usize> = Vec::new();
    for structure in molecule.structures().iter() {
        if structure.len() < 2 {
            continue;
        }
        scratch.clear();
        scratch.extend(structure.iter().map(|&i| i as usize));
        let com = center_of_mass_periodic(
            &frame.x,
            &frame.y,
            &frame.z,
            molecule.masses(),
            &scratch,
            ext,
        );
        for &i in &scratch {
            frame.x[i] = deperiodize_point(frame.x[i] as f64, com[0], ext[0] as f64) as f32;
            frame.y[i] = deperiodize_point(frame.y[i] as f64, com[1], ext[1] as f64) as f32;
            frame.z[i] = deperiodize_point(frame.z[i] as f64, com[2], ext[2] as f64) as f32;
        }
    }
}
