//! Isoparametric element matrices for the built-in engine.
//!
//! - Quad4 axisymmetric: `(r, z)` cross-section, strains `[rr, zz, θθ, rz]`,
//!   volume element `2π r dr dz`
//! - Hex8 solid: trilinear brick, strains `[xx, yy, zz, xy, yz, xz]`
//!
//! Both use 2-point Gauss quadrature per direction with the mean-dilatation
//! (B-bar) strain: the volumetric part of `B` is replaced by its element
//! average, which keeps nearly incompressible rubber from locking.

use std::f64::consts::PI;

use nalgebra::{
    DMatrix, Matrix2, Matrix3, Matrix4, Matrix6, SMatrix, Vector2, Vector3, Vector4, Vector6,
};

use crate::{
    datatypes::{CellType, StressTensor, Vertex},
    error::{ElastomerError, Result},
    materials::Material,
};

const GAUSS_1D: [f64; 2] = [-0.577_350_269_189_625_8, 0.577_350_269_189_625_8];

const QUAD_XI: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const QUAD_ETA: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

const HEX_XI: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
const HEX_ETA: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
const HEX_ZETA: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

fn degenerate(det: f64) -> ElastomerError {
    ElastomerError::Model(format!("Degenerate element, jacobian determinant {det:e}"))
}

/// Strain-displacement matrix, `|det J|` and radius at a quad Gauss point
fn quad4_b(coords: &[Vertex], xi: f64, eta: f64) -> Result<(SMatrix<f64, 4, 8>, f64, f64)> {
    let mut n = [0.0; 4];
    let mut dn_nat = [(0.0, 0.0); 4];
    for i in 0..4 {
        n[i] = 0.25 * (1.0 + QUAD_XI[i] * xi) * (1.0 + QUAD_ETA[i] * eta);
        dn_nat[i] = (
            0.25 * QUAD_XI[i] * (1.0 + QUAD_ETA[i] * eta),
            0.25 * (1.0 + QUAD_XI[i] * xi) * QUAD_ETA[i],
        );
    }

    let mut j = Matrix2::<f64>::zeros();
    for i in 0..4 {
        j[(0, 0)] += dn_nat[i].0 * coords[i].x;
        j[(0, 1)] += dn_nat[i].0 * coords[i].y;
        j[(1, 0)] += dn_nat[i].1 * coords[i].x;
        j[(1, 1)] += dn_nat[i].1 * coords[i].y;
    }
    let det = j.determinant();
    let j_inv = match j.try_inverse() {
        Some(inv) if det.abs() > f64::EPSILON => inv,
        _ => return Err(degenerate(det)),
    };

    let r: f64 = (0..4).map(|i| n[i] * coords[i].x).sum();
    if r <= 0.0 {
        return Err(ElastomerError::Model(format!(
            "Axisymmetric element reaches the axis (r = {r:e})"
        )));
    }

    let mut b = SMatrix::<f64, 4, 8>::zeros();
    for i in 0..4 {
        let d = j_inv * Vector2::new(dn_nat[i].0, dn_nat[i].1);
        let col = 2 * i;
        b[(0, col)] = d[0];
        b[(1, col + 1)] = d[1];
        b[(2, col)] = n[i] / r;
        b[(3, col)] = d[1];
        b[(3, col + 1)] = d[0];
    }

    Ok((b, det.abs(), r))
}

/// B-bar matrices and integration weights `2π r |det J|` at the quad Gauss
/// points
fn quad4_bbar(coords: &[Vertex]) -> Result<Vec<(SMatrix<f64, 4, 8>, f64)>> {
    let m = Vector4::new(1.0, 1.0, 1.0, 0.0);
    let volumetric = m * m.transpose() / 3.0;
    let deviatoric = Matrix4::identity() - volumetric;

    let mut points = Vec::with_capacity(4);
    let mut mean = SMatrix::<f64, 4, 8>::zeros();
    let mut volume = 0.0;
    for xi in GAUSS_1D {
        for eta in GAUSS_1D {
            let (b, det, r) = quad4_b(coords, xi, eta)?;
            let weight = 2.0 * PI * r * det;
            mean += volumetric * b * weight;
            volume += weight;
            points.push((b, weight));
        }
    }
    mean /= volume;

    Ok(points
        .into_iter()
        .map(|(b, weight)| (deviatoric * b + mean, weight))
        .collect())
}

pub fn quad4_axisymmetric_stiffness(
    coords: &[Vertex],
    d: &Matrix4<f64>,
) -> Result<SMatrix<f64, 8, 8>> {
    let mut k = SMatrix::<f64, 8, 8>::zeros();
    for (b, weight) in quad4_bbar(coords)? {
        k += b.transpose() * d * b * weight;
    }
    Ok(k)
}

/// Cell-averaged stress of an axisymmetric quad
pub fn quad4_axisymmetric_stress(
    coords: &[Vertex],
    u: &[f64],
    d: &Matrix4<f64>,
) -> Result<StressTensor> {
    let u = SMatrix::<f64, 8, 1>::from_column_slice(u);
    let tensors: Vec<StressTensor> = quad4_bbar(coords)?
        .into_iter()
        .map(|(b, _)| {
            let s = d * (b * u);
            StressTensor([s[0], s[1], s[2], s[3], 0.0, 0.0])
        })
        .collect();
    Ok(StressTensor::average(&tensors))
}

fn hex8_b(coords: &[Vertex], xi: f64, eta: f64, zeta: f64) -> Result<(SMatrix<f64, 6, 24>, f64)> {
    let mut dn_nat = [[0.0; 3]; 8];
    for i in 0..8 {
        dn_nat[i] = [
            0.125 * HEX_XI[i] * (1.0 + HEX_ETA[i] * eta) * (1.0 + HEX_ZETA[i] * zeta),
            0.125 * (1.0 + HEX_XI[i] * xi) * HEX_ETA[i] * (1.0 + HEX_ZETA[i] * zeta),
            0.125 * (1.0 + HEX_XI[i] * xi) * (1.0 + HEX_ETA[i] * eta) * HEX_ZETA[i],
        ];
    }

    let mut j = Matrix3::<f64>::zeros();
    for i in 0..8 {
        for row in 0..3 {
            j[(row, 0)] += dn_nat[i][row] * coords[i].x;
            j[(row, 1)] += dn_nat[i][row] * coords[i].y;
            j[(row, 2)] += dn_nat[i][row] * coords[i].z;
        }
    }
    let det = j.determinant();
    let j_inv = match j.try_inverse() {
        Some(inv) if det.abs() > f64::EPSILON => inv,
        _ => return Err(degenerate(det)),
    };

    let mut b = SMatrix::<f64, 6, 24>::zeros();
    for i in 0..8 {
        let d = j_inv * Vector3::new(dn_nat[i][0], dn_nat[i][1], dn_nat[i][2]);
        let col = 3 * i;
        b[(0, col)] = d[0];
        b[(1, col + 1)] = d[1];
        b[(2, col + 2)] = d[2];
        b[(3, col)] = d[1];
        b[(3, col + 1)] = d[0];
        b[(4, col + 1)] = d[2];
        b[(4, col + 2)] = d[1];
        b[(5, col)] = d[2];
        b[(5, col + 2)] = d[0];
    }

    Ok((b, det.abs()))
}

fn hex8_bbar(coords: &[Vertex]) -> Result<Vec<(SMatrix<f64, 6, 24>, f64)>> {
    let m = Vector6::new(1.0, 1.0, 1.0, 0.0, 0.0, 0.0);
    let volumetric = m * m.transpose() / 3.0;
    let deviatoric = Matrix6::identity() - volumetric;

    let mut points = Vec::with_capacity(8);
    let mut mean = SMatrix::<f64, 6, 24>::zeros();
    let mut volume = 0.0;
    for xi in GAUSS_1D {
        for eta in GAUSS_1D {
            for zeta in GAUSS_1D {
                let (b, det) = hex8_b(coords, xi, eta, zeta)?;
                mean += volumetric * b * det;
                volume += det;
                points.push((b, det));
            }
        }
    }
    mean /= volume;

    Ok(points
        .into_iter()
        .map(|(b, det)| (deviatoric * b + mean, det))
        .collect())
}

pub fn hex8_stiffness(coords: &[Vertex], d: &Matrix6<f64>) -> Result<SMatrix<f64, 24, 24>> {
    let mut k = SMatrix::<f64, 24, 24>::zeros();
    for (b, det) in hex8_bbar(coords)? {
        k += b.transpose() * d * b * det;
    }
    Ok(k)
}

/// Cell-averaged stress of a hexahedron
pub fn hex8_stress(coords: &[Vertex], u: &[f64], d: &Matrix6<f64>) -> Result<StressTensor> {
    let u = SMatrix::<f64, 24, 1>::from_column_slice(u);
    let tensors: Vec<StressTensor> = hex8_bbar(coords)?
        .into_iter()
        .map(|(b, _)| {
            let s = d * (b * u);
            StressTensor([s[0], s[1], s[2], s[3], s[4], s[5]])
        })
        .collect();
    Ok(StressTensor::average(&tensors))
}

/// Element stiffness matrix of a cell
///
/// # Arguments
/// * `cell_type` - Quad4 cells are treated as axisymmetric, Hex8 as solid
/// * `coords` - Nodal coordinates in cell order
/// * `material` - The constitutive model of the cell
pub fn element_stiffness(
    cell_type: CellType,
    coords: &[Vertex],
    material: &Material,
) -> Result<DMatrix<f64>> {
    match cell_type {
        CellType::Quad4 => {
            let k = quad4_axisymmetric_stiffness(coords, &material.constitutive_axisymmetric())?;
            Ok(DMatrix::from_column_slice(8, 8, k.as_slice()))
        }
        CellType::Hex8 => {
            let k = hex8_stiffness(coords, &material.constitutive_3d())?;
            Ok(DMatrix::from_column_slice(24, 24, k.as_slice()))
        }
    }
}

pub fn element_stress(
    cell_type: CellType,
    coords: &[Vertex],
    u: &[f64],
    material: &Material,
) -> Result<StressTensor> {
    match cell_type {
        CellType::Quad4 => {
            quad4_axisymmetric_stress(coords, u, &material.constitutive_axisymmetric())
        }
        CellType::Hex8 => hex8_stress(coords, u, &material.constitutive_3d()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn steel() -> Material {
        Material::LinearElastic {
            youngs_modulus: 200.0,
            poisson_ratio: 0.25,
        }
    }

    fn unit_hex() -> Vec<Vertex> {
        (0..8)
            .map(|i| {
                Vertex::new(
                    0.5 * (HEX_XI[i] + 1.0),
                    0.5 * (HEX_ETA[i] + 1.0),
                    0.5 * (HEX_ZETA[i] + 1.0),
                )
            })
            .collect()
    }

    #[test]
    fn hex8_rigid_body_motion_is_stress_free() {
        let coords = unit_hex();
        let k = element_stiffness(CellType::Hex8, &coords, &steel()).unwrap();
        let translation = nalgebra::DVector::from_fn(24, |i, _| if i % 3 == 0 { 1.0 } else { 0.0 });
        let forces = &k * translation;
        assert!(forces.amax() < 1e-10);
        assert!((&k - k.transpose()).amax() < 1e-10);
    }

    #[test]
    fn hex8_uniaxial_strain_stress() {
        let coords = unit_hex();
        let mut u = [0.0; 24];
        for i in 0..8 {
            u[3 * i] = 0.01 * coords[i].x;
        }
        let stress = element_stress(CellType::Hex8, &coords, &u, &steel()).unwrap();
        let d = steel().constitutive_3d();
        assert_relative_eq!(stress.0[0], d[(0, 0)] * 0.01, epsilon = 1e-10);
        assert_relative_eq!(stress.0[1], d[(1, 0)] * 0.01, epsilon = 1e-10);
        assert_relative_eq!(stress.0[3], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn quad4_uniform_radial_expansion() {
        // u_r = c r gives ε_rr = ε_θθ = c
        let coords = vec![
            Vertex::new(1.0, 0.0, 0.0),
            Vertex::new(2.0, 0.0, 0.0),
            Vertex::new(2.0, 1.0, 0.0),
            Vertex::new(1.0, 1.0, 0.0),
        ];
        let c = 1e-3;
        let mut u = [0.0; 8];
        for i in 0..4 {
            u[2 * i] = c * coords[i].x;
        }
        let stress = element_stress(CellType::Quad4, &coords, &u, &steel()).unwrap();
        let d = steel().constitutive_axisymmetric();
        assert_relative_eq!(stress.0[0], (d[(0, 0)] + d[(0, 2)]) * c, epsilon = 1e-10);
        assert_relative_eq!(stress.0[2], (d[(2, 0)] + d[(2, 2)]) * c, epsilon = 1e-10);
        assert_relative_eq!(stress.0[3], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn quad4_axial_translation_is_stress_free() {
        let coords = vec![
            Vertex::new(1.0, 0.0, 0.0),
            Vertex::new(2.0, 0.0, 0.0),
            Vertex::new(2.0, 1.0, 0.0),
            Vertex::new(1.0, 1.0, 0.0),
        ];
        let k = element_stiffness(CellType::Quad4, &coords, &steel()).unwrap();
        let translation = nalgebra::DVector::from_fn(8, |i, _| if i % 2 == 1 { 1.0 } else { 0.0 });
        assert!((&k * translation).amax() < 1e-9);
    }

    #[test]
    fn degenerate_and_axis_cells_fail() {
        let flat = vec![Vertex::new(1.0, 0.0, 0.0); 4];
        assert!(element_stiffness(CellType::Quad4, &flat, &steel()).is_err());

        let on_axis = vec![
            Vertex::new(-1.0, 0.0, 0.0),
            Vertex::new(0.0, 0.0, 0.0),
            Vertex::new(0.0, 1.0, 0.0),
            Vertex::new(-1.0, 1.0, 0.0),
        ];
        assert!(element_stiffness(CellType::Quad4, &on_axis, &steel()).is_err());
    }
}
