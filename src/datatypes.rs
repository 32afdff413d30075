use nalgebra::{Matrix3, SymmetricEigen};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64, z: f64) -> Vertex {
        Vertex { x, y, z }
    }

    /// Returns the coordinate along `axis` (0 = x, 1 = y, 2 = z)
    pub fn coord(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn coord_mut(&mut self, axis: usize) -> &mut f64 {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Bilinear quadrilateral, counter-clockwise
    Quad4,
    /// Trilinear hexahedron, bottom face then top face
    Hex8,
}

/// Cauchy stress in Voigt order `[xx, yy, zz, xy, yz, xz]`.
///
/// Axisymmetric results map `rr -> xx`, `zz -> yy`, `θθ -> zz`, `rz -> xy`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressTensor(pub [f64; 6]);

impl StressTensor {
    pub fn zero() -> StressTensor {
        StressTensor([0.0; 6])
    }

    pub fn von_mises(&self) -> f64 {
        let [sxx, syy, szz, sxy, syz, sxz] = self.0;
        f64::sqrt(
            0.5 * ((sxx - syy).powi(2) + (syy - szz).powi(2) + (szz - sxx).powi(2))
                + 3.0 * (sxy.powi(2) + syz.powi(2) + sxz.powi(2)),
        )
    }

    /// Principal values, sorted descending
    pub fn principal(&self) -> [f64; 3] {
        let [sxx, syy, szz, sxy, syz, sxz] = self.0;
        let tensor = Matrix3::new(sxx, sxy, sxz, sxy, syy, syz, sxz, syz, szz);
        let eigen = SymmetricEigen::new(tensor);
        let mut values = [
            eigen.eigenvalues[0],
            eigen.eigenvalues[1],
            eigen.eigenvalues[2],
        ];
        values.sort_by(|a, b| b.total_cmp(a));
        values
    }

    pub fn average(tensors: &[StressTensor]) -> StressTensor {
        if tensors.is_empty() {
            return StressTensor::zero();
        }
        let mut sum = [0.0; 6];
        for tensor in tensors {
            for (s, t) in sum.iter_mut().zip(tensor.0) {
                *s += t;
            }
        }
        for s in &mut sum {
            *s /= tensors.len() as f64;
        }
        StressTensor(sum)
    }
}

/// Scalar measure derived from a stress tensor for field plots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressMeasure {
    VonMises,
    MaxPrincipal,
}

impl StressMeasure {
    pub fn label(&self) -> &'static str {
        match self {
            StressMeasure::VonMises => "Equivalent of Cauchy Stress",
            StressMeasure::MaxPrincipal => "Principal Values of Cauchy Stress",
        }
    }

    pub fn evaluate(&self, stress: &StressTensor) -> f64 {
        match self {
            StressMeasure::VonMises => stress.von_mises(),
            StressMeasure::MaxPrincipal => stress.principal()[0],
        }
    }
}

/// Characteristic curve, one point per converged load step
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCurve {
    pub name: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<(f64, f64)>,
}

impl ResultCurve {
    pub fn new(name: &str, x_label: &str, y_label: &str) -> ResultCurve {
        ResultCurve {
            name: name.to_owned(),
            x_label: x_label.to_owned(),
            y_label: y_label.to_owned(),
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.points.push((x, y));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn xs(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(x, _)| *x)
    }

    pub fn ys(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, y)| *y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniaxial_stress_measures() {
        let stress = StressTensor([100.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_relative_eq!(stress.von_mises(), 100.0, epsilon = 1e-10);
        let principal = stress.principal();
        assert_relative_eq!(principal[0], 100.0, epsilon = 1e-10);
        assert_relative_eq!(principal[2], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn pure_shear_principal_values() {
        let stress = StressTensor([0.0, 0.0, 0.0, 50.0, 0.0, 0.0]);
        let principal = stress.principal();
        assert_relative_eq!(principal[0], 50.0, epsilon = 1e-9);
        assert_relative_eq!(principal[2], -50.0, epsilon = 1e-9);
        assert_relative_eq!(stress.von_mises(), 50.0 * 3f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn average_of_gauss_point_stresses() {
        let a = StressTensor([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = StressTensor([3.0, 2.0, 1.0, 0.0, -1.0, -2.0]);
        assert_eq!(
            StressTensor::average(&[a, b]),
            StressTensor([2.0, 2.0, 2.0, 2.0, 2.0, 2.0])
        );
        assert_eq!(StressTensor::average(&[]), StressTensor::zero());
    }
}
