use nalgebra::{Matrix4, Matrix6};

use crate::error::{ElastomerError, Result};

/// Constitutive model of a solid body
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Material {
    /// Compressible Neo-Hookean solid (rubber)
    NeoHooke { mu: f64, bulk: f64 },
    /// Isotropic linear elastic solid (metal sheets)
    LinearElastic {
        youngs_modulus: f64,
        poisson_ratio: f64,
    },
}

impl Material {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Material::NeoHooke { mu, bulk } => {
                if mu <= 0.0 {
                    return Err(ElastomerError::configuration(
                        "mu",
                        "shear modulus must be positive",
                    ));
                }
                if bulk <= 0.0 {
                    return Err(ElastomerError::configuration(
                        "bulk",
                        "bulk modulus must be positive",
                    ));
                }
            }
            Material::LinearElastic {
                youngs_modulus,
                poisson_ratio,
            } => {
                if youngs_modulus <= 0.0 {
                    return Err(ElastomerError::configuration(
                        "E_metal",
                        "Young's modulus must be positive",
                    ));
                }
                if poisson_ratio <= -1.0 || poisson_ratio >= 0.5 {
                    return Err(ElastomerError::configuration(
                        "poisson_ratio",
                        "Poisson's ratio must be in (-1, 0.5)",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Small-strain Young's modulus. For the Neo-Hookean model this is the
    /// initial tangent, `9 K mu / (3 K + mu)`.
    pub fn youngs_modulus(&self) -> f64 {
        match *self {
            Material::NeoHooke { mu, bulk } => 9.0 * bulk * mu / (3.0 * bulk + mu),
            Material::LinearElastic { youngs_modulus, .. } => youngs_modulus,
        }
    }

    pub fn poisson_ratio(&self) -> f64 {
        match *self {
            Material::NeoHooke { mu, bulk } => (3.0 * bulk - 2.0 * mu) / (2.0 * (3.0 * bulk + mu)),
            Material::LinearElastic { poisson_ratio, .. } => poisson_ratio,
        }
    }

    fn lame(&self) -> (f64, f64) {
        let e = self.youngs_modulus();
        let nu = self.poisson_ratio();
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let mu = e / (2.0 * (1.0 + nu));
        (lambda, mu)
    }

    /// Constitutive matrix for `[rr, zz, θθ, rz]` (engineering shear strain)
    pub fn constitutive_axisymmetric(&self) -> Matrix4<f64> {
        let (lambda, mu) = self.lame();
        let c11 = lambda + 2.0 * mu;
        let c12 = lambda;

        #[rustfmt::skip]
        let d = Matrix4::new(
            c11, c12, c12, 0.0,
            c12, c11, c12, 0.0,
            c12, c12, c11, 0.0,
            0.0, 0.0, 0.0, mu,
        );
        d
    }

    /// Constitutive matrix in Voigt order `[xx, yy, zz, xy, yz, xz]`
    pub fn constitutive_3d(&self) -> Matrix6<f64> {
        let (lambda, mu) = self.lame();
        let c11 = lambda + 2.0 * mu;
        let c12 = lambda;

        #[rustfmt::skip]
        let d = Matrix6::new(
            c11, c12, c12, 0.0, 0.0, 0.0,
            c12, c11, c12, 0.0, 0.0, 0.0,
            c12, c12, c11, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, mu,  0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, mu,  0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, mu,
        );
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn neo_hooke_small_strain_equivalent() {
        let rubber = Material::NeoHooke { mu: 1.0, bulk: 2.0 };
        assert_relative_eq!(rubber.youngs_modulus(), 18.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(rubber.poisson_ratio(), 4.0 / 14.0, epsilon = 1e-12);

        // shear entry recovers mu
        let d = rubber.constitutive_3d();
        assert_relative_eq!(d[(3, 3)], 1.0, epsilon = 1e-12);
        // bulk modulus from the volumetric block
        assert_relative_eq!((d[(0, 0)] + 2.0 * d[(0, 1)]) / 3.0, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn invalid_materials_name_their_parameter() {
        let err = Material::NeoHooke { mu: 0.0, bulk: 1.0 }.validate().unwrap_err();
        assert!(err.to_string().contains("'mu'"));
        assert!(Material::LinearElastic {
            youngs_modulus: 210000.0,
            poisson_ratio: 0.5
        }
        .validate()
        .is_err());
    }

    #[test]
    fn axisymmetric_matches_3d_normal_block() {
        let steel = Material::LinearElastic {
            youngs_modulus: 210000.0,
            poisson_ratio: 0.3,
        };
        let d4 = steel.constitutive_axisymmetric();
        let d6 = steel.constitutive_3d();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(d4[(i, j)], d6[(i, j)]);
            }
        }
        assert_relative_eq!(d4[(3, 3)], 210000.0 / 2.6, epsilon = 1e-6);
    }
}
