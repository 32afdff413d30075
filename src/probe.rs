use nalgebra::DVector;

use crate::{
    error::{ElastomerError, Result},
    job::Substep,
    loadcase::{select_points, Boundaries, Boundary},
    mesher,
    solver::{Engine, Problem, SolveOptions},
};

/// Lateral stiffness of an axisymmetric model at a converged increment.
///
/// The deformed cross-section is revolved into a half solid, clamped at
/// the bottom and sheared on the top face. Only the probe's own 3D model
/// is solved; the increment is read, never written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateralProbe {
    /// Cells in circumferential direction
    pub segments: usize,
    /// Swept angle in degrees. Must be 180 for the symmetry plane to hold.
    pub phi: f64,
    /// Shear displacement relative to the model height
    pub shear: f64,
    /// Probe tolerance is the primary tolerance times this factor
    pub tolerance_factor: f64,
}

impl Default for LateralProbe {
    fn default() -> Self {
        LateralProbe {
            segments: 6,
            phi: 180.0,
            shear: 1e-6,
            tolerance_factor: 10.0,
        }
    }
}

impl LateralProbe {
    /// Evaluates the lateral stiffness in kN/mm.
    ///
    /// # Arguments
    /// * `engine` - The engine for the auxiliary solve
    /// * `substep` - The converged increment to probe
    /// * `options` - Primary solver options
    pub fn evaluate<E>(
        &self,
        engine: &E,
        substep: &Substep<'_>,
        options: &SolveOptions,
    ) -> Result<f64>
    where
        E: Engine + ?Sized,
    {
        let solid = substep
            .field
            .revolve(Some(substep.displacement), self.segments, self.phi)?;

        let (bottom_z, top_z) = mesher::bounds(&solid.points, 2);
        let height = top_z - bottom_z;
        if height <= 0.0 {
            return Err(ElastomerError::Model(
                "Cannot probe a model without height".to_owned(),
            ));
        }
        let delta = self.shear * height;
        let tol = 1e-6 * height.max(1.0);

        let top = select_points(&solid, 2, top_z, tol);
        let mut boundaries = Boundaries::new();
        boundaries.push(Boundary {
            name: "symy".to_owned(),
            points: select_points(&solid, 1, 0.0, tol),
            components: vec![1],
            value: 0.0,
        });
        boundaries.push(Boundary {
            name: "bottom".to_owned(),
            points: select_points(&solid, 2, bottom_z, tol),
            components: vec![0, 1, 2],
            value: 0.0,
        });
        boundaries.push(Boundary {
            name: "top".to_owned(),
            points: top.clone(),
            components: vec![1, 2],
            value: 0.0,
        });
        boundaries.push(Boundary {
            name: "shear".to_owned(),
            points: top.clone(),
            components: vec![0],
            value: delta,
        });

        let constraints = boundaries.constraints(3, None);
        let initial = DVector::zeros(solid.ndof());
        let probe_options = SolveOptions {
            tolerance: options.tolerance * self.tolerance_factor,
            verbose: false,
            ..*options
        };
        let solution = engine.solve(
            &Problem {
                field: &solid,
                bodies: substep.bodies,
                constraints: &constraints,
                initial: &initial,
            },
            &probe_options,
        )?;

        let reaction: f64 = top.iter().map(|&p| solution.reactions[p * 3]).sum();
        let stiffness = 2.0 * reaction / delta / 1000.0;

        if options.verbose {
            println!(
                "info: lateral stiffness at step {} substep {}: {:.4} kN/mm",
                substep.step_index + 1,
                substep.substep_index + 1,
                stiffness
            );
        }

        Ok(stiffness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{assign_fields, solid_bodies, Formulation};
    use crate::materials::Material;
    use crate::mesher::{Mesh, MeshContainer};
    use crate::solver::LinearElasticEngine;
    use approx::assert_relative_eq;

    #[test]
    fn short_tube_in_shear() {
        // ring 10 < r < 20, height 5, shear modulus 1
        let mesh = Mesh::rectangle([10.0, 0.0], [20.0, 5.0], [4, 3]).unwrap();
        let container = MeshContainer::new(&[mesh]).unwrap();
        let field = assign_fields(&container, &[Formulation::Axisymmetric]).unwrap();
        let material = Material::LinearElastic {
            youngs_modulus: 2.6,
            poisson_ratio: 0.3,
        };
        let bodies = solid_bodies(&field, &[material]).unwrap();
        let displacement = DVector::zeros(field.ndof());
        let reactions = DVector::zeros(field.ndof());
        let substep = Substep {
            step_index: 0,
            substep_index: 0,
            substeps: 1,
            steps: 1,
            value: 0.0,
            field: &field,
            bodies: &bodies,
            displacement: &displacement,
            reactions: &reactions,
        };

        let probe = LateralProbe {
            segments: 8,
            ..LateralProbe::default()
        };
        let stiffness = probe
            .evaluate(&LinearElasticEngine::default(), &substep, &SolveOptions::default())
            .unwrap();

        // pure shear estimate G * A / h, bending only lowers it
        let shear_estimate = std::f64::consts::PI * (400.0 - 100.0) / 5.0 / 1000.0;
        assert!(stiffness > 0.3 * shear_estimate, "{stiffness}");
        assert!(stiffness < 1.5 * shear_estimate, "{stiffness}");

        // probing twice gives the same value
        let again = probe
            .evaluate(&LinearElasticEngine::default(), &substep, &SolveOptions::default())
            .unwrap();
        assert_relative_eq!(stiffness, again);
    }
}
