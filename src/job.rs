use nalgebra::DVector;

use crate::{
    error::{ElastomerError, Result},
    field::{FieldContainer, SolidBody},
    loadcase::{Boundaries, Ramp},
    solver::{Engine, Problem, SolveOptions},
};

/// A field with its bodies, boundaries and the ramp driven through them
#[derive(Debug, Clone)]
pub struct Step {
    pub field: FieldContainer,
    pub bodies: Vec<SolidBody>,
    pub ramp: Ramp,
    pub boundaries: Boundaries,
    /// Overrides the job tolerance for this step
    pub tolerance: Option<f64>,
}

impl Step {
    pub fn new(
        field: FieldContainer,
        bodies: Vec<SolidBody>,
        ramp: Ramp,
        boundaries: Boundaries,
    ) -> Result<Step> {
        if ramp.is_empty() {
            return Err(ElastomerError::Model(format!(
                "Ramp on '{}' has no values",
                ramp.boundary
            )));
        }
        if boundaries.get(&ramp.boundary).is_none() {
            return Err(ElastomerError::Model(format!(
                "Ramp drives unknown boundary '{}'",
                ramp.boundary
            )));
        }
        if bodies.is_empty() {
            return Err(ElastomerError::Model("Step has no solid bodies".to_owned()));
        }

        Ok(Step {
            field,
            bodies,
            ramp,
            boundaries,
            tolerance: None,
        })
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Step {
        self.tolerance = Some(tolerance);
        self
    }

    /// Sum of the internal forces on the ramped components of the ramped
    /// boundary
    fn reaction(&self, forces: &DVector<f64>) -> f64 {
        let dim = self.field.dim();
        match self.boundaries.get(&self.ramp.boundary) {
            Some(b) => b
                .points
                .iter()
                .flat_map(|&p| b.components.iter().map(move |&c| forces[p * dim + c]))
                .sum(),
            None => 0.0,
        }
    }
}

/// View of one converged increment handed to the job callback
pub struct Substep<'a> {
    pub step_index: usize,
    pub substep_index: usize,
    pub substeps: usize,
    pub steps: usize,
    /// Ramp value of this increment
    pub value: f64,
    pub field: &'a FieldContainer,
    pub bodies: &'a [SolidBody],
    pub displacement: &'a DVector<f64>,
    pub reactions: &'a DVector<f64>,
}

impl<'a> Substep<'a> {
    /// Completed share of the whole job, in [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.steps == 0 || self.substeps == 0 {
            return 1.0;
        }
        let within = (self.substep_index + 1) as f64 / self.substeps as f64;
        ((self.step_index as f64 + within) / self.steps as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub step_index: usize,
    pub substep_index: usize,
    pub value: f64,
    pub reaction: f64,
    pub iterations: usize,
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult<T> {
    pub history: Vec<HistoryEntry>,
    /// Converged displacement of the last increment
    pub displacement: DVector<f64>,
    /// Values returned by the callback, in substep order
    pub records: Vec<T>,
}

/// Ordered steps solved one increment at a time. The displacement of each
/// increment is the starting point of the next.
#[derive(Debug, Clone)]
pub struct Job {
    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(steps: Vec<Step>) -> Result<Job> {
        let ndof = match steps.first() {
            Some(s) => s.field.ndof(),
            None => return Err(ElastomerError::Model("Job has no steps".to_owned())),
        };
        if steps.iter().any(|s| s.field.ndof() != ndof) {
            return Err(ElastomerError::Model(
                "All steps of a job must share one field layout".to_owned(),
            ));
        }
        Ok(Job { steps })
    }

    /// Total number of increments over all steps
    pub fn substeps(&self) -> usize {
        self.steps.iter().map(|s| s.ramp.len()).sum()
    }

    /// Solves every increment in order and invokes `callback` after each
    /// converged one. An error from the engine or the callback aborts the
    /// job.
    ///
    /// # Arguments
    /// * `engine` - The finite-element engine
    /// * `options` - Job-wide solver options
    /// * `callback` - Called once per converged increment
    ///
    /// # Returns
    /// The increment history, the last displacement and the collected
    /// callback values
    pub fn evaluate<E, T, F>(
        &self,
        engine: &E,
        options: &SolveOptions,
        mut callback: F,
    ) -> Result<JobResult<T>>
    where
        E: Engine + ?Sized,
        F: FnMut(&Substep<'_>) -> Result<Option<T>>,
    {
        let mut displacement = match self.steps.first() {
            Some(s) => DVector::zeros(s.field.ndof()),
            None => return Err(ElastomerError::Model("Job has no steps".to_owned())),
        };
        let mut history = Vec::with_capacity(self.substeps());
        let mut records = Vec::new();

        for (step_index, step) in self.steps.iter().enumerate() {
            let step_options = SolveOptions {
                tolerance: step.tolerance.unwrap_or(options.tolerance),
                ..*options
            };
            let dim = step.field.dim();

            for (substep_index, &value) in step.ramp.values.iter().enumerate() {
                let constraints = step
                    .boundaries
                    .constraints(dim, Some((step.ramp.boundary.as_str(), value)));
                let solution = engine.solve(
                    &Problem {
                        field: &step.field,
                        bodies: &step.bodies,
                        constraints: &constraints,
                        initial: &displacement,
                    },
                    &step_options,
                )?;

                if options.verbose {
                    println!(
                        "info: step {}/{} substep {}/{} converged after {} iterations (residual {:.2e})",
                        step_index + 1,
                        self.steps.len(),
                        substep_index + 1,
                        step.ramp.len(),
                        solution.iterations,
                        solution.residual
                    );
                }

                history.push(HistoryEntry {
                    step_index,
                    substep_index,
                    value,
                    reaction: step.reaction(&solution.reactions),
                    iterations: solution.iterations,
                    residual: solution.residual,
                });
                displacement = solution.displacement;

                let substep = Substep {
                    step_index,
                    substep_index,
                    substeps: step.ramp.len(),
                    steps: self.steps.len(),
                    value,
                    field: &step.field,
                    bodies: &step.bodies,
                    displacement: &displacement,
                    reactions: &solution.reactions,
                };
                if let Some(record) = callback(&substep)? {
                    records.push(record);
                }
            }
        }

        Ok(JobResult {
            history,
            displacement,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{assign_fields, solid_bodies, Formulation};
    use crate::loadcase::{linsteps, uniaxial, MOVE};
    use crate::materials::Material;
    use crate::mesher::{Mesh, MeshContainer};
    use crate::datatypes::StressTensor;
    use crate::solver::{LinearElasticEngine, Solution};
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    fn cube_step(n: usize, steps: usize) -> Step {
        let mesh = Mesh::cube([0.0; 3], [1.0; 3], [n, n, n]).unwrap();
        let container = MeshContainer::new(&[mesh]).unwrap();
        let field = assign_fields(&container, &[Formulation::Solid]).unwrap();
        let bodies = solid_bodies(&field, &[Material::NeoHooke { mu: 1.0, bulk: 2.0 }]).unwrap();
        let boundaries = uniaxial(&field, 0, true, true).unwrap();
        let ramp = Ramp::new(MOVE, linsteps(0.0, 0.1, steps).unwrap());
        Step::new(field, bodies, ramp, boundaries).unwrap()
    }

    #[test]
    fn callback_records_are_collected_in_order() {
        let job = Job::new(vec![cube_step(2, 4)]).unwrap();
        let result = job
            .evaluate(&LinearElasticEngine::default(), &SolveOptions::default(), |s| {
                Ok(Some(s.fraction()))
            })
            .unwrap();
        assert_eq!(result.records, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(result.history.len(), 4);
        assert_eq!(result.history[0].reaction, 0.0);
        assert!(result.history[3].reaction > 0.0);
    }

    #[test]
    fn reaction_grows_linearly_with_the_ramp() {
        let job = Job::new(vec![cube_step(2, 3)]).unwrap();
        let result = job
            .evaluate(
                &LinearElasticEngine::default(),
                &SolveOptions {
                    tolerance: 1e-10,
                    ..SolveOptions::default()
                },
                |_| Ok(None::<()>),
            )
            .unwrap();
        assert!(result.records.is_empty());
        assert_relative_eq!(
            result.history[2].reaction,
            2.0 * result.history[1].reaction,
            epsilon = 1e-9
        );
    }

    #[test]
    fn fractions_span_multiple_steps() {
        let job = Job::new(vec![cube_step(2, 2), cube_step(2, 3)]).unwrap();
        assert_eq!(job.substeps(), 5);
        let result = job
            .evaluate(&LinearElasticEngine::default(), &SolveOptions::default(), |s| {
                Ok(Some(s.fraction()))
            })
            .unwrap();
        let expected = [0.25, 0.5, 0.5 + 1.0 / 6.0, 0.5 + 2.0 / 6.0, 1.0];
        for (got, want) in result.records.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn step_tolerance_overrides_the_job_tolerance() {
        struct Recording {
            inner: LinearElasticEngine,
            tolerances: Mutex<Vec<f64>>,
        }

        impl Engine for Recording {
            fn solve(&self, problem: &Problem<'_>, options: &SolveOptions) -> Result<Solution> {
                if let Ok(mut seen) = self.tolerances.lock() {
                    seen.push(options.tolerance);
                }
                self.inner.solve(problem, options)
            }

            fn stresses(
                &self,
                field: &FieldContainer,
                bodies: &[SolidBody],
                u: &DVector<f64>,
            ) -> Result<Vec<StressTensor>> {
                self.inner.stresses(field, bodies, u)
            }
        }

        let engine = Recording {
            inner: LinearElasticEngine::default(),
            tolerances: Mutex::new(Vec::new()),
        };
        let job = Job::new(vec![cube_step(2, 2).with_tolerance(1e-6), cube_step(2, 1)]).unwrap();
        job.evaluate(&engine, &SolveOptions::default(), |_| Ok(None::<()>)).unwrap();

        assert_eq!(
            *engine.tolerances.lock().unwrap(),
            vec![1e-6, 1e-6, SolveOptions::default().tolerance]
        );
    }

    #[test]
    fn callback_error_aborts_the_job() {
        let job = Job::new(vec![cube_step(2, 5)]).unwrap();
        let mut calls = 0;
        let err = job
            .evaluate(&LinearElasticEngine::default(), &SolveOptions::default(), |s| {
                calls += 1;
                if s.substep_index == 1 {
                    Err(ElastomerError::Solver("probe failed".to_owned()))
                } else {
                    Ok(Some(()))
                }
            })
            .unwrap_err();
        assert!(matches!(err, ElastomerError::Solver(_)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn ramp_must_drive_an_existing_boundary() {
        let step = cube_step(2, 2);
        let ramp = Ramp::new("nowhere", vec![1.0]);
        let boundaries = step.boundaries.clone();
        assert!(Step::new(step.field.clone(), step.bodies.clone(), ramp, boundaries).is_err());
        assert!(Job::new(Vec::new()).is_err());
        assert!(Job::new(vec![cube_step(2, 2), cube_step(3, 2)]).is_err());
    }
}
