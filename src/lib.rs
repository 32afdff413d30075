//! Parametric simulation of rubber parts.
//!
//! A [`params::ParameterSet`] selects a [`scenario::Scenario`] and its
//! slider values. [`pipeline::run`] meshes the part, solves the
//! displacement ramp with an [`solver::Engine`], probes the lateral
//! stiffness where the scenario asks for it and hands meshes and curves to
//! a [`ui::Ui`]. [`session::Session`] re-runs the pipeline whenever the
//! parameters change.

pub mod datatypes;
pub mod elements;
pub mod error;
pub mod field;
pub mod job;
pub mod loadcase;
pub mod materials;
pub mod mesher;
pub mod params;
pub mod pipeline;
pub mod post_processor;
pub mod probe;
pub mod scenario;
pub mod session;
pub mod solver;
pub mod ui;

pub use error::{ElastomerError, Result};
pub use params::ParameterSet;
pub use pipeline::{run, simulate, Outcome, RunState};
pub use scenario::Scenario;
pub use session::Session;
pub use solver::{Engine, LinearElasticEngine, SolveOptions};
