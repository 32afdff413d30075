use crate::{
    error::Result,
    params::ParameterSet,
    pipeline::{self, Outcome, RunState},
    scenario::Scenario,
    solver::{Engine, SolveOptions},
    ui::Ui,
};

/// Re-runs the pipeline whenever the parameter set changes.
///
/// Only the last parameter set and its outcome are kept. A change discards
/// the previous outcome before the new run starts.
pub struct Session<E: Engine> {
    engine: E,
    options: SolveOptions,
    last: Option<ParameterSet>,
    outcome: Option<Outcome>,
    trace: Vec<RunState>,
    runs: usize,
}

impl<E: Engine> Session<E> {
    pub fn new(engine: E, options: SolveOptions) -> Session<E> {
        Session {
            engine,
            options,
            last: None,
            outcome: None,
            trace: vec![RunState::Idle],
            runs: 0,
        }
    }

    /// Runs the pipeline if `params` differ from the previous call.
    ///
    /// # Returns
    /// Whether a run took place
    pub fn update<U>(&mut self, params: ParameterSet, ui: &mut U) -> Result<bool>
    where
        U: Ui + ?Sized,
    {
        if self.last.as_ref() == Some(&params) {
            return Ok(false);
        }

        self.outcome = None;
        self.runs += 1;
        let result =
            pipeline::run_traced(&params, &self.engine, &self.options, ui, &mut self.trace);
        self.last = Some(params);

        let outcome = result?;
        self.outcome = Some(outcome);
        Ok(true)
    }

    /// Reads the sliders of `scenario` from the UI and updates
    pub fn refresh<U>(&mut self, scenario: Scenario, ui: &mut U) -> Result<bool>
    where
        U: Ui,
    {
        let params = ParameterSet::from_controls(scenario, ui);
        self.update(params, ui)
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Phase the last run ended in
    pub fn state(&self) -> RunState {
        self.trace.last().copied().unwrap_or(RunState::Idle)
    }

    /// Phases of the last run, kept when it failed
    pub fn trace(&self) -> &[RunState] {
        &self.trace
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn parameters(&self) -> Option<&ParameterSet> {
        self.last.as_ref()
    }
}
