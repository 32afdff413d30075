use nalgebra::DVector;

use crate::{
    datatypes::{CellType, ResultCurve, StressMeasure},
    error::{ElastomerError, Result},
    field::FieldContainer,
    job::{HistoryEntry, Job, JobResult},
    mesher::MeshContainer,
    params::ParameterSet,
    scenario::Design,
    solver::{Engine, SolveOptions},
    ui::{Chart, Notice, Progress, Ui, Viewport},
};

/// Phases of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunState {
    Idle,
    BuildingGeometry,
    AssemblingFields,
    Solving { step: usize, fraction: f64 },
    SolvingAuxiliary { step: usize },
    Collected,
    Rendered,
    Failed,
}

/// What the job callback hands back for every converged increment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubstepRecord {
    pub step_index: usize,
    pub substep_index: usize,
    pub value: f64,
    pub fraction: f64,
    /// Lateral stiffness in kN/mm, when probed
    pub lateral: Option<f64>,
}

/// Everything a run produced before rendering
#[derive(Debug, Clone)]
pub struct Simulation {
    pub design: Design,
    pub trace: Vec<RunState>,
    pub history: Vec<HistoryEntry>,
    pub records: Vec<SubstepRecord>,
    pub displacement: DVector<f64>,
    pub curves: Vec<ResultCurve>,
    pub viewports: Vec<Viewport>,
}

impl Simulation {
    pub fn curve(&self, name: &str) -> Option<&ResultCurve> {
        self.curves.iter().find(|c| c.name == name)
    }
}

/// Artifacts that reached the UI and the ones that failed
#[derive(Debug, Default)]
pub struct Rendered {
    pub shown: Vec<String>,
    pub errors: Vec<ElastomerError>,
}

#[derive(Debug)]
pub struct Outcome {
    pub simulation: Simulation,
    pub rendered: Rendered,
}

impl Outcome {
    pub fn curves(&self) -> &[ResultCurve] {
        &self.simulation.curves
    }

    pub fn trace(&self) -> &[RunState] {
        &self.simulation.trace
    }
}

fn log(options: &SolveOptions, message: &str) {
    if options.verbose {
        println!("info: {message}");
    }
}

/// Builds, solves and post-processes one parameter set.
///
/// Parameters are validated before anything is meshed, so an inconsistent
/// set never reaches the engine.
///
/// # Arguments
/// * `params` - The parameter set of this run
/// * `engine` - The finite-element engine
/// * `options` - Solver options of the primary job
/// * `progress` - Receives the completed fraction after every increment
pub fn simulate<E, P>(
    params: &ParameterSet,
    engine: &E,
    options: &SolveOptions,
    progress: &mut P,
) -> Result<Simulation>
where
    E: Engine + ?Sized,
    P: Progress + ?Sized,
{
    simulate_traced(params, engine, options, progress, &mut Vec::new())
}

/// Like [`simulate`], recording each phase in `trace` as the run enters
/// it. A failed run ends its trace with [`RunState::Failed`].
pub fn simulate_traced<E, P>(
    params: &ParameterSet,
    engine: &E,
    options: &SolveOptions,
    progress: &mut P,
    trace: &mut Vec<RunState>,
) -> Result<Simulation>
where
    E: Engine + ?Sized,
    P: Progress + ?Sized,
{
    trace.clear();
    trace.push(RunState::Idle);
    let result = stages(params, engine, options, progress, trace);
    if result.is_err() {
        trace.push(RunState::Failed);
    }
    result
}

fn stages<E, P>(
    params: &ParameterSet,
    engine: &E,
    options: &SolveOptions,
    progress: &mut P,
    trace: &mut Vec<RunState>,
) -> Result<Simulation>
where
    E: Engine + ?Sized,
    P: Progress + ?Sized,
{
    trace.push(RunState::BuildingGeometry);
    let design = Design::from_parameters(params)?;
    log(options, &format!("building geometry for the {} scenario", design.scenario()));
    let container = design.geometry()?;

    trace.push(RunState::AssemblingFields);
    let step = design.step(&container)?;
    log(
        options,
        &format!(
            "assembled {} fields on {} points ({} dofs)",
            step.field.fields.len(),
            step.field.points.len(),
            step.field.ndof()
        ),
    );
    let job = Job::new(vec![step])?;
    let probe = design.probe();

    progress.reset();
    let result: JobResult<SubstepRecord> = job.evaluate(engine, options, |substep| {
        let fraction = substep.fraction();
        trace.push(RunState::Solving {
            step: substep.step_index,
            fraction,
        });
        progress.set_fraction(fraction);

        let lateral = match &probe {
            Some(p) => {
                trace.push(RunState::SolvingAuxiliary {
                    step: substep.step_index,
                });
                Some(p.evaluate(engine, substep, options)?)
            }
            None => None,
        };
        Ok(Some(SubstepRecord {
            step_index: substep.step_index,
            substep_index: substep.substep_index,
            value: substep.value,
            fraction,
            lateral,
        }))
    })?;

    let curves = collect_curves(&design, &result);
    let viewports = field_viewports(&design, &container, &job, engine, &result.displacement)?;
    trace.push(RunState::Collected);
    log(options, "collected results");

    Ok(Simulation {
        design,
        trace: trace.clone(),
        history: result.history,
        records: result.records,
        displacement: result.displacement,
        curves,
        viewports,
    })
}

/// Characteristic curves of a finished job in user-facing units
pub fn collect_curves(design: &Design, result: &JobResult<SubstepRecord>) -> Vec<ResultCurve> {
    match design {
        Design::Cube(_) => {
            let mut force = ResultCurve::new("force", "Displacement", "Reaction force");
            for entry in &result.history {
                force.push(entry.value, entry.reaction);
            }
            vec![force]
        }
        Design::Spring(spring) => {
            let mut axial = ResultCurve::new("axial", "Displacement in mm", "Axial force in kN");
            for entry in &result.history {
                axial.push(entry.value, -entry.reaction / 1000.0);
            }
            let mut curves = vec![axial];

            if spring.lateral {
                let mut lateral =
                    ResultCurve::new("lateral", "Displacement in mm", "Lateral stiffness in kN/mm");
                for record in &result.records {
                    if let Some(stiffness) = record.lateral {
                        lateral.push(record.value, stiffness);
                    }
                }
                curves.push(lateral);
            }
            curves
        }
    }
}

fn mesh_viewport(container: &MeshContainer) -> Viewport {
    let cell_type = container.blocks.first().map(|b| b.cell_type).unwrap_or(CellType::Quad4);
    Viewport {
        name: "mesh".to_owned(),
        title: "Mesh".to_owned(),
        points: container.points.clone(),
        cells: container.blocks.iter().flat_map(|b| b.cells.iter().cloned()).collect(),
        cell_type,
        cell_data: None,
    }
}

fn field_viewport(
    field: &FieldContainer,
    displacement: Option<&DVector<f64>>,
    measure: StressMeasure,
    values: Vec<f64>,
) -> Viewport {
    let points = match displacement {
        Some(u) => field.deformed_points(u),
        None => field.points.clone(),
    };
    let cell_type = field
        .fields
        .first()
        .map(|f| f.region.cell_type)
        .unwrap_or(CellType::Hex8);
    Viewport {
        name: "field".to_owned(),
        title: format!("Deformed field, {}", measure.label()),
        points,
        cells: field.fields.iter().flat_map(|f| f.region.cells.iter().cloned()).collect(),
        cell_type,
        cell_data: Some((measure.label().to_owned(), values)),
    }
}

/// Undeformed mesh and deformed field with the scenario's stress measure
fn field_viewports<E>(
    design: &Design,
    container: &MeshContainer,
    job: &Job,
    engine: &E,
    displacement: &DVector<f64>,
) -> Result<Vec<Viewport>>
where
    E: Engine + ?Sized,
{
    let mut viewports = vec![mesh_viewport(container)];
    let measure = design.measure();

    for step in &job.steps {
        let stresses = engine.stresses(&step.field, &step.bodies, displacement)?;
        let values: Vec<f64> = stresses.iter().map(|s| measure.evaluate(s)).collect();

        let viewport = match design.display_revolution() {
            Some((segments, phi)) => {
                let revolved = step.field.revolve(Some(displacement), segments, phi)?;
                let repeated = values
                    .iter()
                    .flat_map(|v| std::iter::repeat(*v).take(segments))
                    .collect();
                field_viewport(&revolved, None, measure, repeated)
            }
            None => field_viewport(&step.field, Some(displacement), measure, values),
        };
        viewports.push(viewport);
    }

    Ok(viewports)
}

fn chart_title(curve: &ResultCurve) -> String {
    format!("{} over {}", curve.y_label, curve.x_label)
}

/// Shows every artifact of a simulation. A failing artifact is logged,
/// reported to the UI and skipped.
pub fn render<U>(simulation: &Simulation, ui: &mut U) -> Rendered
where
    U: Ui + ?Sized,
{
    let mut rendered = Rendered::default();
    let mut record = |ui: &mut U, name: &str, result: Result<()>| match result {
        Ok(()) => rendered.shown.push(name.to_owned()),
        Err(err) => {
            // one broken artifact never aborts the others
            let err = if err.is_fatal() {
                ElastomerError::Render(format!("{name}: {err}"))
            } else {
                err
            };
            eprintln!("warning [render]: {name}: {err}");
            ui.notify(Notice::Warning(format!("Could not display {name}: {err}")));
            rendered.errors.push(err);
        }
    };

    for viewport in &simulation.viewports {
        let result = ui.show_viewport(viewport);
        record(ui, &viewport.name, result);
    }
    for curve in &simulation.curves {
        let chart = Chart {
            name: curve.name.clone(),
            title: chart_title(curve),
            curve: curve.clone(),
        };
        let result = ui.show_chart(&chart);
        record(ui, &chart.name, result);
    }

    rendered
}

fn notice(err: &ElastomerError) -> Notice {
    if err.is_fatal() {
        Notice::Error(err.to_string())
    } else {
        Notice::Warning(err.to_string())
    }
}

/// One full pass from parameters to displayed artifacts. Configuration
/// and convergence failures are reported to the UI and returned without
/// rendering anything.
pub fn run<E, U>(
    params: &ParameterSet,
    engine: &E,
    options: &SolveOptions,
    ui: &mut U,
) -> Result<Outcome>
where
    E: Engine + ?Sized,
    U: Ui + ?Sized,
{
    run_traced(params, engine, options, ui, &mut Vec::new())
}

/// Like [`run`], keeping the phases of the run in `trace`
pub fn run_traced<E, U>(
    params: &ParameterSet,
    engine: &E,
    options: &SolveOptions,
    ui: &mut U,
    trace: &mut Vec<RunState>,
) -> Result<Outcome>
where
    E: Engine + ?Sized,
    U: Ui + ?Sized,
{
    let mut simulation = match simulate_traced(params, engine, options, ui, trace) {
        Ok(s) => s,
        Err(err) => {
            ui.notify(notice(&err));
            return Err(err);
        }
    };

    let rendered = render(&simulation, ui);
    trace.push(RunState::Rendered);
    simulation.trace.push(RunState::Rendered);
    if rendered.errors.is_empty() {
        ui.notify(Notice::Info(format!(
            "{} simulation finished after {} substeps",
            simulation.design.scenario(),
            simulation.history.len()
        )));
    }

    Ok(Outcome {
        simulation,
        rendered,
    })
}
