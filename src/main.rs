use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use clap::{Args, Parser, Subcommand, ValueEnum};

use elastomer::{
    params::{self, ParameterSet},
    post_processor,
    scenario::Scenario,
    solver::{LinearSolver, DEFAULT_TOLERANCE},
    ui::TerminalUi,
    ElastomerError, LinearElasticEngine, Result, Session, SolveOptions,
};

#[derive(Parser)]
#[command(name = "elastomer", version, about = "Parametric simulation of rubber parts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve one parameter set and write all artifacts
    Run(RunArgs),
    /// Re-run whenever the parameter file changes
    Watch {
        #[command(flatten)]
        run: RunArgs,
        /// Polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval: u64,
    },
    /// List the controls of a scenario
    Controls {
        #[arg(long, value_enum, default_value_t = ScenarioArg::Spring)]
        scenario: ScenarioArg,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, value_enum)]
    scenario: Option<ScenarioArg>,
    /// Parameter file, {"scenario": ..., "parameters": {...}}
    #[arg(long)]
    params: Option<PathBuf>,
    /// Overrides one parameter
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// Output directory for charts, viewports and the summary
    #[arg(long, default_value = "results")]
    out: PathBuf,
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
    #[arg(long, value_enum, default_value_t = SolverArg::Cholesky)]
    solver: SolverArg,
    /// Compute element matrices in parallel
    #[arg(long)]
    parallel: bool,
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScenarioArg {
    Cube,
    Spring,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Scenario {
        match arg {
            ScenarioArg::Cube => Scenario::Cube,
            ScenarioArg::Spring => Scenario::Spring,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SolverArg {
    Cholesky,
    Cg,
}

impl RunArgs {
    fn options(&self) -> SolveOptions {
        SolveOptions {
            tolerance: self.tolerance,
            verbose: !self.quiet,
            parallel: self.parallel,
            ..SolveOptions::default()
        }
    }

    fn engine(&self) -> LinearElasticEngine {
        LinearElasticEngine::new(match self.solver {
            SolverArg::Cholesky => LinearSolver::Cholesky,
            SolverArg::Cg => LinearSolver::ConjugateGradient,
        })
    }

    /// Parameter file, then command line overrides
    fn parameters(&self) -> Result<ParameterSet> {
        let mut params = match &self.params {
            Some(path) => {
                let loaded = params::load_parameter_file(&path.to_string_lossy())?;
                if let Some(scenario) = self.scenario {
                    if Scenario::from(scenario) != loaded.scenario {
                        return Err(ElastomerError::Input(format!(
                            "Parameter file is for the {} scenario",
                            loaded.scenario
                        )));
                    }
                }
                loaded
            }
            None => {
                let scenario = self.scenario.map(Scenario::from).unwrap_or(Scenario::Spring);
                ParameterSet::defaults(scenario)
            }
        };
        for assignment in &self.set {
            let (name, value) = params::parse_assignment(assignment)?;
            params = params.with(&name, value)?;
        }
        Ok(params)
    }
}

fn write_summary(session: &Session<LinearElasticEngine>, out: &Path, quiet: bool) -> Result<()> {
    let (outcome, params) = match (session.outcome(), session.parameters()) {
        (Some(o), Some(p)) => (o, p),
        _ => return Ok(()),
    };
    std::fs::create_dir_all(out)?;
    let path = out.join("summary.json");
    let summary = post_processor::curves_json(params.scenario.name(), outcome.curves());
    post_processor::write_summary(&summary, &path)?;
    if !quiet {
        println!("info: wrote summary to {}", path.display());
    }
    Ok(())
}

fn run_once(args: &RunArgs) -> Result<()> {
    let params = args.parameters()?;
    let mut ui = TerminalUi::new(args.out.clone(), args.quiet);
    ui.answer_with(&params);

    let mut session = Session::new(args.engine(), args.options());
    if session.refresh(params.scenario, &mut ui).is_err() {
        // already reported by the ui
        std::process::exit(1)
    }
    write_summary(&session, &args.out, args.quiet)
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn watch(args: &RunArgs, interval: u64) -> Result<()> {
    let path = match &args.params {
        Some(p) => p.clone(),
        None => {
            return Err(ElastomerError::Input(
                "watch needs a parameter file (--params)".to_owned(),
            ))
        }
    };

    let mut ui = TerminalUi::new(args.out.clone(), args.quiet);
    let mut session = Session::new(args.engine(), args.options());
    let mut seen = None;
    println!("info: watching {} for changes", path.display());

    loop {
        let stamp = modified(&path);
        if stamp != seen {
            seen = stamp;
            match args.parameters() {
                Ok(params) => {
                    ui.answer_with(&params);
                    // failures are reported by the ui, keep watching
                    if let Ok(true) = session.refresh(params.scenario, &mut ui) {
                        write_summary(&session, &args.out, args.quiet)?;
                    }
                }
                Err(err) => eprintln!("warning [parameters]: {err}"),
            }
        }
        std::thread::sleep(Duration::from_millis(interval));
    }
}

fn list_controls(scenario: Scenario) {
    println!("{:<12} {:>10} {:>10} {:>10}  label", "name", "min", "max", "default");
    for control in scenario.controls() {
        println!(
            "{:<12} {:>10} {:>10} {:>10}  {}",
            control.name, control.min, control.max, control.default, control.label
        );
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run(args) => run_once(args),
        Command::Watch { run, interval } => watch(run, *interval),
        Command::Controls { scenario } => {
            list_controls((*scenario).into());
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1)
    }
}
