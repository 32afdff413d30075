use std::collections::BTreeMap;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    datatypes::{CellType, ResultCurve, Vertex},
    error::{ElastomerError, Result},
    params::ParameterSet,
    post_processor,
};

/// Source of slider values
pub trait Controls {
    /// Returns the current value of the slider labelled `label`
    fn slider(&mut self, label: &str, min: f64, max: f64, default: f64) -> f64;
}

/// Receives the completed share of a run. Calls happen on the solving
/// thread and must return quickly.
pub trait Progress {
    fn set_fraction(&mut self, fraction: f64);

    /// Called before a new run starts reporting
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Warning(String),
    Error(String),
}

/// A curve to embed as a chart
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub name: String,
    pub title: String,
    pub curve: ResultCurve,
}

/// A mesh to embed in a 3D viewport, optionally colored per cell
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub name: String,
    pub title: String,
    pub points: Vec<Vertex>,
    pub cells: Vec<Vec<usize>>,
    pub cell_type: CellType,
    pub cell_data: Option<(String, Vec<f64>)>,
}

/// The user-facing collaborator of the pipeline
pub trait Ui: Controls + Progress {
    fn notify(&mut self, notice: Notice);

    fn show_chart(&mut self, chart: &Chart) -> Result<()>;

    fn show_viewport(&mut self, viewport: &Viewport) -> Result<()>;
}

/// Console front end. Slider values come from a parameter set, progress
/// is drawn with indicatif and artifacts are written to `out_dir`.
pub struct TerminalUi {
    pub out_dir: PathBuf,
    pub quiet: bool,
    answers: BTreeMap<String, f64>,
    bar: Option<ProgressBar>,
}

impl TerminalUi {
    pub fn new(out_dir: PathBuf, quiet: bool) -> TerminalUi {
        TerminalUi {
            out_dir,
            quiet,
            answers: BTreeMap::new(),
            bar: None,
        }
    }

    /// Answers the sliders of the parameter set's scenario with its values
    pub fn answer_with(&mut self, params: &ParameterSet) {
        self.answers.clear();
        for control in params.scenario.controls() {
            if let Ok(value) = params.get(control.name) {
                self.answers.insert(control.label.to_owned(), value);
            }
        }
    }

    fn artifact_path(&self, name: &str, extension: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.out_dir)?;
        Ok(self.out_dir.join(format!("{name}.{extension}")))
    }
}

impl Controls for TerminalUi {
    fn slider(&mut self, label: &str, _min: f64, _max: f64, default: f64) -> f64 {
        *self.answers.get(label).unwrap_or(&default)
    }
}

impl Progress for TerminalUi {
    fn set_fraction(&mut self, fraction: f64) {
        if self.quiet {
            return;
        }
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(1000);
            if let Ok(style) = ProgressStyle::with_template("{bar:40} {percent:>3}% {msg}") {
                bar.set_style(style);
            }
            bar
        });
        bar.set_position((fraction.clamp(0.0, 1.0) * 1000.0).round() as u64);
        if fraction >= 1.0 {
            bar.finish();
        }
    }

    fn reset(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Ui for TerminalUi {
    fn notify(&mut self, notice: Notice) {
        match notice {
            Notice::Info(message) => {
                if !self.quiet {
                    println!("info: {message}")
                }
            }
            Notice::Warning(message) => eprintln!("warning [ui]: {message}"),
            Notice::Error(message) => eprintln!("error: {message}"),
        }
    }

    fn show_chart(&mut self, chart: &Chart) -> Result<()> {
        let svg = self.artifact_path(&chart.name, "svg")?;
        let csv = self.artifact_path(&chart.name, "csv")?;
        post_processor::curve_csv(&chart.curve, &csv)?;
        post_processor::svg_chart(chart, &svg)?;
        if !self.quiet {
            println!("info: wrote chart to {}", svg.display());
        }
        Ok(())
    }

    fn show_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        let path = self.artifact_path(&viewport.name, "vtk")?;
        post_processor::vtk_output(viewport, &path)?;
        if !self.quiet {
            println!("info: wrote viewport to {}", path.display());
        }
        Ok(())
    }
}

/// In-memory front end. Records everything it is asked to show.
#[derive(Debug, Default)]
pub struct Headless {
    /// Slider values by label, defaults are used for missing labels
    pub values: BTreeMap<String, f64>,
    /// Labels in the order the sliders were requested
    pub requested: Vec<String>,
    pub fractions: Vec<f64>,
    pub resets: usize,
    pub notices: Vec<Notice>,
    pub charts: Vec<Chart>,
    pub viewports: Vec<Viewport>,
    /// Chart names that fail to embed
    pub failing_charts: Vec<String>,
}

impl Headless {
    pub fn new() -> Headless {
        Headless::default()
    }

    pub fn with_value(mut self, label: &str, value: f64) -> Headless {
        self.values.insert(label.to_owned(), value);
        self
    }

    pub fn failing_chart(mut self, name: &str) -> Headless {
        self.failing_charts.push(name.to_owned());
        self
    }

    pub fn errors(&self) -> Vec<&str> {
        self.notices
            .iter()
            .filter_map(|n| match n {
                Notice::Error(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Controls for Headless {
    fn slider(&mut self, label: &str, _min: f64, _max: f64, default: f64) -> f64 {
        self.requested.push(label.to_owned());
        *self.values.get(label).unwrap_or(&default)
    }
}

impl Progress for Headless {
    fn set_fraction(&mut self, fraction: f64) {
        self.fractions.push(fraction);
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.fractions.clear();
    }
}

impl Ui for Headless {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn show_chart(&mut self, chart: &Chart) -> Result<()> {
        if self.failing_charts.contains(&chart.name) {
            return Err(ElastomerError::Render(format!(
                "no display backend for chart {}",
                chart.name
            )));
        }
        self.charts.push(chart.clone());
        Ok(())
    }

    fn show_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.viewports.push(viewport.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;

    #[test]
    fn terminal_answers_from_parameters() {
        let params = ParameterSet::defaults(Scenario::Spring).with("H", 80.0).unwrap();
        let mut ui = TerminalUi::new(PathBuf::from("unused"), true);
        ui.answer_with(&params);
        let rebuilt = ParameterSet::from_controls(Scenario::Spring, &mut ui);
        assert_eq!(rebuilt, params);
    }

    #[test]
    fn headless_records_requests() {
        let mut ui = Headless::new().with_value("Maximum stretch", 1.5);
        let params = ParameterSet::from_controls(Scenario::Cube, &mut ui);
        assert_eq!(params.get("stretch").unwrap(), 1.5);
        assert_eq!(ui.requested.len(), 3);

        ui.set_fraction(0.5);
        ui.reset();
        assert!(ui.fractions.is_empty());
        assert_eq!(ui.resets, 1);
    }

    #[test]
    fn terminal_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut ui = TerminalUi::new(dir.path().join("out"), true);
        let mut curve = ResultCurve::new("force", "u", "F");
        curve.push(0.0, 0.0);
        curve.push(1.0, 2.0);
        ui.show_chart(&Chart {
            name: "force".to_owned(),
            title: "Force".to_owned(),
            curve,
        })
        .unwrap();
        assert!(dir.path().join("out/force.svg").exists());
        assert!(dir.path().join("out/force.csv").exists());
    }
}
