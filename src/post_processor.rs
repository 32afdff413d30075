use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use json::{object, JsonValue};
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::{
    datatypes::{CellType, ResultCurve},
    error::{ElastomerError, Result},
    ui::{Chart, Viewport},
};

const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 420.0;
const CHART_MARGIN: f64 = 60.0;

fn create(path: &Path) -> Result<BufWriter<File>> {
    match File::create(path) {
        Ok(f) => Ok(BufWriter::new(f)),
        Err(err) => Err(ElastomerError::Render(format!(
            "Failed to create {}: {err}",
            path.display()
        ))),
    }
}

fn render_error(path: &Path, err: std::io::Error) -> ElastomerError {
    ElastomerError::Render(format!("Failed to write {}: {err}", path.display()))
}

/// Writes a curve as two-column csv
///
/// # Arguments
/// * `curve` - The curve to write
/// * `path` - Output file
pub fn curve_csv(curve: &ResultCurve, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    let mut write = || -> std::io::Result<()> {
        writeln!(file, "{},{}", curve.x_label, curve.y_label)?;
        for (x, y) in &curve.points {
            writeln!(file, "{x},{y}")?;
        }
        file.flush()
    };
    write().map_err(|err| render_error(path, err))
}

fn svg_element(name: &str, attributes: &[(&str, String)]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element.attributes.insert((*key).to_owned(), value.clone());
    }
    element
}

fn svg_text(x: f64, y: f64, anchor: &str, text: &str) -> Element {
    let mut element = svg_element(
        "text",
        &[
            ("x", format!("{x:.1}")),
            ("y", format!("{y:.1}")),
            ("text-anchor", anchor.to_owned()),
            ("font-family", "sans-serif".to_owned()),
            ("font-size", "12".to_owned()),
        ],
    );
    element.children.push(XMLNode::Text(text.to_owned()));
    element
}

/// Range of the values, widened when it is empty
fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

/// Builds the svg document of a line chart
pub fn svg_document(chart: &Chart) -> Element {
    let curve = &chart.curve;
    let (x_lo, x_hi) = span(curve.xs());
    let (y_lo, y_hi) = span(curve.ys());
    let plot_w = CHART_WIDTH - 2.0 * CHART_MARGIN;
    let plot_h = CHART_HEIGHT - 2.0 * CHART_MARGIN;
    let px = |x: f64| CHART_MARGIN + (x - x_lo) / (x_hi - x_lo) * plot_w;
    let py = |y: f64| CHART_HEIGHT - CHART_MARGIN - (y - y_lo) / (y_hi - y_lo) * plot_h;

    let mut svg = svg_element(
        "svg",
        &[
            ("xmlns", "http://www.w3.org/2000/svg".to_owned()),
            ("width", format!("{CHART_WIDTH}")),
            ("height", format!("{CHART_HEIGHT}")),
            ("viewBox", format!("0 0 {CHART_WIDTH} {CHART_HEIGHT}")),
        ],
    );

    let mut frame = vec![
        svg_element(
            "rect",
            &[
                ("x", format!("{CHART_MARGIN}")),
                ("y", format!("{CHART_MARGIN}")),
                ("width", format!("{plot_w}")),
                ("height", format!("{plot_h}")),
                ("fill", "none".to_owned()),
                ("stroke", "black".to_owned()),
            ],
        ),
        svg_text(CHART_WIDTH / 2.0, CHART_MARGIN / 2.0, "middle", &chart.title),
        svg_text(CHART_WIDTH / 2.0, CHART_HEIGHT - 15.0, "middle", &curve.x_label),
        svg_text(15.0, CHART_MARGIN - 10.0, "start", &curve.y_label),
        svg_text(CHART_MARGIN, CHART_HEIGHT - CHART_MARGIN + 15.0, "middle", &format!("{x_lo:.3}")),
        svg_text(
            CHART_WIDTH - CHART_MARGIN,
            CHART_HEIGHT - CHART_MARGIN + 15.0,
            "middle",
            &format!("{x_hi:.3}"),
        ),
        svg_text(CHART_MARGIN - 5.0, CHART_HEIGHT - CHART_MARGIN, "end", &format!("{y_lo:.3}")),
        svg_text(CHART_MARGIN - 5.0, CHART_MARGIN + 4.0, "end", &format!("{y_hi:.3}")),
    ];

    let coordinates: Vec<String> = curve
        .points
        .iter()
        .map(|(x, y)| format!("{:.2},{:.2}", px(*x), py(*y)))
        .collect();
    frame.push(svg_element(
        "polyline",
        &[
            ("points", coordinates.join(" ")),
            ("fill", "none".to_owned()),
            ("stroke", "steelblue".to_owned()),
            ("stroke-width", "2".to_owned()),
        ],
    ));
    for (x, y) in &curve.points {
        frame.push(svg_element(
            "circle",
            &[
                ("cx", format!("{:.2}", px(*x))),
                ("cy", format!("{:.2}", py(*y))),
                ("r", "3".to_owned()),
                ("fill", "steelblue".to_owned()),
            ],
        ));
    }

    svg.children.extend(frame.into_iter().map(XMLNode::Element));
    svg
}

/// Writes a chart as an svg line plot
pub fn svg_chart(chart: &Chart, path: &Path) -> Result<()> {
    let file = create(path)?;
    match svg_document(chart).write_with_config(file, EmitterConfig::new().perform_indent(true)) {
        Ok(()) => Ok(()),
        Err(err) => Err(ElastomerError::Render(format!(
            "Failed to write svg chart {}: {err}",
            path.display()
        ))),
    }
}

fn vtk_cell_type(cell_type: CellType) -> u8 {
    match cell_type {
        CellType::Quad4 => 9,
        CellType::Hex8 => 12,
    }
}

/// Writes a viewport mesh as a legacy ascii VTK unstructured grid
///
/// # Arguments
/// * `viewport` - The mesh and its optional cell scalars
/// * `path` - Output file
pub fn vtk_output(viewport: &Viewport, path: &Path) -> Result<()> {
    if let Some((_, values)) = &viewport.cell_data {
        if values.len() != viewport.cells.len() {
            return Err(ElastomerError::Render(format!(
                "Viewport {} has {} cell values for {} cells",
                viewport.name,
                values.len(),
                viewport.cells.len()
            )));
        }
    }

    let mut file = create(path)?;
    let mut write = || -> std::io::Result<()> {
        writeln!(file, "# vtk DataFile Version 3.0")?;
        writeln!(file, "{}", viewport.title)?;
        writeln!(file, "ASCII")?;
        writeln!(file, "DATASET UNSTRUCTURED_GRID")?;

        writeln!(file, "POINTS {} double", viewport.points.len())?;
        for p in &viewport.points {
            writeln!(file, "{} {} {}", p.x, p.y, p.z)?;
        }

        let size: usize = viewport.cells.iter().map(|c| c.len() + 1).sum();
        writeln!(file, "CELLS {} {}", viewport.cells.len(), size)?;
        for cell in &viewport.cells {
            let ids: Vec<String> = cell.iter().map(|i| i.to_string()).collect();
            writeln!(file, "{} {}", cell.len(), ids.join(" "))?;
        }

        writeln!(file, "CELL_TYPES {}", viewport.cells.len())?;
        for _ in &viewport.cells {
            writeln!(file, "{}", vtk_cell_type(viewport.cell_type))?;
        }

        if let Some((name, values)) = &viewport.cell_data {
            writeln!(file, "CELL_DATA {}", values.len())?;
            writeln!(file, "SCALARS {} double 1", name.replace(' ', "_"))?;
            writeln!(file, "LOOKUP_TABLE default")?;
            for v in values {
                writeln!(file, "{v}")?;
            }
        }
        file.flush()
    };
    write().map_err(|err| render_error(path, err))
}

/// Collects the curves of a run into a json document
pub fn curves_json(scenario: &str, curves: &[ResultCurve]) -> JsonValue {
    let list: Vec<JsonValue> = curves
        .iter()
        .map(|curve| {
            let points: Vec<JsonValue> =
                curve.points.iter().map(|(x, y)| json::array![*x, *y]).collect();
            object! {
                name: curve.name.clone(),
                x_label: curve.x_label.clone(),
                y_label: curve.y_label.clone(),
                points: JsonValue::Array(points),
            }
        })
        .collect();
    object! {
        scenario: scenario,
        curves: JsonValue::Array(list),
    }
}

pub fn write_summary(summary: &JsonValue, path: &Path) -> Result<()> {
    std::fs::write(path, summary.pretty(2))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Vertex;

    fn curve() -> ResultCurve {
        let mut curve = ResultCurve::new("axial", "Displacement in mm", "Force in kN");
        curve.push(0.0, 0.0);
        curve.push(-1.0, 2.5);
        curve.push(-2.0, 5.5);
        curve
    }

    #[test]
    fn svg_has_one_marker_per_point() {
        let chart = Chart {
            name: "axial".to_owned(),
            title: "Axial force".to_owned(),
            curve: curve(),
        };
        let svg = svg_document(&chart);
        let circles = svg
            .children
            .iter()
            .filter(|n| matches!(n, XMLNode::Element(e) if e.name == "circle"))
            .count();
        assert_eq!(circles, 3);
        assert!(svg.get_child("polyline").is_some());
    }

    #[test]
    fn csv_and_vtk_files() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("axial.csv");
        curve_csv(&curve(), &csv).unwrap();
        let text = std::fs::read_to_string(&csv).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert_eq!(text.lines().next(), Some("Displacement in mm,Force in kN"));

        let viewport = Viewport {
            name: "mesh".to_owned(),
            title: "Mesh".to_owned(),
            points: vec![
                Vertex::new(0.0, 0.0, 0.0),
                Vertex::new(1.0, 0.0, 0.0),
                Vertex::new(1.0, 1.0, 0.0),
                Vertex::new(0.0, 1.0, 0.0),
            ],
            cells: vec![vec![0, 1, 2, 3]],
            cell_type: CellType::Quad4,
            cell_data: Some(("Equivalent of Cauchy Stress".to_owned(), vec![1.5])),
        };
        let vtk = dir.path().join("mesh.vtk");
        vtk_output(&viewport, &vtk).unwrap();
        let text = std::fs::read_to_string(&vtk).unwrap();
        assert!(text.contains("CELLS 1 5"));
        assert!(text.contains("SCALARS Equivalent_of_Cauchy_Stress double 1"));

        let broken = Viewport {
            cell_data: Some(("s".to_owned(), vec![])),
            ..viewport
        };
        assert!(matches!(vtk_output(&broken, &vtk), Err(ElastomerError::Render(_))));
    }

    #[test]
    fn summary_lists_curves() {
        let summary = curves_json("spring", &[curve()]);
        assert_eq!(summary["scenario"], "spring");
        assert_eq!(summary["curves"][0]["points"].len(), 3);
        assert_eq!(summary["curves"][0]["points"][1][0], -1.0);
    }
}
