use std::fmt;
use std::str::FromStr;

use crate::{
    datatypes::{StressMeasure, Vertex},
    error::{ElastomerError, Result},
    field::{assign_fields, solid_bodies, Formulation},
    job::Step,
    loadcase::{linsteps, uniaxial, Ramp, MOVE},
    materials::Material,
    mesher::{self, Mesh, MeshContainer, MIN_SPACING},
    params::{Control, ParameterSet},
    probe::LateralProbe,
};

/// Poisson's ratio of the metal sheets
pub const METAL_POISSON_RATIO: f64 = 0.3;

/// Circumferential cells and swept angle of the displayed spring
pub const DISPLAY_SEGMENTS: usize = 18;
pub const DISPLAY_ANGLE: f64 = 270.0;

const fn control(
    name: &'static str,
    label: &'static str,
    min: f64,
    max: f64,
    default: f64,
    integer: bool,
) -> Control {
    Control {
        name,
        label,
        min,
        max,
        default,
        integer,
    }
}

const CUBE_CONTROLS: [Control; 3] = [
    control("details", "Number of points per axis", 2.0, 11.0, 4.0, true),
    control("stretch", "Maximum stretch", 1.0, 2.0, 2.0, false),
    control("steps", "Number of substeps", 1.0, 20.0, 5.0, true),
];

const SPRING_CONTROLS: [Control; 13] = [
    control("H", "Height H in mm", 20.0, 200.0, 50.0, false),
    control("D", "Outer diameter D in mm", 20.0, 300.0, 100.0, false),
    control("d", "Inner diameter d in mm", 0.0, 290.0, 50.0, false),
    control("n", "Number of rubber layers", 1.0, 8.0, 3.0, true),
    control("t", "Sheet thickness t in mm", 0.5, 10.0, 3.0, false),
    control("axial_max", "Maximum axial compression", 0.0, 0.5, 0.2, false),
    control("axial_steps", "Number of axial steps", 1.0, 30.0, 10.0, true),
    control("details", "Mesh details", 2.0, 12.0, 5.0, true),
    control("runout", "Relative runout radius", 0.0, 0.5, 0.1, false),
    control("mu", "Shear modulus of rubber in MPa", 0.1, 5.0, 1.0, false),
    control("bulk", "Bulk modulus of rubber in MPa", 10.0, 5000.0, 1000.0, false),
    control("E_metal", "Young's modulus of metal in MPa", 1e3, 3e5, 210000.0, false),
    control("lateral", "Lateral stiffness (0 = off, 1 = on)", 0.0, 1.0, 1.0, true),
];

/// The simulation a parameter set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Uniaxial tension of a unit cube
    Cube,
    /// Compression of a laminated rubber-metal spring
    Spring,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::Cube, Scenario::Spring];

    pub fn controls(&self) -> &'static [Control] {
        match self {
            Scenario::Cube => &CUBE_CONTROLS,
            Scenario::Spring => &SPRING_CONTROLS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Cube => "cube",
            Scenario::Spring => "spring",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = ElastomerError;

    fn from_str(s: &str) -> Result<Scenario> {
        match s.to_ascii_lowercase().as_str() {
            "cube" => Ok(Scenario::Cube),
            "spring" => Ok(Scenario::Spring),
            _ => Err(ElastomerError::Input(format!(
                "Unknown scenario '{s}', expected cube or spring"
            ))),
        }
    }
}

fn count(params: &ParameterSet, name: &str) -> Result<usize> {
    let value = params.get(name)?;
    if value < 1.0 {
        return Err(ElastomerError::configuration(name, format!("must be at least 1, got {value}")));
    }
    Ok(value.round() as usize)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeParameters {
    pub details: usize,
    pub stretch: f64,
    pub steps: usize,
}

impl CubeParameters {
    pub fn from_parameters(params: &ParameterSet) -> Result<CubeParameters> {
        let details = count(params, "details")?;
        if details < 2 {
            return Err(ElastomerError::configuration(
                "details",
                "needs at least 2 points per axis",
            ));
        }
        let stretch = params.get("stretch")?;
        if stretch < 1.0 {
            return Err(ElastomerError::configuration(
                "stretch",
                format!("must not be below 1, got {stretch}"),
            ));
        }

        Ok(CubeParameters {
            details,
            stretch,
            steps: count(params, "steps")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringParameters {
    pub height: f64,
    pub outer_diameter: f64,
    pub inner_diameter: f64,
    pub layers: usize,
    pub sheet_thickness: f64,
    pub axial_max: f64,
    pub axial_steps: usize,
    pub details: usize,
    pub runout: f64,
    pub mu: f64,
    pub bulk: f64,
    pub metal_modulus: f64,
    pub lateral: bool,
}

impl SpringParameters {
    pub fn from_parameters(params: &ParameterSet) -> Result<SpringParameters> {
        let outer_diameter = params.get("D")?;
        let inner_diameter = params.get("d")?;
        if inner_diameter >= outer_diameter {
            return Err(ElastomerError::configuration(
                "d",
                format!(
                    "inner diameter {inner_diameter} must be smaller than outer diameter D={outer_diameter}"
                ),
            ));
        }
        if inner_diameter <= 0.0 {
            return Err(ElastomerError::configuration("d", "inner diameter must be positive"));
        }

        let layers = count(params, "n")?;
        let sheet_thickness = params.get("t")?;
        if layers > 1 && sheet_thickness <= 0.0 {
            return Err(ElastomerError::configuration("t", "sheet thickness must be positive"));
        }

        let spring = SpringParameters {
            height: params.get("H")?,
            outer_diameter,
            inner_diameter,
            layers,
            sheet_thickness,
            axial_max: params.get("axial_max")?,
            axial_steps: count(params, "axial_steps")?,
            details: count(params, "details")?,
            runout: params.get("runout")?,
            mu: params.get("mu")?,
            bulk: params.get("bulk")?,
            metal_modulus: params.get("E_metal")?,
            lateral: params.get("lateral")? >= 0.5,
        };

        let h = spring.layer_height();
        if h <= 0.0 {
            return Err(ElastomerError::configuration(
                "H",
                format!("rubber layer height H/n - t*(n-1) = {h:.3} must be positive"),
            ));
        }
        if spring.details < 2 {
            return Err(ElastomerError::configuration(
                "details",
                "needs at least 2 points per axis",
            ));
        }
        if !(0.0..1.0).contains(&spring.runout) {
            return Err(ElastomerError::configuration("runout", "must be in [0, 1)"));
        }

        // cells must stay wider than the point merge grid
        let intervals = (spring.details - 1) as f64;
        if h / intervals < MIN_SPACING {
            return Err(ElastomerError::configuration(
                "H",
                format!(
                    "rubber layer height {h:.4} is too small for {} mesh points",
                    spring.details
                ),
            ));
        }
        let radial = (outer_diameter - inner_diameter) / 2.0 * (1.0 - spring.runout) / intervals;
        if radial < MIN_SPACING {
            return Err(ElastomerError::configuration(
                "d",
                format!(
                    "wall thickness (D-d)/2 = {:.4} is too small for {} mesh points",
                    (outer_diameter - inner_diameter) / 2.0,
                    spring.details
                ),
            ));
        }
        if layers > 1 && sheet_thickness < MIN_SPACING {
            return Err(ElastomerError::configuration(
                "t",
                "sheet thickness is below the mesh resolution",
            ));
        }
        spring.rubber().validate()?;
        spring.metal().validate()?;

        Ok(spring)
    }

    /// Height of one rubber layer, `H/n - t*(n-1)`
    pub fn layer_height(&self) -> f64 {
        self.height / self.layers as f64 - self.sheet_thickness * (self.layers - 1) as f64
    }

    /// Distance between two rubber layers
    pub fn pitch(&self) -> f64 {
        self.layer_height() + self.sheet_thickness
    }

    pub fn rubber(&self) -> Material {
        Material::NeoHooke {
            mu: self.mu,
            bulk: self.bulk,
        }
    }

    pub fn metal(&self) -> Material {
        Material::LinearElastic {
            youngs_modulus: self.metal_modulus,
            poisson_ratio: METAL_POISSON_RATIO,
        }
    }

    /// Prescribed axial displacement per substep, compression negative
    pub fn axial_ramp(&self) -> Result<Vec<f64>> {
        linsteps(
            0.0,
            -self.axial_max * self.layers as f64 * self.layer_height(),
            self.axial_steps,
        )
    }
}

/// Validated scenario inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Design {
    Cube(CubeParameters),
    Spring(SpringParameters),
}

impl Design {
    /// Checks the parameter combination. Fails before anything is built.
    pub fn from_parameters(params: &ParameterSet) -> Result<Design> {
        match params.scenario {
            Scenario::Cube => Ok(Design::Cube(CubeParameters::from_parameters(params)?)),
            Scenario::Spring => Ok(Design::Spring(SpringParameters::from_parameters(params)?)),
        }
    }

    pub fn scenario(&self) -> Scenario {
        match self {
            Design::Cube(_) => Scenario::Cube,
            Design::Spring(_) => Scenario::Spring,
        }
    }

    /// Mesh regions in material order
    pub fn geometry(&self) -> Result<MeshContainer> {
        match self {
            Design::Cube(cube) => {
                let n = cube.details;
                MeshContainer::new(&[Mesh::cube([0.0; 3], [1.0; 3], [n, n, n])?])
            }
            Design::Spring(spring) => {
                let (r_in, r_out) = (spring.inner_diameter / 2.0, spring.outer_diameter / 2.0);
                let h = spring.layer_height();
                let n = spring.details;

                let mut rubber = Mesh::rectangle([r_in, 0.0], [r_out, h], [n, n])?;
                let center = Vertex::new((r_in + r_out) / 2.0, h / 2.0, 0.0);
                rubber.add_runouts(spring.runout, center, 0, 1, 2)?;
                let rubber_layers = mesher::stack(&rubber, spring.layers, spring.pitch(), 1)?;

                if spring.layers == 1 {
                    return MeshContainer::new(&[rubber_layers]);
                }
                let sheet_top = h + spring.sheet_thickness;
                let sheet = Mesh::rectangle([r_in, h], [r_out, sheet_top], [n, 2])?;
                let sheets = mesher::stack(&sheet, spring.layers - 1, spring.pitch(), 1)?;
                MeshContainer::new(&[rubber_layers, sheets])
            }
        }
    }

    /// Fields, bodies, boundaries and ramp on the meshed regions
    pub fn step(&self, container: &MeshContainer) -> Result<Step> {
        match self {
            Design::Cube(cube) => {
                let field = assign_fields(container, &[Formulation::Solid])?;
                let bodies = solid_bodies(&field, &[Material::NeoHooke { mu: 1.0, bulk: 2.0 }])?;
                let boundaries = uniaxial(&field, 0, true, true)?;
                let ramp = Ramp::new(MOVE, linsteps(0.0, cube.stretch - 1.0, cube.steps)?);
                Step::new(field, bodies, ramp, boundaries)
            }
            Design::Spring(spring) => {
                let materials: Vec<Material> = if container.blocks.len() == 1 {
                    vec![spring.rubber()]
                } else {
                    vec![spring.rubber(), spring.metal()]
                };
                let formulations = vec![Formulation::Axisymmetric; materials.len()];
                let field = assign_fields(container, &formulations)?;
                let bodies = solid_bodies(&field, &materials)?;
                let boundaries = uniaxial(&field, 1, true, false)?;
                let ramp = Ramp::new(MOVE, spring.axial_ramp()?);
                Step::new(field, bodies, ramp, boundaries)
            }
        }
    }

    /// Stress measure shown on the deformed field
    pub fn measure(&self) -> StressMeasure {
        match self {
            Design::Cube(_) => StressMeasure::MaxPrincipal,
            Design::Spring(_) => StressMeasure::VonMises,
        }
    }

    /// Revolution applied before displaying an axisymmetric result
    pub fn display_revolution(&self) -> Option<(usize, f64)> {
        match self {
            Design::Cube(_) => None,
            Design::Spring(_) => Some((DISPLAY_SEGMENTS, DISPLAY_ANGLE)),
        }
    }

    pub fn probe(&self) -> Option<LateralProbe> {
        match self {
            Design::Spring(spring) if spring.lateral => Some(LateralProbe::default()),
            _ => None,
        }
    }
}
