use std::collections::BTreeMap;

use json::JsonValue;

use crate::{
    error::{ElastomerError, Result},
    scenario::Scenario,
    ui::Controls,
};

/// A slider published to the UI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control {
    pub name: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Values are rounded to whole numbers
    pub integer: bool,
}

impl Control {
    /// Brings a raw value into the slider range
    pub fn clamp(&self, value: f64) -> f64 {
        let value = if self.integer { value.round() } else { value };
        value.clamp(self.min, self.max)
    }
}

/// Named scalar inputs of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    pub scenario: Scenario,
    values: BTreeMap<String, f64>,
}

impl ParameterSet {
    pub fn defaults(scenario: Scenario) -> ParameterSet {
        ParameterSet {
            scenario,
            values: scenario
                .controls()
                .iter()
                .map(|c| (c.name.to_owned(), c.default))
                .collect(),
        }
    }

    /// Asks the UI for every control of the scenario
    pub fn from_controls(scenario: Scenario, controls: &mut dyn Controls) -> ParameterSet {
        let mut values = BTreeMap::new();
        for control in scenario.controls() {
            let raw = controls.slider(control.label, control.min, control.max, control.default);
            values.insert(control.name.to_owned(), control.clamp(raw));
        }
        ParameterSet { scenario, values }
    }

    pub fn get(&self, name: &str) -> Result<f64> {
        match self.values.get(name) {
            Some(v) => Ok(*v),
            None => Err(ElastomerError::Input(format!(
                "Parameter {name} is not defined for the {} scenario",
                self.scenario
            ))),
        }
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Returns a copy with one value replaced. Out-of-range values are
    /// clamped to the control range with a warning.
    pub fn with(&self, name: &str, value: f64) -> Result<ParameterSet> {
        let control = match self.scenario.controls().iter().find(|c| c.name == name) {
            Some(c) => c,
            None => {
                return Err(ElastomerError::Input(format!(
                    "Unknown parameter {name} for the {} scenario",
                    self.scenario
                )))
            }
        };
        if !value.is_finite() {
            return Err(ElastomerError::Input(format!(
                "Parameter {name} must be a finite number"
            )));
        }

        let clamped = control.clamp(value);
        if clamped != value {
            eprintln!(
                "warning [parameters]: {name}={value} is outside [{}, {}], using {clamped}",
                control.min, control.max
            );
        }

        let mut updated = self.clone();
        updated.values.insert(name.to_owned(), clamped);
        Ok(updated)
    }
}

/// Parses a `KEY=VALUE` assignment from the command line
pub fn parse_assignment(assignment: &str) -> Result<(String, f64)> {
    let (key, value) = match assignment.split_once('=') {
        Some(kv) => kv,
        None => {
            return Err(ElastomerError::Input(format!(
                "Expected KEY=VALUE, got '{assignment}'"
            )))
        }
    };
    let value: f64 = match value.trim().parse() {
        Ok(v) => v,
        Err(_err) => {
            return Err(ElastomerError::Input(format!(
                "Value of {} is not a number: '{}'",
                key.trim(),
                value.trim()
            )))
        }
    };
    Ok((key.trim().to_owned(), value))
}

/// Reads a parameter set from a json document of the form
/// `{"scenario": "spring", "parameters": {"H": 50}}`. Missing parameters
/// keep their defaults.
pub fn parse_parameters(document: &str) -> Result<ParameterSet> {
    let input_json = match json::parse(document) {
        Ok(j) => j,
        Err(err) => {
            return Err(ElastomerError::Input(format!(
                "Error in parameter file json: {err}"
            )))
        }
    };

    let scenario: Scenario = match input_json["scenario"].as_str() {
        Some(name) => name.parse()?,
        None => {
            return Err(ElastomerError::Input(
                "Parameter file is missing the scenario field".to_owned(),
            ))
        }
    };

    let mut params = ParameterSet::defaults(scenario);
    match &input_json["parameters"] {
        JsonValue::Null => {}
        JsonValue::Object(object) => {
            for (name, value) in object.iter() {
                let value = match value.as_f64() {
                    Some(v) => v,
                    None => {
                        return Err(ElastomerError::Input(format!(
                            "Parameter {name} in parameter file is not a number"
                        )))
                    }
                };
                params = params.with(name, value)?;
            }
        }
        _ => {
            return Err(ElastomerError::Input(
                "The parameters field of the parameter file must be an object".to_owned(),
            ))
        }
    }

    Ok(params)
}

pub fn load_parameter_file(path: &str) -> Result<ParameterSet> {
    let file_string = match std::fs::read_to_string(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(ElastomerError::Input(format!(
                "Unable to open parameter file {path}"
            )))
        }
    };
    parse_parameters(&file_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    impl Controls for Fixed {
        fn slider(&mut self, _label: &str, _min: f64, _max: f64, _default: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn defaults_cover_every_control() {
        let params = ParameterSet::defaults(Scenario::Spring);
        assert_eq!(params.values().len(), Scenario::Spring.controls().len());
        assert_eq!(params.get("axial_steps").unwrap(), 10.0);
        assert!(params.get("stretch").is_err());
    }

    #[test]
    fn sliders_are_clamped_and_rounded() {
        let params = ParameterSet::from_controls(Scenario::Cube, &mut Fixed(3.6));
        assert_eq!(params.get("details").unwrap(), 4.0);
        assert_eq!(params.get("steps").unwrap(), 4.0);
        assert_eq!(params.get("stretch").unwrap(), 2.0);
    }

    #[test]
    fn assignments() {
        assert_eq!(parse_assignment("H = 60").unwrap(), ("H".to_owned(), 60.0));
        assert!(parse_assignment("H").is_err());
        assert!(parse_assignment("H=tall").is_err());

        let params = ParameterSet::defaults(Scenario::Spring);
        assert!(params.with("nope", 1.0).is_err());
        assert_eq!(params.with("n", 100.0).unwrap().get("n").unwrap(), 8.0);
    }

    #[test]
    fn parameter_document() {
        let document = r#"{"scenario": "spring", "parameters": {"H": 60, "n": 2}}"#;
        let params = parse_parameters(document).unwrap();
        assert_eq!(params.scenario, Scenario::Spring);
        assert_eq!(params.get("H").unwrap(), 60.0);
        assert_eq!(params.get("D").unwrap(), 100.0);

        assert!(parse_parameters(r#"{"parameters": {}}"#).is_err());
        assert!(parse_parameters(r#"{"scenario": "torus"}"#).is_err());
        let document = r#"{"scenario": "cube", "parameters": {"steps": "many"}}"#;
        assert!(parse_parameters(document).is_err());
        assert!(parse_parameters(r#"{"scenario": "cube", "parameters": {"H": 1}}"#).is_err());
        assert_eq!(
            parse_parameters(r#"{"scenario": "cube"}"#).unwrap(),
            ParameterSet::defaults(Scenario::Cube)
        );
    }

    #[test]
    fn parameter_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"scenario": "cube", "parameters": {"steps": 3}}"#).unwrap();
        let params = load_parameter_file(path.to_str().unwrap()).unwrap();
        assert_eq!(params.get("steps").unwrap(), 3.0);
        assert!(load_parameter_file("/nonexistent/params.json").is_err());
    }
}
