use std::collections::BTreeMap;

use crate::{
    error::{ElastomerError, Result},
    field::FieldContainer,
    mesher,
};

/// Name of the boundary that carries the prescribed displacement ramp
pub const MOVE: &str = "move";

/// Prescribed value on selected components of a set of points
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub name: String,
    pub points: Vec<usize>,
    pub components: Vec<usize>,
    pub value: f64,
}

/// Ordered set of boundaries. Later boundaries win where two constrain the
/// same degree of freedom.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Boundaries(Vec<Boundary>);

impl Boundaries {
    pub fn new() -> Boundaries {
        Boundaries(Vec::new())
    }

    pub fn push(&mut self, boundary: Boundary) {
        self.0.push(boundary);
    }

    pub fn get(&self, name: &str) -> Option<&Boundary> {
        self.0.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Boundary> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prescribed degrees of freedom. `ramp` overrides the value of the
    /// named boundary.
    pub fn constraints(&self, dim: usize, ramp: Option<(&str, f64)>) -> BTreeMap<usize, f64> {
        let mut constraints = BTreeMap::new();
        for boundary in &self.0 {
            let value = match ramp {
                Some((name, value)) if name == boundary.name => value,
                _ => boundary.value,
            };
            for &p in &boundary.points {
                for &c in &boundary.components {
                    constraints.insert(p * dim + c, value);
                }
            }
        }
        constraints
    }
}

/// Points whose coordinate along `axis` is within `tol` of `coordinate`
pub fn select_points(field: &FieldContainer, axis: usize, coordinate: f64, tol: f64) -> Vec<usize> {
    field
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| (p.coord(axis) - coordinate).abs() <= tol)
        .map(|(i, _)| i)
        .collect()
}

fn boundary_tolerance(field: &FieldContainer, axis: usize) -> f64 {
    let (lo, hi) = mesher::bounds(&field.points, axis);
    1e-6 * (hi - lo).abs().max(1.0)
}

/// Uniaxial loadcase along `axis`.
///
/// The far face carries the `move` boundary. With `sym` the faces at the
/// minimum coordinate of every direction are symmetry planes, otherwise
/// the near face along `axis` is fully fixed. With `clamped` the far face
/// is held in all other directions.
///
/// # Arguments
/// * `field` - The field container the boundaries apply to
/// * `axis` - Loading direction
/// * `clamped` - Whether the loaded face is clamped transversally
/// * `sym` - Whether to use symmetry planes instead of a fixed face
pub fn uniaxial(
    field: &FieldContainer,
    axis: usize,
    clamped: bool,
    sym: bool,
) -> Result<Boundaries> {
    let dim = field.dim();
    if axis >= dim {
        return Err(ElastomerError::Model(format!(
            "Loading axis {axis} does not exist in a {dim}D field"
        )));
    }

    let mut boundaries = Boundaries::new();

    if sym {
        for (direction, name) in ["symx", "symy", "symz"].iter().enumerate().take(dim) {
            let (lo, _) = mesher::bounds(&field.points, direction);
            boundaries.push(Boundary {
                name: name.to_string(),
                points: select_points(field, direction, lo, boundary_tolerance(field, direction)),
                components: vec![direction],
                value: 0.0,
            });
        }
    } else {
        let (lo, _) = mesher::bounds(&field.points, axis);
        boundaries.push(Boundary {
            name: "fixed".to_owned(),
            points: select_points(field, axis, lo, boundary_tolerance(field, axis)),
            components: (0..dim).collect(),
            value: 0.0,
        });
    }

    let (_, hi) = mesher::bounds(&field.points, axis);
    let far = select_points(field, axis, hi, boundary_tolerance(field, axis));
    if clamped {
        boundaries.push(Boundary {
            name: "clamped".to_owned(),
            points: far.clone(),
            components: (0..dim).filter(|&c| c != axis).collect(),
            value: 0.0,
        });
    }
    boundaries.push(Boundary {
        name: MOVE.to_owned(),
        points: far,
        components: vec![axis],
        value: 0.0,
    });

    for boundary in boundaries.iter() {
        if boundary.points.is_empty() {
            return Err(ElastomerError::Model(format!(
                "Boundary '{}' selects no points",
                boundary.name
            )));
        }
    }

    Ok(boundaries)
}

/// `num` evenly spaced values from `start` to `end`. A single step is the
/// full value `end`.
pub fn linsteps(start: f64, end: f64, num: usize) -> Result<Vec<f64>> {
    match num {
        0 => Err(ElastomerError::Model(
            "A ramp needs at least one step".to_owned(),
        )),
        1 => Ok(vec![end]),
        _ => {
            let mut values: Vec<f64> = (0..num)
                .map(|i| start + (end - start) * i as f64 / (num - 1) as f64)
                .collect();
            values[num - 1] = end;
            Ok(values)
        }
    }
}

/// Values a boundary moves through, one per substep
#[derive(Debug, Clone, PartialEq)]
pub struct Ramp {
    pub boundary: String,
    pub values: Vec<f64>,
}

impl Ramp {
    pub fn new(boundary: &str, values: Vec<f64>) -> Ramp {
        Ramp {
            boundary: boundary.to_owned(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{assign_fields, Formulation};
    use crate::mesher::{Mesh, MeshContainer};

    fn cube_field(n: usize) -> FieldContainer {
        let mesh = Mesh::cube([0.0; 3], [1.0; 3], [n, n, n]).unwrap();
        let container = MeshContainer::new(&[mesh]).unwrap();
        assign_fields(&container, &[Formulation::Solid]).unwrap()
    }

    #[test]
    fn ramp_length_matches_steps() {
        for num in 1..25 {
            let values = linsteps(0.0, -6.4, num).unwrap();
            assert_eq!(values.len(), num);
            assert_eq!(*values.last().unwrap(), -6.4);
        }
        assert_eq!(linsteps(0.0, 1.0, 5).unwrap(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(linsteps(0.0, 1.0, 0).is_err());
    }

    #[test]
    fn uniaxial_with_symmetry_and_clamp() {
        let field = cube_field(3);
        let boundaries = uniaxial(&field, 0, true, true).unwrap();
        let names: Vec<&str> = boundaries.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["symx", "symy", "symz", "clamped", "move"]);

        let moved = boundaries.get(MOVE).unwrap();
        assert_eq!(moved.points.len(), 9);
        assert_eq!(moved.components, vec![0]);
        assert_eq!(boundaries.get("clamped").unwrap().components, vec![1, 2]);
    }

    #[test]
    fn ramp_overrides_move_value() {
        let field = cube_field(2);
        let boundaries = uniaxial(&field, 0, true, true).unwrap();
        let constraints = boundaries.constraints(3, Some((MOVE, 0.5)));
        let moved = boundaries.get(MOVE).unwrap();
        for &p in &moved.points {
            assert_eq!(constraints[&(p * 3)], 0.5);
            assert_eq!(constraints[&(p * 3 + 1)], 0.0);
        }
        // three symmetry faces, clamped and moved far face, minus the 4
        // far-face dofs that also lie on the y and z symmetry planes
        assert_eq!(constraints.len(), 4 + 4 + 4 + 8 + 4 - 4);
    }

    #[test]
    fn fixed_face_without_symmetry() {
        let field = cube_field(2);
        let boundaries = uniaxial(&field, 2, false, false).unwrap();
        let fixed = boundaries.get("fixed").unwrap();
        assert_eq!(fixed.components, vec![0, 1, 2]);
        assert!(boundaries.get("clamped").is_none());
        assert!(uniaxial(&field, 3, false, false).is_err());
    }
}
