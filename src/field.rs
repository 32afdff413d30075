use nalgebra::DVector;

use crate::{
    datatypes::{CellType, Vertex},
    error::{ElastomerError, Result},
    materials::Material,
    mesher::{self, MeshContainer},
};

/// Interpolation scheme of a displacement field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    /// `(u_r, u_z)` on an `(r, z)` cross-section, x is the radius
    Axisymmetric,
    /// `(u_x, u_y, u_z)` on a 3D solid
    Solid,
}

impl Formulation {
    pub fn dim(&self) -> usize {
        match self {
            Formulation::Axisymmetric => 2,
            Formulation::Solid => 3,
        }
    }

    fn cell_type(&self) -> CellType {
        match self {
            Formulation::Axisymmetric => CellType::Quad4,
            Formulation::Solid => CellType::Hex8,
        }
    }
}

/// Cells of one block of a mesh container
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub cells: Vec<Vec<usize>>,
    pub cell_type: CellType,
}

impl Region {
    pub fn from_container(container: &MeshContainer, block: usize) -> Result<Region> {
        match container.blocks.get(block) {
            Some(b) => Ok(Region {
                cells: b.cells.clone(),
                cell_type: b.cell_type,
            }),
            None => Err(ElastomerError::Model(format!(
                "Mesh container has no block {block}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub region: Region,
    pub formulation: Formulation,
}

impl Field {
    pub fn new(region: Region, formulation: Formulation) -> Result<Field> {
        if region.cell_type != formulation.cell_type() {
            return Err(ElastomerError::Model(format!(
                "{:?} formulation needs {:?} cells, region has {:?}",
                formulation,
                formulation.cell_type(),
                region.cell_type
            )));
        }
        Ok(Field {
            region,
            formulation,
        })
    }
}

/// Fields on a shared point list. Points shared between regions carry
/// one set of degrees of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldContainer {
    pub points: Vec<Vertex>,
    pub fields: Vec<Field>,
    formulation: Formulation,
}

impl FieldContainer {
    pub fn new(points: Vec<Vertex>, fields: Vec<Field>) -> Result<FieldContainer> {
        let formulation = match fields.first() {
            Some(f) => f.formulation,
            None => {
                return Err(ElastomerError::Model(
                    "Field container needs at least one field".to_owned(),
                ))
            }
        };
        if fields.iter().any(|f| f.formulation != formulation) {
            return Err(ElastomerError::Model(
                "Cannot couple fields of different formulations".to_owned(),
            ));
        }
        let out_of_range = fields
            .iter()
            .flat_map(|f| f.region.cells.iter().flatten())
            .any(|&p| p >= points.len());
        if out_of_range {
            return Err(ElastomerError::Model(
                "Region refers to a point outside the container".to_owned(),
            ));
        }

        Ok(FieldContainer {
            points,
            fields,
            formulation,
        })
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    pub fn dim(&self) -> usize {
        self.formulation.dim()
    }

    pub fn ndof(&self) -> usize {
        self.points.len() * self.dim()
    }

    pub fn dof(&self, point: usize, component: usize) -> usize {
        point * self.dim() + component
    }

    /// Point coordinates moved by a displacement vector
    pub fn deformed_points(&self, displacement: &DVector<f64>) -> Vec<Vertex> {
        let dim = self.dim();
        self.points
            .iter()
            .enumerate()
            .map(|(p, v)| {
                let mut moved = *v;
                for c in 0..dim {
                    *moved.coord_mut(c) += displacement[p * dim + c];
                }
                moved
            })
            .collect()
    }

    /// Revolves an axisymmetric container into a 3D solid one.
    ///
    /// # Arguments
    /// * `displacement` - Optional displacement to apply before revolving
    /// * `segments` - Number of cells in circumferential direction
    /// * `phi` - Swept angle in degrees
    pub fn revolve(
        &self,
        displacement: Option<&DVector<f64>>,
        segments: usize,
        phi: f64,
    ) -> Result<FieldContainer> {
        if self.formulation != Formulation::Axisymmetric {
            return Err(ElastomerError::Model(
                "Only axisymmetric fields can be revolved".to_owned(),
            ));
        }
        let section = match displacement {
            Some(u) => self.deformed_points(u),
            None => self.points.clone(),
        };
        let points = mesher::revolve_points(&section, segments, phi)?;

        let fields = self
            .fields
            .iter()
            .map(|f| {
                let region = Region {
                    cells: mesher::revolve_cells(&f.region.cells, section.len(), segments, phi),
                    cell_type: CellType::Hex8,
                };
                Field::new(region, Formulation::Solid)
            })
            .collect::<Result<Vec<Field>>>()?;

        FieldContainer::new(points, fields)
    }
}

/// Creates one field per container block and couples them.
///
/// `formulations[i]` is used for block `i`, so both lists must have the
/// same length.
pub fn assign_fields(
    container: &MeshContainer,
    formulations: &[Formulation],
) -> Result<FieldContainer> {
    if formulations.len() != container.blocks.len() {
        return Err(ElastomerError::Model(format!(
            "Got {} formulations for {} regions",
            formulations.len(),
            container.blocks.len()
        )));
    }

    let mut fields = Vec::with_capacity(formulations.len());
    for (block, formulation) in formulations.iter().enumerate() {
        let region = Region::from_container(container, block)?;
        fields.push(Field::new(region, *formulation)?);
    }

    FieldContainer::new(container.points.clone(), fields)
}

/// A constitutive model attached to one field of a container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolidBody {
    pub field: usize,
    pub material: Material,
}

/// Pairs field `i` with `materials[i]`
pub fn solid_bodies(container: &FieldContainer, materials: &[Material]) -> Result<Vec<SolidBody>> {
    if materials.len() != container.fields.len() {
        return Err(ElastomerError::Model(format!(
            "Got {} materials for {} fields",
            materials.len(),
            container.fields.len()
        )));
    }
    for material in materials {
        material.validate()?;
    }

    Ok(materials
        .iter()
        .enumerate()
        .map(|(field, material)| SolidBody {
            field,
            material: *material,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::Mesh;

    fn two_blocks() -> MeshContainer {
        let rubber = Mesh::rectangle([1.0, 0.0], [2.0, 1.0], [3, 3]).unwrap();
        let metal = Mesh::rectangle([1.0, 1.0], [2.0, 1.2], [3, 2]).unwrap();
        MeshContainer::new(&[rubber, metal]).unwrap()
    }

    #[test]
    fn coupled_fields_share_dofs() {
        let container = two_blocks();
        let field = assign_fields(
            &container,
            &[Formulation::Axisymmetric, Formulation::Axisymmetric],
        )
        .unwrap();
        assert_eq!(field.ndof(), 12 * 2);
        assert_eq!(field.fields.len(), 2);
        assert_eq!(field.dof(7, 1), 15);
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let container = two_blocks();
        assert!(assign_fields(&container, &[Formulation::Axisymmetric]).is_err());

        let field = assign_fields(
            &container,
            &[Formulation::Axisymmetric, Formulation::Axisymmetric],
        )
        .unwrap();
        let rubber = Material::NeoHooke { mu: 1.0, bulk: 100.0 };
        assert!(solid_bodies(&field, &[rubber]).is_err());
        assert_eq!(solid_bodies(&field, &[rubber, rubber]).unwrap().len(), 2);
    }

    #[test]
    fn wrong_cell_type_for_formulation() {
        let container = two_blocks();
        assert!(assign_fields(&container, &[Formulation::Solid, Formulation::Solid]).is_err());
    }

    #[test]
    fn revolve_keeps_blocks_and_applies_displacement() {
        let container = two_blocks();
        let field = assign_fields(
            &container,
            &[Formulation::Axisymmetric, Formulation::Axisymmetric],
        )
        .unwrap();
        let mut u = DVector::zeros(field.ndof());
        for p in 0..field.points.len() {
            u[field.dof(p, 1)] = -0.1;
        }

        let solid = field.revolve(Some(&u), 4, 180.0).unwrap();
        assert_eq!(solid.formulation(), Formulation::Solid);
        assert_eq!(solid.points.len(), 12 * 5);
        assert_eq!(solid.fields[0].region.cells.len(), 4 * 4);
        assert_eq!(solid.fields[1].region.cells.len(), 2 * 4);
        assert!(solid.points.iter().all(|p| p.z <= 1.2 - 0.1 + 1e-12));
        assert!(solid.revolve(None, 4, 180.0).is_err());
    }
}
