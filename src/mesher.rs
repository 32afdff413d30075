use std::collections::HashMap;

use crate::{
    datatypes::{CellType, Vertex},
    error::{ElastomerError, Result},
};

/// Number of decimals used when deciding whether two points coincide
pub const MERGE_DECIMALS: i32 = 3;

/// Smallest point spacing that never collapses on the merge grid
pub const MIN_SPACING: f64 = 2e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub points: Vec<Vertex>,
    pub cells: Vec<Vec<usize>>,
    pub cell_type: CellType,
}

/// A group of cells of one type that refers to a shared point list
#[derive(Debug, Clone, PartialEq)]
pub struct CellBlock {
    pub cells: Vec<Vec<usize>>,
    pub cell_type: CellType,
}

/// Several meshes merged onto one deduplicated point list.
///
/// Block `i` holds the cells of input mesh `i`, renumbered to the shared
/// points, so blocks that touch share their boundary points.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshContainer {
    pub points: Vec<Vertex>,
    pub blocks: Vec<CellBlock>,
}

/// Deduplicates points on the `MERGE_DECIMALS` grid. The first point seen
/// for a grid key keeps its original coordinates.
struct PointIndex {
    keys: HashMap<(i64, i64, i64), usize>,
    points: Vec<Vertex>,
}

impl PointIndex {
    fn new() -> PointIndex {
        PointIndex {
            keys: HashMap::new(),
            points: Vec::new(),
        }
    }

    fn key(vertex: &Vertex) -> (i64, i64, i64) {
        let scale = 10f64.powi(MERGE_DECIMALS);
        (
            (vertex.x * scale).round() as i64,
            (vertex.y * scale).round() as i64,
            (vertex.z * scale).round() as i64,
        )
    }

    fn insert(&mut self, vertex: Vertex) -> usize {
        let next = self.points.len();
        let idx = *self.keys.entry(Self::key(&vertex)).or_insert(next);
        if idx == next {
            self.points.push(vertex);
        }
        idx
    }
}

/// Evenly spaced values from `start` to `end`. The last value is exactly `end`.
fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    let mut values: Vec<f64> = (0..num)
        .map(|i| start + (end - start) * i as f64 / (num - 1) as f64)
        .collect();
    if let Some(last) = values.last_mut() {
        *last = end;
    }
    values
}

fn remap_cells(cells: &[Vec<usize>], map: &[usize]) -> Vec<Vec<usize>> {
    cells
        .iter()
        .map(|cell| cell.iter().map(|&p| map[p]).collect())
        .collect()
}

impl Mesh {
    /// Creates a structured quad mesh of a rectangle in the xy-plane
    ///
    /// # Arguments
    /// * `a` - Lower left corner
    /// * `b` - Upper right corner
    /// * `n` - Number of points along x and y
    pub fn rectangle(a: [f64; 2], b: [f64; 2], n: [usize; 2]) -> Result<Mesh> {
        if n[0] < 2 || n[1] < 2 {
            return Err(ElastomerError::Mesher(format!(
                "Rectangle needs at least 2 points per axis, got {:?}",
                n
            )));
        }
        if b[0] <= a[0] || b[1] <= a[1] {
            return Err(ElastomerError::Mesher(format!(
                "Rectangle corners {:?} and {:?} span no area",
                a, b
            )));
        }

        let xs = linspace(a[0], b[0], n[0]);
        let ys = linspace(a[1], b[1], n[1]);

        let mut points = Vec::with_capacity(n[0] * n[1]);
        for y in &ys {
            for x in &xs {
                points.push(Vertex::new(*x, *y, 0.0));
            }
        }

        let idx = |i: usize, j: usize| j * n[0] + i;
        let mut cells = Vec::with_capacity((n[0] - 1) * (n[1] - 1));
        for j in 0..n[1] - 1 {
            for i in 0..n[0] - 1 {
                cells.push(vec![
                    idx(i, j),
                    idx(i + 1, j),
                    idx(i + 1, j + 1),
                    idx(i, j + 1),
                ]);
            }
        }

        Ok(Mesh {
            points,
            cells,
            cell_type: CellType::Quad4,
        })
    }

    /// Creates a structured hexahedron mesh of a box
    ///
    /// # Arguments
    /// * `a` - Minimum corner
    /// * `b` - Maximum corner
    /// * `n` - Number of points along x, y and z
    pub fn cube(a: [f64; 3], b: [f64; 3], n: [usize; 3]) -> Result<Mesh> {
        if n.iter().any(|&k| k < 2) {
            return Err(ElastomerError::Mesher(format!(
                "Cube needs at least 2 points per axis, got {:?}",
                n
            )));
        }
        if (0..3).any(|i| b[i] <= a[i]) {
            return Err(ElastomerError::Mesher(format!(
                "Cube corners {:?} and {:?} span no volume",
                a, b
            )));
        }

        let xs = linspace(a[0], b[0], n[0]);
        let ys = linspace(a[1], b[1], n[1]);
        let zs = linspace(a[2], b[2], n[2]);

        let mut points = Vec::with_capacity(n[0] * n[1] * n[2]);
        for z in &zs {
            for y in &ys {
                for x in &xs {
                    points.push(Vertex::new(*x, *y, *z));
                }
            }
        }

        let idx = |i: usize, j: usize, k: usize| k * n[0] * n[1] + j * n[0] + i;
        let mut cells = Vec::new();
        for k in 0..n[2] - 1 {
            for j in 0..n[1] - 1 {
                for i in 0..n[0] - 1 {
                    cells.push(vec![
                        idx(i, j, k),
                        idx(i + 1, j, k),
                        idx(i + 1, j + 1, k),
                        idx(i, j + 1, k),
                        idx(i, j, k + 1),
                        idx(i + 1, j, k + 1),
                        idx(i + 1, j + 1, k + 1),
                        idx(i, j + 1, k + 1),
                    ]);
                }
            }
        }

        Ok(Mesh {
            points,
            cells,
            cell_type: CellType::Hex8,
        })
    }

    /// Returns a copy of the mesh moved by `offset` along `axis`
    pub fn translate(&self, offset: f64, axis: usize) -> Mesh {
        let mut moved = self.clone();
        for point in moved.points.iter_mut() {
            *point.coord_mut(axis) += offset;
        }
        moved
    }

    /// Recesses the free edges normal to `axis` with a rounded run-out.
    ///
    /// Every point is pulled towards `center` along `axis` by
    /// `depth * (1 - |s|^exponent)`, where `s` is the normalized distance
    /// from `center` along `normal` (-1 and 1 on the outermost points).
    /// Points on the two end faces (`|s| == 1`) do not move.
    ///
    /// # Arguments
    /// * `depth` - Normalized run-out radius in `[0, 1)`
    /// * `center` - Anchor point
    /// * `axis` - Direction that is recessed
    /// * `normal` - Direction along which the recess varies
    /// * `exponent` - Shape exponent of the run-out profile
    pub fn add_runouts(
        &mut self,
        depth: f64,
        center: Vertex,
        axis: usize,
        normal: usize,
        exponent: i32,
    ) -> Result<()> {
        if !(0.0..1.0).contains(&depth) {
            return Err(ElastomerError::Mesher(format!(
                "Run-out depth must be in [0, 1), got {depth}"
            )));
        }
        let half = self
            .points
            .iter()
            .map(|p| (p.coord(normal) - center.coord(normal)).abs())
            .fold(0.0, f64::max);
        if half <= 0.0 {
            return Err(ElastomerError::Mesher(
                "Run-out anchor has no extent along the normal axis".to_owned(),
            ));
        }

        for point in self.points.iter_mut() {
            let s = (point.coord(normal) - center.coord(normal)) / half;
            let factor = 1.0 - depth * (1.0 - s.abs().powi(exponent));
            if factor == 1.0 {
                continue;
            }
            let c = center.coord(axis);
            let value = point.coord_mut(axis);
            *value = c + (*value - c) * factor;
        }

        Ok(())
    }

    /// Merges meshes of the same cell type, deduplicating coincident points
    pub fn merge(meshes: &[Mesh]) -> Result<Mesh> {
        let cell_type = match meshes.first() {
            Some(m) => m.cell_type,
            None => return Err(ElastomerError::Mesher("Nothing to merge".to_owned())),
        };
        if meshes.iter().any(|m| m.cell_type != cell_type) {
            return Err(ElastomerError::Mesher(
                "Cannot merge meshes of different cell types".to_owned(),
            ));
        }

        let container = MeshContainer::new(meshes)?;
        let cells = container
            .blocks
            .into_iter()
            .flat_map(|block| block.cells)
            .collect();

        Ok(Mesh {
            points: container.points,
            cells,
            cell_type,
        })
    }

    /// Revolves a quad mesh in the xy-plane about the y-axis into hexahedra.
    ///
    /// The x coordinate is taken as the radius and y as the axial
    /// coordinate. The revolved solid has its axis along z. Rings of points
    /// on the axis collapse onto one point.
    ///
    /// # Arguments
    /// * `segments` - Number of cells in circumferential direction
    /// * `phi` - Swept angle in degrees, `(0, 360]`
    pub fn revolve(&self, segments: usize, phi: f64) -> Result<Mesh> {
        if self.cell_type != CellType::Quad4 {
            return Err(ElastomerError::Mesher(
                "Only quad meshes can be revolved".to_owned(),
            ));
        }
        let points = revolve_points(&self.points, segments, phi)?;
        let cells = revolve_cells(&self.cells, self.points.len(), segments, phi);
        Mesh::merge(&[Mesh {
            points,
            cells,
            cell_type: CellType::Hex8,
        }])
    }
}

/// Bounds of `points` along `axis` as `(min, max)`
pub fn bounds(points: &[Vertex], axis: usize) -> (f64, f64) {
    points.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
        (lo.min(p.coord(axis)), hi.max(p.coord(axis)))
    })
}

fn is_full_revolution(phi: f64) -> bool {
    (phi - 360.0).abs() < 1e-9
}

/// Number of point rings created by a revolution
pub fn revolve_rings(segments: usize, phi: f64) -> usize {
    if is_full_revolution(phi) {
        segments
    } else {
        segments + 1
    }
}

/// Sweeps `(r, z)` points about the vertical axis. Ring `s` of point `p`
/// lands at index `p * rings + s`, so neighbouring points stay close in
/// the numbering.
pub fn revolve_points(points: &[Vertex], segments: usize, phi: f64) -> Result<Vec<Vertex>> {
    if segments == 0 || !(phi > 0.0 && phi <= 360.0) {
        return Err(ElastomerError::Mesher(format!(
            "Invalid revolution: {segments} segments over {phi} degrees"
        )));
    }
    if points.iter().any(|p| p.x < 0.0) {
        return Err(ElastomerError::Mesher(
            "Cannot revolve points with negative radius".to_owned(),
        ));
    }

    let rings = revolve_rings(segments, phi);
    let mut revolved = Vec::with_capacity(points.len() * rings);
    for point in points {
        for s in 0..rings {
            let angle = (phi * s as f64 / segments as f64).to_radians();
            revolved.push(Vertex::new(
                point.x * angle.cos(),
                point.x * angle.sin(),
                point.y,
            ));
        }
    }
    Ok(revolved)
}

/// Hexahedra from revolving quads, numbered like `revolve_points`
pub fn revolve_cells(
    cells: &[Vec<usize>],
    num_points: usize,
    segments: usize,
    phi: f64,
) -> Vec<Vec<usize>> {
    let rings = revolve_rings(segments, phi);
    let at = |p: usize, s: usize| p * rings + s % rings;
    debug_assert!(cells.iter().flatten().all(|&p| p < num_points));

    let mut revolved = Vec::with_capacity(cells.len() * segments);
    for cell in cells {
        for s in 0..segments {
            // next ring first keeps a positive jacobian for counter-clockwise quads
            let mut hex: Vec<usize> = cell.iter().map(|&p| at(p, s + 1)).collect();
            hex.extend(cell.iter().map(|&p| at(p, s)));
            revolved.push(hex);
        }
    }
    revolved
}

impl MeshContainer {
    /// Merges meshes onto a shared point list
    pub fn new(meshes: &[Mesh]) -> Result<MeshContainer> {
        if meshes.is_empty() {
            return Err(ElastomerError::Mesher(
                "Mesh container needs at least one mesh".to_owned(),
            ));
        }

        let mut index = PointIndex::new();
        let mut blocks = Vec::with_capacity(meshes.len());
        for mesh in meshes {
            let map: Vec<usize> = mesh.points.iter().map(|p| index.insert(*p)).collect();
            blocks.push(CellBlock {
                cells: remap_cells(&mesh.cells, &map),
                cell_type: mesh.cell_type,
            });
        }

        Ok(MeshContainer {
            points: index.points,
            blocks,
        })
    }
}

/// Stacks `count` copies of `base`, each moved by `pitch` along `axis`,
/// and merges them into one mesh
pub fn stack(base: &Mesh, count: usize, pitch: f64, axis: usize) -> Result<Mesh> {
    if count == 0 {
        return Err(ElastomerError::Mesher("Cannot stack zero layers".to_owned()));
    }
    let copies: Vec<Mesh> = (0..count)
        .map(|k| base.translate(k as f64 * pitch, axis))
        .collect();
    Mesh::merge(&copies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rectangle_counts_and_orientation() {
        let mesh = Mesh::rectangle([0.0, 0.0], [2.0, 1.0], [3, 2]).unwrap();
        assert_eq!(mesh.points.len(), 6);
        assert_eq!(mesh.cells, vec![vec![0, 1, 4, 3], vec![1, 2, 5, 4]]);
        assert_eq!(mesh.points[5], Vertex::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn rectangle_rejects_degenerate_input() {
        assert!(Mesh::rectangle([0.0, 0.0], [1.0, 1.0], [1, 4]).is_err());
        assert!(Mesh::rectangle([0.0, 0.0], [0.0, 1.0], [3, 3]).is_err());
    }

    #[test]
    fn cube_counts() {
        let mesh = Mesh::cube([0.0; 3], [1.0; 3], [4, 4, 4]).unwrap();
        assert_eq!(mesh.points.len(), 64);
        assert_eq!(mesh.cells.len(), 27);
        assert_eq!(mesh.cell_type, CellType::Hex8);
        assert_eq!(mesh.cells[0], vec![0, 1, 5, 4, 16, 17, 21, 20]);
    }

    #[test]
    fn layers_translated_by_pitch_share_boundary_points() {
        let layer = Mesh::rectangle([25.0, 0.0], [50.0, 10.0 / 3.0], [5, 4]).unwrap();
        let pitch = 10.0 / 3.0;
        let merged = stack(&layer, 2, pitch, 1).unwrap();

        // the top row of the first copy is the bottom row of the second
        assert_eq!(merged.points.len(), 2 * 20 - 5);
        assert_eq!(merged.cells.len(), 2 * 12);

        let upper = layer.translate(pitch, 1);
        for i in 0..5 {
            let top = layer.points[15 + i];
            let bottom = upper.points[i];
            assert_eq!(PointIndex::key(&top), PointIndex::key(&bottom));
        }
    }

    #[test]
    fn container_shares_points_between_blocks() {
        let rubber = Mesh::rectangle([1.0, 0.0], [2.0, 1.0], [3, 3]).unwrap();
        let metal = Mesh::rectangle([1.0, 1.0], [2.0, 1.2], [3, 2]).unwrap();
        let container = MeshContainer::new(&[rubber, metal]).unwrap();
        assert_eq!(container.points.len(), 9 + 3);
        assert_eq!(container.blocks.len(), 2);
        // first row of the metal block reuses the top row of the rubber block
        assert_eq!(container.blocks[1].cells[0][0], 6);
        assert_eq!(container.blocks[1].cells[0][1], 7);
    }

    #[test]
    fn merge_rejects_mixed_cell_types() {
        let quad = Mesh::rectangle([0.0, 0.0], [1.0, 1.0], [2, 2]).unwrap();
        let hex = Mesh::cube([0.0; 3], [1.0; 3], [2, 2, 2]).unwrap();
        assert!(Mesh::merge(&[quad, hex]).is_err());
        assert!(Mesh::merge(&[]).is_err());
    }

    #[test]
    fn runouts_keep_end_faces() {
        let mut mesh = Mesh::rectangle([25.0, 0.0], [50.0, 10.0], [5, 5]).unwrap();
        let original = mesh.clone();
        mesh.add_runouts(0.2, Vertex::new(37.5, 5.0, 0.0), 0, 1, 2)
            .unwrap();

        for (moved, before) in mesh.points.iter().zip(&original.points) {
            if before.y == 0.0 || before.y == 10.0 {
                assert_eq!(moved, before);
            }
        }
        // mid-height outer point is pulled in by depth * half width
        let mid_outer = mesh.points[2 * 5 + 4];
        assert_relative_eq!(mid_outer.x, 50.0 - 0.2 * 12.5, epsilon = 1e-12);
        assert!(mesh
            .add_runouts(1.0, Vertex::new(37.5, 5.0, 0.0), 0, 1, 2)
            .is_err());
    }

    #[test]
    fn half_revolution_of_a_quad() {
        let mesh = Mesh::rectangle([1.0, 0.0], [2.0, 1.0], [2, 2]).unwrap();
        let solid = mesh.revolve(4, 180.0).unwrap();
        assert_eq!(solid.points.len(), 4 * 5);
        assert_eq!(solid.cells.len(), 4);
        assert_eq!(solid.cell_type, CellType::Hex8);

        // last ring of the outer bottom point lies on the negative x-axis
        let p = solid.points[1 * 5 + 4];
        assert_relative_eq!(p.x, -2.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn revolution_collapses_axis_points() {
        let mesh = Mesh::rectangle([0.0, 0.0], [1.0, 1.0], [2, 2]).unwrap();
        let solid = mesh.revolve(4, 180.0).unwrap();
        // two axis points stay single, two outer points get 5 rings each
        assert_eq!(solid.points.len(), 2 + 2 * 5);
        assert_eq!(solid.cells.len(), 4);
        assert!(solid.cells.iter().flatten().all(|&p| p < solid.points.len()));
        // every wedge shares its axis edge
        for cell in &solid.cells {
            assert_eq!(cell[0], cell[4]);
            assert_eq!(cell[3], cell[7]);
        }
    }

    #[test]
    fn full_revolution_wraps_around() {
        let mesh = Mesh::rectangle([1.0, 0.0], [2.0, 1.0], [2, 2]).unwrap();
        let solid = mesh.revolve(6, 360.0).unwrap();
        assert_eq!(solid.points.len(), 4 * 6);
        let last = &solid.cells[5];
        // the last segment closes onto ring zero
        assert_eq!(last[0], 0);
        assert_eq!(last[4], 5);
        assert!(mesh.revolve(0, 180.0).is_err());
    }
}
