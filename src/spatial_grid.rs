//! Uniform hash grid for shape collision candidates

use glam::Vec3;
use std::collections::HashMap;

pub type CellKey = (i32, i32, i32);

pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size = cell_size.max(f32::EPSILON);
        self.cells.clear();
    }

    /// Empty every bucket but keep their allocations.
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
    }

    pub fn cell_of(&self, pos: Vec3) -> CellKey {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    pub fn insert(&mut self, index: usize, pos: Vec3) {
        let cell = self.cell_of(pos);
        self.cells.entry(cell).or_default().push(index);
    }

    /// Indices in the cell containing `pos` and its 26 neighbours.
    pub fn neighbors(&self, pos: Vec3, out: &mut Vec<usize>) {
        let (cx, cy, cz) = self.cell_of(pos);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(indices) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        out.extend_from_slice(indices);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighborhood_is_27_cells() {
        let mut grid = SpatialGrid::new(100.0);
        grid.insert(0, Vec3::new(50.0, 50.0, 50.0));
        grid.insert(1, Vec3::new(-50.0, 150.0, 120.0));
        grid.insert(2, Vec3::new(250.0, 50.0, 50.0));
        grid.insert(3, Vec3::new(150.0, -50.0, -50.0));

        let mut out = Vec::new();
        grid.neighbors(Vec3::new(10.0, 10.0, 10.0), &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1, 3]);
    }

    #[test]
    fn test_clear_keeps_nothing_visible() {
        let mut grid = SpatialGrid::new(100.0);
        grid.insert(0, Vec3::ZERO);
        grid.clear();
        let mut out = Vec::new();
        grid.neighbors(Vec3::ZERO, &mut out);
        assert!(out.is_empty());
    }
}
