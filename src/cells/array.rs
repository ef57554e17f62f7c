use super::cell::Cell;
use crate::simbox::SimBox;
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// The regular 3D partition of a box into cells of edge >= the pair
/// potential range.
///
/// Each cell knows two neighbour lists: cells reachable within one step
/// in each axis direction without crossing a periodic boundary, and
/// those reachable only through the wrap. A neighbour reachable both
/// ways is classified as direct; the two lists never share a cell, so a
/// given atom pair is considered under exactly one image convention.
#[derive(Debug, Clone, Default)]
pub struct CellArray {
    divisions: [usize; 3],
    cells: Vec<Cell>,
    neighbours: Vec<Vec<usize>>,
    mim_neighbours: Vec<Vec<usize>>,
}

impl CellArray {
    /// Partition the box for the given interaction range.
    pub fn generate(bx: &SimBox, range: f64) -> Self {
        let lengths = bx.axis_lengths();
        let divisions = [
            ((lengths.x / range).floor() as usize).max(1),
            ((lengths.y / range).floor() as usize).max(1),
            ((lengths.z / range).floor() as usize).max(1),
        ];
        if bx.is_periodic() && divisions.iter().any(|n| *n < 3) {
            log::debug!(
                "cell divisions {:?} leave fewer than three cells along an axis; minimum-image \
                 classification degenerates for same-cell pairs",
                divisions
            );
        }
        let mut array = Self {
            divisions,
            cells: Vec::new(),
            neighbours: Vec::new(),
            mim_neighbours: Vec::new(),
        };
        for i in 0..divisions[0] {
            for j in 0..divisions[1] {
                for k in 0..divisions[2] {
                    let index = array.flat_index([i, j, k]);
                    debug_assert_eq!(index, array.cells.len());
                    array.cells.push(Cell::new(index, [i, j, k]));
                }
            }
        }
        array.build_neighbours(bx.is_periodic());
        array
    }

    fn flat_index(&self, grid: [usize; 3]) -> usize {
        (grid[0] * self.divisions[1] + grid[1]) * self.divisions[2] + grid[2]
    }

    /// one-step neighbour lists, split by whether the step wraps
    fn build_neighbours(&mut self, periodic: bool) {
        self.neighbours = vec![Vec::new(); self.cells.len()];
        self.mim_neighbours = vec![Vec::new(); self.cells.len()];
        for cell in 0..self.cells.len() {
            let grid = self.cells[cell].grid();
            // neighbour index -> whether every route to it crosses a boundary
            let mut found: BTreeMap<usize, bool> = BTreeMap::new();
            for dx in -1i64..=1 {
                for dy in -1i64..=1 {
                    for dz in -1i64..=1 {
                        if (dx, dy, dz) == (0, 0, 0) {
                            continue;
                        }
                        let raw = [
                            grid[0] as i64 + dx,
                            grid[1] as i64 + dy,
                            grid[2] as i64 + dz,
                        ];
                        let crosses = raw
                            .iter()
                            .zip(self.divisions)
                            .any(|(x, n)| *x < 0 || *x >= n as i64);
                        if crosses && !periodic {
                            continue;
                        }
                        let wrapped = [
                            raw[0].rem_euclid(self.divisions[0] as i64) as usize,
                            raw[1].rem_euclid(self.divisions[1] as i64) as usize,
                            raw[2].rem_euclid(self.divisions[2] as i64) as usize,
                        ];
                        let target = self.flat_index(wrapped);
                        if target == cell {
                            continue;
                        }
                        found
                            .entry(target)
                            .and_modify(|c| *c &= crosses)
                            .or_insert(crosses);
                    }
                }
            }
            for (target, crosses) in found {
                match crosses {
                    false => self.neighbours[cell].push(target),
                    true => self.mim_neighbours[cell].push(target),
                }
            }
        }
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn divisions(&self) -> [usize; 3] {
        self.divisions
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    /// index of the cell containing the folded position
    pub fn cell_containing(&self, bx: &SimBox, r: Vector3<f64>) -> usize {
        let frac = bx.folded_fractional(r);
        let grid = [
            ((frac.x * self.divisions[0] as f64) as i64).clamp(0, self.divisions[0] as i64 - 1),
            ((frac.y * self.divisions[1] as f64) as i64).clamp(0, self.divisions[1] as i64 - 1),
            ((frac.z * self.divisions[2] as f64) as i64).clamp(0, self.divisions[2] as i64 - 1),
        ];
        self.flat_index([grid[0] as usize, grid[1] as usize, grid[2] as usize])
    }

    pub fn neighbours(&self, cell: usize) -> &[usize] {
        &self.neighbours[cell]
    }

    pub fn mim_neighbours(&self, cell: usize) -> &[usize] {
        &self.mim_neighbours[cell]
    }

    /// whether pairs between these two cells require the minimum image
    pub fn mim_required(&self, a: usize, b: usize) -> bool {
        self.mim_neighbours[a].contains(&b)
    }

    pub fn clear_atoms(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }
}
