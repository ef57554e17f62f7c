/// One sub-volume of the box, holding the indices of the atoms whose
/// folded positions currently lie inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    index: usize,
    grid: [usize; 3],
    atoms: Vec<usize>,
}

impl Cell {
    pub fn new(index: usize, grid: [usize; 3]) -> Self {
        Self {
            index,
            grid,
            atoms: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn grid(&self) -> [usize; 3] {
        self.grid
    }

    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atoms.binary_search(&atom).is_ok()
    }

    pub fn add(&mut self, atom: usize) {
        if let Err(slot) = self.atoms.binary_search(&atom) {
            self.atoms.insert(slot, atom);
        }
    }

    pub fn remove(&mut self, atom: usize) {
        if let Ok(slot) = self.atoms.binary_search(&atom) {
            self.atoms.remove(slot);
        }
    }

    pub fn clear(&mut self) {
        self.atoms.clear();
    }
}
