use nalgebra::Vector3;

/// cell index carried before any spatial assignment has happened
pub const UNASSIGNED_CELL: usize = usize::MAX;

/// One atom instantiated into a configuration.
///
/// Every relationship is an index interpreted against the owning
/// configuration's arenas: the cell currently containing the folded
/// position, the owning molecule, the local (used-type histogram) and
/// master (pair potential table) type indices, and the species atom
/// this one instantiates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atom {
    pub r: Vector3<f64>,
    pub cell: usize,
    pub molecule: usize,
    pub local_type: usize,
    pub master_type: usize,
    pub charge: f64,
    pub species_atom: usize,
}
