use nalgebra::Vector3;

/// A named site defined on a species: its instantaneous position is the
/// minimum-image average of the origin atoms' coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesSite {
    pub name: String,
    pub origins: Vec<usize>,
}

/// One realised site within a configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    pub origin: Vector3<f64>,
    /// owning molecule index within the configuration
    pub molecule: usize,
    /// index of the species site definition this realises
    pub definition: usize,
}

impl Site {
    /// two sites are the same physical site when they come from the same
    /// molecule and the same definition
    pub fn same_site(&self, other: &Site) -> bool {
        self.molecule == other.molecule && self.definition == other.definition
    }

    pub fn same_molecule(&self, other: &Site) -> bool {
        self.molecule == other.molecule
    }
}
