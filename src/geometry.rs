use {
    crate::{config::Config, error::Result},
    serde::{Deserialize, Serialize},
};

/// A spatial discretization descriptor.
///
/// Fields carry their horizontal points flattened row by row, so a field on
/// this geometry is a rank-2 array of shape `(nx * ny, levels)`. The same
/// type describes both the native (on-disk) and the processing (compute)
/// discretizations; the two may be identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    nx: usize,
    ny: usize,
    levels: usize,
}

impl Geometry {
    pub fn new(nx: usize, ny: usize, levels: usize) -> Self {
        Geometry { nx, ny, levels }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Geometry {
            nx: config.get_usize("nx")?,
            ny: config.get_usize("ny")?,
            levels: config.get_usize("levels")?,
        })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn npoints(&self) -> usize {
        self.nx * self.ny
    }

    pub fn field_shape(&self) -> (usize, usize) {
        (self.npoints(), self.levels)
    }
}
