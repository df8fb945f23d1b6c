use crate::core::Vector3f;
use crate::lipid::LipidSpeciesDescr;
use crate::membrane::MembraneError;
use serde::Deserialize;

/// Parameters of the per-frame computation
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MembraneOptions {
    /// Neighbour search cutoff in nm
    pub cutoff: f32,
    /// Bilayer normal. Zero vector means that it is inferred.
    pub external_normal: [f32; 3],
    /// Number of passes of the local surface fit
    pub fit_iterations: usize,
    /// Seed the surface fit by the normals of the previous frame
    pub use_previous_normals: bool,
    /// Length of VMD arrows in Angstroms
    pub arrow_length: f32,
}

impl Default for MembraneOptions {
    fn default() -> Self {
        Self {
            cutoff: 2.0,
            external_normal: [0.0; 3],
            fit_iterations: 2,
            use_previous_normals: false,
            arrow_length: 5.0,
        }
    }
}

impl MembraneOptions {
    pub fn external_normal(&self) -> Vector3f {
        Vector3f::from(self.external_normal)
    }

    pub fn validate(&self) -> Result<(), MembraneError> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(MembraneError::InvalidCutoff(self.cutoff));
        }
        Ok(())
    }
}

/// Lipid species and options read from TOML
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MembraneConfig {
    pub species: Vec<LipidSpeciesDescr>,
    #[serde(default)]
    pub options: MembraneOptions,
}

impl MembraneConfig {
    pub fn from_toml(s: &str) -> Result<Self, MembraneError> {
        let cfg: Self = toml::from_str(s)?;
        if cfg.species.is_empty() {
            return Err(MembraneError::NoSpecies);
        }
        cfg.options.validate()?;
        Ok(cfg)
    }
}
