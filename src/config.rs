//! Pipeline configuration.
//!
//! Every tunable constant of the mesher lives in [`MeshConfig`]. The defaults
//! reproduce the classic GAMer parameters, so meshes produced with a default
//! configuration are compatible with meshes produced by existing tooling.
//!
//! ```
//! use biomesh::config::MeshConfig;
//!
//! let config = MeshConfig::from_toml_str(r#"
//!     isovalue = 2.0
//!     [coarsen]
//!     flatness-angle = 20.0
//! "#).unwrap();
//! assert_eq!(config.isovalue, 2.0);
//! assert_eq!(config.blobbiness, -0.2);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MeshError, Result};

/// Isovalue used by the marching cubes extraction.
pub const ISO_VALUE: f32 = 2.5;
/// Kernel decay used when blurring atoms into a volume.
pub const BLOBBINESS: f32 = -0.2;
/// Volume samples per unit length.
pub const DIM_SCALE: f64 = 1.99;
/// Fraction of vertices a coarsening pass tries to remove.
pub const COARSEN_RATE: f64 = 0.1666;
/// Islands enclosing fewer voxels than this are removed.
pub const MIN_VOLUME: f64 = 333_333.0;
/// Bounding sphere radius as a multiple of the molecule radius.
pub const SPHERE_RATIO: f64 = 40.0;

/// Top-level configuration threaded through every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MeshConfig {
    /// Level of the extracted isosurface.
    pub isovalue: f32,
    /// Kernel decay of each atom's density contribution (negative).
    pub blobbiness: f32,
    /// Volume samples per unit length.
    pub dim_scale: f64,
    /// Scale factor applied to the atoms' bounding box, about its centre.
    pub padding_ratio: f64,
    /// Minimum enclosed volume, in voxel units, for an island to survive.
    pub min_volume: f64,
    /// Radius of the bounding sphere relative to the molecule radius.
    pub sphere_ratio: f64,
    /// Subdivision level of the bounding sphere primitive.
    pub sphere_level: usize,
    /// Parameter string passed through to the tetrahedralizer.
    pub tet_params: String,
    /// Smoothing parameters.
    pub smooth: SmoothConfig,
    /// Coarsening parameters.
    pub coarsen: CoarsenConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            isovalue: ISO_VALUE,
            blobbiness: BLOBBINESS,
            dim_scale: DIM_SCALE,
            padding_ratio: 1.5,
            min_volume: MIN_VOLUME,
            sphere_ratio: SPHERE_RATIO,
            sphere_level: 3,
            tet_params: String::new(),
            smooth: SmoothConfig::default(),
            coarsen: CoarsenConfig::default(),
        }
    }
}

/// Smoothing parameters of the quality loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SmoothConfig {
    /// Maximum number of relaxation passes.
    pub iterations: usize,
    /// Fraction of the way each vertex moves toward its one-ring centroid.
    pub lambda: f64,
    /// Stop once no angle is smaller than this (degrees).
    pub min_angle: f64,
    /// Stop once no angle is larger than this (degrees).
    pub max_angle: f64,
    /// Keep boundary and marked vertices fixed.
    pub hold_marked: bool,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            lambda: 0.5,
            min_angle: 15.0,
            max_angle: 150.0,
            hold_marked: true,
        }
    }
}

/// Coarsening parameters of the quality loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoarsenConfig {
    /// Fraction of vertices a single pass tries to remove.
    pub rate: f64,
    /// Maximum spread (degrees) of face normals around a collapsible edge.
    pub flatness_angle: f64,
    /// Edges longer than this multiple of the average edge length are kept.
    pub denseness_weight: f64,
    /// Maximum rotation (degrees) of any surviving face normal.
    pub max_normal_angle: f64,
    /// Number of coarsen/smooth rounds run by the pipeline.
    pub rounds: usize,
}

impl Default for CoarsenConfig {
    fn default() -> Self {
        Self {
            rate: COARSEN_RATE,
            flatness_angle: 45.0,
            denseness_weight: 1.5,
            max_normal_angle: 30.0,
            rounds: 1,
        }
    }
}

impl MeshConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: MeshConfig =
            toml::from_str(text).map_err(|e| MeshError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading mesh configuration.");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML text.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| MeshError::Config(e.to_string()))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.dim_scale.is_finite() && self.dim_scale > 0.0) {
            return Err(MeshError::invalid_param("dim-scale", self.dim_scale, "must be positive"));
        }
        if !(self.padding_ratio.is_finite() && self.padding_ratio >= 1.0) {
            return Err(MeshError::invalid_param(
                "padding-ratio",
                self.padding_ratio,
                "must be at least 1.0",
            ));
        }
        if !(self.blobbiness < 0.0) {
            return Err(MeshError::invalid_param("blobbiness", self.blobbiness, "must be negative"));
        }
        if !(self.coarsen.rate > 0.0 && self.coarsen.rate < 1.0) {
            return Err(MeshError::invalid_param(
                "coarsen.rate",
                self.coarsen.rate,
                "must lie in (0, 1)",
            ));
        }
        if self.smooth.min_angle >= self.smooth.max_angle {
            return Err(MeshError::invalid_param(
                "smooth.min-angle",
                self.smooth.min_angle,
                "must be smaller than max-angle",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = MeshConfig::default();
        assert_eq!(config.isovalue, 2.5);
        assert_eq!(config.blobbiness, -0.2);
        assert_eq!(config.dim_scale, 1.99);
        assert_eq!(config.coarsen.rate, 0.1666);
        assert_eq!(config.min_volume, 333_333.0);
        assert_eq!(config.sphere_ratio, 40.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MeshConfig::from_toml_str("dim-scale = 3.0\n[smooth]\niterations = 2\n").unwrap();
        assert_eq!(config.dim_scale, 3.0);
        assert_eq!(config.smooth.iterations, 2);
        assert_eq!(config.smooth.lambda, 0.5);
        assert_eq!(config.isovalue, ISO_VALUE);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            MeshConfig::from_toml_str("isolevel = 1.0"),
            Err(MeshError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_padding_rejected() {
        assert!(MeshConfig::from_toml_str("padding-ratio = 0.5").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = MeshConfig {
            tet_params: "q2.0".to_string(),
            ..MeshConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(MeshConfig::from_toml_str(&text).unwrap(), config);
    }
}
