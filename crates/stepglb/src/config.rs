//! Conversion settings.
//!
//! Every entry point takes a [`ConvertConfig`] explicitly. Values can come
//! from the mode presets, a TOML file, or both (file keys override the
//! preset of the mode they name).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stepglb_kernel_math::MILLIMETERS_TO_METERS;
use stepglb_kernel_tessellate::TessellationParams;

use crate::error::ConvertError;

/// How occurrences end up in the exported scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionMode {
    /// One node per occurrence, meshes shared between occurrences of the
    /// same part.
    #[default]
    Occurrence,
    /// All occurrences baked into a single mesh under one node.
    SingleShape,
}

impl ConversionMode {
    /// Name used in progress lines and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Occurrence => "occurrence",
            Self::SingleShape => "single-shape",
        }
    }
}

impl std::fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Scene layout.
    pub mode: ConversionMode,
    /// Factor from kernel length units to meters.
    pub unit_scale_to_meters: f64,
    /// Maximum chordal deviation, kernel units.
    pub linear_deflection: f64,
    /// Maximum angular deviation in radians; `None` leaves it unbounded.
    pub angular_deflection: Option<f64>,
    /// Run the double-sided material pass on the written file.
    pub force_double_sided: bool,
    /// Move each mesh so its bounding-box minimum is the origin.
    pub rezero: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self::for_mode(ConversionMode::Occurrence)
    }
}

/// Partial settings, as read from a TOML file or the command line.
///
/// Unset fields keep the value of the configuration they are applied to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    /// Scene layout; also selects the preset the other fields start from.
    pub mode: Option<ConversionMode>,
    /// Factor from kernel length units to meters.
    pub unit_scale_to_meters: Option<f64>,
    /// Maximum chordal deviation, kernel units.
    pub linear_deflection: Option<f64>,
    /// Maximum angular deviation in radians.
    pub angular_deflection: Option<f64>,
    /// Run the double-sided material pass.
    pub force_double_sided: Option<bool>,
    /// Move each mesh so its bounding-box minimum is the origin.
    pub rezero: Option<bool>,
}

impl ConfigOverrides {
    /// Apply the set fields on top of `base`.
    ///
    /// A mode different from `base.mode` first switches to that mode's preset.
    pub fn apply(&self, base: ConvertConfig) -> ConvertConfig {
        let mut config = match self.mode {
            Some(mode) if mode != base.mode => ConvertConfig::for_mode(mode),
            _ => base,
        };
        if let Some(v) = self.unit_scale_to_meters {
            config.unit_scale_to_meters = v;
        }
        if let Some(v) = self.linear_deflection {
            config.linear_deflection = v;
        }
        if let Some(v) = self.angular_deflection {
            config.angular_deflection = Some(v);
        }
        if let Some(v) = self.force_double_sided {
            config.force_double_sided = v;
        }
        if let Some(v) = self.rezero {
            config.rezero = v;
        }
        config
    }

    /// Overlay `other` on `self`; fields set in `other` win.
    pub fn merge(self, other: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            mode: other.mode.or(self.mode),
            unit_scale_to_meters: other.unit_scale_to_meters.or(self.unit_scale_to_meters),
            linear_deflection: other.linear_deflection.or(self.linear_deflection),
            angular_deflection: other.angular_deflection.or(self.angular_deflection),
            force_double_sided: other.force_double_sided.or(self.force_double_sided),
            rezero: other.rezero.or(self.rezero),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConvertError> {
        toml::from_str(text).map_err(ConvertError::config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

impl ConvertConfig {
    /// Preset for `mode`.
    ///
    /// | mode         | linear | angular | rezero |
    /// |--------------|--------|---------|--------|
    /// | occurrence   | 0.15   | 0.25    | yes    |
    /// | single-shape | 0.5    | none    | no     |
    pub fn for_mode(mode: ConversionMode) -> Self {
        match mode {
            ConversionMode::Occurrence => Self {
                mode,
                unit_scale_to_meters: MILLIMETERS_TO_METERS,
                linear_deflection: 0.15,
                angular_deflection: Some(0.25),
                force_double_sided: true,
                rezero: true,
            },
            ConversionMode::SingleShape => Self {
                mode,
                unit_scale_to_meters: MILLIMETERS_TO_METERS,
                linear_deflection: 0.5,
                angular_deflection: None,
                force_double_sided: true,
                rezero: false,
            },
        }
    }

    /// Parse a TOML document. Missing keys take the preset of the `mode`
    /// the document names (occurrence when it names none).
    pub fn from_toml_str(text: &str) -> Result<Self, ConvertError> {
        let config = ConfigOverrides::from_toml_str(text)?.apply(Self::default());
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject values no kernel can honour.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if !(self.unit_scale_to_meters.is_finite() && self.unit_scale_to_meters > 0.0) {
            return Err(ConvertError::config(format!(
                "unit_scale_to_meters must be positive, got {}",
                self.unit_scale_to_meters
            )));
        }
        if !(self.linear_deflection.is_finite() && self.linear_deflection > 0.0) {
            return Err(ConvertError::config(format!(
                "linear_deflection must be positive, got {}",
                self.linear_deflection
            )));
        }
        if let Some(angular) = self.angular_deflection {
            if !(angular.is_finite() && angular > 0.0) {
                return Err(ConvertError::config(format!(
                    "angular_deflection must be positive, got {angular}"
                )));
            }
        }
        Ok(())
    }

    /// Tessellation settings derived from this configuration.
    pub fn tessellation(&self) -> TessellationParams {
        TessellationParams {
            linear_deflection: self.linear_deflection,
            angular_deflection: self.angular_deflection,
            unit_scale: self.unit_scale_to_meters,
            rezero: self.rezero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let occ = ConvertConfig::default();
        assert_eq!(occ.mode, ConversionMode::Occurrence);
        assert_eq!(occ.unit_scale_to_meters, 0.001);
        assert_eq!(occ.linear_deflection, 0.15);
        assert_eq!(occ.angular_deflection, Some(0.25));
        assert!(occ.force_double_sided);
        assert!(occ.rezero);

        let single = ConvertConfig::for_mode(ConversionMode::SingleShape);
        assert_eq!(single.linear_deflection, 0.5);
        assert_eq!(single.angular_deflection, None);
        assert!(!single.rezero);
    }

    #[test]
    fn test_toml_overrides_preset() {
        let config = ConvertConfig::from_toml_str(
            "mode = \"single-shape\"\nlinear_deflection = 0.2\nforce_double_sided = false\n",
        )
        .unwrap();
        assert_eq!(config.mode, ConversionMode::SingleShape);
        assert_eq!(config.linear_deflection, 0.2);
        assert!(!config.force_double_sided);
        // untouched keys follow the single-shape preset
        assert_eq!(config.angular_deflection, None);
        assert!(!config.rezero);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ConvertConfig::from_toml_str("").unwrap(), ConvertConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ConvertConfig::from_toml_str("linear_deflection = -1.0"),
            Err(ConvertError::Config(_))
        ));
        assert!(matches!(
            ConvertConfig::from_toml_str("mode = \"sideways\""),
            Err(ConvertError::Config(_))
        ));
        assert!(matches!(
            ConvertConfig::from_toml_str("unit_scale_to_meters = 0.0"),
            Err(ConvertError::Config(_))
        ));
        assert!(matches!(
            ConvertConfig::from_toml_str("tolerance = 0.1"),
            Err(ConvertError::Config(_))
        ));
    }

    #[test]
    fn test_overrides_merge_and_apply() {
        let file = ConfigOverrides {
            linear_deflection: Some(0.3),
            rezero: Some(false),
            ..Default::default()
        };
        let flags = ConfigOverrides {
            linear_deflection: Some(0.05),
            ..Default::default()
        };
        let config = file.merge(flags).apply(ConvertConfig::default());
        assert_eq!(config.linear_deflection, 0.05);
        assert!(!config.rezero);
        assert_eq!(config.angular_deflection, Some(0.25));

        let switched = ConfigOverrides {
            mode: Some(ConversionMode::SingleShape),
            ..Default::default()
        }
        .apply(ConvertConfig::default());
        assert_eq!(switched, ConvertConfig::for_mode(ConversionMode::SingleShape));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepglb.toml");
        std::fs::write(&path, "unit_scale_to_meters = 1.0\nrezero = false\n").unwrap();

        let config = ConvertConfig::load(&path).unwrap();
        assert_eq!(config.unit_scale_to_meters, 1.0);
        assert!(!config.rezero);
        assert_eq!(config.linear_deflection, 0.15);

        assert!(matches!(
            ConvertConfig::load(dir.path().join("missing.toml")),
            Err(ConvertError::Io(_))
        ));
    }

    #[test]
    fn test_tessellation_params() {
        let params = ConvertConfig::default().tessellation();
        assert_eq!(params.linear_deflection, 0.15);
        assert_eq!(params.unit_scale, 0.001);
        assert!(params.rezero);
    }
}
