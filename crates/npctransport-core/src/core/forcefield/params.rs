use super::sites::SiteShape;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalParams {
    pub interaction_k: f64,
    pub interaction_range: f64,
    pub nonspecific_k: f64,
    pub nonspecific_range: f64,
    pub excluded_volume_k: f64,
    #[serde(default)]
    pub backbone_k: f64,
    pub slack: f64,
    pub range: f64,
    #[serde(default)]
    pub site_shape: SiteShape,
    #[serde(default)]
    pub box_side: Option<f64>,
    /// Confines optimized bodies to the tunnel of a membrane slab centered on `z = 0`.
    #[serde(default)]
    pub slab_is_on: bool,
    #[serde(default)]
    pub slab_thickness: f64,
    #[serde(default)]
    pub tunnel_radius: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChannelParams {
    pub bottom_z: f64,
    pub top_z: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TypeFactors {
    #[serde(default = "unit_factor")]
    pub k_factor: f64,
    #[serde(default = "unit_factor")]
    pub range_factor: f64,
}

fn unit_factor() -> f64 {
    1.0
}

impl Default for TypeFactors {
    fn default() -> Self {
        Self {
            k_factor: 1.0,
            range_factor: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InteractionSpec {
    pub type0: String,
    pub type1: String,
    #[serde(default)]
    pub interaction_k: Option<f64>,
    #[serde(default)]
    pub interaction_range: Option<f64>,
}

/// Read-only parameter record consumed by scoring and statistics.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationParams {
    pub globals: GlobalParams,
    #[serde(default)]
    pub channel: Option<ChannelParams>,
    #[serde(default)]
    pub types: HashMap<String, TypeFactors>,
    #[serde(default)]
    pub interactions: Vec<InteractionSpec>,
}

#[derive(Debug, Deserialize)]
struct TypeFactorRecord {
    #[serde(rename = "type")]
    type_name: String,
    k_factor: f64,
    range_factor: f64,
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid parameter '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl SimulationParams {
    /// Loads and validates parameters from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let params: Self = toml::from_str(&content).map_err(|e| ParamLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        params.validate()?;
        Ok(params)
    }

    /// Loads parameters from a TOML file and overrides per-type factors with a CSV
    /// table of `type,k_factor,range_factor` records.
    pub fn load_with_type_factors(
        params_path: &Path,
        type_factors_path: &Path,
    ) -> Result<Self, ParamLoadError> {
        let mut params = Self::load(params_path)?;
        let factors = Self::load_type_factors_csv(type_factors_path)?;
        params.types.extend(factors);
        params.validate()?;
        Ok(params)
    }

    fn load_type_factors_csv(
        path: &Path,
    ) -> Result<HashMap<String, TypeFactors>, ParamLoadError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| ParamLoadError::Csv {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        let mut factors = HashMap::new();
        for result in reader.deserialize::<TypeFactorRecord>() {
            let record = result.map_err(|e| ParamLoadError::Csv {
                path: path.to_string_lossy().to_string(),
                source: e,
            })?;
            factors.insert(
                record.type_name,
                TypeFactors {
                    k_factor: record.k_factor,
                    range_factor: record.range_factor,
                },
            );
        }
        Ok(factors)
    }

    /// Checks the parameter record for values that make scoring or statistics meaningless.
    pub fn validate(&self) -> Result<(), ParamLoadError> {
        let g = &self.globals;
        non_negative("globals.interaction_k", g.interaction_k)?;
        positive("globals.interaction_range", g.interaction_range)?;
        non_negative("globals.nonspecific_k", g.nonspecific_k)?;
        non_negative("globals.nonspecific_range", g.nonspecific_range)?;
        non_negative("globals.excluded_volume_k", g.excluded_volume_k)?;
        non_negative("globals.backbone_k", g.backbone_k)?;
        non_negative("globals.slack", g.slack)?;
        positive("globals.range", g.range)?;
        if let Some(side) = g.box_side {
            positive("globals.box_side", side)?;
        }
        if g.slab_is_on {
            positive("globals.slab_thickness", g.slab_thickness)?;
            positive("globals.tunnel_radius", g.tunnel_radius)?;
        }

        if let Some(channel) = &self.channel {
            finite("channel.bottom_z", channel.bottom_z)?;
            finite("channel.top_z", channel.top_z)?;
            if channel.bottom_z >= channel.top_z {
                return Err(invalid(
                    "channel",
                    format!(
                        "bottom_z ({}) must be below top_z ({})",
                        channel.bottom_z, channel.top_z
                    ),
                ));
            }
        }

        for (name, factors) in &self.types {
            non_negative(&format!("types.{name}.k_factor"), factors.k_factor)?;
            non_negative(&format!("types.{name}.range_factor"), factors.range_factor)?;
        }

        for spec in &self.interactions {
            if let Some(k) = spec.interaction_k {
                non_negative(&format!("interactions.{}-{}.interaction_k", spec.type0, spec.type1), k)?;
            }
            if let Some(range) = spec.interaction_range {
                positive(
                    &format!("interactions.{}-{}.interaction_range", spec.type0, spec.type1),
                    range,
                )?;
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> ParamLoadError {
    ParamLoadError::Invalid {
        field: field.to_string(),
        reason,
    }
}

fn finite(field: &str, value: f64) -> Result<(), ParamLoadError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite, got {value}")))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ParamLoadError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(invalid(field, format!("must be non-negative, got {value}")));
    }
    Ok(())
}

fn positive(field: &str, value: f64) -> Result<(), ParamLoadError> {
    finite(field, value)?;
    if value <= 0.0 {
        return Err(invalid(field, format!("must be positive, got {value}")));
    }
    Ok(())
}
