//! Aggregated configuration
//!
//! Every offset, name and threshold the crate uses is a field somewhere below
//! [`SessionConfig`]. Omitted fields keep their defaults, so a JSON document only
//! needs to name what differs for a given target build.

use crate::camera::CameraConfig;
use crate::locator::LocatorConfig;
use crate::metadata::TypeTableConfig;
use crate::projection::ProjectionConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// All tunables for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Node list walk
    pub locator: LocatorConfig,
    /// Type table route
    pub type_table: TypeTableConfig,
    /// Camera selection and validation
    pub camera: CameraConfig,
    /// World-to-screen projection
    pub projection: ProjectionConfig,
}

impl SessionConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.projection.validate().map_err(Error::InvalidConfig)?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
