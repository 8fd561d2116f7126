use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Filesystem layout of a pipeline run. All artifacts hang off one data
/// root; any individual path can be overridden via a JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    /// Census attribute table (csv or parquet) keyed by grid id.
    pub census_table: PathBuf,
    /// Healthcare accessibility point samples (parquet; x/y meters + seconds).
    pub health_samples: PathBuf,
    /// Directory of `{year}_q{quarter}_{modality}.parquet` tile tables.
    pub internet_dir: PathBuf,

    pub grid_matrix: PathBuf,
    pub quadkey_matrix: PathBuf,

    pub population_out: PathBuf,
    pub health_out: PathBuf,
    pub internet_out: PathBuf,
    pub fused_out: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::under(Path::new("data"))
    }
}

impl DataPaths {
    pub fn under(root: &Path) -> Self {
        Self {
            census_table: root.join("population/census_2021.csv"),
            health_samples: root.join("health/accessibility_samples.parquet"),
            internet_dir: root.join("internet"),
            grid_matrix: root.join("matrix/matrix_grid_h3_weights.parquet"),
            quadkey_matrix: root.join("matrix/matrix_quadkey_h3_weights.parquet"),
            population_out: root.join("population/population_census_2021_h3_res8.parquet"),
            health_out: root.join("health/euro_access_healthcare_2023_h3_res8.parquet"),
            internet_out: root.join("internet/internet_speed_h3_res8.parquet"),
            fused_out: root.join("data_h3_res8.parquet"),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let paths = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(paths)
    }
}
