//! Configuration d'un lot d'estimation

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use gfa_engine::Thresholds;

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// SRID des couches d'entrée (4326 projeté en 3857, sinon conservé)
    #[serde(default = "default_srid")]
    pub srid: u32,

    /// Fichiers produits
    #[serde(default)]
    pub output: OutputConfig,

    /// Seuils de l'estimation
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Nombre de threads de calcul (défaut : tous les cœurs)
    #[serde(default)]
    pub jobs: Option<usize>,
}

/// Sélection des fichiers produits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "enabled")]
    pub geojson: bool,

    #[serde(default = "enabled")]
    pub estimates: bool,

    #[serde(default = "enabled")]
    pub report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            geojson: true,
            estimates: true,
            report: true,
        }
    }
}

fn default_srid() -> u32 {
    3857
}

fn enabled() -> bool {
    true
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            "strict" => Self::load_embedded(include_str!("presets/strict.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default, strict", preset),
        }
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(name: &str) -> Result<Self> {
        let path = Path::new(name);
        if path.extension().is_some_and(|ext| ext == "json") || path.exists() {
            Self::load(path)
        } else {
            Self::from_preset(name)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Applique les surcharges de la ligne de commande puis valide les seuils
    pub fn with_overrides(mut self, srid: Option<u32>, jobs: Option<usize>) -> Result<Self> {
        if let Some(srid) = srid {
            self.srid = srid;
        }
        if jobs.is_some() {
            self.jobs = jobs;
        }
        if self.jobs == Some(0) {
            anyhow::bail!("jobs must be at least 1");
        }
        self.thresholds
            .validate()
            .context("Invalid thresholds in configuration")?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_matches_engine_defaults() {
        let config = Config::from_preset("default").unwrap();
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.srid, 3857);
        assert!(config.output.geojson);
    }

    #[test]
    fn test_strict_preset_overrides_some_thresholds() {
        let config = Config::from_preset("strict").unwrap();
        let defaults = Thresholds::default();
        assert_eq!(config.thresholds.min_parcel_area, 80.0);
        assert_eq!(config.thresholds.neighbour_buffer, defaults.neighbour_buffer);
        assert_eq!(config.thresholds.link_accuracy.street_block, 0.5);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(Config::from_preset("lenient").is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_preset("default")
            .unwrap()
            .with_overrides(Some(4326), Some(2))
            .unwrap();
        assert_eq!(config.srid, 4326);
        assert_eq!(config.jobs, Some(2));

        let zero = Config::from_preset("default").unwrap().with_overrides(None, Some(0));
        assert!(zero.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("gfa_cli_config_test.json");
        std::fs::write(&path, r#"{"srid": 4326, "thresholds": {"storey_ceiling": 40}}"#).unwrap();

        let config = Config::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(config.srid, 4326);
        assert_eq!(config.thresholds.storey_ceiling, 40);
        assert_eq!(config.thresholds.min_parcel_area, 50.0);
        assert!(config.output.report);

        std::fs::remove_file(path).ok();
    }
}
