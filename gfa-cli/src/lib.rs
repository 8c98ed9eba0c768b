//! # gfa-cli
//!
//! Adaptateur d'entrée/sortie du moteur `gfa-engine`.
//!
//! ## Features
//!
//! - Lecture d'un instantané GeoJSON (parcelles, voirie) et JSON (réglementations, liens)
//! - Projection EPSG:4326 → EPSG:3857
//! - Export GeoJSON des surfaces par programme, export JSON détaillé
//! - Rapport d'exécution avec empreintes blake3 des entrées
//!
//! ## Usage CLI
//!
//! ```bash
//! gfa-estimate estimate --parcels parcels.geojson --roads roads.geojson \
//!     --regulations regulations.json --links links.json --output ./out
//!
//! # Configuration effective
//! gfa-estimate config --config strict
//! ```

pub mod config;
pub mod export;
pub mod input;
pub mod project;
pub mod report;
pub mod run;

pub use config::Config;
pub use report::{RunReport, RunStatus};
