//! # gfa-engine
//!
//! Estimation de la surface de plancher constructible (GFA) de chaque parcelle
//! d'un cadastre, sous un ensemble hétérogène de réglementations d'urbanisme.
//!
//! ## Étapes
//!
//! - Topologie : nettoyage des polygones, voisinage symétrique, arêtes
//! - Classification : façade, arrière, côtés, angle, lisière, catégories routières
//! - Réglementations : liens, programmes admissibles, coefficient d'emprise, reculs
//! - Enveloppe : parties de parcelle, étages, emprises par niveau
//! - Agrégation : surface de plancher par programme (ou inconnue)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gfa_engine::{estimate, EngineInput, Thresholds};
//!
//! let input = EngineInput {
//!     parcels,
//!     roads,
//!     regulations,
//!     links,
//! };
//! let estimation = estimate(input, &Thresholds::default())?;
//! for parcel in &estimation.estimates {
//!     println!("{}: {:?}", parcel.parcel_id, parcel.max_gfa());
//! }
//! ```

pub mod audit;
pub mod classify;
pub mod config;
pub mod envelope;
pub mod error;
pub mod geometry;
pub mod gfa;
pub mod index;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod regulation;
pub mod topology;
pub mod types;

pub use audit::{Audit, Issue, IssueLevel, Stage};
pub use config::{LinkAccuracy, Thresholds};
pub use error::EngineError;
pub use pipeline::{estimate, EngineInput, Estimation, EstimateStatus, ParcelEstimate, ProgrammeEstimate, RunStats};
pub use regulation::{RegulationKind, RegulationLink, RegulationSet, RegulationTables};
pub use types::{Gfa, ParcelId, ParcelRecord, Programme, RegulationId, RoadCategory, RoadRecord, RoadType, StoreyLimit, Zone};
