//! Seuils numériques de l'estimation
//!
//! Toutes les tolérances géométriques et les ratios de recouvrement sont
//! regroupés ici. Les valeurs par défaut sont exprimées en mètres (CRS métrique).

use serde::{Deserialize, Serialize};

use crate::types::RoadType;
use crate::EngineError;

/// Seuils de l'estimation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    /// Tolérance de simplification des anneaux extérieurs
    pub simplify_tolerance: f64,

    /// Surface minimale d'une parcelle (m²)
    pub min_parcel_area: f64,

    /// Tampon du test de voisinage
    pub neighbour_buffer: f64,

    /// Surface d'intersection minimale entre voisins (m²)
    pub neighbour_min_overlap: f64,

    /// Largeur de la bande posée sur chaque côté du rectangle englobant
    pub mbr_edge_band: f64,

    /// Ratio de couverture routière d'un côté pour le test d'angle
    pub corner_ratio: f64,

    /// Tampon de fusion de la masse résidentielle
    pub fringe_buffer: f64,

    /// Trous de la masse résidentielle inférieurs à cette surface supprimés (m²)
    pub fringe_hole_area: f64,

    /// Tampon appliqué à la parcelle pour le test de lisière
    pub fringe_test_buffer: f64,

    /// Largeur de la sonde extérieure posée sur chaque arête
    pub edge_probe_width: f64,

    /// Ratio de recouvrement sonde / route pour une arête de catégorie
    pub road_overlap_ratio: f64,

    /// Ratio de recouvrement sonde / voisin pour une arête mitoyenne
    pub party_wall_overlap_ratio: f64,

    /// Ratio de recouvrement sonde / ligne directrice urbaine
    pub udg_overlap_ratio: f64,

    /// Tampon appliqué au réseau routier pour typer les parcelles de voirie
    pub road_network_buffer: f64,

    /// Part résiduelle (non couverte) au-delà de laquelle une partie libre est créée
    pub remaining_part_ratio: f64,

    /// Largeur de l'ouverture morphologique des parties résiduelles
    pub part_cleaning_width: f64,

    /// Hauteur d'étage en zone résidentielle
    pub residential_storey_height: f64,

    /// Hauteur d'étage hors zone résidentielle
    pub other_storey_height: f64,

    /// Plafond de sécurité sur le nombre d'étages
    pub storey_ceiling: u32,

    /// Intervalle des logs de progression (parcelles)
    pub progress_every: usize,

    /// Types de voie ouvrant droit aux conditions « borde une route »
    pub abutting_road_types: Vec<RoadType>,

    /// Précisions de rattachement spatial
    pub link_accuracy: LinkAccuracy,
}

/// Ratio minimal (surface d'intersection / surface de parcelle) pour
/// rattacher une réglementation surfacique à une parcelle
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkAccuracy {
    pub height_control: f64,
    pub landed_housing: f64,
    pub urban_design: f64,
    pub street_block: f64,
    pub central_area: f64,
    pub urban_design_area: f64,
    pub conservation: f64,
    pub monument: f64,
}

impl Default for LinkAccuracy {
    fn default() -> Self {
        Self {
            height_control: 0.01,
            landed_housing: 0.01,
            urban_design: 0.01,
            street_block: 0.4,
            central_area: 0.4,
            urban_design_area: 0.4,
            conservation: 0.4,
            monument: 0.005,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            simplify_tolerance: 0.1,
            min_parcel_area: 50.0,
            neighbour_buffer: 2.0,
            neighbour_min_overlap: 1.0,
            mbr_edge_band: 3.0,
            corner_ratio: 0.3,
            fringe_buffer: 200.0,
            fringe_hole_area: 120_000.0,
            fringe_test_buffer: 10.0,
            edge_probe_width: 1.0,
            road_overlap_ratio: 0.2,
            party_wall_overlap_ratio: 0.5,
            udg_overlap_ratio: 0.5,
            road_network_buffer: 5.0,
            remaining_part_ratio: 0.1,
            part_cleaning_width: 1.0,
            residential_storey_height: 3.6,
            other_storey_height: 5.0,
            storey_ceiling: 60,
            progress_every: 1000,
            abutting_road_types: vec![
                RoadType::MajorMinorArterial,
                RoadType::LocalCollectorPrimaryAccess,
            ],
            link_accuracy: LinkAccuracy::default(),
        }
    }
}

impl Thresholds {
    /// Vérifie la cohérence des seuils avant un lot
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = [
            ("simplify_tolerance", self.simplify_tolerance),
            ("neighbour_buffer", self.neighbour_buffer),
            ("mbr_edge_band", self.mbr_edge_band),
            ("fringe_buffer", self.fringe_buffer),
            ("fringe_test_buffer", self.fringe_test_buffer),
            ("edge_probe_width", self.edge_probe_width),
            ("road_network_buffer", self.road_network_buffer),
            ("residential_storey_height", self.residential_storey_height),
            ("other_storey_height", self.other_storey_height),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::invalid_config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        let ratios = [
            ("corner_ratio", self.corner_ratio),
            ("road_overlap_ratio", self.road_overlap_ratio),
            ("party_wall_overlap_ratio", self.party_wall_overlap_ratio),
            ("udg_overlap_ratio", self.udg_overlap_ratio),
            ("remaining_part_ratio", self.remaining_part_ratio),
            ("link_accuracy.height_control", self.link_accuracy.height_control),
            ("link_accuracy.landed_housing", self.link_accuracy.landed_housing),
            ("link_accuracy.urban_design", self.link_accuracy.urban_design),
            ("link_accuracy.street_block", self.link_accuracy.street_block),
            ("link_accuracy.central_area", self.link_accuracy.central_area),
            ("link_accuracy.urban_design_area", self.link_accuracy.urban_design_area),
            ("link_accuracy.conservation", self.link_accuracy.conservation),
            ("link_accuracy.monument", self.link_accuracy.monument),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.storey_ceiling == 0 {
            return Err(EngineError::invalid_config("storey_ceiling must be at least 1"));
        }
        if self.progress_every == 0 {
            return Err(EngineError::invalid_config("progress_every must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_valid() {
        let thresholds = Thresholds::default();
        assert!(thresholds.validate().is_ok());
        assert_eq!(thresholds.min_parcel_area, 50.0);
        assert_eq!(thresholds.link_accuracy.monument, 0.005);
    }

    #[test]
    fn test_rejects_out_of_range_ratio() {
        let thresholds = Thresholds {
            corner_ratio: 1.5,
            ..Thresholds::default()
        };
        let err = thresholds.validate().unwrap_err();
        assert!(err.to_string().contains("corner_ratio"));
    }

    #[test]
    fn test_rejects_zero_storey_ceiling() {
        let thresholds = Thresholds {
            storey_ceiling: 0,
            ..Thresholds::default()
        };
        assert!(thresholds.validate().is_err());
    }
}
