//! Réglementations d'urbanisme et leur résolution par parcelle
//!
//! Les tables sont chargées une fois puis partagées en lecture seule entre
//! threads. Chaque préoccupation (programme, coefficient d'emprise, reculs,
//! mitoyenneté) est résolue dans son propre sous-module.

pub mod link;
pub mod party_wall;
pub mod plot_ratio;
pub mod programme;
pub mod setback;

use std::collections::HashMap;
use std::fmt;

use geo::MultiPolygon;
use serde::Serialize;

use crate::types::{Programme, RegulationId, RoadCategory, Zone};
use crate::EngineError;

pub use link::{LinkTable, LinkedRegulation, RegulationLink};
pub use setback::SetbackTable;

/// Type de réglementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RegulationKind {
    HeightControlPlan,
    StreetBlockPlan,
    UrbanDesignGuideline,
    LandedHousingArea,
    GoodClassBungalowArea,
    DevelopmentControlPlan,
    RoadCategory,
    CentralArea,
    ConservationArea,
    Monument,
    UrbanDesignArea,
    PlanningBoundary,
}

impl RegulationKind {
    /// Interprète un libellé de type de réglementation
    pub fn parse(label: &str) -> Result<Self, EngineError> {
        let kind = match label.trim() {
            "HeightControlPlan" => Self::HeightControlPlan,
            "StreetBlockPlan" => Self::StreetBlockPlan,
            "UrbanDesignGuideline" => Self::UrbanDesignGuideline,
            "LandedHousingArea" => Self::LandedHousingArea,
            "GoodClassBungalowArea" => Self::GoodClassBungalowArea,
            "DevelopmentControlPlan" => Self::DevelopmentControlPlan,
            "RoadCategory" => Self::RoadCategory,
            "CentralArea" => Self::CentralArea,
            "ConservationArea" => Self::ConservationArea,
            "Monument" => Self::Monument,
            "UrbanDesignArea" => Self::UrbanDesignArea,
            "PlanningBoundary" => Self::PlanningBoundary,
            other => return Err(EngineError::UnknownRegulationKind(other.to_string())),
        };
        Ok(kind)
    }

    /// Zones d'aménagement résidentiel individuel (LHA et GCBA)
    pub fn is_landed_area(self) -> bool {
        matches!(self, Self::LandedHousingArea | Self::GoodClassBungalowArea)
    }
}

impl fmt::Display for RegulationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Plan de contrôle des hauteurs
#[derive(Debug, Clone)]
pub struct HeightControlPlan {
    pub id: RegulationId,
    pub geometry: Option<MultiPolygon>,
    pub storeys: Option<u32>,
    /// Hauteur absolue maximale (m)
    pub abs_height: Option<f64>,
    /// Contrôle de détail (rend l'estimation incertaine)
    pub additional_type: Option<String>,
}

/// Nature d'un recul de plan d'îlot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SetbackKind {
    Front,
    Side,
    Rear,
    PartyWall,
}

impl SetbackKind {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "FrontSetback" | "Front" => Some(Self::Front),
            "SideSetback" | "Side" => Some(Self::Side),
            "RearSetback" | "Rear" => Some(Self::Rear),
            "PartyWall" => Some(Self::PartyWall),
            _ => None,
        }
    }
}

/// Recul d'un plan d'îlot à un niveau donné
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSetback {
    pub kind: SetbackKind,
    /// Niveau (0 = rez-de-chaussée)
    pub level: u32,
    pub distance: f64,
}

/// Plan d'îlot (street block plan)
#[derive(Debug, Clone)]
pub struct StreetBlockPlan {
    pub id: RegulationId,
    pub geometry: Option<MultiPolygon>,
    pub setbacks: Vec<LevelSetback>,
    pub storeys: Option<u32>,
    pub plot_ratio: Option<f64>,
    /// Programmes explicitement autorisés
    pub programmes: Vec<Programme>,
}

impl StreetBlockPlan {
    /// Recul d'une nature donnée à un niveau donné
    pub fn setback_at(&self, kind: SetbackKind, level: u32) -> Option<f64> {
        self.setbacks
            .iter()
            .filter(|s| s.kind == kind && s.level == level)
            .map(|s| s.distance)
            .reduce(f64::max)
    }

    /// Recul en vigueur à un niveau : celui du plus haut niveau défini,
    /// pour cette nature, qui ne dépasse pas `level`
    pub fn setback_up_to(&self, kind: SetbackKind, level: u32) -> Option<f64> {
        let defined = self
            .setbacks
            .iter()
            .filter(|s| s.kind == kind && s.level <= level)
            .map(|s| s.level)
            .max()?;
        self.setback_at(kind, defined)
    }

    /// Plus haut niveau portant un recul
    pub fn max_level(&self) -> Option<u32> {
        self.setbacks.iter().map(|s| s.level).max()
    }

    pub fn requires_party_wall(&self) -> bool {
        self.setbacks.iter().any(|s| s.kind == SetbackKind::PartyWall)
    }
}

/// Ligne directrice de conception urbaine
#[derive(Debug, Clone)]
pub struct UrbanDesignGuideline {
    pub id: RegulationId,
    pub geometry: Option<MultiPolygon>,
    pub storeys: Option<u32>,
    pub setback: Option<f64>,
    pub party_wall: bool,
    pub additional_type: Option<String>,
}

/// Zone d'habitat individuel (LHA) ou de bungalows de standing (GCBA)
#[derive(Debug, Clone)]
pub struct LandedHousingArea {
    pub id: RegulationId,
    pub geometry: Option<MultiPolygon>,
    pub good_class: bool,
    pub storeys: Option<u32>,
    pub programmes: Vec<Programme>,
}

impl LandedHousingArea {
    pub fn kind(&self) -> RegulationKind {
        if self.good_class {
            RegulationKind::GoodClassBungalowArea
        } else {
            RegulationKind::LandedHousingArea
        }
    }
}

/// Condition sur le coefficient d'emprise de la parcelle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotRatioCondition {
    pub value: f64,
    /// `true` : strictement supérieur, `false` : égal
    pub above: bool,
}

impl PlotRatioCondition {
    pub fn matches(&self, ratio: Option<f64>) -> bool {
        match ratio {
            Some(r) if self.above => r > self.value,
            Some(r) => (r - self.value).abs() < 1e-9,
            None => false,
        }
    }
}

/// Conditions d'application d'un plan de contrôle du développement
#[derive(Debug, Clone, Default)]
pub struct DcpConditions {
    /// Zonages visés (vide = aucun)
    pub zones: Vec<Zone>,
    /// Zonages voisins requis (vide = aucune condition)
    pub neighbour_zones: Vec<Zone>,
    /// Zones (LHA ou limites de planification) dont la parcelle doit faire partie
    pub in_area_regs: Vec<RegulationId>,
    /// Appartenance (ou non) au centre-ville
    pub in_central_area: Option<bool>,
    pub fringe: bool,
    pub corner: bool,
    pub abuts_road: bool,
    pub abuts_gcba: bool,
    pub in_gcba: bool,
    pub plot_ratio: Option<PlotRatioCondition>,
}

/// Plan de contrôle du développement (réglementation par type)
#[derive(Debug, Clone)]
pub struct DevelopmentControlPlan {
    pub id: RegulationId,
    pub programme: Programme,
    pub plot_ratio: Option<f64>,
    pub setback: Option<f64>,
    pub storeys: Option<u32>,
    pub site_coverage: Option<f64>,
    /// Catégories routières (identifiants de `RoadCategoryRule`)
    pub road_categories: Vec<RegulationId>,
    pub conditions: DcpConditions,
}

/// Zone tampon imposée le long d'une catégorie de voie
#[derive(Debug, Clone)]
pub struct RoadCategoryRule {
    pub id: RegulationId,
    pub category: RoadCategory,
    pub buffer: f64,
}

/// Réglementation purement surfacique (centre-ville, conservation, monument...)
#[derive(Debug, Clone)]
pub struct AreaRegulation {
    pub id: RegulationId,
    pub kind: RegulationKind,
    pub geometry: Option<MultiPolygon>,
    pub name: Option<String>,
}

/// Tables brutes, une par type de réglementation
#[derive(Debug, Clone, Default)]
pub struct RegulationTables {
    pub height_control: Vec<HeightControlPlan>,
    pub street_blocks: Vec<StreetBlockPlan>,
    pub urban_design: Vec<UrbanDesignGuideline>,
    pub landed_housing: Vec<LandedHousingArea>,
    pub development_control: Vec<DevelopmentControlPlan>,
    pub road_categories: Vec<RoadCategoryRule>,
    pub areas: Vec<AreaRegulation>,
}

/// Référence vers une instance : type + position dans sa table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegulationRef {
    pub kind: RegulationKind,
    pub index: usize,
}

/// Tables indexées par identifiant
#[derive(Debug, Clone, Default)]
pub struct RegulationSet {
    pub tables: RegulationTables,
    by_id: HashMap<RegulationId, RegulationRef>,
}

impl RegulationSet {
    /// Indexe les tables et vérifie les références internes
    pub fn new(tables: RegulationTables) -> Result<Self, EngineError> {
        let mut by_id = HashMap::new();
        {
            let mut insert = |id: &RegulationId, kind: RegulationKind, index: usize| {
                if by_id.insert(id.clone(), RegulationRef { kind, index }).is_some() {
                    return Err(EngineError::DuplicateRegulation(id.clone()));
                }
                Ok(())
            };
            for (i, r) in tables.height_control.iter().enumerate() {
                insert(&r.id, RegulationKind::HeightControlPlan, i)?;
            }
            for (i, r) in tables.street_blocks.iter().enumerate() {
                insert(&r.id, RegulationKind::StreetBlockPlan, i)?;
            }
            for (i, r) in tables.urban_design.iter().enumerate() {
                insert(&r.id, RegulationKind::UrbanDesignGuideline, i)?;
            }
            for (i, r) in tables.landed_housing.iter().enumerate() {
                insert(&r.id, r.kind(), i)?;
            }
            for (i, r) in tables.development_control.iter().enumerate() {
                insert(&r.id, RegulationKind::DevelopmentControlPlan, i)?;
            }
            for (i, r) in tables.road_categories.iter().enumerate() {
                insert(&r.id, RegulationKind::RoadCategory, i)?;
            }
            for (i, r) in tables.areas.iter().enumerate() {
                insert(&r.id, r.kind, i)?;
            }
        }

        for dcp in &tables.development_control {
            for road_reg in &dcp.road_categories {
                match by_id.get(road_reg) {
                    Some(r) if r.kind == RegulationKind::RoadCategory => {}
                    _ => return Err(EngineError::UnknownRegulation(road_reg.clone())),
                }
            }
        }

        Ok(Self { tables, by_id })
    }

    pub fn lookup(&self, id: &str) -> Option<RegulationRef> {
        self.by_id.get(id).copied()
    }

    /// Identifiant d'une instance
    pub fn id_of(&self, r: RegulationRef) -> &str {
        let t = &self.tables;
        match r.kind {
            RegulationKind::HeightControlPlan => &t.height_control[r.index].id,
            RegulationKind::StreetBlockPlan => &t.street_blocks[r.index].id,
            RegulationKind::UrbanDesignGuideline => &t.urban_design[r.index].id,
            RegulationKind::LandedHousingArea | RegulationKind::GoodClassBungalowArea => {
                &t.landed_housing[r.index].id
            }
            RegulationKind::DevelopmentControlPlan => &t.development_control[r.index].id,
            RegulationKind::RoadCategory => &t.road_categories[r.index].id,
            _ => &t.areas[r.index].id,
        }
    }

    /// Géométrie d'une instance surfacique
    pub fn geometry_of(&self, r: RegulationRef) -> Option<&MultiPolygon> {
        let t = &self.tables;
        match r.kind {
            RegulationKind::HeightControlPlan => t.height_control[r.index].geometry.as_ref(),
            RegulationKind::StreetBlockPlan => t.street_blocks[r.index].geometry.as_ref(),
            RegulationKind::UrbanDesignGuideline => t.urban_design[r.index].geometry.as_ref(),
            RegulationKind::LandedHousingArea | RegulationKind::GoodClassBungalowArea => {
                t.landed_housing[r.index].geometry.as_ref()
            }
            RegulationKind::DevelopmentControlPlan | RegulationKind::RoadCategory => None,
            _ => t.areas[r.index].geometry.as_ref(),
        }
    }

    /// Toutes les instances surfaciques munies d'une géométrie
    pub fn area_regulations(&self) -> Vec<RegulationRef> {
        let mut refs: Vec<RegulationRef> = self
            .by_id
            .values()
            .copied()
            .filter(|r| self.geometry_of(*r).is_some())
            .collect();
        refs.sort_unstable();
        refs
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dcp(id: &str, road_categories: Vec<&str>) -> DevelopmentControlPlan {
        DevelopmentControlPlan {
            id: id.to_string(),
            programme: Programme::Flat,
            plot_ratio: Some(2.8),
            setback: Some(5.0),
            storeys: Some(12),
            site_coverage: Some(0.4),
            road_categories: road_categories.into_iter().map(String::from).collect(),
            conditions: DcpConditions::default(),
        }
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let tables = RegulationTables {
            development_control: vec![dcp("R1", vec![]), dcp("R1", vec![])],
            ..Default::default()
        };
        assert!(matches!(
            RegulationSet::new(tables),
            Err(EngineError::DuplicateRegulation(_))
        ));
    }

    #[test]
    fn test_rejects_dangling_road_category() {
        let tables = RegulationTables {
            development_control: vec![dcp("R1", vec!["missing"])],
            ..Default::default()
        };
        assert!(matches!(
            RegulationSet::new(tables),
            Err(EngineError::UnknownRegulation(_))
        ));
    }

    #[test]
    fn test_lookup_landed_kinds() {
        let tables = RegulationTables {
            landed_housing: vec![
                LandedHousingArea {
                    id: "LHA".to_string(),
                    geometry: None,
                    good_class: false,
                    storeys: Some(3),
                    programmes: vec![],
                },
                LandedHousingArea {
                    id: "GCBA".to_string(),
                    geometry: None,
                    good_class: true,
                    storeys: Some(2),
                    programmes: vec![],
                },
            ],
            ..Default::default()
        };
        let set = RegulationSet::new(tables).unwrap();
        assert_eq!(
            set.lookup("GCBA").unwrap().kind,
            RegulationKind::GoodClassBungalowArea
        );
        assert_eq!(set.id_of(set.lookup("LHA").unwrap()), "LHA");
    }

    #[test]
    fn test_street_block_levels() {
        let sbp = StreetBlockPlan {
            id: "S".to_string(),
            geometry: None,
            setbacks: vec![
                LevelSetback { kind: SetbackKind::Front, level: 1, distance: 7.5 },
                LevelSetback { kind: SetbackKind::Front, level: 0, distance: 3.0 },
                LevelSetback { kind: SetbackKind::Side, level: 0, distance: 2.0 },
            ],
            storeys: Some(5),
            plot_ratio: None,
            programmes: vec![],
        };
        assert_eq!(sbp.max_level(), Some(1));
        assert_eq!(sbp.setback_at(SetbackKind::Front, 1), Some(7.5));
        assert_eq!(sbp.setback_at(SetbackKind::Rear, 0), None);
        assert_eq!(sbp.setback_at(SetbackKind::Side, 1), None);
        assert_eq!(sbp.setback_up_to(SetbackKind::Side, 1), Some(2.0));
        assert_eq!(sbp.setback_up_to(SetbackKind::Front, 4), Some(7.5));
        assert_eq!(sbp.setback_up_to(SetbackKind::Rear, 4), None);
        assert!(!sbp.requires_party_wall());
    }

    #[test]
    fn test_plot_ratio_condition() {
        let above = PlotRatioCondition { value: 1.4, above: true };
        assert!(above.matches(Some(2.1)));
        assert!(!above.matches(Some(1.4)));
        assert!(!above.matches(None));
        let equal = PlotRatioCondition { value: 1.4, above: false };
        assert!(equal.matches(Some(1.4)));
    }
}
