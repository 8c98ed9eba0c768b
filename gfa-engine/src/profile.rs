//! Profil réglementaire d'une parcelle
//!
//! Faits calculés une fois les liens spatiaux et explicites établis :
//! appartenance aux zones, programmes admissibles, coefficient d'emprise
//! effectif, plafonds d'étages et drapeau de mitoyenneté.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::classify::Classification;
use crate::config::Thresholds;
use crate::regulation::link::DcpFacts;
use crate::regulation::party_wall::is_party_wall_parcel;
use crate::regulation::plot_ratio::{resolve_plot_ratio, PlotRatioOutcome};
use crate::regulation::programme::{allowed_programmes, EligibilityInput};
use crate::regulation::{LinkTable, RegulationKind, RegulationSet};
use crate::topology::Cadastre;
use crate::types::Programme;

/// Faits réglementaires d'une parcelle
#[derive(Debug, Clone, Serialize)]
pub struct ParcelProfile {
    pub in_central_area: bool,
    pub in_landed_area: bool,
    pub in_gcba: bool,
    pub abuts_gcba: bool,
    pub abuts_listed_road: bool,
    pub allowed_programmes: Vec<Programme>,
    pub plot_ratio: PlotRatioOutcome,
    /// Plafond d'étages des LHA / GCBA rattachées
    pub landed_storeys: Option<u32>,
    /// Plafond d'étages des plans d'îlot rattachés
    pub street_block_storeys: Option<u32>,
    pub party_wall: bool,
}

/// Programmes listés par les réglementations d'un type, sans doublon
fn listed_programmes(links: &LinkTable, set: &RegulationSet, idx: usize, kind: RegulationKind) -> Vec<Programme> {
    let programmes: BTreeSet<Programme> = match kind {
        RegulationKind::StreetBlockPlan => links
            .indices(idx, kind)
            .into_iter()
            .flat_map(|i| set.tables.street_blocks[i].programmes.iter().copied())
            .collect(),
        _ => links
            .indices(idx, kind)
            .into_iter()
            .flat_map(|i| set.tables.landed_housing[i].programmes.iter().copied())
            .collect(),
    };
    programmes.into_iter().collect()
}

/// Construit le profil d'une parcelle classée
pub fn build_profile(
    cadastre: &Cadastre,
    idx: usize,
    classification: &Classification,
    links: &LinkTable,
    set: &RegulationSet,
    thresholds: &Thresholds,
) -> ParcelProfile {
    let parcel = cadastre.get(idx);

    let in_central_area = links.has(idx, RegulationKind::CentralArea);
    let in_landed_area = links.has(idx, RegulationKind::LandedHousingArea);
    let in_gcba = links.has(idx, RegulationKind::GoodClassBungalowArea);
    let abuts_gcba = parcel
        .neighbours
        .iter()
        .any(|&n| links.has(n, RegulationKind::GoodClassBungalowArea));
    let abuts_listed_road = classification
        .neighbour_road_types
        .iter()
        .any(|t| thresholds.abutting_road_types.contains(t));

    let lha_programmes = listed_programmes(links, set, idx, RegulationKind::LandedHousingArea);
    let sbp_programmes = listed_programmes(links, set, idx, RegulationKind::StreetBlockPlan);

    let allowed = allowed_programmes(&EligibilityInput {
        zone: &parcel.zone,
        area: parcel.area,
        width: classification.avg_width,
        depth: classification.avg_depth,
        corner: classification.corner,
        fringe: classification.fringe,
        in_lha: !lha_programmes.is_empty(),
        in_gcba,
        lha_programmes: &lha_programmes,
        sbp_programmes: &sbp_programmes,
        abuts_listed_road,
    });

    let landed_storeys = links
        .of(idx)
        .filter(|r| r.kind.is_landed_area())
        .filter_map(|r| set.tables.landed_housing[r.index].storeys)
        .min();
    let street_block_storeys = links
        .indices(idx, RegulationKind::StreetBlockPlan)
        .into_iter()
        .filter_map(|i| set.tables.street_blocks[i].storeys)
        .min();

    let party_wall = is_party_wall_parcel(links, set, idx, &allowed);

    ParcelProfile {
        in_central_area,
        in_landed_area,
        in_gcba,
        abuts_gcba,
        abuts_listed_road,
        allowed_programmes: allowed,
        plot_ratio: resolve_plot_ratio(cadastre, links, set, idx),
        landed_storeys,
        street_block_storeys,
        party_wall,
    }
}

impl ParcelProfile {
    /// Faits soumis aux conditions des plans de contrôle du développement
    pub fn dcp_facts<'a>(
        &'a self,
        cadastre: &'a Cadastre,
        idx: usize,
        classification: &'a Classification,
        links: &LinkTable,
        set: &'a RegulationSet,
    ) -> DcpFacts<'a> {
        let area_regs = links
            .of(idx)
            .filter(|r| r.kind.is_landed_area() || r.kind == RegulationKind::PlanningBoundary)
            .map(|r| set.id_of(r))
            .collect();
        DcpFacts {
            zone: &cadastre.get(idx).zone,
            allowed: &self.allowed_programmes,
            plot_ratio: self.plot_ratio.plot_ratio,
            in_central_area: self.in_central_area,
            area_regs,
            fringe: classification.fringe,
            corner: classification.corner,
            abuts_listed_road: self.abuts_listed_road,
            abuts_gcba: self.abuts_gcba,
            in_gcba: self.in_gcba,
            neighbour_zones: &classification.neighbour_zones,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_all;
    use crate::geometry::to_multi;
    use crate::regulation::link::link_spatial;
    use crate::regulation::{LandedHousingArea, RegulationTables};
    use crate::types::{ParcelRecord, Zone};
    use geo::{polygon, Geometry, Polygon};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]
    }

    fn record(id: &str, polygon: Polygon, zone: Zone) -> ParcelRecord {
        ParcelRecord {
            id: id.to_string(),
            geometry: Geometry::Polygon(polygon),
            zone,
            plot_ratio: Some(1.4),
        }
    }

    #[test]
    fn test_profile_of_house_in_gcba() {
        let thresholds = Thresholds::default();
        let records = vec![
            record("road", rect(-10.0, -10.0, 80.0, 0.0), Zone::Road),
            record("big", rect(0.0, 0.0, 40.0, 50.0), Zone::Residential),
            record("next", rect(40.0, 0.0, 60.0, 50.0), Zone::Residential),
        ];
        let (cadastre, _) = Cadastre::build(records, &[], &thresholds);
        let (classifications, _) = classify_all(&cadastre, &thresholds);
        let set = RegulationSet::new(RegulationTables {
            landed_housing: vec![LandedHousingArea {
                id: "GCBA".to_string(),
                geometry: Some(to_multi(&rect(0.0, 0.0, 40.0, 50.0))),
                good_class: true,
                storeys: Some(2),
                programmes: vec![Programme::GoodClassBungalow],
            }],
            ..Default::default()
        })
        .unwrap();
        let links = link_spatial(&cadastre, &set, &thresholds.link_accuracy);

        let big = cadastre.position("big").unwrap();
        let c = classifications[big].as_ref().unwrap();
        let profile = build_profile(&cadastre, big, c, &links, &set, &thresholds);
        assert!(profile.in_gcba);
        assert!(!profile.in_landed_area);
        assert_eq!(profile.landed_storeys, Some(2));
        assert_eq!(profile.allowed_programmes, vec![Programme::GoodClassBungalow]);
        assert!(!profile.party_wall);

        let next = cadastre.position("next").unwrap();
        let c = classifications[next].as_ref().unwrap();
        let profile = build_profile(&cadastre, next, c, &links, &set, &thresholds);
        assert!(profile.abuts_gcba);
        assert!(!profile.in_gcba);
        // 1000 m², 20 m de large : maisons mitoyennes admissibles
        assert!(profile.party_wall);

        let facts = profile.dcp_facts(&cadastre, next, c, &links, &set);
        assert!(facts.abuts_gcba);
        assert!(facts.area_regs.is_empty());
    }
}
