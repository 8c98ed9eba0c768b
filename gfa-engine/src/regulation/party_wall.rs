//! Murs mitoyens
//!
//! Deux passes : le drapeau de mitoyenneté de chaque parcelle est calculé
//! pour tout le lot, puis les arêtes mitoyennes d'une parcelle sont celles
//! qui regardent une voisine elle-même mitoyenne.

use crate::classify::Classification;
use crate::topology::Cadastre;
use crate::types::{EdgeRole, Programme};

use super::{LinkTable, RegulationKind, RegulationSet};

/// Vrai si la parcelle admet des murs mitoyens
pub fn is_party_wall_parcel(
    links: &LinkTable,
    set: &RegulationSet,
    idx: usize,
    allowed: &[Programme],
) -> bool {
    let street_block = links
        .indices(idx, RegulationKind::StreetBlockPlan)
        .into_iter()
        .any(|i| set.tables.street_blocks[i].requires_party_wall());
    let design_guideline = links
        .indices(idx, RegulationKind::UrbanDesignGuideline)
        .into_iter()
        .any(|i| set.tables.urban_design[i].party_wall);
    street_block || design_guideline || allowed.iter().any(|p| p.is_attached())
}

/// Arêtes dont la sonde recouvre majoritairement une voisine mitoyenne,
/// arêtes arrière exclues.
pub fn party_wall_edges(
    cadastre: &Cadastre,
    idx: usize,
    classification: &Classification,
    party_wall_flags: &[bool],
    min_overlap_ratio: f64,
) -> Vec<usize> {
    let parcel = cadastre.get(idx);
    let walls: Vec<_> = parcel
        .neighbours
        .iter()
        .filter(|&&n| party_wall_flags[n])
        .map(|&n| cadastre.get(n).multi())
        .collect();
    if walls.is_empty() {
        return Vec::new();
    }

    classification
        .probes
        .iter()
        .enumerate()
        .filter(|(i, _)| classification.edge_roles[*i] != Some(EdgeRole::Rear))
        .filter_map(|(i, probe)| probe.as_ref().map(|p| (i, p)))
        .filter(|(_, probe)| {
            walls
                .iter()
                .any(|wall| probe.overlap_ratio(wall) > min_overlap_ratio)
        })
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify_parcel, ResidentialMass};
    use crate::config::Thresholds;
    use crate::regulation::{RegulationTables, UrbanDesignGuideline};
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
            plot_ratio: None,
        }
    }

    #[test]
    fn test_party_wall_flag_sources() {
        let tables = RegulationTables {
            urban_design: vec![UrbanDesignGuideline {
                id: "UDG".to_string(),
                geometry: None,
                storeys: None,
                setback: None,
                party_wall: true,
                additional_type: None,
            }],
            ..Default::default()
        };
        let set = RegulationSet::new(tables).unwrap();
        let mut links = LinkTable::new(2);
        links.insert(0, set.lookup("UDG").unwrap());

        assert!(is_party_wall_parcel(&links, &set, 0, &[]));
        assert!(!is_party_wall_parcel(&links, &set, 1, &[Programme::Bungalow]));
        assert!(is_party_wall_parcel(&links, &set, 1, &[Programme::TerraceType2]));
    }

    #[test]
    fn test_edges_facing_party_wall_neighbours() {
        let thresholds = Thresholds::default();
        let records = vec![
            record("road", rect(-10.0, -10.0, 70.0, 0.0), Zone::Road),
            record("west", rect(0.0, 0.0, 20.0, 30.0), Zone::Residential),
            record("middle", rect(20.0, 0.0, 40.0, 30.0), Zone::Residential),
            record("east", rect(40.0, 0.0, 60.0, 30.0), Zone::Residential),
        ];
        let (cadastre, _) = Cadastre::build(records, &[], &thresholds);
        let mass = ResidentialMass::build(&cadastre, &thresholds);
        let middle = cadastre.position("middle").unwrap();
        let (classification, _) = classify_parcel(&cadastre, middle, &mass, &thresholds);

        let mut flags = vec![false; cadastre.len()];
        flags[cadastre.position("west").unwrap()] = true;
        let edges = party_wall_edges(&cadastre, middle, &classification, &flags, 0.5);
        assert_eq!(edges.len(), 1);
        let edge = cadastre.get(middle).edges[edges[0]];
        assert!((edge.start.x - 20.0).abs() < 1e-6 && (edge.end.x - 20.0).abs() < 1e-6);

        flags[cadastre.position("east").unwrap()] = true;
        let edges = party_wall_edges(&cadastre, middle, &classification, &flags, 0.5);
        assert_eq!(edges.len(), 2);
    }
}
