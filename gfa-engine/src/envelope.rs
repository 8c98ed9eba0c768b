//! Enveloppe constructible : parties de parcelle, étages et emprises
//!
//! Une parcelle est découpée selon les réglementations de hauteur
//! (lignes directrices de conception en priorité, sinon plans de contrôle des
//! hauteurs). Les parties sont attribuées par limite d'étages croissante : une
//! surface couverte par deux réglementations reçoit la plus restrictive.

use geo::{Area, BooleanOps, MultiPolygon};
use serde::Serialize;

use crate::config::Thresholds;
use crate::geometry::{opening, setback_footprint, EPSILON};
use crate::regulation::{LinkTable, RegulationKind, RegulationSet, SetbackTable};
use crate::topology::Parcel;
use crate::types::{RegulationId, StoreyLimit};

/// Origine d'une partie
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "regulation", rename_all = "snake_case")]
pub enum PartSource {
    /// Parcelle entière, sans réglementation de hauteur
    Parcel,
    DesignGuideline(RegulationId),
    HeightControl(RegulationId),
    /// Reste non couvert, sans limite propre
    Remainder,
}

/// Partie de parcelle et sa limite d'étages propre
#[derive(Debug, Clone)]
pub struct Part {
    pub shape: MultiPolygon,
    pub area: f64,
    pub storeys: StoreyLimit,
    pub source: PartSource,
}

struct HeightRule<'a> {
    id: &'a str,
    geometry: Option<&'a MultiPolygon>,
    storeys: StoreyLimit,
    design: bool,
}

fn height_rules<'a>(
    parcel: &Parcel,
    links: &LinkTable,
    set: &'a RegulationSet,
    idx: usize,
    thresholds: &Thresholds,
) -> Vec<HeightRule<'a>> {
    let design: Vec<HeightRule<'a>> = links
        .indices(idx, RegulationKind::UrbanDesignGuideline)
        .into_iter()
        .map(|i| &set.tables.urban_design[i])
        .filter_map(|g| {
            Some(HeightRule {
                id: &g.id,
                geometry: g.geometry.as_ref(),
                storeys: StoreyLimit::Finite(g.storeys?),
                design: true,
            })
        })
        .collect();
    if !design.is_empty() {
        return design;
    }

    let storey_height = parcel.zone.storey_height(
        thresholds.residential_storey_height,
        thresholds.other_storey_height,
    );
    links
        .indices(idx, RegulationKind::HeightControlPlan)
        .into_iter()
        .map(|i| &set.tables.height_control[i])
        .filter_map(|h| {
            let by_storeys = h.storeys.map(StoreyLimit::Finite);
            let by_height = h
                .abs_height
                .map(|height| StoreyLimit::from_height(height, storey_height));
            let storeys = match (by_storeys, by_height) {
                (Some(a), Some(b)) => a.min(b),
                (a, b) => a.or(b)?,
            };
            Some(HeightRule {
                id: &h.id,
                geometry: h.geometry.as_ref(),
                storeys,
                design: false,
            })
        })
        .collect()
}

/// Découpe une parcelle en parties homogènes en hauteur
pub fn subdivide(
    parcel: &Parcel,
    links: &LinkTable,
    set: &RegulationSet,
    idx: usize,
    thresholds: &Thresholds,
) -> Vec<Part> {
    let whole = parcel.multi();
    let mut rules = height_rules(parcel, links, set, idx, thresholds);
    if rules.is_empty() {
        return vec![Part {
            shape: whole,
            area: parcel.area,
            storeys: StoreyLimit::Unconstrained,
            source: PartSource::Parcel,
        }];
    }
    rules.sort_by(|a, b| a.storeys.cmp(&b.storeys).then(a.id.cmp(b.id)));

    let mut parts = Vec::new();
    let mut remaining = whole.clone();
    for rule in rules {
        if remaining.unsigned_area() <= EPSILON {
            break;
        }
        let shape = match rule.geometry {
            Some(geometry) => remaining.intersection(geometry),
            None => remaining.clone(),
        };
        let area = shape.unsigned_area();
        if area <= EPSILON {
            continue;
        }
        remaining = remaining.difference(&shape);
        let source = if rule.design {
            PartSource::DesignGuideline(rule.id.to_string())
        } else {
            PartSource::HeightControl(rule.id.to_string())
        };
        parts.push(Part {
            shape,
            area,
            storeys: rule.storeys,
            source,
        });
    }

    if remaining.unsigned_area() > thresholds.remaining_part_ratio * parcel.area {
        let cleaned = opening(&remaining, thresholds.part_cleaning_width);
        let area = cleaned.unsigned_area();
        if area > EPSILON {
            parts.push(Part {
                shape: cleaned,
                area,
                storeys: StoreyLimit::Unconstrained,
                source: PartSource::Remainder,
            });
        }
    }
    parts
}

/// Limite d'étages d'une partie après application des plafonds de la parcelle
/// et du programme, bornée par le plafond global.
pub fn effective_storeys(part: &Part, caps: &[Option<u32>], ceiling: u32) -> StoreyLimit {
    let limit = caps
        .iter()
        .flatten()
        .map(|&n| StoreyLimit::Finite(n))
        .fold(part.storeys, StoreyLimit::min);
    match limit {
        StoreyLimit::Finite(n) => StoreyLimit::Finite(n.min(ceiling)),
        StoreyLimit::Unconstrained => StoreyLimit::Unconstrained,
    }
}

/// Emprises constructibles, une par niveau de la table de reculs
pub fn footprints(parcel: &Parcel, table: &SetbackTable) -> Vec<MultiPolygon> {
    table
        .levels
        .iter()
        .map(|setbacks| setback_footprint(&parcel.polygon, &parcel.edges, setbacks))
        .collect()
}

/// Surfaces d'emprise par niveau, restreintes à une partie.
///
/// Une parcelle d'une seule partie utilise directement les emprises.
pub fn part_footprint_areas(part: &Part, footprints: &[MultiPolygon], single_part: bool) -> Vec<f64> {
    footprints
        .iter()
        .map(|footprint| {
            if single_part {
                footprint.unsigned_area()
            } else if footprint.0.is_empty() {
                0.0
            } else {
                footprint.intersection(&part.shape).unsigned_area()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::square;
    use crate::geometry::to_multi;
    use crate::regulation::{HeightControlPlan, RegulationTables, UrbanDesignGuideline};
    use crate::topology::Cadastre;
    use crate::types::{ParcelRecord, Programme, Zone};
    use geo::{polygon, Geometry};

    fn parcel_cadastre() -> Cadastre {
        let records = vec![ParcelRecord {
            id: "P".to_string(),
            geometry: Geometry::Polygon(square(0.0, 0.0, 20.0)),
            zone: Zone::Residential,
            plot_ratio: None,
        }];
        Cadastre::build(records, &[], &Thresholds::default()).0
    }

    fn hcp(id: &str, x0: f64, x1: f64, storeys: Option<u32>, abs_height: Option<f64>) -> HeightControlPlan {
        HeightControlPlan {
            id: id.to_string(),
            geometry: Some(to_multi(&polygon![
                (x: x0, y: -5.0),
                (x: x1, y: -5.0),
                (x: x1, y: 25.0),
                (x: x0, y: 25.0),
            ])),
            storeys,
            abs_height,
            additional_type: None,
        }
    }

    fn linked(tables: RegulationTables) -> (RegulationSet, LinkTable) {
        let set = RegulationSet::new(tables).unwrap();
        let mut links = LinkTable::new(1);
        for r in set.area_regulations() {
            links.insert(0, r);
        }
        (set, links)
    }

    #[test]
    fn test_no_height_regulation_gives_single_part() {
        let cadastre = parcel_cadastre();
        let (set, links) = linked(RegulationTables::default());
        let parts = subdivide(cadastre.get(0), &links, &set, 0, &Thresholds::default());
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].source, PartSource::Parcel);
        assert!(parts[0].storeys.is_unconstrained());
    }

    #[test]
    fn test_overlap_goes_to_the_lowest_limit() {
        let cadastre = parcel_cadastre();
        let (set, links) = linked(RegulationTables {
            height_control: vec![
                hcp("high", -5.0, 15.0, Some(12), None),
                // 20 m / 3.6 m → 5 étages
                hcp("low", 10.0, 25.0, None, Some(20.0)),
            ],
            ..Default::default()
        });
        let parts = subdivide(cadastre.get(0), &links, &set, 0, &Thresholds::default());
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].storeys, StoreyLimit::Finite(5));
        assert!((parts[0].area - 200.0).abs() < 1e-6);
        assert_eq!(parts[1].storeys, StoreyLimit::Finite(12));
        assert!((parts[1].area - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_large_remainder_becomes_unconstrained_part() {
        let cadastre = parcel_cadastre();
        let (set, links) = linked(RegulationTables {
            height_control: vec![hcp("west", -5.0, 8.0, Some(4), None)],
            ..Default::default()
        });
        let parts = subdivide(cadastre.get(0), &links, &set, 0, &Thresholds::default());
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].source, PartSource::Remainder);
        assert!(parts[1].storeys.is_unconstrained());
    }

    #[test]
    fn test_small_remainder_is_dropped() {
        let cadastre = parcel_cadastre();
        let (set, links) = linked(RegulationTables {
            height_control: vec![hcp("most", -5.0, 19.0, Some(4), None)],
            ..Default::default()
        });
        let parts = subdivide(cadastre.get(0), &links, &set, 0, &Thresholds::default());
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_design_guideline_takes_precedence() {
        let cadastre = parcel_cadastre();
        let (set, mut links) = linked(RegulationTables {
            height_control: vec![hcp("hcp", -5.0, 25.0, Some(2), None)],
            urban_design: vec![UrbanDesignGuideline {
                id: "udg".to_string(),
                geometry: None,
                storeys: Some(8),
                setback: None,
                party_wall: false,
                additional_type: None,
            }],
            ..Default::default()
        });
        links.insert(0, set.lookup("udg").unwrap());
        let parts = subdivide(cadastre.get(0), &links, &set, 0, &Thresholds::default());
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].storeys, StoreyLimit::Finite(8));
        assert_eq!(parts[0].source, PartSource::DesignGuideline("udg".to_string()));
    }

    #[test]
    fn test_effective_storeys() {
        let part = Part {
            shape: MultiPolygon::new(vec![]),
            area: 0.0,
            storeys: StoreyLimit::Unconstrained,
            source: PartSource::Parcel,
        };
        assert!(effective_storeys(&part, &[None, None], 60).is_unconstrained());
        assert_eq!(
            effective_storeys(&part, &[Some(5), None, Some(3)], 60),
            StoreyLimit::Finite(3)
        );
        assert_eq!(effective_storeys(&part, &[Some(99)], 60), StoreyLimit::Finite(60));
    }

    #[test]
    fn test_footprints_per_level() {
        let cadastre = parcel_cadastre();
        let parcel = cadastre.get(0);
        let table = SetbackTable {
            programme: Programme::Flat,
            levels: vec![vec![0.0; 4], vec![2.0; 4]],
        };
        let prints = footprints(parcel, &table);
        assert_eq!(prints.len(), 2);
        assert!((prints[0].unsigned_area() - 400.0).abs() < 1e-6);
        assert!((prints[1].unsigned_area() - 256.0).abs() < 1e-6);
    }
}
