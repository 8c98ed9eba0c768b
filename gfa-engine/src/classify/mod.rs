//! Classification des arêtes et des voisins
//!
//! À partir du rectangle englobant d'aire minimale de chaque parcelle :
//! - côté de façade (recouvrement routier maximal), côté arrière, côtés latéraux
//! - parcelle d'angle, parcelle de lisière résidentielle
//! - voisins de façade / latéraux / arrière
//! - rôle et catégorie routière de chaque arête réelle
//! - largeur et profondeur moyennes

pub mod dimensions;
pub mod fringe;

use std::collections::BTreeSet;

use geo::{Area, Line, MultiPolygon};
use rayon::prelude::*;
use tracing::debug;

use crate::audit::{Issue, Stage};
use crate::config::Thresholds;
use crate::geometry::{bounding_rectangle_edges, outward_band, overlap_area, round_to, segment_length, to_multi};
use crate::progress::Progress;
use crate::topology::{Cadastre, Parcel};
use crate::types::{EdgeRole, RoadCategory, RoadType, Zone};

pub use dimensions::average_span;
pub use fringe::ResidentialMass;

/// Sonde extérieure posée sur une arête réelle
#[derive(Debug, Clone)]
pub struct EdgeProbe {
    pub shape: MultiPolygon,
    pub area: f64,
}

impl EdgeProbe {
    fn new(edge: &Line, width: f64) -> Option<Self> {
        let band = outward_band(edge, width)?;
        let area = band.unsigned_area();
        Some(Self {
            shape: to_multi(&band),
            area,
        })
    }

    /// Part de la sonde recouverte par `other`
    pub fn overlap_ratio(&self, other: &MultiPolygon) -> f64 {
        if self.area <= 0.0 {
            return 0.0;
        }
        overlap_area(&self.shape, other) / self.area
    }
}

/// Résultat de la classification d'une parcelle
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Côtés du rectangle englobant (anti-horaire)
    pub bounding_edges: Option<[Line; 4]>,
    pub front: Option<usize>,
    pub rear: Option<usize>,
    pub sides: Vec<usize>,

    pub corner: bool,
    pub fringe: bool,

    pub front_neighbours: Vec<usize>,
    pub side_neighbours: Vec<usize>,
    pub rear_neighbours: Vec<usize>,

    /// Rôle de chaque arête réelle, déduit du voisin qu'elle regarde
    pub edge_roles: Vec<Option<EdgeRole>>,

    /// Catégories routières bordant chaque arête réelle
    pub road_categories: Vec<BTreeSet<RoadCategory>>,

    /// Sondes extérieures des arêtes réelles
    pub probes: Vec<Option<EdgeProbe>>,

    pub avg_width: Option<f64>,
    pub avg_depth: Option<f64>,

    pub neighbour_zones: BTreeSet<Zone>,
    pub neighbour_road_types: BTreeSet<RoadType>,
}

impl Classification {
    /// Rôle d'un côté du rectangle englobant
    pub fn bounding_role(&self, k: usize) -> Option<EdgeRole> {
        if self.front == Some(k) {
            Some(EdgeRole::Front)
        } else if self.rear == Some(k) {
            Some(EdgeRole::Rear)
        } else if self.sides.contains(&k) {
            Some(EdgeRole::Side)
        } else {
            None
        }
    }

    /// Indices des arêtes réelles ayant le rôle donné
    pub fn edges_with_role(&self, role: EdgeRole) -> Vec<usize> {
        self.edge_roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == Some(role))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn has_front(&self) -> bool {
        self.front.is_some()
    }
}

/// Classe toutes les parcelles constructibles (zones hors voirie et hors
/// zones non constructibles). Les autres reçoivent `None`.
pub fn classify_all(cadastre: &Cadastre, thresholds: &Thresholds) -> (Vec<Option<Classification>>, Vec<Issue>) {
    let mass = ResidentialMass::build(cadastre, thresholds);
    let progress = Progress::new("classification", cadastre.len(), thresholds.progress_every);

    let results: Vec<(Option<Classification>, Vec<Issue>)> = (0..cadastre.len())
        .into_par_iter()
        .map(|idx| {
            let parcel = cadastre.get(idx);
            let result = if parcel.zone.is_non_gfa() {
                (None, Vec::new())
            } else {
                let (classification, issues) = classify_parcel(cadastre, idx, &mass, thresholds);
                (Some(classification), issues)
            };
            progress.tick();
            result
        })
        .collect();

    let mut classifications = Vec::with_capacity(results.len());
    let mut issues = Vec::new();
    for (classification, parcel_issues) in results {
        classifications.push(classification);
        issues.extend(parcel_issues);
    }
    (classifications, issues)
}

/// Classe une parcelle
pub fn classify_parcel(
    cadastre: &Cadastre,
    idx: usize,
    mass: &ResidentialMass,
    thresholds: &Thresholds,
) -> (Classification, Vec<Issue>) {
    let parcel = cadastre.get(idx);
    let mut issues = Vec::new();
    let mut out = Classification {
        edge_roles: vec![None; parcel.edges.len()],
        road_categories: vec![BTreeSet::new(); parcel.edges.len()],
        probes: parcel
            .edges
            .iter()
            .map(|e| EdgeProbe::new(e, thresholds.edge_probe_width))
            .collect(),
        ..Default::default()
    };

    for &n in &parcel.neighbours {
        let neighbour = cadastre.get(n);
        out.neighbour_zones.insert(neighbour.zone.clone());
        if let Some(road_type) = neighbour.road_type {
            out.neighbour_road_types.insert(road_type);
        }
    }

    if parcel.zone.is_residential() {
        out.fringe = mass.is_fringe(parcel, thresholds);
    }

    classify_road_edges(cadastre, parcel, &mut out, thresholds);

    match bounding_rectangle_edges(&parcel.polygon) {
        Some(rect) => {
            out.bounding_edges = Some(rect);
            classify_bounding_edges(cadastre, parcel, &rect, &mut out, thresholds);
        }
        None => issues.push(Issue::warning(
            &parcel.id,
            Stage::Classification,
            "minimum bounding rectangle unavailable",
        )),
    }

    if out.has_front() {
        classify_neighbours(cadastre, parcel, &mut out, thresholds);
        classify_boundary_edges(cadastre, parcel, &mut out);
        compute_dimensions(parcel, &mut out);
    } else {
        debug!(parcel_id = %parcel.id, "No road-facing edge, front unassigned");
        issues.push(Issue::warning(
            &parcel.id,
            Stage::Classification,
            "no adjacent road found, front edge unassigned",
        ));
    }

    (out, issues)
}

/// Façade, arrière, côtés latéraux et drapeau d'angle
fn classify_bounding_edges(
    cadastre: &Cadastre,
    parcel: &Parcel,
    rect: &[Line; 4],
    out: &mut Classification,
    thresholds: &Thresholds,
) {
    let roads: Vec<MultiPolygon> = parcel
        .neighbours
        .iter()
        .map(|&n| cadastre.get(n))
        .filter(|n| n.zone.is_road())
        .map(Parcel::multi)
        .collect();

    let lengths: Vec<f64> = rect.iter().map(|e| round_to(segment_length(e), 3)).collect();

    // (surface recouverte par la voirie, ratio de la bande)
    let coverage: Vec<(f64, f64)> = rect
        .iter()
        .map(|edge| match outward_band(edge, thresholds.mbr_edge_band) {
            Some(band) => {
                let band_area = band.unsigned_area();
                let band = to_multi(&band);
                // Recouvrement cumulé sur toutes les voies, pas voie par voie
                let covered: f64 = roads.iter().map(|r| overlap_area(&band, r)).sum();
                (covered, if band_area > 0.0 { covered / band_area } else { 0.0 })
            }
            None => (0.0, 0.0),
        })
        .collect();

    let front = (0..4)
        .filter(|&k| coverage[k].0 > 0.0)
        .max_by(|&a, &b| {
            coverage[a]
                .0
                .total_cmp(&coverage[b].0)
                .then(lengths[a].total_cmp(&lengths[b]))
                .then(b.cmp(&a))
        });
    let Some(front) = front else {
        return;
    };

    let opposite = (front + 2) % 4;
    let rear = if lengths[opposite] == lengths[front] {
        Some(opposite)
    } else {
        (0..4).find(|&k| k != front && lengths[k] == lengths[front])
    };

    out.front = Some(front);
    out.rear = rear;
    out.sides = (0..4).filter(|&k| k != front && Some(k) != rear).collect();

    let road_facing: BTreeSet<usize> = (0..4)
        .filter(|&k| coverage[k].1 > thresholds.corner_ratio && Some(k) != rear)
        .collect();
    out.corner = road_facing.len() > 1;
}

/// Chaque voisin prend le rôle du côté du rectangle qu'il recouvre le plus
fn classify_neighbours(
    cadastre: &Cadastre,
    parcel: &Parcel,
    out: &mut Classification,
    thresholds: &Thresholds,
) {
    let Some(rect) = out.bounding_edges else {
        return;
    };
    let bands: Vec<Option<MultiPolygon>> = rect
        .iter()
        .map(|e| outward_band(e, thresholds.mbr_edge_band).map(|b| to_multi(&b)))
        .collect();

    for &n in &parcel.neighbours {
        let shape = cadastre.get(n).multi();
        let best = (0..4)
            .filter_map(|k| bands[k].as_ref().map(|b| (k, overlap_area(b, &shape))))
            .filter(|(_, area)| *area > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
        match best.and_then(|(k, _)| out.bounding_role(k)) {
            Some(EdgeRole::Front) => out.front_neighbours.push(n),
            Some(EdgeRole::Side) => out.side_neighbours.push(n),
            Some(EdgeRole::Rear) => out.rear_neighbours.push(n),
            None => {}
        }
    }
}

/// Chaque arête réelle prend le rôle du voisin classé que sa sonde recouvre le plus
fn classify_boundary_edges(cadastre: &Cadastre, parcel: &Parcel, out: &mut Classification) {
    let classified: Vec<(MultiPolygon, EdgeRole)> = out
        .front_neighbours
        .iter()
        .map(|&n| (n, EdgeRole::Front))
        .chain(out.side_neighbours.iter().map(|&n| (n, EdgeRole::Side)))
        .chain(out.rear_neighbours.iter().map(|&n| (n, EdgeRole::Rear)))
        .map(|(n, role)| (cadastre.get(n).multi(), role))
        .collect();

    for (i, probe) in out.probes.iter().enumerate() {
        let Some(probe) = probe else {
            continue;
        };
        out.edge_roles[i] = classified
            .iter()
            .map(|(shape, role)| (overlap_area(&probe.shape, shape), *role))
            .filter(|(area, _)| *area > 0.0)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, role)| role);
    }
    debug_assert_eq!(out.edge_roles.len(), parcel.edges.len());
}

/// Catégories routières des arêtes dont la sonde recouvre une voie typée
fn classify_road_edges(
    cadastre: &Cadastre,
    parcel: &Parcel,
    out: &mut Classification,
    thresholds: &Thresholds,
) {
    let typed_roads: Vec<(MultiPolygon, RoadCategory)> = parcel
        .neighbours
        .iter()
        .map(|&n| cadastre.get(n))
        .filter_map(|n| n.road_type.map(|t| (n.multi(), t.category())))
        .collect();
    if typed_roads.is_empty() {
        return;
    }
    for (i, probe) in out.probes.iter().enumerate() {
        let Some(probe) = probe else {
            continue;
        };
        for (shape, category) in &typed_roads {
            if probe.overlap_ratio(shape) > thresholds.road_overlap_ratio {
                out.road_categories[i].insert(*category);
            }
        }
    }
}

fn compute_dimensions(parcel: &Parcel, out: &mut Classification) {
    let (Some(rect), Some(front)) = (out.bounding_edges, out.front) else {
        return;
    };
    let Some(&side) = out.sides.first() else {
        return;
    };
    let front_edge = rect[front];
    let side_edge = rect[side];
    out.avg_width = average_span(&parcel.polygon, &front_edge, segment_length(&side_edge));
    out.avg_depth = average_span(&parcel.polygon, &side_edge, segment_length(&front_edge));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::square;
    use crate::types::ParcelRecord;
    use geo::{polygon, Geometry, Polygon};

    fn record(id: &str, polygon: Polygon, zone: Zone) -> ParcelRecord {
        ParcelRecord {
            id: id.to_string(),
            geometry: Geometry::Polygon(polygon),
            zone,
            plot_ratio: None,
        }
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]
    }

    /// Rangée de 3 parcelles 20 × 30 au nord d'une route, route latérale à l'ouest
    fn block() -> Cadastre {
        let records = vec![
            record("road-south", rect(-10.0, -10.0, 60.0, 0.0), Zone::Road),
            record("road-west", rect(-10.0, 0.0, 0.0, 30.0), Zone::Road),
            record("west", rect(0.0, 0.0, 20.0, 30.0), Zone::Residential),
            record("middle", rect(20.0, 0.0, 40.0, 30.0), Zone::Residential),
            record("east", rect(40.0, 0.0, 60.0, 30.0), Zone::Residential),
        ];
        Cadastre::build(records, &[], &Thresholds::default()).0
    }

    fn classify(cadastre: &Cadastre, id: &str) -> Classification {
        let thresholds = Thresholds::default();
        let mass = ResidentialMass::build(cadastre, &thresholds);
        classify_parcel(cadastre, cadastre.position(id).unwrap(), &mass, &thresholds).0
    }

    #[test]
    fn test_front_rear_sides_partition() {
        let cadastre = block();
        let c = classify(&cadastre, "middle");
        let front = c.front.unwrap();
        let mut all: Vec<usize> = c.sides.clone();
        all.push(front);
        all.extend(c.rear);
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3]);
        assert_ne!(Some(front), c.rear);
        assert!(!c.corner);

        let rect = c.bounding_edges.unwrap();
        let front_edge = rect[front];
        assert!(front_edge.start.y.abs() < 1e-6 && front_edge.end.y.abs() < 1e-6);
    }

    #[test]
    fn test_corner_parcel() {
        let cadastre = block();
        let c = classify(&cadastre, "west");
        assert!(c.corner);
        assert!(c.front.is_some());
        assert_ne!(c.front, c.rear);
    }

    #[test]
    fn test_neighbour_and_edge_roles() {
        let cadastre = block();
        let c = classify(&cadastre, "middle");
        let road = cadastre.position("road-south").unwrap();
        let west = cadastre.position("west").unwrap();
        let east = cadastre.position("east").unwrap();
        assert_eq!(c.front_neighbours, vec![road]);
        assert!(c.side_neighbours.contains(&west));
        assert!(c.side_neighbours.contains(&east));

        assert_eq!(c.edges_with_role(EdgeRole::Front).len(), 1);
        assert_eq!(c.edges_with_role(EdgeRole::Side).len(), 2);
        assert!(c.neighbour_zones.contains(&Zone::Road));
    }

    #[test]
    fn test_width_and_depth() {
        let cadastre = block();
        let c = classify(&cadastre, "middle");
        assert_eq!(c.avg_width, Some(20.0));
        assert_eq!(c.avg_depth, Some(30.0));
    }

    #[test]
    fn test_front_coverage_sums_road_pieces() {
        // Façade sud bordée par deux tronçons, côté ouest par une seule voie plus courte
        let records = vec![
            record("road-a", rect(0.0, -10.0, 15.0, 0.0), Zone::Road),
            record("road-b", rect(15.0, -10.0, 30.0, 0.0), Zone::Road),
            record("road-west", rect(-10.0, 0.0, 0.0, 20.0), Zone::Road),
            record("lot", rect(0.0, 0.0, 30.0, 20.0), Zone::Residential),
        ];
        let (cadastre, _) = Cadastre::build(records, &[], &Thresholds::default());
        let c = classify(&cadastre, "lot");
        let front = c.bounding_edges.unwrap()[c.front.unwrap()];
        assert!(front.start.y.abs() < 1e-6 && front.end.y.abs() < 1e-6);
        assert!(c.corner);
    }

    #[test]
    fn test_no_road_no_front() {
        let records = vec![record("alone", square(0.0, 0.0, 30.0), Zone::Residential)];
        let (cadastre, _) = Cadastre::build(records, &[], &Thresholds::default());
        let thresholds = Thresholds::default();
        let mass = ResidentialMass::build(&cadastre, &thresholds);
        let (c, issues) = classify_parcel(&cadastre, 0, &mass, &thresholds);
        assert!(c.front.is_none());
        assert!(c.sides.is_empty());
        assert_eq!(issues.len(), 1);
        assert!(c.fringe);
    }
}
