//! Construction de la topologie parcellaire
//!
//! Nettoyage des géométries brutes, exclusion des parcelles inexploitables,
//! relation de voisinage symétrique et typage des parcelles de voirie à partir
//! du réseau routier.

use std::collections::{BTreeSet, HashMap};

use geo::{Area, Buffer, Geometry, Line, LineString, MultiPolygon, Polygon};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::audit::{Issue, Stage};
use crate::config::Thresholds;
use crate::geometry::{boundary_edges, buffer, clean_polygon, overlap_area, to_multi};
use crate::index::{rect_of, SpatialIndex};
use crate::progress::Progress;
use crate::types::{ParcelId, ParcelRecord, RoadRecord, RoadType, Zone};

/// Parcelle nettoyée, prête pour la classification
#[derive(Debug, Clone)]
pub struct Parcel {
    pub id: ParcelId,

    /// Polygone simplifié, anneau extérieur anti-horaire
    pub polygon: Polygon,

    pub zone: Zone,

    /// Coefficient d'emprise de base fourni en entrée
    pub plot_ratio: Option<f64>,

    pub area: f64,

    /// Arêtes consécutives de l'anneau extérieur
    pub edges: Vec<Line>,

    /// Positions des voisines dans le cadastre (triées)
    pub neighbours: Vec<usize>,

    /// Type de voie, pour les parcelles de voirie uniquement
    pub road_type: Option<RoadType>,
}

impl Parcel {
    pub fn multi(&self) -> MultiPolygon {
        to_multi(&self.polygon)
    }
}

/// Ensemble des parcelles exploitables et leur index spatial
pub struct Cadastre {
    parcels: Vec<Parcel>,
    by_id: HashMap<ParcelId, usize>,
    index: SpatialIndex,
}

impl Cadastre {
    /// Construit la topologie à partir des parcelles brutes et du réseau routier.
    ///
    /// Les parcelles rejetées (multi-polygones, géométries dégénérées, doublons)
    /// sont signalées par un problème de niveau `Error` et absentes du résultat.
    pub fn build(
        records: Vec<ParcelRecord>,
        roads: &[RoadRecord],
        thresholds: &Thresholds,
    ) -> (Self, Vec<Issue>) {
        let total = records.len();
        let cleaned: Vec<Result<Parcel, Issue>> = records
            .into_par_iter()
            .map(|record| clean_record(record, thresholds))
            .collect();

        let mut issues = Vec::new();
        let mut parcels = Vec::with_capacity(cleaned.len());
        let mut by_id = HashMap::with_capacity(cleaned.len());
        for result in cleaned {
            match result {
                Ok(parcel) => {
                    if by_id.contains_key(&parcel.id) {
                        warn!(parcel_id = %parcel.id, "Duplicate parcel id, keeping the first one");
                        issues.push(Issue::error(&parcel.id, Stage::Topology, "duplicate parcel id"));
                        continue;
                    }
                    by_id.insert(parcel.id.clone(), parcels.len());
                    parcels.push(parcel);
                }
                Err(issue) => {
                    warn!(parcel_id = %issue.parcel_id, reason = %issue.message, "Parcel excluded");
                    issues.push(issue);
                }
            }
        }

        let index = SpatialIndex::build(
            parcels
                .iter()
                .enumerate()
                .filter_map(|(i, p)| rect_of(&p.polygon).map(|r| (i, r))),
        );

        let neighbours = find_neighbours(&parcels, &index, thresholds);
        for (parcel, list) in parcels.iter_mut().zip(neighbours) {
            parcel.neighbours = list;
        }

        assign_road_types(&mut parcels, roads, thresholds);

        info!(
            input = total,
            kept = parcels.len(),
            excluded = issues.len(),
            "Topology built"
        );

        (
            Self {
                parcels,
                by_id,
                index,
            },
            issues,
        )
    }

    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    pub fn get(&self, idx: usize) -> &Parcel {
        &self.parcels[idx]
    }

    /// Position d'une parcelle par identifiant
    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn by_id(&self, id: &str) -> Option<&Parcel> {
        self.position(id).map(|i| &self.parcels[i])
    }

    /// Parcelles dont le rectangle englobant recoupe celui de `geometry`
    pub fn candidates(&self, geometry: &MultiPolygon, margin: f64) -> Vec<usize> {
        match rect_of(geometry) {
            Some(rect) => self.index.candidates(&rect, margin),
            None => Vec::new(),
        }
    }

    /// Positions des parcelles de voirie
    pub fn road_parcels(&self) -> impl Iterator<Item = usize> + '_ {
        self.parcels
            .iter()
            .enumerate()
            .filter(|(_, p)| p.zone.is_road())
            .map(|(i, _)| i)
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }
}

fn clean_record(record: ParcelRecord, thresholds: &Thresholds) -> Result<Parcel, Issue> {
    let id = record.id;
    let polygon = match record.geometry {
        Geometry::Polygon(p) => p,
        Geometry::MultiPolygon(mut mp) if mp.0.len() == 1 => mp.0.remove(0),
        Geometry::MultiPolygon(mp) => {
            return Err(Issue::error(
                &id,
                Stage::Topology,
                format!("multi-polygon parcel with {} members", mp.0.len()),
            ))
        }
        _ => {
            return Err(Issue::error(&id, Stage::Topology, "parcel geometry is not a polygon"));
        }
    };

    let Some(polygon) = clean_polygon(&polygon, thresholds.simplify_tolerance) else {
        return Err(Issue::error(&id, Stage::Topology, "degenerate polygon after simplification"));
    };

    let area = polygon.unsigned_area();
    if area < thresholds.min_parcel_area {
        return Err(Issue::error(
            &id,
            Stage::Topology,
            format!(
                "parcel area {:.1} below minimum {}",
                area, thresholds.min_parcel_area
            ),
        ));
    }

    let edges = boundary_edges(&polygon);
    Ok(Parcel {
        id,
        polygon,
        zone: record.zone,
        plot_ratio: record.plot_ratio.filter(|r| r.is_finite()),
        area,
        edges,
        neighbours: Vec::new(),
        road_type: None,
    })
}

/// Relation de voisinage : tampon de la parcelle recoupant une autre parcelle
/// au-delà d'une surface minimale. Le résultat est symétrisé.
fn find_neighbours(parcels: &[Parcel], index: &SpatialIndex, thresholds: &Thresholds) -> Vec<Vec<usize>> {
    let progress = Progress::new("neighbours", parcels.len(), thresholds.progress_every);

    let found: Vec<Vec<usize>> = parcels
        .par_iter()
        .enumerate()
        .map(|(i, parcel)| {
            let grown = buffer(&parcel.multi(), thresholds.neighbour_buffer);
            let list = match rect_of(&grown) {
                Some(rect) => index
                    .candidates(&rect, 0.0)
                    .into_iter()
                    .filter(|&j| {
                        j != i
                            && overlap_area(&grown, &parcels[j].multi())
                                > thresholds.neighbour_min_overlap
                    })
                    .collect(),
                None => Vec::new(),
            };
            progress.tick();
            list
        })
        .collect();

    let mut symmetric: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); parcels.len()];
    for (i, list) in found.iter().enumerate() {
        for &j in list {
            symmetric[i].insert(j);
            symmetric[j].insert(i);
        }
    }
    symmetric
        .into_iter()
        .map(|set| set.into_iter().collect())
        .collect()
}

fn buffer_road(geometry: &Geometry, distance: f64) -> Option<MultiPolygon> {
    let grown = match geometry {
        Geometry::Line(line) => LineString::new(vec![line.start, line.end]).buffer(distance),
        Geometry::LineString(ls) => ls.buffer(distance),
        Geometry::MultiLineString(mls) => mls.buffer(distance),
        Geometry::Polygon(p) => p.buffer(distance),
        Geometry::MultiPolygon(mp) => mp.buffer(distance),
        _ => return None,
    };
    (!grown.0.is_empty()).then_some(grown)
}

/// Chaque parcelle de voirie reçoit le type du tronçon (tamponné) qui la
/// recouvre le plus ; aucun recouvrement laisse la voie non catégorisée.
fn assign_road_types(parcels: &mut [Parcel], roads: &[RoadRecord], thresholds: &Thresholds) {
    let buffered: Vec<(MultiPolygon, RoadType)> = roads
        .par_iter()
        .filter_map(|road| {
            buffer_road(&road.geometry, thresholds.road_network_buffer).map(|g| (g, road.road_type))
        })
        .collect();
    if buffered.is_empty() {
        debug!("No road network features, road parcels stay uncategorised");
        return;
    }
    let index = SpatialIndex::build(
        buffered
            .iter()
            .enumerate()
            .filter_map(|(i, (g, _))| rect_of(g).map(|r| (i, r))),
    );

    parcels
        .par_iter_mut()
        .filter(|p| p.zone.is_road())
        .for_each(|parcel| {
            let shape = parcel.multi();
            let Some(rect) = rect_of(&shape) else {
                return;
            };
            let best = index
                .candidates(&rect, 0.0)
                .into_iter()
                .map(|k| (overlap_area(&shape, &buffered[k].0), buffered[k].1))
                .filter(|(area, _)| *area > 0.0)
                .max_by(|a, b| a.0.total_cmp(&b.0));
            parcel.road_type = best.map(|(_, road_type)| road_type);
        });
}
