//! Pilote du lot d'estimation
//!
//! Étapes séparées par des barrières, chacune parallélisée par parcelle :
//! 1. topologie (nettoyage, voisinage, typage des voies)
//! 2. classification des arêtes et des voisins
//! 3. rattachement spatial et explicite des réglementations
//! 4. profils réglementaires, puis plans de contrôle du développement
//! 5. reculs, enveloppe et surface de plancher par programme
//!
//! Les tables partagées ne sont jamais modifiées après leur construction.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use geo::Area;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{Audit, Issue, Stage};
use crate::classify::{classify_all, Classification};
use crate::config::Thresholds;
use crate::envelope::{effective_storeys, footprints, part_footprint_areas, subdivide, Part, PartSource};
use crate::gfa::{parcel_gfa, plot_ratio_gfa, PartEnvelope};
use crate::profile::{build_profile, ParcelProfile};
use crate::progress::Progress;
use crate::regulation::link::{link_explicit, link_spatial, matching_development_control};
use crate::regulation::party_wall::party_wall_edges;
use crate::regulation::programme::keeps_programme;
use crate::regulation::setback::{
    design_guideline_setbacks, resolve_setbacks, road_buffers, street_block_levels, ProgrammeRules,
    SetbackContext,
};
use crate::regulation::{
    DevelopmentControlPlan, LinkTable, LinkedRegulation, RegulationKind, RegulationLink, RegulationRef,
    RegulationSet,
};
use crate::topology::Cadastre;
use crate::types::{EdgeRole, Gfa, ParcelId, ParcelRecord, Programme, RoadCategory, RoadRecord, StoreyLimit, Zone};
use crate::EngineError;

/// Données d'un lot, entièrement chargées avant le calcul
#[derive(Debug, Clone, Default)]
pub struct EngineInput {
    pub parcels: Vec<ParcelRecord>,
    pub roads: Vec<RoadRecord>,
    pub regulations: RegulationSet,
    pub links: Vec<RegulationLink>,
}

/// Issue de l'estimation d'une parcelle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    /// Au moins un programme estimé
    Estimated,
    /// Aucune valeur calculable (ni enveloppe ni coefficient)
    Unknown,
    /// Zonage sans surface de plancher
    NonGfaZone,
    /// Contrôle de détail ou patrimoine : estimation non fiable
    Unclear,
    /// Écartée par la topologie
    Excluded,
}

/// Attributs dérivés d'une parcelle classée
#[derive(Debug, Clone, Serialize)]
pub struct ParcelAttributes {
    pub corner: bool,
    pub fringe: bool,
    pub avg_width: Option<f64>,
    pub avg_depth: Option<f64>,
    pub edge_roles: Vec<Option<EdgeRole>>,
    pub edge_road_categories: Vec<Vec<RoadCategory>>,
    pub party_wall_edges: Vec<usize>,
    pub front_neighbours: Vec<ParcelId>,
    pub side_neighbours: Vec<ParcelId>,
    pub rear_neighbours: Vec<ParcelId>,
    pub neighbour_zones: Vec<Zone>,
}

/// Partie de parcelle telle qu'exportée
#[derive(Debug, Clone, Serialize)]
pub struct PartSummary {
    pub source: PartSource,
    pub area: f64,
    pub storeys: StoreyLimit,
}

/// Estimation pour un programme
#[derive(Debug, Clone, Serialize)]
pub struct ProgrammeEstimate {
    pub programme: Programme,
    pub plot_ratio: Option<f64>,
    pub site_coverage: f64,
    /// Reculs par niveau et par arête
    pub setbacks: Vec<Vec<f64>>,
    /// Surface d'emprise par niveau
    pub footprint_areas: Vec<f64>,
    /// Étages autorisés par partie
    pub storeys: Vec<StoreyLimit>,
    pub gfa: Gfa,
}

/// Résultat d'une parcelle
#[derive(Debug, Clone, Serialize)]
pub struct ParcelEstimate {
    pub parcel_id: ParcelId,
    pub zone: Zone,
    pub status: EstimateStatus,
    pub area: Option<f64>,
    pub attributes: Option<ParcelAttributes>,
    pub profile: Option<ParcelProfile>,
    pub parts: Vec<PartSummary>,
    pub programmes: Vec<ProgrammeEstimate>,
}

impl ParcelEstimate {
    fn bare(parcel_id: ParcelId, zone: Zone, status: EstimateStatus, area: Option<f64>) -> Self {
        Self {
            parcel_id,
            zone,
            status,
            area,
            attributes: None,
            profile: None,
            parts: Vec::new(),
            programmes: Vec::new(),
        }
    }

    /// Surface de plancher d'un programme
    pub fn gfa(&self, programme: Programme) -> Gfa {
        self.programmes
            .iter()
            .find(|p| p.programme == programme)
            .map_or(Gfa::Unknown, |p| p.gfa)
    }

    /// Plus grande surface connue, tous programmes confondus
    pub fn max_gfa(&self) -> Gfa {
        self.programmes
            .iter()
            .filter_map(|p| p.gfa.value())
            .reduce(f64::max)
            .map_or(Gfa::Unknown, Gfa::Known)
    }
}

/// Compteurs d'un lot
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub parcels_in: usize,
    pub parcels_kept: usize,
    pub links: usize,
    pub development_control_links: usize,
    pub estimated: usize,
    pub unknown: usize,
    pub non_gfa: usize,
    pub unclear: usize,
    pub excluded: usize,
    pub duration_ms: u64,
}

/// Résultat complet d'un lot
#[derive(Debug, Clone, Serialize)]
pub struct Estimation {
    pub estimates: Vec<ParcelEstimate>,
    pub links: Vec<LinkedRegulation>,
    pub audit: Audit,
    pub stats: RunStats,
}

/// Lance l'estimation complète d'un lot.
///
/// Seules les erreurs de configuration, de référence dans les liens et les
/// invariants structurels interrompent le lot ; tout le reste est consigné
/// dans l'audit.
pub fn estimate(input: EngineInput, thresholds: &Thresholds) -> Result<Estimation, EngineError> {
    thresholds.validate()?;
    let start = Instant::now();
    let EngineInput {
        parcels,
        roads,
        regulations: set,
        links: explicit_links,
    } = input;

    let input_order: Vec<(ParcelId, Zone)> = parcels.iter().map(|p| (p.id.clone(), p.zone.clone())).collect();
    let mut stats = RunStats {
        parcels_in: parcels.len(),
        ..Default::default()
    };
    let mut audit = Audit::new();

    // 1. Topologie
    let (cadastre, topology_issues) = Cadastre::build(parcels, &roads, thresholds);
    let excluded_ids: HashSet<String> = topology_issues.iter().map(|i| i.parcel_id.clone()).collect();
    audit.extend(topology_issues);
    stats.parcels_kept = cadastre.len();

    // 2. Classification
    let (classifications, classification_issues) = classify_all(&cadastre, thresholds);
    audit.extend(classification_issues);

    // 3. Liens
    let mut links = link_spatial(&cadastre, &set, &thresholds.link_accuracy);
    let excluded: HashSet<&str> = excluded_ids.iter().map(String::as_str).collect();
    let explicit = link_explicit(&mut links, &explicit_links, &cadastre, &set, &excluded)?;
    debug!(added = explicit, "Explicit links merged");

    // 4. Profils, puis plans de contrôle
    let progress = Progress::new("profiles", cadastre.len(), thresholds.progress_every);
    let profiles: Vec<Option<ParcelProfile>> = (0..cadastre.len())
        .into_par_iter()
        .map(|idx| {
            let profile = classifications[idx]
                .as_ref()
                .map(|c| build_profile(&cadastre, idx, c, &links, &set, thresholds));
            progress.tick();
            profile
        })
        .collect();

    let progress = Progress::new("development control", cadastre.len(), thresholds.progress_every);
    let matched: Vec<Vec<RegulationRef>> = (0..cadastre.len())
        .into_par_iter()
        .map(|idx| {
            let found = match (&profiles[idx], &classifications[idx]) {
                (Some(profile), Some(c)) => {
                    let facts = profile.dcp_facts(&cadastre, idx, c, &links, &set);
                    matching_development_control(&set, &facts)
                }
                _ => Vec::new(),
            };
            progress.tick();
            found
        })
        .collect();
    let mut dcp_count = 0;
    for (idx, found) in matched.into_iter().enumerate() {
        for r in found {
            if links.insert(idx, r) {
                dcp_count += 1;
            }
        }
    }
    stats.development_control_links = dcp_count;
    stats.links = links.count();
    info!(links = stats.links, development_control = dcp_count, "Regulation links resolved");

    let party_wall_flags: Vec<bool> = profiles
        .iter()
        .map(|p| p.as_ref().is_some_and(|p| p.party_wall))
        .collect();

    // 5. Enveloppes et surfaces de plancher
    let progress = Progress::new("envelopes", cadastre.len(), thresholds.progress_every);
    let context = BatchContext {
        cadastre: &cadastre,
        set: &set,
        links: &links,
        party_wall_flags: &party_wall_flags,
        thresholds,
    };
    let results: Vec<Result<(ParcelEstimate, Vec<Issue>), EngineError>> = (0..cadastre.len())
        .into_par_iter()
        .map(|idx| {
            let result = context.estimate_parcel(idx, classifications[idx].as_ref(), profiles[idx].as_ref());
            progress.tick();
            result
        })
        .collect();

    let mut by_id: BTreeMap<ParcelId, ParcelEstimate> = BTreeMap::new();
    for result in results {
        let (estimate, issues) = result?;
        audit.extend(issues);
        by_id.insert(estimate.parcel_id.clone(), estimate);
    }

    let mut estimates = Vec::with_capacity(input_order.len());
    let mut seen: HashSet<ParcelId> = HashSet::new();
    for (id, zone) in input_order {
        if !seen.insert(id.clone()) {
            continue;
        }
        match by_id.remove(&id) {
            Some(estimate) => estimates.push(estimate),
            None => estimates.push(ParcelEstimate::bare(id, zone, EstimateStatus::Excluded, None)),
        }
    }

    for estimate in &estimates {
        match estimate.status {
            EstimateStatus::Estimated => stats.estimated += 1,
            EstimateStatus::Unknown => stats.unknown += 1,
            EstimateStatus::NonGfaZone => stats.non_gfa += 1,
            EstimateStatus::Unclear => stats.unclear += 1,
            EstimateStatus::Excluded => stats.excluded += 1,
        }
    }
    audit.sort();
    stats.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        parcels = stats.parcels_in,
        estimated = stats.estimated,
        unknown = stats.unknown,
        unclear = stats.unclear,
        excluded = stats.excluded,
        duration_ms = stats.duration_ms,
        "Estimation finished"
    );

    Ok(Estimation {
        estimates,
        links: links.export(&cadastre, &set),
        audit,
        stats,
    })
}

/// Tables partagées, en lecture seule, de l'étape d'enveloppe
struct BatchContext<'a> {
    cadastre: &'a Cadastre,
    set: &'a RegulationSet,
    links: &'a LinkTable,
    party_wall_flags: &'a [bool],
    thresholds: &'a Thresholds,
}

impl BatchContext<'_> {
    /// Motif d'exclusion d'une parcelle à l'estimation incertaine
    fn unclear_reason(&self, idx: usize) -> Option<String> {
        for r in self.links.of(idx) {
            let reason = match r.kind {
                RegulationKind::ConservationArea => Some("conservation area"),
                RegulationKind::Monument => Some("monument"),
                RegulationKind::HeightControlPlan
                    if self.set.tables.height_control[r.index].additional_type.is_some() =>
                {
                    Some("detail-controlled height control plan")
                }
                RegulationKind::UrbanDesignGuideline
                    if self.set.tables.urban_design[r.index].additional_type.is_some() =>
                {
                    Some("detail-controlled urban design guideline")
                }
                _ => None,
            };
            if let Some(reason) = reason {
                return Some(format!("{reason} ({})", self.set.id_of(r)));
            }
        }
        None
    }

    fn estimate_parcel(
        &self,
        idx: usize,
        classification: Option<&Classification>,
        profile: Option<&ParcelProfile>,
    ) -> Result<(ParcelEstimate, Vec<Issue>), EngineError> {
        let parcel = self.cadastre.get(idx);
        let mut issues = Vec::new();

        let (Some(classification), Some(profile)) = (classification, profile) else {
            issues.push(Issue::info(&parcel.id, Stage::Classification, "non-GFA zone, not estimated"));
            return Ok((
                ParcelEstimate::bare(
                    parcel.id.clone(),
                    parcel.zone.clone(),
                    EstimateStatus::NonGfaZone,
                    Some(parcel.area),
                ),
                issues,
            ));
        };

        let wall_edges = if profile.party_wall {
            party_wall_edges(
                self.cadastre,
                idx,
                classification,
                self.party_wall_flags,
                self.thresholds.party_wall_overlap_ratio,
            )
        } else {
            Vec::new()
        };

        let mut estimate = ParcelEstimate {
            parcel_id: parcel.id.clone(),
            zone: parcel.zone.clone(),
            status: EstimateStatus::Unknown,
            area: Some(parcel.area),
            attributes: Some(self.attributes(classification, &wall_edges)),
            profile: Some(profile.clone()),
            parts: Vec::new(),
            programmes: Vec::new(),
        };

        if let Some(reason) = self.unclear_reason(idx) {
            warn!(parcel_id = %parcel.id, reason = %reason, "Parcel estimate unclear");
            issues.push(Issue::warning(
                &parcel.id,
                Stage::Regulation,
                format!("estimate unclear: {reason}"),
            ));
            estimate.status = EstimateStatus::Unclear;
            return Ok((estimate, issues));
        }

        let linked_dcps: Vec<&DevelopmentControlPlan> = self
            .links
            .indices(idx, RegulationKind::DevelopmentControlPlan)
            .into_iter()
            .map(|i| &self.set.tables.development_control[i])
            .collect();
        let mut by_programme: BTreeMap<Programme, Vec<&DevelopmentControlPlan>> = BTreeMap::new();
        for dcp in &linked_dcps {
            if keeps_programme(&parcel.zone, &profile.allowed_programmes, dcp.programme) {
                by_programme.entry(dcp.programme).or_default().push(dcp);
            }
        }

        let base_ratio = profile.plot_ratio.plot_ratio;

        if by_programme.is_empty() {
            let ratio = linked_dcps
                .iter()
                .filter_map(|d| d.plot_ratio)
                .chain(base_ratio)
                .reduce(f64::min);
            let gfa = plot_ratio_gfa(parcel.area, ratio);
            estimate.programmes.push(ProgrammeEstimate {
                programme: Programme::General,
                plot_ratio: ratio,
                site_coverage: 1.0,
                setbacks: Vec::new(),
                footprint_areas: Vec::new(),
                storeys: Vec::new(),
                gfa,
            });
        } else {
            let parts = subdivide(parcel, self.links, self.set, idx, self.thresholds);
            estimate.parts = parts
                .iter()
                .map(|p| PartSummary {
                    source: p.source.clone(),
                    area: p.area,
                    storeys: p.storeys,
                })
                .collect();

            let design_setbacks = design_guideline_setbacks(
                classification,
                self.links,
                self.set,
                idx,
                self.thresholds.udg_overlap_ratio,
            );
            let levels = street_block_levels(self.links, self.set, idx);
            let setback_context = SetbackContext {
                edge_roles: &classification.edge_roles,
                road_categories: &classification.road_categories,
                design_setbacks: &design_setbacks,
                street_block_levels: &levels,
                party_wall: profile.party_wall,
                party_wall_edges: &wall_edges,
            };

            for (programme, dcps) in by_programme {
                estimate.programmes.push(self.estimate_programme(
                    idx,
                    programme,
                    &dcps,
                    &parts,
                    &setback_context,
                    profile,
                )?);
            }
        }

        for p in &estimate.programmes {
            if p.gfa.is_unknown() {
                issues.push(Issue::warning(
                    &parcel.id,
                    Stage::Aggregation,
                    format!("GFA unknown for programme {}", p.programme),
                ));
            }
        }
        if estimate.programmes.iter().any(|p| !p.gfa.is_unknown()) {
            estimate.status = EstimateStatus::Estimated;
        }
        Ok((estimate, issues))
    }

    fn estimate_programme(
        &self,
        idx: usize,
        programme: Programme,
        dcps: &[&DevelopmentControlPlan],
        parts: &[Part],
        setback_context: &SetbackContext<'_>,
        profile: &ParcelProfile,
    ) -> Result<ProgrammeEstimate, EngineError> {
        let parcel = self.cadastre.get(idx);

        let rules = ProgrammeRules {
            programme,
            setback: dcps.iter().filter_map(|d| d.setback).reduce(f64::max),
            road_buffers: road_buffers(self.set, dcps.iter().flat_map(|d| d.road_categories.iter())),
        };
        let table = resolve_setbacks(setback_context, &rules);
        table.validate(&parcel.id, parcel.edges.len())?;

        let programme_storeys = dcps.iter().filter_map(|d| d.storeys).min();
        let site_coverage = dcps
            .iter()
            .filter_map(|d| d.site_coverage)
            .reduce(f64::min)
            .unwrap_or(1.0);
        let plot_ratio = dcps
            .iter()
            .filter_map(|d| d.plot_ratio)
            .chain(profile.plot_ratio.plot_ratio)
            .reduce(f64::min);

        let prints = footprints(parcel, &table);
        let caps = [
            profile.landed_storeys,
            profile.street_block_storeys,
            programme_storeys,
            profile.plot_ratio.context_storeys,
        ];
        let single_part = parts.len() == 1;
        let envelopes: Vec<PartEnvelope> = parts
            .iter()
            .map(|part| PartEnvelope {
                storeys: effective_storeys(part, &caps, self.thresholds.storey_ceiling),
                footprint_areas: part_footprint_areas(part, &prints, single_part),
            })
            .collect();

        let gfa = parcel_gfa(&envelopes, parcel.area, site_coverage, plot_ratio);
        debug!(parcel_id = %parcel.id, programme = ?programme, gfa = ?gfa, "Programme estimated");

        Ok(ProgrammeEstimate {
            programme,
            plot_ratio,
            site_coverage,
            footprint_areas: prints.iter().map(|f| f.unsigned_area()).collect(),
            storeys: envelopes.iter().map(|e| e.storeys).collect(),
            setbacks: table.levels,
            gfa,
        })
    }

    fn attributes(&self, classification: &Classification, wall_edges: &[usize]) -> ParcelAttributes {
        let ids = |list: &[usize]| -> Vec<ParcelId> {
            list.iter().map(|&n| self.cadastre.get(n).id.clone()).collect()
        };
        ParcelAttributes {
            corner: classification.corner,
            fringe: classification.fringe,
            avg_width: classification.avg_width,
            avg_depth: classification.avg_depth,
            edge_roles: classification.edge_roles.clone(),
            edge_road_categories: classification
                .road_categories
                .iter()
                .map(|categories| categories.iter().copied().collect())
                .collect(),
            party_wall_edges: wall_edges.to_vec(),
            front_neighbours: ids(&classification.front_neighbours),
            side_neighbours: ids(&classification.side_neighbours),
            rear_neighbours: ids(&classification.rear_neighbours),
            neighbour_zones: classification.neighbour_zones.iter().cloned().collect(),
        }
    }
}
