//! Rattachement des réglementations aux parcelles
//!
//! Trois sources, cumulées sans doublon :
//! - recouvrement spatial (ratio intersection / surface de parcelle),
//! - liens explicites fournis en entrée,
//! - conditions d'application des plans de contrôle du développement.

use std::collections::{BTreeSet, HashSet};

use geo::MultiPolygon;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LinkAccuracy;
use crate::geometry::overlap_area;
use crate::topology::Cadastre;
use crate::types::{ParcelId, Programme, RegulationId, Zone};
use crate::EngineError;

use super::{DevelopmentControlPlan, RegulationKind, RegulationRef, RegulationSet};

/// Lien explicite parcelle → réglementation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegulationLink {
    pub parcel_id: ParcelId,
    pub regulation_id: RegulationId,
}

/// Lien résolu, typé, tel qu'exporté
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LinkedRegulation {
    pub parcel_id: ParcelId,
    pub regulation_id: RegulationId,
    pub kind: RegulationKind,
}

/// Réglementations rattachées, par position de parcelle
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    per_parcel: Vec<BTreeSet<RegulationRef>>,
}

impl LinkTable {
    pub fn new(parcel_count: usize) -> Self {
        Self {
            per_parcel: vec![BTreeSet::new(); parcel_count],
        }
    }

    /// Ajoute un lien ; faux s'il existait déjà
    pub fn insert(&mut self, parcel: usize, regulation: RegulationRef) -> bool {
        self.per_parcel[parcel].insert(regulation)
    }

    pub fn of(&self, parcel: usize) -> impl Iterator<Item = RegulationRef> + '_ {
        self.per_parcel[parcel].iter().copied()
    }

    /// Positions, dans leur table, des réglementations d'un type donné
    pub fn indices(&self, parcel: usize, kind: RegulationKind) -> Vec<usize> {
        self.per_parcel[parcel]
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.index)
            .collect()
    }

    pub fn has(&self, parcel: usize, kind: RegulationKind) -> bool {
        self.per_parcel[parcel].iter().any(|r| r.kind == kind)
    }

    /// Rattachée à une LHA ou une GCBA
    pub fn has_landed_area(&self, parcel: usize) -> bool {
        self.per_parcel[parcel].iter().any(|r| r.kind.is_landed_area())
    }

    pub fn count(&self) -> usize {
        self.per_parcel.iter().map(BTreeSet::len).sum()
    }

    /// Liens typés, triés par parcelle puis réglementation
    pub fn export(&self, cadastre: &Cadastre, set: &RegulationSet) -> Vec<LinkedRegulation> {
        let mut links: Vec<LinkedRegulation> = self
            .per_parcel
            .iter()
            .enumerate()
            .flat_map(|(idx, refs)| {
                refs.iter().map(move |r| LinkedRegulation {
                    parcel_id: cadastre.get(idx).id.clone(),
                    regulation_id: set.id_of(*r).to_string(),
                    kind: r.kind,
                })
            })
            .collect();
        links.sort();
        links
    }
}

/// Seuil de rattachement d'un type surfacique ; `None` : plus grand recouvrement
fn accuracy_for(kind: RegulationKind, accuracy: &LinkAccuracy) -> Option<f64> {
    let value = match kind {
        RegulationKind::HeightControlPlan => accuracy.height_control,
        RegulationKind::StreetBlockPlan => accuracy.street_block,
        RegulationKind::UrbanDesignGuideline => accuracy.urban_design,
        RegulationKind::LandedHousingArea | RegulationKind::GoodClassBungalowArea => {
            accuracy.landed_housing
        }
        RegulationKind::CentralArea => accuracy.central_area,
        RegulationKind::UrbanDesignArea => accuracy.urban_design_area,
        RegulationKind::ConservationArea => accuracy.conservation,
        RegulationKind::Monument => accuracy.monument,
        RegulationKind::PlanningBoundary
        | RegulationKind::DevelopmentControlPlan
        | RegulationKind::RoadCategory => return None,
    };
    Some(value)
}

/// Rattachement spatial de toutes les réglementations surfaciques.
///
/// Une parcelle est rattachée quand `intersection / surface > seuil`
/// (strict). Les limites de planification ne retiennent que le plus grand
/// recouvrement de chaque parcelle.
pub fn link_spatial(cadastre: &Cadastre, set: &RegulationSet, accuracy: &LinkAccuracy) -> LinkTable {
    let regulations = set.area_regulations();

    let overlaps: Vec<(usize, RegulationRef, f64)> = regulations
        .par_iter()
        .flat_map_iter(|&r| {
            let geometry: &MultiPolygon = match set.geometry_of(r) {
                Some(g) => g,
                None => return Vec::new(),
            };
            cadastre
                .candidates(geometry, 0.0)
                .into_iter()
                .filter_map(|idx| {
                    let parcel = cadastre.get(idx);
                    let overlap = overlap_area(geometry, &parcel.multi());
                    (overlap > 0.0).then(|| (idx, r, overlap / parcel.area))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mut table = LinkTable::new(cadastre.len());
    let mut boundaries: Vec<Option<(RegulationRef, f64)>> = vec![None; cadastre.len()];
    for (idx, r, ratio) in overlaps {
        match accuracy_for(r.kind, accuracy) {
            Some(threshold) => {
                if ratio > threshold {
                    table.insert(idx, r);
                }
            }
            None => {
                let best = &mut boundaries[idx];
                if best.map_or(true, |(b, area)| ratio > area || (ratio == area && r < b)) {
                    *best = Some((r, ratio));
                }
            }
        }
    }
    for (idx, best) in boundaries.into_iter().enumerate() {
        if let Some((r, _)) = best {
            table.insert(idx, r);
        }
    }

    info!(
        regulations = regulations.len(),
        links = table.count(),
        "Spatial links computed"
    );
    table
}

/// Ajoute les liens explicites.
///
/// Un lien vers une parcelle écartée par la topologie est ignoré ; une
/// parcelle ou réglementation totalement inconnue est une erreur.
pub fn link_explicit(
    table: &mut LinkTable,
    links: &[RegulationLink],
    cadastre: &Cadastre,
    set: &RegulationSet,
    excluded: &HashSet<&str>,
) -> Result<usize, EngineError> {
    let mut added = 0;
    for link in links {
        let regulation = set
            .lookup(&link.regulation_id)
            .ok_or_else(|| EngineError::UnknownRegulation(link.regulation_id.clone()))?;
        let Some(idx) = cadastre.position(&link.parcel_id) else {
            if excluded.contains(link.parcel_id.as_str()) {
                debug!(parcel_id = %link.parcel_id, "Link to excluded parcel ignored");
                continue;
            }
            return Err(EngineError::UnknownParcel(link.parcel_id.clone()));
        };
        if table.insert(idx, regulation) {
            added += 1;
        }
    }
    Ok(added)
}

/// Faits d'une parcelle examinés par les conditions des plans de contrôle
#[derive(Debug, Clone)]
pub struct DcpFacts<'a> {
    pub zone: &'a Zone,
    pub allowed: &'a [Programme],
    pub plot_ratio: Option<f64>,
    pub in_central_area: bool,
    /// Identifiants des LHA, GCBA et limites de planification rattachées
    pub area_regs: BTreeSet<&'a str>,
    pub fringe: bool,
    pub corner: bool,
    pub abuts_listed_road: bool,
    pub abuts_gcba: bool,
    pub in_gcba: bool,
    pub neighbour_zones: &'a BTreeSet<Zone>,
}

/// Vrai si toutes les conditions du plan sont satisfaites
pub fn dcp_applies(dcp: &DevelopmentControlPlan, facts: &DcpFacts<'_>) -> bool {
    let c = &dcp.conditions;

    // Un plan sans zonage visé ne s'applique à aucune parcelle
    if !c.zones.contains(facts.zone) {
        return false;
    }
    if dcp.programme.is_landed() && !facts.allowed.contains(&dcp.programme) {
        return false;
    }
    if let Some(condition) = &c.plot_ratio {
        if !condition.matches(facts.plot_ratio) {
            return false;
        }
    }
    if let Some(central) = c.in_central_area {
        if central != facts.in_central_area {
            return false;
        }
    }
    if !c.in_area_regs.is_empty()
        && !c.in_area_regs.iter().any(|id| facts.area_regs.contains(id.as_str()))
    {
        return false;
    }
    if (c.fringe && !facts.fringe)
        || (c.corner && !facts.corner)
        || (c.abuts_road && !facts.abuts_listed_road)
        || (c.abuts_gcba && !facts.abuts_gcba)
        || (c.in_gcba && !facts.in_gcba)
    {
        return false;
    }
    if !c.neighbour_zones.is_empty()
        && !c.neighbour_zones.iter().any(|z| facts.neighbour_zones.contains(z))
    {
        return false;
    }
    true
}

/// Plans de contrôle dont les conditions tiennent pour une parcelle
pub fn matching_development_control(set: &RegulationSet, facts: &DcpFacts<'_>) -> Vec<RegulationRef> {
    set.tables
        .development_control
        .iter()
        .enumerate()
        .filter(|(_, dcp)| dcp_applies(dcp, facts))
        .map(|(index, _)| RegulationRef {
            kind: RegulationKind::DevelopmentControlPlan,
            index,
        })
        .collect()
}
