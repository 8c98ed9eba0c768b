//! Coefficient d'emprise effectif
//!
//! Les zonages institutionnels sans coefficient reçoivent une valeur déduite
//! du contexte : appartenance à une zone d'habitat individuel, voisinage d'une
//! telle zone, ou densité moyenne des voisines. Les plans d'îlot rattachés
//! plafonnent ensuite le résultat.

use serde::Serialize;

use crate::geometry::round_to;
use crate::topology::Cadastre;
use crate::types::Zone;

use super::{LinkTable, RegulationKind, RegulationSet};

/// Densité de contexte au-delà de laquelle le voisinage n'est plus « bas »
const LOW_DENSITY_CONTEXT: f64 = 1.4;

/// Valeurs de repli d'un zonage
struct ZoneFallback {
    in_landed_area: f64,
    fringe: f64,
    context: f64,
    fringe_storeys: u32,
    context_storeys: u32,
}

fn fallback_for(zone: &Zone) -> Option<ZoneFallback> {
    let values = match zone {
        Zone::PlaceOfWorship => (1.0, 1.4, 1.6, 4, 5),
        Zone::EducationalInstitution => (1.0, 1.0, 1.4, 3, 4),
        Zone::CivicAndCommunityInstitution => (1.0, 1.4, 1.4, 3, 4),
        _ => return None,
    };
    Some(ZoneFallback {
        in_landed_area: values.0,
        fringe: values.1,
        context: values.2,
        fringe_storeys: values.3,
        context_storeys: values.4,
    })
}

/// Règle ayant fixé le coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotRatioSource {
    Input,
    LandedArea,
    LandedAreaFringe,
    Context,
    StreetBlock,
}

/// Coefficient retenu et limite d'étages qui l'accompagne
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotRatioOutcome {
    pub plot_ratio: Option<f64>,
    pub source: Option<PlotRatioSource>,
    /// Étages implicites du repli par zonage
    pub context_storeys: Option<u32>,
}

/// Moyenne des coefficients de base des voisines, arrondie au dixième
fn context_ratio(cadastre: &Cadastre, idx: usize) -> Option<f64> {
    let ratios: Vec<f64> = cadastre
        .get(idx)
        .neighbours
        .iter()
        .filter_map(|&n| cadastre.get(n).plot_ratio)
        .collect();
    if ratios.is_empty() {
        return None;
    }
    Some(round_to(ratios.iter().sum::<f64>() / ratios.len() as f64, 1))
}

fn landed_storeys(links: &LinkTable, set: &RegulationSet, idx: usize) -> Option<u32> {
    links
        .of(idx)
        .filter(|r| r.kind.is_landed_area())
        .filter_map(|r| set.tables.landed_housing[r.index].storeys)
        .min()
}

/// Coefficient d'emprise effectif d'une parcelle
pub fn resolve_plot_ratio(
    cadastre: &Cadastre,
    links: &LinkTable,
    set: &RegulationSet,
    idx: usize,
) -> PlotRatioOutcome {
    let parcel = cadastre.get(idx);
    let mut outcome = PlotRatioOutcome {
        plot_ratio: parcel.plot_ratio,
        source: parcel.plot_ratio.map(|_| PlotRatioSource::Input),
        context_storeys: None,
    };

    if outcome.plot_ratio.is_none() {
        if let Some(fallback) = fallback_for(&parcel.zone) {
            apply_zone_fallback(cadastre, links, set, idx, &fallback, &mut outcome);
        }
    }

    let street_block = links
        .indices(idx, RegulationKind::StreetBlockPlan)
        .into_iter()
        .filter_map(|i| set.tables.street_blocks[i].plot_ratio)
        .reduce(f64::min);
    if let Some(sbp) = street_block {
        match outcome.plot_ratio {
            Some(current) if current <= sbp => {}
            _ => {
                outcome.plot_ratio = Some(sbp);
                outcome.source = Some(PlotRatioSource::StreetBlock);
            }
        }
    }

    outcome
}

fn apply_zone_fallback(
    cadastre: &Cadastre,
    links: &LinkTable,
    set: &RegulationSet,
    idx: usize,
    fallback: &ZoneFallback,
    outcome: &mut PlotRatioOutcome,
) {
    let parcel = cadastre.get(idx);
    let context = context_ratio(cadastre, idx);
    let low_density = context.is_some_and(|c| c <= LOW_DENSITY_CONTEXT);
    let high_density = context.is_some_and(|c| c > LOW_DENSITY_CONTEXT);
    let near_landed_area = parcel.neighbours.iter().any(|&n| links.has_landed_area(n));
    let near_industry = parcel
        .neighbours
        .iter()
        .any(|&n| cadastre.get(n).zone.is_industrial());

    if links.has_landed_area(idx) && low_density {
        outcome.plot_ratio = Some(fallback.in_landed_area);
        outcome.source = Some(PlotRatioSource::LandedArea);
        outcome.context_storeys = landed_storeys(links, set, idx);
    } else if near_landed_area && low_density {
        outcome.plot_ratio = Some(fallback.fringe);
        outcome.source = Some(PlotRatioSource::LandedAreaFringe);
        outcome.context_storeys = Some(fallback.fringe_storeys);
    } else if high_density || near_industry {
        outcome.plot_ratio = Some(fallback.context);
        outcome.source = Some(PlotRatioSource::Context);
        outcome.context_storeys = Some(fallback.context_storeys);
    }
    // Centre-ville ou contexte inconnu : le coefficient reste indéterminé
}
