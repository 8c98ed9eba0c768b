//! Agrégation de la surface de plancher
//!
//! Pour chaque partie, les surfaces d'emprise des niveaux sont cumulées sur
//! le nombre d'étages autorisé, chaque étage étant plafonné par le coefficient
//! d'emprise au sol. Le total est ensuite plafonné par `surface × coefficient
//! d'emprise`, qui sert aussi de repli quand l'enveloppe est indéterminée.

use crate::types::{Gfa, StoreyLimit};

/// Limite d'étages et surfaces d'emprise par niveau d'une partie
#[derive(Debug, Clone, PartialEq)]
pub struct PartEnvelope {
    pub storeys: StoreyLimit,
    pub footprint_areas: Vec<f64>,
}

/// Surface de plancher d'une partie.
///
/// Les étages au-delà du dernier niveau d'emprise reprennent la surface du
/// dernier niveau. `None` quand des étages sont autorisés sans aucune emprise.
pub fn part_gfa(storeys: u32, footprint_areas: &[f64], parcel_area: f64, site_coverage: f64) -> Option<f64> {
    if storeys == 0 {
        return Some(0.0);
    }
    let last = footprint_areas.last()?;
    let cap = parcel_area * site_coverage;
    let total = (0..storeys as usize)
        .map(|storey| footprint_areas.get(storey).unwrap_or(last).min(cap))
        .sum();
    Some(total)
}

/// Surface de plancher d'une parcelle pour un programme
pub fn parcel_gfa(parts: &[PartEnvelope], parcel_area: f64, site_coverage: f64, plot_ratio: Option<f64>) -> Gfa {
    let ratio_cap = plot_ratio.map(|ratio| parcel_area * ratio);

    let envelope: Option<f64> = if parts.is_empty() {
        None
    } else {
        parts
            .iter()
            .map(|part| {
                let storeys = part.storeys.finite()?;
                part_gfa(storeys, &part.footprint_areas, parcel_area, site_coverage)
            })
            .sum()
    };

    match (envelope, ratio_cap) {
        (Some(gfa), Some(cap)) => Gfa::Known(gfa.min(cap)),
        (Some(gfa), None) => Gfa::Known(gfa),
        (None, Some(cap)) => Gfa::Known(cap),
        (None, None) => Gfa::Unknown,
    }
}

/// Repli sans enveloppe : `surface × coefficient`
pub fn plot_ratio_gfa(parcel_area: f64, plot_ratio: Option<f64>) -> Gfa {
    match plot_ratio {
        Some(ratio) => Gfa::Known(parcel_area * ratio),
        None => Gfa::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_only() {
        assert_eq!(parcel_gfa(&[], 1000.0, 1.0, Some(2.0)), Gfa::Known(2000.0));
        assert_eq!(parcel_gfa(&[], 1000.0, 1.0, None), Gfa::Unknown);
        assert_eq!(plot_ratio_gfa(1000.0, Some(1.4)), Gfa::Known(1400.0));
    }

    #[test]
    fn test_envelope_capped_by_ratio() {
        let part = PartEnvelope {
            storeys: StoreyLimit::Finite(3),
            footprint_areas: vec![800.0, 800.0, 600.0],
        };
        assert_eq!(part_gfa(3, &part.footprint_areas, 1000.0, 0.9), Some(2200.0));
        assert_eq!(
            parcel_gfa(&[part.clone()], 1000.0, 0.9, Some(2.0)),
            Gfa::Known(2000.0)
        );
        assert_eq!(parcel_gfa(&[part], 1000.0, 0.9, None), Gfa::Known(2200.0));
    }

    #[test]
    fn test_site_coverage_caps_each_storey() {
        assert_eq!(part_gfa(2, &[900.0, 500.0], 1000.0, 0.6), Some(1100.0));
    }

    #[test]
    fn test_last_level_repeats() {
        assert_eq!(part_gfa(4, &[400.0, 300.0], 1000.0, 1.0), Some(1300.0));
        assert_eq!(part_gfa(1, &[400.0, 300.0], 1000.0, 1.0), Some(400.0));
    }

    #[test]
    fn test_zero_storeys_and_empty_footprint() {
        assert_eq!(part_gfa(0, &[], 1000.0, 1.0), Some(0.0));
        assert_eq!(part_gfa(2, &[], 1000.0, 1.0), None);
        assert_eq!(part_gfa(3, &[0.0], 1000.0, 1.0), Some(0.0));
    }

    #[test]
    fn test_unconstrained_part_falls_back_to_ratio() {
        let parts = [
            PartEnvelope {
                storeys: StoreyLimit::Finite(2),
                footprint_areas: vec![300.0],
            },
            PartEnvelope {
                storeys: StoreyLimit::Unconstrained,
                footprint_areas: vec![400.0],
            },
        ];
        assert_eq!(parcel_gfa(&parts, 1000.0, 1.0, Some(1.5)), Gfa::Known(1500.0));
        assert_eq!(parcel_gfa(&parts, 1000.0, 1.0, None), Gfa::Unknown);
    }

    #[test]
    fn test_multi_part_sum() {
        let parts = [
            PartEnvelope {
                storeys: StoreyLimit::Finite(2),
                footprint_areas: vec![300.0],
            },
            PartEnvelope {
                storeys: StoreyLimit::Finite(4),
                footprint_areas: vec![200.0, 150.0],
            },
        ];
        assert_eq!(parcel_gfa(&parts, 1000.0, 1.0, Some(3.0)), Gfa::Known(1250.0));
    }
}
