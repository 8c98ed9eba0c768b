//! Reculs par arête, par niveau et par programme
//!
//! Les règles sont des fonctions pures proposant un recul minimal par arête ;
//! elles sont appliquées dans l'ordre de `ADJUSTMENTS` et combinées par
//! maximum. Les arêtes mitoyennes sont ensuite ramenées à zéro.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::classify::Classification;
use crate::types::{EdgeRole, Programme, RoadCategory};
use crate::EngineError;

use super::{LinkTable, RegulationKind, RegulationSet, SetbackKind, StreetBlockPlan};

/// Reculs d'un programme : `levels[niveau][arête]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetbackTable {
    pub programme: Programme,
    pub levels: Vec<Vec<f64>>,
}

impl SetbackTable {
    /// Reculs d'un niveau ; au-delà du dernier niveau défini, le dernier s'applique
    pub fn level(&self, level: usize) -> &[f64] {
        let last = self.levels.len().saturating_sub(1);
        self.levels.get(level.min(last)).map_or(&[], Vec::as_slice)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Chaque niveau doit couvrir exactement les arêtes de la parcelle
    pub fn validate(&self, parcel_id: &str, edge_count: usize) -> Result<(), EngineError> {
        match self.levels.iter().find(|level| level.len() != edge_count) {
            Some(level) => Err(EngineError::EdgeCountMismatch {
                parcel_id: parcel_id.to_string(),
                edges: edge_count,
                setbacks: level.len(),
            }),
            None => Ok(()),
        }
    }
}

/// Reculs d'un plan d'îlot à un niveau, par rôle d'arête
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreetBlockLevel {
    pub front: Option<f64>,
    pub side: Option<f64>,
    pub rear: Option<f64>,
}

impl StreetBlockLevel {
    fn for_role(&self, role: EdgeRole) -> Option<f64> {
        match role {
            EdgeRole::Front => self.front,
            EdgeRole::Side => self.side,
            EdgeRole::Rear => self.rear,
        }
    }
}

/// Valeurs des plans de contrôle retenues pour un programme
#[derive(Debug, Clone, PartialEq)]
pub struct ProgrammeRules {
    pub programme: Programme,
    pub setback: Option<f64>,
    /// Tampon maximal par catégorie de voie
    pub road_buffers: BTreeMap<RoadCategory, f64>,
}

/// Faits par arête nécessaires aux règles de recul
#[derive(Debug, Clone)]
pub struct SetbackContext<'a> {
    pub edge_roles: &'a [Option<EdgeRole>],
    pub road_categories: &'a [BTreeSet<RoadCategory>],
    /// Recul des lignes directrices de conception, par arête
    pub design_setbacks: &'a [Option<f64>],
    pub street_block_levels: &'a [StreetBlockLevel],
    pub party_wall: bool,
    pub party_wall_edges: &'a [usize],
}

impl SetbackContext<'_> {
    fn edge_count(&self) -> usize {
        self.edge_roles.len()
    }
}

type Adjustment = fn(&SetbackContext<'_>, &ProgrammeRules, usize) -> Vec<Option<f64>>;

const ADJUSTMENTS: [(&str, Adjustment); 4] = [
    ("development_control", development_control),
    ("urban_design", urban_design),
    ("street_block", street_block),
    ("road_category", road_category),
];

fn development_control(ctx: &SetbackContext<'_>, rules: &ProgrammeRules, _: usize) -> Vec<Option<f64>> {
    vec![rules.setback; ctx.edge_count()]
}

fn urban_design(ctx: &SetbackContext<'_>, _: &ProgrammeRules, _: usize) -> Vec<Option<f64>> {
    ctx.design_setbacks.to_vec()
}

fn street_block(ctx: &SetbackContext<'_>, _: &ProgrammeRules, level: usize) -> Vec<Option<f64>> {
    let Some(values) = ctx.street_block_levels.get(level) else {
        return vec![None; ctx.edge_count()];
    };
    ctx.edge_roles
        .iter()
        .map(|role| role.and_then(|r| values.for_role(r)))
        .collect()
}

fn road_category(ctx: &SetbackContext<'_>, rules: &ProgrammeRules, _: usize) -> Vec<Option<f64>> {
    ctx.road_categories
        .iter()
        .map(|categories| {
            categories
                .iter()
                .filter_map(|c| rules.road_buffers.get(c).copied())
                .reduce(f64::max)
        })
        .collect()
}

/// Arêtes ramenées à zéro pour un programme
fn party_wall_override(ctx: &SetbackContext<'_>, programme: Programme) -> BTreeSet<usize> {
    if !ctx.party_wall || programme.is_detached() {
        return BTreeSet::new();
    }
    let mut edges: BTreeSet<usize> = ctx.party_wall_edges.iter().copied().collect();
    if programme.is_attached() {
        edges.extend(
            ctx.edge_roles
                .iter()
                .enumerate()
                .filter(|(_, r)| **r == Some(EdgeRole::Side))
                .map(|(i, _)| i),
        );
    }
    edges
}

/// Table de reculs d'un programme
pub fn resolve_setbacks(ctx: &SetbackContext<'_>, rules: &ProgrammeRules) -> SetbackTable {
    let level_count = ctx.street_block_levels.len().max(1);
    let zeroed = party_wall_override(ctx, rules.programme);

    let levels = (0..level_count)
        .map(|level| {
            let mut values = vec![0.0_f64; ctx.edge_count()];
            for (_, adjustment) in &ADJUSTMENTS {
                for (value, proposed) in values.iter_mut().zip(adjustment(ctx, rules, level)) {
                    if let Some(p) = proposed.filter(|p| p.is_finite()) {
                        *value = value.max(p);
                    }
                }
            }
            for &i in &zeroed {
                if let Some(value) = values.get_mut(i) {
                    *value = 0.0;
                }
            }
            values
        })
        .collect();

    SetbackTable {
        programme: rules.programme,
        levels,
    }
}

/// Reculs des plans d'îlot rattachés, un élément par niveau de 0 au plus
/// haut niveau défini. Chaque plan garde son dernier recul défini aux niveaux
/// supérieurs ; entre plans, le plus exigeant l'emporte.
pub fn street_block_levels(links: &LinkTable, set: &RegulationSet, idx: usize) -> Vec<StreetBlockLevel> {
    let plans: Vec<_> = links
        .indices(idx, RegulationKind::StreetBlockPlan)
        .into_iter()
        .map(|i| &set.tables.street_blocks[i])
        .collect();
    combine_street_blocks(&plans)
}

fn combine_street_blocks(plans: &[&StreetBlockPlan]) -> Vec<StreetBlockLevel> {
    let Some(top) = plans.iter().filter_map(|p| p.max_level()).max() else {
        return Vec::new();
    };
    let widest = |kind: SetbackKind, level: u32| {
        plans
            .iter()
            .filter_map(|p| p.setback_up_to(kind, level))
            .reduce(f64::max)
    };
    (0..=top)
        .map(|level| StreetBlockLevel {
            front: widest(SetbackKind::Front, level),
            side: widest(SetbackKind::Side, level),
            rear: widest(SetbackKind::Rear, level),
        })
        .collect()
}

/// Recul des lignes directrices de conception pour chaque arête : celle dont
/// la géométrie recouvre le plus la sonde, au-delà du ratio minimal.
pub fn design_guideline_setbacks(
    classification: &Classification,
    links: &LinkTable,
    set: &RegulationSet,
    idx: usize,
    min_overlap_ratio: f64,
) -> Vec<Option<f64>> {
    let guidelines: Vec<_> = links
        .indices(idx, RegulationKind::UrbanDesignGuideline)
        .into_iter()
        .map(|i| &set.tables.urban_design[i])
        .filter_map(|g| Some((g.geometry.as_ref()?, g.setback?)))
        .collect();

    classification
        .probes
        .iter()
        .map(|probe| {
            let probe = probe.as_ref()?;
            guidelines
                .iter()
                .map(|(geometry, setback)| (probe.overlap_ratio(geometry), *setback))
                .filter(|(ratio, _)| *ratio > min_overlap_ratio)
                .max_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, setback)| setback)
        })
        .collect()
}

/// Tampons routiers maximaux par catégorie, pour un ensemble de plans
pub fn road_buffers<'a>(
    set: &RegulationSet,
    road_category_ids: impl IntoIterator<Item = &'a String>,
) -> BTreeMap<RoadCategory, f64> {
    let mut buffers: BTreeMap<RoadCategory, f64> = BTreeMap::new();
    for id in road_category_ids {
        let Some(r) = set.lookup(id).filter(|r| r.kind == RegulationKind::RoadCategory) else {
            continue;
        };
        let rule = &set.tables.road_categories[r.index];
        let entry = buffers.entry(rule.category).or_insert(rule.buffer);
        *entry = entry.max(rule.buffer);
    }
    buffers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regulation::LevelSetback;

    const ROLES: [Option<EdgeRole>; 4] = [
        Some(EdgeRole::Front),
        Some(EdgeRole::Side),
        Some(EdgeRole::Rear),
        Some(EdgeRole::Side),
    ];

    fn rules(programme: Programme, setback: Option<f64>) -> ProgrammeRules {
        ProgrammeRules {
            programme,
            setback,
            road_buffers: BTreeMap::new(),
        }
    }

    fn context<'a>(
        categories: &'a [BTreeSet<RoadCategory>],
        design: &'a [Option<f64>],
        levels: &'a [StreetBlockLevel],
    ) -> SetbackContext<'a> {
        SetbackContext {
            edge_roles: &ROLES,
            road_categories: categories,
            design_setbacks: design,
            street_block_levels: levels,
            party_wall: false,
            party_wall_edges: &[],
        }
    }

    #[test]
    fn test_rules_combine_by_maximum() {
        let mut categories = vec![BTreeSet::new(); 4];
        categories[0].insert(RoadCategory::Category2);
        let design = [None, Some(5.0), None, None];
        let ctx = context(&categories, &design, &[]);

        let mut flat = rules(Programme::Flat, Some(3.0));
        flat.road_buffers.insert(RoadCategory::Category2, 7.5);

        let table = resolve_setbacks(&ctx, &flat);
        assert_eq!(table.levels, vec![vec![7.5, 5.0, 3.0, 3.0]]);
        assert!(table.validate("P", 4).is_ok());
    }

    #[test]
    fn test_street_block_levels_and_reuse() {
        let categories = vec![BTreeSet::new(); 4];
        let design = [None; 4];
        let levels = [
            StreetBlockLevel { front: Some(3.0), side: None, rear: Some(2.0) },
            StreetBlockLevel { front: Some(6.0), side: Some(1.0), rear: Some(2.0) },
        ];
        let ctx = context(&categories, &design, &levels);
        let table = resolve_setbacks(&ctx, &rules(Programme::Commercial, None));
        assert_eq!(table.level_count(), 2);
        assert_eq!(table.level(0), &[3.0, 0.0, 2.0, 0.0]);
        assert_eq!(table.level(1), &[6.0, 1.0, 2.0, 1.0]);
        assert_eq!(table.level(7), table.level(1));
    }

    fn plan(id: &str, setbacks: &[(SetbackKind, u32, f64)]) -> StreetBlockPlan {
        StreetBlockPlan {
            id: id.to_string(),
            geometry: None,
            setbacks: setbacks
                .iter()
                .map(|&(kind, level, distance)| LevelSetback { kind, level, distance })
                .collect(),
            storeys: None,
            plot_ratio: None,
            programmes: vec![],
        }
    }

    #[test]
    fn test_sparse_street_block_levels() {
        let sbp = plan(
            "S",
            &[
                (SetbackKind::Front, 0, 3.0),
                (SetbackKind::Front, 3, 10.0),
                (SetbackKind::Side, 1, 2.0),
            ],
        );
        let levels = combine_street_blocks(&[&sbp]);
        assert_eq!(levels.len(), 4);
        let fronts: Vec<_> = levels.iter().map(|l| l.front).collect();
        assert_eq!(fronts, vec![Some(3.0), Some(3.0), Some(3.0), Some(10.0)]);
        let sides: Vec<_> = levels.iter().map(|l| l.side).collect();
        assert_eq!(sides, vec![None, Some(2.0), Some(2.0), Some(2.0)]);

        let categories = vec![BTreeSet::new(); 4];
        let design = [None; 4];
        let ctx = context(&categories, &design, &levels);
        let table = resolve_setbacks(&ctx, &rules(Programme::Commercial, None));
        assert_eq!(table.level(1)[0], 3.0);
        assert_eq!(table.level(3)[0], 10.0);
        assert_eq!(table.level(9)[0], 10.0);
    }

    #[test]
    fn test_plans_with_different_level_counts() {
        let a = plan("A", &[(SetbackKind::Front, 0, 3.0), (SetbackKind::Front, 1, 4.0)]);
        let b = plan("B", &[(SetbackKind::Front, 0, 10.0)]);
        let levels = combine_street_blocks(&[&a, &b]);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].front, Some(10.0));
        assert_eq!(levels[1].front, Some(10.0));
        assert!(combine_street_blocks(&[]).is_empty());
    }

    #[test]
    fn test_larger_sources_never_lower_setbacks() {
        let mut categories = vec![BTreeSet::new(); 4];
        categories[0].insert(RoadCategory::Category1);
        categories[1].insert(RoadCategory::Category1);
        let design = [None; 4];

        let mut previous: Option<SetbackTable> = None;
        for step in 0..6 {
            let distance = step as f64 * 1.5;
            let levels = [
                StreetBlockLevel { front: Some(distance), side: Some(1.0), rear: None },
                StreetBlockLevel { front: Some(distance + 2.0), side: Some(distance), rear: Some(distance) },
            ];
            let ctx = context(&categories, &design, &levels);
            let mut flat = rules(Programme::Flat, Some(2.0));
            flat.road_buffers.insert(RoadCategory::Category1, 4.0 + distance);

            let table = resolve_setbacks(&ctx, &flat);
            if let Some(previous) = &previous {
                for level in 0..2 {
                    for (now, before) in table.level(level).iter().zip(previous.level(level)) {
                        assert!(now >= before, "level {level}: {now} < {before}");
                    }
                }
            }
            previous = Some(table);
        }
    }

    #[test]
    fn test_party_wall_overrides_per_programme() {
        let categories = vec![BTreeSet::new(); 4];
        let design = [None; 4];
        let mut ctx = context(&categories, &design, &[]);
        ctx.party_wall = true;
        let party_wall_edges = [1];
        ctx.party_wall_edges = &party_wall_edges;

        let terrace = resolve_setbacks(&ctx, &rules(Programme::TerraceType2, Some(2.0)));
        assert_eq!(terrace.level(0), &[2.0, 0.0, 2.0, 0.0]);

        let flat = resolve_setbacks(&ctx, &rules(Programme::Flat, Some(2.0)));
        assert_eq!(flat.level(0), &[2.0, 0.0, 2.0, 2.0]);

        let bungalow = resolve_setbacks(&ctx, &rules(Programme::Bungalow, Some(2.0)));
        assert_eq!(bungalow.level(0), &[2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_edge_count_mismatch() {
        let table = SetbackTable {
            programme: Programme::Flat,
            levels: vec![vec![1.0, 1.0, 1.0]],
        };
        let err = table.validate("P", 4).unwrap_err();
        assert!(err.is_fatal());
    }
}
