//! Largeur et profondeur moyennes d'une parcelle
//!
//! Dix lignes de sonde régulièrement espacées, parallèles à un côté du
//! rectangle englobant, sont découpées par la parcelle. La valeur retenue est
//! la médiane des longueurs découpées.

use geo::{BooleanOps, Coord, Line, LineString, MultiLineString, Polygon};

use crate::geometry::{round_to, segment_length, to_multi, EPSILON};

/// Nombre de lignes de sonde
const PROBE_COUNT: usize = 10;

/// Longueur médiane des sondes parallèles à `along`, décalées vers l'intérieur
/// du rectangle sur la distance `across`.
pub fn average_span(polygon: &Polygon, along: &Line, across: f64) -> Option<f64> {
    let len = segment_length(along);
    if len <= EPSILON || across <= EPSILON {
        return None;
    }
    let d = along.delta();
    let normal = Coord {
        x: -d.y / len,
        y: d.x / len,
    };

    let shape = to_multi(polygon);
    let mut lengths: Vec<f64> = (1..=PROBE_COUNT)
        .map(|k| {
            let offset = across * k as f64 / (PROBE_COUNT + 1) as f64;
            let shift = Coord {
                x: normal.x * offset,
                y: normal.y * offset,
            };
            let probe = MultiLineString::new(vec![LineString::new(vec![
                along.start + shift,
                along.end + shift,
            ])]);
            clipped_length(&shape.clip(&probe, false))
        })
        .collect();

    lengths.sort_by(f64::total_cmp);
    let mid = PROBE_COUNT / 2;
    Some(round_to((lengths[mid - 1] + lengths[mid]) / 2.0, 3))
}

fn clipped_length(lines: &MultiLineString) -> f64 {
    lines
        .0
        .iter()
        .flat_map(|ls| ls.lines())
        .map(|line| segment_length(&line))
        .sum()
}
