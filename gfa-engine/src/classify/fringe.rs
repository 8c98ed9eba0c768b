//! Masse résidentielle contiguë et détection des parcelles de lisière

use geo::{Area, BooleanOps, MultiPolygon, Polygon};
use rayon::prelude::*;
use tracing::debug;

use crate::config::Thresholds;
use crate::geometry::{buffer, drop_small_holes, to_multi};
use crate::index::{rect_of, SpatialIndex};
use crate::topology::{Cadastre, Parcel};

/// Union des parcelles résidentielles dilatées, trous mineurs bouchés, puis érodées
pub struct ResidentialMass {
    parts: Vec<Polygon>,
    index: SpatialIndex,
}

impl ResidentialMass {
    pub fn build(cadastre: &Cadastre, thresholds: &Thresholds) -> Self {
        let grown = cadastre
            .parcels()
            .par_iter()
            .filter(|p| p.zone.is_residential())
            .map(|p| buffer(&p.multi(), thresholds.fringe_buffer))
            .reduce(|| MultiPolygon::new(vec![]), |a, b| union_multi(&a, &b));

        let filled = drop_small_holes(grown, thresholds.fringe_hole_area);
        let mass = buffer(&filled, -thresholds.fringe_buffer);
        debug!(components = mass.0.len(), "Residential mass built");

        let parts = mass.0;
        let index = SpatialIndex::build(
            parts
                .iter()
                .enumerate()
                .filter_map(|(i, p)| rect_of(p).map(|r| (i, r))),
        );
        Self { parts, index }
    }

    /// Vrai si la parcelle dilatée déborde de la masse résidentielle
    pub fn is_fringe(&self, parcel: &Parcel, thresholds: &Thresholds) -> bool {
        let grown = buffer(&parcel.multi(), thresholds.fringe_test_buffer);
        let Some(rect) = rect_of(&grown) else {
            return false;
        };
        let inside: f64 = self
            .index
            .candidates(&rect, 0.0)
            .into_iter()
            .map(|k| grown.intersection(&to_multi(&self.parts[k])).unsigned_area())
            .sum();
        inside.round() < grown.unsigned_area().round()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

fn union_multi(a: &MultiPolygon, b: &MultiPolygon) -> MultiPolygon {
    if a.0.is_empty() {
        return b.clone();
    }
    if b.0.is_empty() {
        return a.clone();
    }
    a.union(b)
}
