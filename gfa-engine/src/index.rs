//! Index spatial (R-tree des rectangles englobants)

use geo::{BoundingRect, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// Rectangle englobant indexé par position dans une table
struct IndexedBox {
    idx: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// Rectangle englobant d'une géométrie, `None` si elle est vide
pub fn rect_of<G: BoundingRect<f64>>(geometry: &G) -> Option<Rect> {
    geometry.bounding_rect().into()
}

/// Index de recherche des candidats par recouvrement de rectangles
pub struct SpatialIndex {
    tree: RTree<IndexedBox>,
}

impl SpatialIndex {
    /// Construit l'index en une passe (bulk load)
    pub fn build(items: impl IntoIterator<Item = (usize, Rect)>) -> Self {
        let boxes = items
            .into_iter()
            .map(|(idx, rect)| IndexedBox {
                idx,
                env: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(boxes),
        }
    }

    /// Positions dont le rectangle recoupe `rect` élargi de `margin`, triées
    pub fn candidates(&self, rect: &Rect, margin: f64) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [rect.min().x - margin, rect.min().y - margin],
            [rect.max().x + margin, rect.max().y + margin],
        );
        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.idx)
            .collect();
        found.sort_unstable();
        found
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn test_candidates_with_margin() {
        let index = SpatialIndex::build(vec![
            (0, Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 })),
            (1, Rect::new(coord! { x: 12.0, y: 0.0 }, coord! { x: 20.0, y: 10.0 })),
            (2, Rect::new(coord! { x: 100.0, y: 100.0 }, coord! { x: 110.0, y: 110.0 })),
        ]);
        let probe = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });
        assert_eq!(index.candidates(&probe, 0.0), vec![0]);
        assert_eq!(index.candidates(&probe, 3.0), vec![0, 1]);
        assert_eq!(index.len(), 3);
    }
}
