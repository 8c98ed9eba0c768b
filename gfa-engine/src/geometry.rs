//! Primitives géométriques : nettoyage d'anneaux, arêtes, bandes et opérations booléennes
//!
//! Convention : tous les polygones manipulés par le moteur ont un anneau
//! extérieur orienté dans le sens anti-horaire. L'intérieur d'une arête est donc
//! à sa gauche, l'extérieur à sa droite.

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Buffer, Coord, Line, LineString, MinimumRotatedRect, MultiPolygon, Polygon};

/// Tolérance numérique des comparaisons de longueurs et surfaces
pub const EPSILON: f64 = 1e-9;

/// Arrondi à `decimals` décimales
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Longueur d'un segment
pub fn segment_length(line: &Line) -> f64 {
    let d = line.delta();
    d.x.hypot(d.y)
}

fn point_segment_distance(p: Coord, a: Coord, b: Coord) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 <= EPSILON {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    (p.x - (a.x + t * dx)).hypot(p.y - (a.y + t * dy))
}

/// Simplifie un anneau fermé : retire les sommets quasi doublons et ceux qui
/// s'écartent de moins de `tolerance` de la droite joignant leurs voisins.
///
/// Retourne `None` si moins de 3 sommets subsistent.
pub fn clean_ring(ring: &LineString, tolerance: f64) -> Option<LineString> {
    let mut coords: Vec<Coord> = ring.0.clone();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords.dedup_by(|b, a| (b.x - a.x).hypot(b.y - a.y) <= tolerance);

    loop {
        let n = coords.len();
        if n < 3 {
            return None;
        }
        let removable = (0..n).find(|&i| {
            let prev = coords[(i + n - 1) % n];
            let next = coords[(i + 1) % n];
            point_segment_distance(coords[i], prev, next) <= tolerance
        });
        match removable {
            Some(i) => {
                coords.remove(i);
            }
            None => break,
        }
    }

    coords.push(coords[0]);
    Some(LineString::new(coords))
}

/// Nettoie un polygone et l'oriente (extérieur anti-horaire)
pub fn clean_polygon(polygon: &Polygon, tolerance: f64) -> Option<Polygon> {
    let exterior = clean_ring(polygon.exterior(), tolerance)?;
    let interiors = polygon
        .interiors()
        .iter()
        .filter_map(|ring| clean_ring(ring, tolerance))
        .collect();
    let cleaned = Polygon::new(exterior, interiors).orient(Direction::Default);
    (cleaned.unsigned_area() > EPSILON).then_some(cleaned)
}

/// Arêtes consécutives de l'anneau extérieur
pub fn boundary_edges(polygon: &Polygon) -> Vec<Line> {
    polygon
        .exterior()
        .lines()
        .filter(|line| segment_length(line) > EPSILON)
        .collect()
}

/// Les 4 côtés du rectangle englobant d'aire minimale, orientés anti-horaire
pub fn bounding_rectangle_edges(polygon: &Polygon) -> Option<[Line; 4]> {
    let rect = polygon.minimum_rotated_rect()?.orient(Direction::Default);
    let lines: Vec<Line> = rect.exterior().lines().collect();
    match lines.as_slice() {
        [a, b, c, d] => Some([*a, *b, *c, *d]),
        _ => None,
    }
}

fn unit_left_normal(line: &Line) -> Option<Coord> {
    let len = segment_length(line);
    if len <= EPSILON {
        return None;
    }
    let d = line.delta();
    Some(Coord {
        x: -d.y / len,
        y: d.x / len,
    })
}

/// Bande intérieure (côté gauche) de largeur `width` le long d'une arête
pub fn inward_band(line: &Line, width: f64) -> Option<Polygon> {
    if width <= EPSILON {
        return None;
    }
    let n = unit_left_normal(line)?;
    let off = Coord {
        x: n.x * width,
        y: n.y * width,
    };
    Some(Polygon::new(
        LineString::new(vec![line.start, line.end, line.end + off, line.start + off]),
        vec![],
    ))
}

/// Bande extérieure (côté droit) de largeur `width` le long d'une arête
pub fn outward_band(line: &Line, width: f64) -> Option<Polygon> {
    if width <= EPSILON {
        return None;
    }
    let n = unit_left_normal(line)?;
    let off = Coord {
        x: -n.x * width,
        y: -n.y * width,
    };
    Some(Polygon::new(
        LineString::new(vec![line.start, line.start + off, line.end + off, line.end]),
        vec![],
    ))
}

/// Enveloppe un polygone en multipolygone
pub fn to_multi(polygon: &Polygon) -> MultiPolygon {
    MultiPolygon::new(vec![polygon.clone()])
}

/// Union de polygones par réduction en arbre
pub fn union_all(polygons: Vec<Polygon>) -> MultiPolygon {
    let mut layer: Vec<MultiPolygon> = polygons
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| {
                pair.iter()
                    .skip(1)
                    .fold(pair[0].clone(), |acc, other| acc.union(other))
            })
            .collect();
    }
    layer.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Surface de l'intersection de deux multipolygones
pub fn overlap_area(a: &MultiPolygon, b: &MultiPolygon) -> f64 {
    if a.0.is_empty() || b.0.is_empty() {
        return 0.0;
    }
    a.intersection(b).unsigned_area()
}

/// Tampon (positif ou négatif) d'un multipolygone
pub fn buffer(geometry: &MultiPolygon, distance: f64) -> MultiPolygon {
    if geometry.0.is_empty() {
        return geometry.clone();
    }
    geometry.buffer(distance)
}

/// Ouverture morphologique : érosion puis dilatation de `width`
///
/// Supprime les languettes plus étroites que `2 × width`.
pub fn opening(geometry: &MultiPolygon, width: f64) -> MultiPolygon {
    buffer(&buffer(geometry, -width), width)
}

/// Supprime les trous dont la surface est inférieure ou égale à `max_hole_area`
pub fn drop_small_holes(geometry: MultiPolygon, max_hole_area: f64) -> MultiPolygon {
    MultiPolygon::new(
        geometry
            .0
            .into_iter()
            .map(|polygon| {
                let (exterior, interiors) = polygon.into_inner();
                let kept = interiors
                    .into_iter()
                    .filter(|ring| Polygon::new(ring.clone(), vec![]).unsigned_area() > max_hole_area)
                    .collect();
                Polygon::new(exterior, kept)
            })
            .collect(),
    )
}

/// Emprise restante après recul de chaque arête vers l'intérieur.
///
/// `setbacks[i]` s'applique à `edges[i]` ; un recul nul laisse l'arête intacte.
/// Un résultat vide est une emprise nulle, pas une erreur.
pub fn setback_footprint(polygon: &Polygon, edges: &[Line], setbacks: &[f64]) -> MultiPolygon {
    let bands: Vec<Polygon> = edges
        .iter()
        .zip(setbacks)
        .filter_map(|(edge, &distance)| inward_band(edge, distance))
        .collect();
    let whole = to_multi(polygon);
    if bands.is_empty() {
        return whole;
    }
    whole.difference(&union_all(bands))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::polygon;

    pub(crate) fn square(x: f64, y: f64, size: f64) -> Polygon {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]
    }

    #[test]
    fn test_clean_ring_removes_collinear_vertex() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.02),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        let cleaned = clean_polygon(&poly, 0.1).unwrap();
        assert_eq!(boundary_edges(&cleaned).len(), 4);
    }

    #[test]
    fn test_clean_polygon_orients_ccw() {
        let cw = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
        ];
        let cleaned = clean_polygon(&cw, 0.1).unwrap();
        assert!(cleaned.signed_area() > 0.0);
    }

    #[test]
    fn test_bands_sides() {
        let edge = Line::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 0.0 });
        let inward = inward_band(&edge, 2.0).unwrap();
        let outward = outward_band(&edge, 1.0).unwrap();
        assert!((inward.unsigned_area() - 20.0).abs() < 1e-9);
        assert!(inward.exterior().0.iter().all(|c| c.y >= 0.0));
        assert!(outward.exterior().0.iter().all(|c| c.y <= 0.0));
        assert!(inward_band(&edge, 0.0).is_none());
    }

    #[test]
    fn test_zero_setback_reproduces_parcel() {
        let parcel = square(0.0, 0.0, 10.0);
        let edges = boundary_edges(&parcel);
        let footprint = setback_footprint(&parcel, &edges, &vec![0.0; edges.len()]);
        assert!((footprint.unsigned_area() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_setback_shrinks_square() {
        let parcel = square(0.0, 0.0, 10.0);
        let edges = boundary_edges(&parcel);
        let footprint = setback_footprint(&parcel, &edges, &vec![1.0; edges.len()]);
        assert!((footprint.unsigned_area() - 64.0).abs() < 1e-6);

        let gone = setback_footprint(&parcel, &edges, &vec![6.0; edges.len()]);
        assert!(gone.unsigned_area() < 1e-6);
    }

    #[test]
    fn test_union_all_merges_adjacent() {
        let merged = union_all(vec![
            square(0.0, 0.0, 10.0),
            square(10.0, 0.0, 10.0),
            square(20.0, 0.0, 10.0),
        ]);
        assert!((merged.unsigned_area() - 300.0).abs() < 1e-6);
        assert!(union_all(vec![]).0.is_empty());
    }

    #[test]
    fn test_drop_small_holes() {
        let hole = LineString::from(vec![(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0), (4.0, 4.0)]);
        let poly = Polygon::new(square(0.0, 0.0, 10.0).exterior().clone(), vec![hole]);
        let filled = drop_small_holes(MultiPolygon::new(vec![poly.clone()]), 5.0);
        assert!((filled.unsigned_area() - 100.0).abs() < 1e-9);
        let kept = drop_small_holes(MultiPolygon::new(vec![poly]), 1.0);
        assert!((kept.unsigned_area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_rectangle_of_square() {
        let edges = bounding_rectangle_edges(&square(0.0, 0.0, 10.0)).unwrap();
        for edge in &edges {
            assert!((segment_length(edge) - 10.0).abs() < 1e-6);
        }
    }
}
