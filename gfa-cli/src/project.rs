//! Projection des couches d'entrée vers un CRS métrique
//!
//! Les calculs de l'estimation sont exprimés en mètres : les données
//! géographiques (EPSG:4326) sont projetées en Web Mercator (EPSG:3857),
//! tout autre SRID est supposé métrique et conservé tel quel.

use geo::{Coord, Geometry, MapCoords};

/// Rayon équatorial WGS84 (m)
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude maximale représentable en Web Mercator
const MAX_LATITUDE: f64 = 85.0;

pub const WGS84: u32 = 4326;
pub const WEB_MERCATOR: u32 = 3857;

/// Projection appliquée à une couche
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Coordonnées déjà métriques
    Identity { srid: u32 },
    /// Degrés WGS84 vers Web Mercator
    GeographicToWebMercator,
}

impl Projection {
    pub fn for_srid(srid: u32) -> Self {
        if srid == WGS84 {
            Self::GeographicToWebMercator
        } else {
            Self::Identity { srid }
        }
    }

    /// SRID des géométries projetées
    pub fn output_srid(self) -> u32 {
        match self {
            Self::Identity { srid } => srid,
            Self::GeographicToWebMercator => WEB_MERCATOR,
        }
    }

    pub fn project(self, geometry: Geometry) -> Geometry {
        match self {
            Self::Identity { .. } => geometry,
            Self::GeographicToWebMercator => geometry.map_coords(to_web_mercator),
        }
    }
}

/// Degrés (lon, lat) vers Web Mercator
pub fn to_web_mercator(c: Coord) -> Coord {
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: EARTH_RADIUS * c.x.to_radians(),
        y: EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}
