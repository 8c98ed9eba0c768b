//! Export des résultats d'estimation

pub mod geojson;
pub mod json;

pub use self::geojson::export_to_geojson;
pub use self::json::export_estimates;
