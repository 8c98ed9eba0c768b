//! Chargement d'un instantané d'entrée
//!
//! - couches GeoJSON des parcelles et du réseau routier
//! - fichier JSON des réglementations, une table par type
//! - table JSON optionnelle des liens parcelle / réglementation
//!
//! Les géométries sont projetées dans le CRS de calcul dès la lecture.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geo::{Geometry, GeometryCollection, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use gfa_engine::regulation::{
    AreaRegulation, DcpConditions, DevelopmentControlPlan, HeightControlPlan, LandedHousingArea, LevelSetback,
    PlotRatioCondition, RoadCategoryRule, SetbackKind, StreetBlockPlan, UrbanDesignGuideline,
};
use gfa_engine::{
    EngineInput, ParcelRecord, Programme, RegulationKind, RegulationLink, RegulationSet, RegulationTables,
    RoadCategory, RoadRecord, RoadType, Zone,
};

use crate::project::Projection;
use crate::report::InputFingerprint;

/// Défauts d'un fichier d'entrée
#[derive(Debug, Error)]
pub enum InputError {
    #[error("feature #{index} has no '{property}' property")]
    MissingProperty { index: usize, property: String },

    #[error("feature {id}: unsupported geometry: {source}")]
    Geometry {
        id: String,
        #[source]
        source: geojson::Error,
    },

    #[error("regulation {id}: {message}")]
    Regulation { id: String, message: String },
}

/// Noms des propriétés lues dans les couches GeoJSON
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldNames {
    pub id: String,
    pub zone: String,
    pub plot_ratio: String,
    pub road_type: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            zone: "zone".to_string(),
            plot_ratio: "plot_ratio".to_string(),
            road_type: "road_type".to_string(),
        }
    }
}

/// Chemins d'un instantané
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub parcels: PathBuf,
    pub roads: Option<PathBuf>,
    pub regulations: Option<PathBuf>,
    pub links: Option<PathBuf>,
}

/// Instantané chargé, prêt pour le moteur
#[derive(Debug)]
pub struct Snapshot {
    pub input: EngineInput,
    pub fingerprints: Vec<InputFingerprint>,
}

/// Charge toutes les couches d'un instantané
pub fn load_snapshot(paths: &SnapshotPaths, projection: Projection, fields: &FieldNames) -> Result<Snapshot> {
    let mut fingerprints = vec![InputFingerprint::of_file("parcels", &paths.parcels)?];

    let parcels = load_parcels(&paths.parcels, projection, fields)?;

    let roads = match &paths.roads {
        Some(path) => {
            fingerprints.push(InputFingerprint::of_file("roads", path)?);
            load_roads(path, projection, fields)?
        }
        None => Vec::new(),
    };

    let tables = match &paths.regulations {
        Some(path) => {
            fingerprints.push(InputFingerprint::of_file("regulations", path)?);
            load_regulations(path, projection)?
        }
        None => RegulationTables::default(),
    };
    let regulations = RegulationSet::new(tables).context("Invalid regulation tables")?;

    let links = match &paths.links {
        Some(path) => {
            fingerprints.push(InputFingerprint::of_file("links", path)?);
            load_links(path, &regulations)?
        }
        None => Vec::new(),
    };

    info!(
        parcels = parcels.len(),
        roads = roads.len(),
        regulations = regulations.len(),
        links = links.len(),
        "Snapshot loaded"
    );

    Ok(Snapshot {
        input: EngineInput {
            parcels,
            roads,
            regulations,
            links,
        },
        fingerprints,
    })
}

fn read_collection(path: &Path) -> Result<FeatureCollection> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read GeoJSON file: {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .context(format!("Failed to parse GeoJSON: {}", path.display()))?;
    FeatureCollection::try_from(geojson).context(format!("Not a FeatureCollection: {}", path.display()))
}

/// Valeur textuelle d'une propriété (nombres acceptés)
fn property_string(feature: &Feature, name: &str) -> Option<String> {
    match feature.property(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn feature_id(feature: &Feature, index: usize, fields: &FieldNames) -> Result<String, InputError> {
    if let Some(id) = property_string(feature, &fields.id) {
        return Ok(id);
    }
    match &feature.id {
        Some(geojson::feature::Id::String(s)) => Ok(s.clone()),
        Some(geojson::feature::Id::Number(n)) => Ok(n.to_string()),
        None => Err(InputError::MissingProperty {
            index,
            property: fields.id.clone(),
        }),
    }
}

/// Coefficient numérique ; les valeurs textuelles non numériques
/// (« EVA », « SDP »...) sont absentes.
pub fn parse_ratio(value: &Value) -> Option<f64> {
    let ratio = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => fast_float::parse::<f64, _>(s.trim()).ok(),
        _ => None,
    };
    ratio.filter(|r| r.is_finite() && *r >= 0.0)
}

fn convert_geometry(id: &str, geometry: geojson::Geometry, projection: Projection) -> Result<Geometry, InputError> {
    let geometry = Geometry::try_from(geometry).map_err(|source| InputError::Geometry {
        id: id.to_string(),
        source,
    })?;
    Ok(projection.project(geometry))
}

/// Couche des parcelles.
///
/// Une géométrie absente est conservée vide : le moteur exclut alors la
/// parcelle avec un problème d'audit plutôt que d'interrompre le lot.
pub fn load_parcels(path: &Path, projection: Projection, fields: &FieldNames) -> Result<Vec<ParcelRecord>> {
    let collection = read_collection(path)?;
    let parcels: Result<Vec<ParcelRecord>, InputError> = collection
        .features
        .into_par_iter()
        .enumerate()
        .map(|(index, mut feature)| {
            let id = feature_id(&feature, index, fields)?;
            let zone = property_string(&feature, &fields.zone)
                .map(|label| Zone::from_label(&label))
                .ok_or_else(|| InputError::MissingProperty {
                    index,
                    property: fields.zone.clone(),
                })?;
            let plot_ratio = feature.property(&fields.plot_ratio).and_then(parse_ratio);
            let geometry = match feature.geometry.take() {
                Some(geometry) => convert_geometry(&id, geometry, projection)?,
                None => Geometry::GeometryCollection(GeometryCollection::default()),
            };
            Ok(ParcelRecord {
                id,
                geometry,
                zone,
                plot_ratio,
            })
        })
        .collect();
    let parcels = parcels.context(format!("Invalid parcel layer: {}", path.display()))?;
    debug!(path = %path.display(), count = parcels.len(), "Parcels read");
    Ok(parcels)
}

/// Couche du réseau routier ; les tronçons hors typologie sont ignorés
pub fn load_roads(path: &Path, projection: Projection, fields: &FieldNames) -> Result<Vec<RoadRecord>> {
    let collection = read_collection(path)?;
    let mut roads = Vec::with_capacity(collection.features.len());
    let mut ignored = 0usize;
    for (index, mut feature) in collection.features.into_iter().enumerate() {
        let Some(label) = property_string(&feature, &fields.road_type) else {
            ignored += 1;
            continue;
        };
        let road_type = match RoadType::parse(&label) {
            Ok(Some(road_type)) => road_type,
            Ok(None) => {
                ignored += 1;
                continue;
            }
            Err(e) => {
                warn!(feature = index, error = %e, "Road feature ignored");
                ignored += 1;
                continue;
            }
        };
        let Some(geometry) = feature.geometry.take() else {
            ignored += 1;
            continue;
        };
        let geometry = convert_geometry(&format!("road #{index}"), geometry, projection)?;
        roads.push(RoadRecord { geometry, road_type });
    }
    debug!(path = %path.display(), count = roads.len(), ignored, "Roads read");
    Ok(roads)
}

#[derive(Debug, Deserialize)]
struct HeightControlDto {
    id: String,
    geometry: Option<geojson::Geometry>,
    storeys: Option<u32>,
    abs_height: Option<f64>,
    additional_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LevelSetbackDto {
    kind: String,
    #[serde(default)]
    level: u32,
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct StreetBlockDto {
    id: String,
    geometry: Option<geojson::Geometry>,
    #[serde(default)]
    setbacks: Vec<LevelSetbackDto>,
    storeys: Option<u32>,
    #[serde(default)]
    plot_ratio: Value,
    #[serde(default)]
    programmes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UrbanDesignDto {
    id: String,
    geometry: Option<geojson::Geometry>,
    storeys: Option<u32>,
    setback: Option<f64>,
    #[serde(default)]
    party_wall: bool,
    additional_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LandedHousingDto {
    id: String,
    geometry: Option<geojson::Geometry>,
    #[serde(default)]
    good_class: bool,
    storeys: Option<u32>,
    #[serde(default)]
    programmes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PlotRatioConditionDto {
    value: f64,
    #[serde(default)]
    above: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConditionsDto {
    zones: Vec<String>,
    neighbour_zones: Vec<String>,
    in_area_regs: Vec<String>,
    in_central_area: Option<bool>,
    fringe: bool,
    corner: bool,
    abuts_road: bool,
    abuts_gcba: bool,
    in_gcba: bool,
    plot_ratio: Option<PlotRatioConditionDto>,
}

#[derive(Debug, Deserialize)]
struct DevelopmentControlDto {
    id: String,
    #[serde(default)]
    programme: String,
    #[serde(default)]
    plot_ratio: Value,
    setback: Option<f64>,
    storeys: Option<u32>,
    site_coverage: Option<f64>,
    #[serde(default)]
    road_categories: Vec<String>,
    #[serde(default)]
    conditions: ConditionsDto,
}

#[derive(Debug, Deserialize)]
struct RoadCategoryDto {
    id: String,
    category: u8,
    buffer: f64,
}

#[derive(Debug, Deserialize)]
struct AreaDto {
    id: String,
    kind: String,
    geometry: Option<geojson::Geometry>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegulationFile {
    height_control: Vec<HeightControlDto>,
    street_blocks: Vec<StreetBlockDto>,
    urban_design: Vec<UrbanDesignDto>,
    landed_housing: Vec<LandedHousingDto>,
    development_control: Vec<DevelopmentControlDto>,
    road_categories: Vec<RoadCategoryDto>,
    areas: Vec<AreaDto>,
}

fn regulation_error(id: &str, message: impl Into<String>) -> InputError {
    InputError::Regulation {
        id: id.to_string(),
        message: message.into(),
    }
}

/// Géométrie surfacique d'une réglementation
fn area_geometry(
    id: &str,
    geometry: Option<geojson::Geometry>,
    projection: Projection,
) -> Result<Option<MultiPolygon>, InputError> {
    let Some(geometry) = geometry else {
        return Ok(None);
    };
    match convert_geometry(id, geometry, projection)? {
        Geometry::Polygon(p) => Ok(Some(MultiPolygon::new(vec![p]))),
        Geometry::MultiPolygon(mp) => Ok(Some(mp)),
        Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for g in gc {
                match g {
                    Geometry::Polygon(p) => polygons.push(p),
                    Geometry::MultiPolygon(mp) => polygons.extend(mp),
                    _ => return Err(regulation_error(id, "collection member is not a polygon")),
                }
            }
            Ok(Some(MultiPolygon::new(polygons)))
        }
        _ => Err(regulation_error(id, "geometry is not a polygon")),
    }
}

fn programmes(id: &str, labels: &[String]) -> Result<Vec<Programme>, InputError> {
    let mut out = Vec::new();
    for label in labels {
        let family = Programme::parse_family(label).map_err(|e| regulation_error(id, e.to_string()))?;
        for p in family {
            if !out.contains(&p) {
                out.push(p);
            }
        }
    }
    Ok(out)
}

fn zones(labels: &[String]) -> Vec<Zone> {
    labels.iter().map(|l| Zone::from_label(l)).collect()
}

/// Un plan de contrôle par programme de la famille désignée
fn development_control(dto: DevelopmentControlDto) -> Result<Vec<DevelopmentControlPlan>, InputError> {
    let family = Programme::parse_family(&dto.programme).map_err(|e| regulation_error(&dto.id, e.to_string()))?;
    let c = dto.conditions;
    let conditions = DcpConditions {
        zones: zones(&c.zones),
        neighbour_zones: zones(&c.neighbour_zones),
        in_area_regs: c.in_area_regs,
        in_central_area: c.in_central_area,
        fringe: c.fringe,
        corner: c.corner,
        abuts_road: c.abuts_road,
        abuts_gcba: c.abuts_gcba,
        in_gcba: c.in_gcba,
        plot_ratio: c.plot_ratio.map(|p| PlotRatioCondition {
            value: p.value,
            above: p.above,
        }),
    };
    let single = family.len() == 1;
    Ok(family
        .into_iter()
        .map(|programme| DevelopmentControlPlan {
            id: if single {
                dto.id.clone()
            } else {
                format!("{}#{}", dto.id, programme.label())
            },
            programme,
            plot_ratio: parse_ratio(&dto.plot_ratio),
            setback: dto.setback,
            storeys: dto.storeys,
            site_coverage: dto.site_coverage,
            road_categories: dto.road_categories.clone(),
            conditions: conditions.clone(),
        })
        .collect())
}

fn tables_from_file(file: RegulationFile, projection: Projection) -> Result<RegulationTables, InputError> {
    let mut tables = RegulationTables::default();

    for dto in file.height_control {
        tables.height_control.push(HeightControlPlan {
            geometry: area_geometry(&dto.id, dto.geometry, projection)?,
            storeys: dto.storeys,
            abs_height: dto.abs_height,
            additional_type: dto.additional_type,
            id: dto.id,
        });
    }

    for dto in file.street_blocks {
        let mut setbacks = Vec::with_capacity(dto.setbacks.len());
        for s in &dto.setbacks {
            let kind = SetbackKind::parse(&s.kind)
                .ok_or_else(|| regulation_error(&dto.id, format!("unknown setback kind '{}'", s.kind)))?;
            setbacks.push(LevelSetback {
                kind,
                level: s.level,
                distance: s.distance,
            });
        }
        tables.street_blocks.push(StreetBlockPlan {
            geometry: area_geometry(&dto.id, dto.geometry, projection)?,
            setbacks,
            storeys: dto.storeys,
            plot_ratio: parse_ratio(&dto.plot_ratio),
            programmes: programmes(&dto.id, &dto.programmes)?,
            id: dto.id,
        });
    }

    for dto in file.urban_design {
        tables.urban_design.push(UrbanDesignGuideline {
            geometry: area_geometry(&dto.id, dto.geometry, projection)?,
            storeys: dto.storeys,
            setback: dto.setback,
            party_wall: dto.party_wall,
            additional_type: dto.additional_type,
            id: dto.id,
        });
    }

    for dto in file.landed_housing {
        tables.landed_housing.push(LandedHousingArea {
            geometry: area_geometry(&dto.id, dto.geometry, projection)?,
            good_class: dto.good_class,
            storeys: dto.storeys,
            programmes: programmes(&dto.id, &dto.programmes)?,
            id: dto.id,
        });
    }

    for dto in file.development_control {
        tables.development_control.extend(development_control(dto)?);
    }

    for dto in file.road_categories {
        let category = RoadCategory::from_number(dto.category)
            .ok_or_else(|| regulation_error(&dto.id, format!("road category {} out of range", dto.category)))?;
        tables.road_categories.push(RoadCategoryRule {
            id: dto.id,
            category,
            buffer: dto.buffer,
        });
    }

    for dto in file.areas {
        let kind = RegulationKind::parse(&dto.kind).map_err(|e| regulation_error(&dto.id, e.to_string()))?;
        tables.areas.push(AreaRegulation {
            geometry: area_geometry(&dto.id, dto.geometry, projection)?,
            kind,
            name: dto.name,
            id: dto.id,
        });
    }

    Ok(tables)
}

/// Fichier des réglementations
pub fn load_regulations(path: &Path, projection: Projection) -> Result<RegulationTables> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read regulation file: {}", path.display()))?;
    let file: RegulationFile = serde_json::from_str(&content).context("Failed to parse regulation JSON")?;
    let tables = tables_from_file(file, projection).context(format!("Invalid regulation file: {}", path.display()))?;
    debug!(
        height_control = tables.height_control.len(),
        street_blocks = tables.street_blocks.len(),
        urban_design = tables.urban_design.len(),
        landed_housing = tables.landed_housing.len(),
        development_control = tables.development_control.len(),
        areas = tables.areas.len(),
        "Regulations read"
    );
    Ok(tables)
}

#[derive(Debug, Deserialize)]
struct LinkDto {
    parcel_id: String,
    regulation_id: String,
    #[serde(default)]
    regulation_type: Option<String>,
}

/// Table des liens explicites.
///
/// Le type déclaré, s'il est fourni, doit être un type connu ; un type qui ne
/// correspond pas à la réglementation référencée est signalé.
pub fn load_links(path: &Path, set: &RegulationSet) -> Result<Vec<RegulationLink>> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read link file: {}", path.display()))?;
    let rows: Vec<LinkDto> = serde_json::from_str(&content).context("Failed to parse link JSON")?;

    let mut links = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(label) = &row.regulation_type {
            let declared = RegulationKind::parse(label)
                .context(format!("Invalid link {} -> {}", row.parcel_id, row.regulation_id))?;
            if let Some(actual) = set.lookup(&row.regulation_id).map(|r| r.kind) {
                if actual != declared {
                    warn!(
                        parcel_id = %row.parcel_id,
                        regulation_id = %row.regulation_id,
                        declared = %declared,
                        actual = %actual,
                        "Link type does not match regulation"
                    );
                }
            }
        }
        links.push(RegulationLink {
            parcel_id: row.parcel_id,
            regulation_id: row.regulation_id,
        });
    }
    Ok(links)
}
