//! Types de données pour le crate gfa-engine

use std::fmt;
use std::sync::OnceLock;

use geo::Geometry;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Identifiant de parcelle tel que fourni par la source amont
pub type ParcelId = String;

/// Identifiant d'instance réglementaire
pub type RegulationId = String;

/// Normalise un libellé : majuscules, sans ponctuation ni espaces
///
/// `"Residential / Institution"` et `"RESIDENTIAL/INSTITUTION"` donnent tous deux
/// `"RESIDENTIALINSTITUTION"`.
fn normalize_label(label: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATORS.get_or_init(|| Regex::new("[^A-Z0-9]+").expect("static regex"));
    re.replace_all(&label.trim().to_uppercase(), "").into_owned()
}

/// Zonage d'une parcelle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Zone {
    Residential,
    ResidentialWithCommercialAtFirstStorey,
    CommercialAndResidential,
    ResidentialOrInstitution,
    White,
    BusinessParkWhite,
    Business1White,
    Business2White,
    Business1,
    Business2,
    BusinessPark,
    Commercial,
    Hotel,
    PlaceOfWorship,
    EducationalInstitution,
    CivicAndCommunityInstitution,
    HealthAndMedicalCare,
    SportsAndRecreation,
    Road,
    Waterbody,
    Utility,
    OpenSpace,
    ReserveSite,
    Park,
    Agriculture,
    MassRapidTransit,
    RapidTransit,
    LightRapidTransit,
    PortOrAirport,
    SpecialUse,
    Cemetery,
    BeachArea,
    Transport,
    /// Libellé non répertorié, conservé tel quel
    Other(String),
}

impl Zone {
    /// Interprète un libellé de zonage (forme masterplan ou CamelCase)
    pub fn from_label(label: &str) -> Self {
        match normalize_label(label).as_str() {
            "RESIDENTIAL" => Self::Residential,
            "RESIDENTIALWITHCOMMERCIALAT1STSTOREY" | "RESIDENTIALWITHCOMMERCIALATFIRSTSTOREY" => {
                Self::ResidentialWithCommercialAtFirstStorey
            }
            "COMMERCIALRESIDENTIAL" | "COMMERCIALANDRESIDENTIAL" => Self::CommercialAndResidential,
            "RESIDENTIALINSTITUTION" | "RESIDENTIALORINSTITUTION" => Self::ResidentialOrInstitution,
            "WHITE" => Self::White,
            "BUSINESSPARKWHITE" => Self::BusinessParkWhite,
            "BUSINESS1WHITE" => Self::Business1White,
            "BUSINESS2WHITE" => Self::Business2White,
            "BUSINESS1" => Self::Business1,
            "BUSINESS2" => Self::Business2,
            "BUSINESSPARK" => Self::BusinessPark,
            "COMMERCIAL" => Self::Commercial,
            "HOTEL" => Self::Hotel,
            "PLACEOFWORSHIP" => Self::PlaceOfWorship,
            "EDUCATIONALINSTITUTION" => Self::EducationalInstitution,
            "CIVICCOMMUNITYINSTITUTION"
            | "CIVICANDCOMMUNITYINSTITUTION"
            | "CIVICANDCOMMUNITYINSTITUTIONZONE" => Self::CivicAndCommunityInstitution,
            "HEALTHMEDICALCARE" | "HEALTHANDMEDICALCARE" => Self::HealthAndMedicalCare,
            "SPORTSRECREATION" | "SPORTSANDRECREATION" => Self::SportsAndRecreation,
            "ROAD" => Self::Road,
            "WATERBODY" => Self::Waterbody,
            "UTILITY" => Self::Utility,
            "OPENSPACE" => Self::OpenSpace,
            "RESERVESITE" => Self::ReserveSite,
            "PARK" => Self::Park,
            "AGRICULTURE" => Self::Agriculture,
            "MASSRAPIDTRANSIT" | "MASRAPIDTRANSIT" => Self::MassRapidTransit,
            "RAPIDTRANSIT" => Self::RapidTransit,
            "LIGHTRAPIDTRANSIT" => Self::LightRapidTransit,
            "PORTAIRPORT" | "PORTORAIRPORT" => Self::PortOrAirport,
            "SPECIALUSE" | "SPECIALUSEZONE" => Self::SpecialUse,
            "CEMETERY" => Self::Cemetery,
            "BEACHAREA" => Self::BeachArea,
            "TRANSPORT" | "TRANSPORTFACILITIES" => Self::Transport,
            _ => Self::Other(label.trim().to_string()),
        }
    }

    /// Zones pouvant accueillir un programme résidentiel
    pub fn is_residential(&self) -> bool {
        matches!(self, Self::Residential | Self::ResidentialOrInstitution) || self.is_mixed_use()
    }

    /// Zones mixtes (résidentiel + autre usage)
    pub fn is_mixed_use(&self) -> bool {
        matches!(
            self,
            Self::ResidentialWithCommercialAtFirstStorey
                | Self::CommercialAndResidential
                | Self::White
                | Self::BusinessParkWhite
                | Self::Business1White
                | Self::Business2White
        )
    }

    pub fn is_industrial(&self) -> bool {
        matches!(self, Self::Business1 | Self::Business2 | Self::BusinessPark)
    }

    pub fn is_road(&self) -> bool {
        matches!(self, Self::Road)
    }

    /// Zones où aucune surface de plancher n'est estimée
    pub fn is_non_gfa(&self) -> bool {
        matches!(
            self,
            Self::Road
                | Self::Waterbody
                | Self::Utility
                | Self::OpenSpace
                | Self::ReserveSite
                | Self::Park
                | Self::Agriculture
                | Self::MassRapidTransit
                | Self::RapidTransit
                | Self::LightRapidTransit
                | Self::PortOrAirport
                | Self::SpecialUse
                | Self::Cemetery
                | Self::BeachArea
        )
    }

    /// Hauteur d'étage utilisée pour convertir une hauteur absolue en étages
    pub fn storey_height(&self, residential: f64, other: f64) -> f64 {
        if self.is_residential() {
            residential
        } else {
            other
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(label) => write!(f, "{label}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Programme de développement (usage autorisé)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Programme {
    Bungalow,
    SemiDetachedHouse,
    TerraceType1,
    TerraceType2,
    GoodClassBungalow,
    Flat,
    Condominium,
    ServicedApartmentResidentialZone,
    ServicedApartmentMixedUseZone,
    Clinic,
    Commercial,
    Hotel,
    Business,
    Institution,
    /// Réglementation non qualifiée : s'applique à tous les programmes
    General,
}

impl Programme {
    /// Interprète un libellé de programme.
    ///
    /// `TerraceHouse` désigne la famille des deux types de maisons en bande.
    pub fn parse_family(label: &str) -> Result<Vec<Self>, EngineError> {
        let programme = match normalize_label(label).as_str() {
            "" | "GENERAL" => Self::General,
            "BUNGALOW" | "DETACHEDHOUSE" => Self::Bungalow,
            "SEMIDETACHEDHOUSE" => Self::SemiDetachedHouse,
            "TERRACEHOUSE" => return Ok(vec![Self::TerraceType1, Self::TerraceType2]),
            "TERRACETYPE1" => Self::TerraceType1,
            "TERRACETYPE2" => Self::TerraceType2,
            "GOODCLASSBUNGALOW" => Self::GoodClassBungalow,
            "FLAT" => Self::Flat,
            "CONDOMINIUM" => Self::Condominium,
            "SERVICEDAPARTMENTRESIDENTIALZONE" => Self::ServicedApartmentResidentialZone,
            "SERVICEDAPARTMENTMIXEDUSEZONE" => Self::ServicedApartmentMixedUseZone,
            "CLINIC" => Self::Clinic,
            "COMMERCIAL" => Self::Commercial,
            "HOTEL" => Self::Hotel,
            "BUSINESS" | "BUSINESS1" | "BUSINESS2" | "BUSINESSPARK" => Self::Business,
            "INSTITUTION" | "INSTITUTIONAL" => Self::Institution,
            _ => return Err(EngineError::UnknownProgramme(label.to_string())),
        };
        Ok(vec![programme])
    }

    /// Maisons mitoyennes (mur mitoyen possible)
    pub fn is_attached(self) -> bool {
        matches!(
            self,
            Self::SemiDetachedHouse | Self::TerraceType1 | Self::TerraceType2
        )
    }

    /// Maisons individuelles (jamais de mur mitoyen)
    pub fn is_detached(self) -> bool {
        matches!(self, Self::Bungalow | Self::GoodClassBungalow)
    }

    /// Programmes de maisons individuelles ou mitoyennes
    pub fn is_landed(self) -> bool {
        self.is_attached() || self.is_detached()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bungalow => "Bungalow",
            Self::SemiDetachedHouse => "Semi-DetachedHouse",
            Self::TerraceType1 => "TerraceType1",
            Self::TerraceType2 => "TerraceType2",
            Self::GoodClassBungalow => "GoodClassBungalow",
            Self::Flat => "Flat",
            Self::Condominium => "Condominium",
            Self::ServicedApartmentResidentialZone => "ServicedApartmentResidentialZone",
            Self::ServicedApartmentMixedUseZone => "ServicedApartmentMixedUseZone",
            Self::Clinic => "Clinic",
            Self::Commercial => "Commercial",
            Self::Hotel => "Hotel",
            Self::Business => "Business",
            Self::Institution => "Institution",
            Self::General => "General",
        }
    }
}

impl fmt::Display for Programme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Type de voie du réseau routier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoadType {
    Expressway,
    SemiExpressway,
    MajorMinorArterial,
    LocalCollectorPrimaryAccess,
    LocalAccess,
    SlipRoad,
    ServiceRoad,
}

impl RoadType {
    /// Interprète un code de type de voie.
    ///
    /// Retourne `Ok(None)` pour les types non pertinents (carrefours, voies
    /// supprimées, lignes imaginaires...) et une erreur pour un code inconnu.
    pub fn parse(label: &str) -> Result<Option<Self>, EngineError> {
        let road_type = match normalize_label(label).as_str() {
            "EXPRESSWAY" => Self::Expressway,
            "SEMIEXPRESSWAY" => Self::SemiExpressway,
            "MAJORARTERIALSMINORARTERIALS" | "MAJORARTERIAL" | "MINORARTERIAL" => {
                Self::MajorMinorArterial
            }
            "LOCALCOLLECTORPRIMARYACCESS" => Self::LocalCollectorPrimaryAccess,
            "LOCALACCESS" => Self::LocalAccess,
            "SLIPROAD" => Self::SlipRoad,
            "SERVICEROAD" => Self::ServiceRoad,
            "CROSSJUNCTION" | "TJUNCTION" | "EXPUNGED" | "OTHERJUNCTION" | "PEDESTRIANMALL"
            | "2TJUNCTIONOPPOSITEEACHOTHER" | "UNKNOWN" | "YJUNCTION" | "IMAGINARYLINE" => {
                return Ok(None)
            }
            _ => return Err(EngineError::UnknownRoadType(label.to_string())),
        };
        Ok(Some(road_type))
    }

    /// Catégorie réglementaire de la voie (zone tampon)
    pub fn category(self) -> RoadCategory {
        match self {
            Self::Expressway | Self::SemiExpressway => RoadCategory::Category1,
            Self::MajorMinorArterial => RoadCategory::Category2,
            Self::LocalCollectorPrimaryAccess
            | Self::LocalAccess
            | Self::SlipRoad
            | Self::ServiceRoad => RoadCategory::Category3To5,
        }
    }
}

/// Catégorie de voie imposant une zone tampon
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RoadCategory {
    Category1,
    Category2,
    Category3To5,
}

impl RoadCategory {
    /// Interprète un numéro de catégorie (1 à 5)
    pub fn from_number(category: u8) -> Option<Self> {
        match category {
            1 => Some(Self::Category1),
            2 => Some(Self::Category2),
            3..=5 => Some(Self::Category3To5),
            _ => None,
        }
    }
}

/// Rôle d'une arête (de rectangle englobant ou de limite réelle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EdgeRole {
    Front,
    Side,
    Rear,
}

/// Nombre d'étages autorisés
///
/// `Unconstrained` est strictement supérieur à toute valeur finie, de sorte que
/// `min()` combine directement plusieurs limites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StoreyLimit {
    Finite(u32),
    Unconstrained,
}

impl StoreyLimit {
    /// Convertit une hauteur absolue en nombre d'étages entiers
    pub fn from_height(height: f64, storey_height: f64) -> Self {
        if !height.is_finite() || storey_height <= 0.0 {
            return Self::Unconstrained;
        }
        Self::Finite((height / storey_height).floor().max(0.0) as u32)
    }

    pub fn finite(self) -> Option<u32> {
        match self {
            Self::Finite(n) => Some(n),
            Self::Unconstrained => None,
        }
    }

    pub fn is_unconstrained(self) -> bool {
        matches!(self, Self::Unconstrained)
    }
}

/// Surface de plancher estimée : valeur connue ou explicitement inconnue
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Gfa {
    Known(f64),
    Unknown,
}

impl Gfa {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Parcelle brute telle que chargée depuis la source amont
#[derive(Debug, Clone)]
pub struct ParcelRecord {
    /// Identifiant unique
    pub id: ParcelId,

    /// Géométrie (Polygon attendu ; MultiPolygon à un seul membre toléré)
    pub geometry: Geometry,

    /// Zonage
    pub zone: Zone,

    /// Coefficient d'emprise (plot ratio) de base, s'il est numérique
    pub plot_ratio: Option<f64>,
}

/// Tronçon du réseau routier
#[derive(Debug, Clone)]
pub struct RoadRecord {
    /// Géométrie (ligne ou polygone)
    pub geometry: Geometry,

    /// Type de voie
    pub road_type: RoadType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_from_masterplan_labels() {
        assert_eq!(Zone::from_label("RESIDENTIAL"), Zone::Residential);
        assert_eq!(
            Zone::from_label("RESIDENTIAL / INSTITUTION"),
            Zone::ResidentialOrInstitution
        );
        assert_eq!(
            Zone::from_label("COMMERCIAL & RESIDENTIAL"),
            Zone::CommercialAndResidential
        );
        assert_eq!(
            Zone::from_label("BUSINESS PARK - WHITE"),
            Zone::BusinessParkWhite
        );
        assert_eq!(
            Zone::from_label("CivicAndCommunityInstitutionZone"),
            Zone::CivicAndCommunityInstitution
        );
        assert_eq!(
            Zone::from_label("Mystery"),
            Zone::Other("Mystery".to_string())
        );
    }

    #[test]
    fn test_zone_families() {
        assert!(Zone::White.is_residential());
        assert!(Zone::White.is_mixed_use());
        assert!(!Zone::Residential.is_mixed_use());
        assert!(Zone::Road.is_non_gfa());
        assert!(Zone::Business2.is_industrial());
    }

    #[test]
    fn test_programme_family() {
        assert_eq!(
            Programme::parse_family("TerraceHouse").unwrap(),
            vec![Programme::TerraceType1, Programme::TerraceType2]
        );
        assert_eq!(
            Programme::parse_family("Semi-DetachedHouse").unwrap(),
            vec![Programme::SemiDetachedHouse]
        );
        assert!(Programme::parse_family("Spaceport").is_err());
    }

    #[test]
    fn test_road_type_parse() {
        assert_eq!(
            RoadType::parse("Major Arterials/Minor Arterials").unwrap(),
            Some(RoadType::MajorMinorArterial)
        );
        assert_eq!(RoadType::parse("T-Junction").unwrap(), None);
        assert!(RoadType::parse("Runway").is_err());
        assert_eq!(
            RoadType::SemiExpressway.category(),
            RoadCategory::Category1
        );
    }

    #[test]
    fn test_storey_limit_ordering() {
        assert!(StoreyLimit::Finite(40) < StoreyLimit::Unconstrained);
        assert_eq!(
            StoreyLimit::Finite(4).min(StoreyLimit::Unconstrained),
            StoreyLimit::Finite(4)
        );
        assert_eq!(StoreyLimit::from_height(20.0, 3.6), StoreyLimit::Finite(5));
    }
}
