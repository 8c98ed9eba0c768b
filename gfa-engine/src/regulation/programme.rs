//! Programmes résidentiels admissibles sur une parcelle
//!
//! Seuils de surface et de largeur des maisons, exigences des bungalows de
//! standing, des immeubles et des résidences hôtelières.

use crate::types::{Programme, Zone};

/// Surface et largeur minimales
#[derive(Debug, Clone, Copy)]
struct Dimensions {
    area: f64,
    width: f64,
}

impl Dimensions {
    const fn new(area: f64, width: f64) -> Self {
        Self { area, width }
    }

    fn fits(&self, area: f64, width: f64) -> bool {
        area >= self.area && width >= self.width
    }
}

/// Règle d'admissibilité d'un programme de maison
struct LandedRule {
    programme: Programme,
    regular: Dimensions,
    corner: Dimensions,
}

const LANDED_RULES: [LandedRule; 4] = [
    LandedRule {
        programme: Programme::Bungalow,
        regular: Dimensions::new(400.0, 10.0),
        corner: Dimensions::new(400.0, 10.0),
    },
    LandedRule {
        programme: Programme::SemiDetachedHouse,
        regular: Dimensions::new(200.0, 8.0),
        corner: Dimensions::new(200.0, 8.0),
    },
    LandedRule {
        programme: Programme::TerraceType1,
        regular: Dimensions::new(150.0, 6.0),
        corner: Dimensions::new(200.0, 8.0),
    },
    LandedRule {
        programme: Programme::TerraceType2,
        regular: Dimensions::new(80.0, 6.0),
        corner: Dimensions::new(80.0, 8.0),
    },
];

const GCB_MIN_AREA: f64 = 1400.0;
const GCB_MIN_WIDTH: f64 = 18.5;
const GCB_MIN_DEPTH: f64 = 30.0;
const FLAT_MIN_AREA: f64 = 1000.0;
const CONDOMINIUM_MIN_AREA: f64 = 4000.0;

/// Données d'entrée de l'admissibilité
#[derive(Debug, Clone)]
pub struct EligibilityInput<'a> {
    pub zone: &'a Zone,
    pub area: f64,
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub corner: bool,
    pub fringe: bool,
    pub in_lha: bool,
    pub in_gcba: bool,
    /// Programmes listés par les LHA rattachées
    pub lha_programmes: &'a [Programme],
    /// Programmes listés par les plans d'îlot rattachés
    pub sbp_programmes: &'a [Programme],
    /// Une voie voisine appartient aux types de voie retenus
    pub abuts_listed_road: bool,
}

impl EligibilityInput<'_> {
    fn listed(&self, programme: Programme) -> bool {
        self.lha_programmes.contains(&programme) || self.sbp_programmes.contains(&programme)
    }
}

/// Programmes résidentiels admissibles, dans l'ordre de déclaration
pub fn allowed_programmes(input: &EligibilityInput<'_>) -> Vec<Programme> {
    if !input.zone.is_residential() {
        return Vec::new();
    }
    // Dimension inconnue : aucun seuil n'est satisfait
    let width = input.width.unwrap_or(0.0);
    let depth = input.depth.unwrap_or(0.0);
    let pure_residential = *input.zone == Zone::Residential;

    let mut allowed = Vec::new();

    if !input.in_gcba {
        for rule in &LANDED_RULES {
            let dims = if input.corner { &rule.corner } else { &rule.regular };
            if !dims.fits(input.area, width) {
                continue;
            }
            // Hors zone résidentielle pure : programme listé requis
            if !pure_residential && !input.listed(rule.programme) {
                continue;
            }
            allowed.push(rule.programme);
        }
    }

    if input.area >= GCB_MIN_AREA
        && width >= GCB_MIN_WIDTH
        && depth >= GCB_MIN_DEPTH
        && (input.in_gcba || input.sbp_programmes.contains(&Programme::GoodClassBungalow))
    {
        allowed.push(Programme::GoodClassBungalow);
    }

    let high_rise_allowed = !input.in_gcba && !input.in_lha;

    if high_rise_allowed && input.area >= FLAT_MIN_AREA {
        allowed.push(Programme::Flat);
    }

    if high_rise_allowed
        && input.area >= CONDOMINIUM_MIN_AREA
        && matches!(input.zone, Zone::Residential | Zone::ResidentialOrInstitution)
    {
        allowed.push(Programme::Condominium);
    }

    if high_rise_allowed && input.fringe {
        if pure_residential && input.abuts_listed_road {
            allowed.push(Programme::ServicedApartmentResidentialZone);
        }
        if input.zone.is_mixed_use() {
            allowed.push(Programme::ServicedApartmentMixedUseZone);
        }
    }

    allowed
}

/// Filtre appliqué aux programmes des plans de contrôle en zone résidentielle
pub fn keeps_programme(zone: &Zone, allowed: &[Programme], programme: Programme) -> bool {
    if !zone.is_residential() {
        return true;
    }
    matches!(programme, Programme::Clinic | Programme::General) || allowed.contains(&programme)
}
