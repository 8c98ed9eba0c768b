//! Types d'erreurs pour le crate gfa-engine

use thiserror::Error;

/// Erreurs pouvant interrompre une estimation
///
/// Les défauts de données récupérables (géométrie dégénérée, absence de façade,
/// ratio inconnu...) ne passent jamais par ce type : ils sont consignés dans
/// l'[`Audit`](crate::audit::Audit) de la parcelle concernée.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Géométrie invalide
    #[error("Invalid geometry for {entity_id}: {reason}")]
    InvalidGeometry { entity_id: String, reason: String },

    /// Programme de développement inconnu
    #[error("Unknown development programme: {0}")]
    UnknownProgramme(String),

    /// Type de voie inconnu
    #[error("Unknown road type: {0}")]
    UnknownRoadType(String),

    /// Type de réglementation inconnu
    #[error("Unknown regulation kind: {0}")]
    UnknownRegulationKind(String),

    /// Parcelle référencée par un lien mais absente du cadastre
    #[error("Link references unknown parcel {0}")]
    UnknownParcel(String),

    /// Réglementation référencée par un lien mais absente des tables
    #[error("Link references unknown regulation {0}")]
    UnknownRegulation(String),

    /// Identifiant de réglementation présent dans deux tables
    #[error("Duplicate regulation id {0}")]
    DuplicateRegulation(String),

    /// Configuration incohérente
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invariant structurel violé : la table de reculs ne couvre pas
    /// exactement les arêtes de la parcelle. Fatal pour tout le lot.
    #[error("Setback table for {parcel_id} has {setbacks} entries but the parcel has {edges} edges")]
    EdgeCountMismatch {
        parcel_id: String,
        edges: usize,
        setbacks: usize,
    },
}

impl EngineError {
    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            entity_id: entity_id.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de configuration
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Vrai si l'erreur signale un bug structurel plutôt qu'un défaut de données
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EdgeCountMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_count_mismatch_is_fatal() {
        let err = EngineError::EdgeCountMismatch {
            parcel_id: "P1".to_string(),
            edges: 4,
            setbacks: 3,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("P1"));
        assert!(!EngineError::invalid_geometry("P2", "empty ring").is_fatal());
    }
}
