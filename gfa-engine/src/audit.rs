//! Journal d'audit par parcelle
//!
//! Les défauts récupérables (géométrie dégénérée, façade introuvable, ratio
//! inconnu...) ne font jamais échouer le lot : ils sont consignés ici pour que
//! l'on puisse énumérer chaque parcelle dont l'estimation est partielle ou inconnue.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::types::ParcelId;

/// Niveau de sévérité d'un problème
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueLevel {
    /// Parcelle exclue de l'estimation
    Error,
    /// Estimation partielle ou inconnue
    Warning,
    /// Information
    Info,
}

/// Étape du pipeline ayant relevé le problème
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    Topology,
    Classification,
    Regulation,
    Envelope,
    Aggregation,
}

/// Problème relevé sur une parcelle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub parcel_id: ParcelId,
    pub level: IssueLevel,
    pub stage: Stage,
    pub message: String,
}

impl Issue {
    pub fn error(parcel_id: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(parcel_id, IssueLevel::Error, stage, message)
    }

    pub fn warning(parcel_id: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(parcel_id, IssueLevel::Warning, stage, message)
    }

    pub fn info(parcel_id: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(parcel_id, IssueLevel::Info, stage, message)
    }

    fn new(parcel_id: &str, level: IssueLevel, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            parcel_id: parcel_id.to_string(),
            level,
            stage,
            message: message.into(),
        }
    }
}

/// Ensemble des problèmes d'un lot
#[derive(Debug, Clone, Default, Serialize)]
pub struct Audit {
    issues: Vec<Issue>,
}

impl Audit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre un problème
    pub fn record(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues.extend(issues);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Problèmes d'une parcelle donnée
    pub fn for_parcel<'a>(&'a self, parcel_id: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |i| i.parcel_id == parcel_id)
    }

    /// Parcelles exclues (au moins un problème de niveau `Error`)
    pub fn excluded_parcels(&self) -> BTreeSet<&str> {
        self.issues
            .iter()
            .filter(|i| i.level == IssueLevel::Error)
            .map(|i| i.parcel_id.as_str())
            .collect()
    }

    /// Nombre de problèmes par niveau
    pub fn count_by_level(&self) -> BTreeMap<IssueLevel, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.level).or_insert(0) += 1;
        }
        counts
    }

    /// Trie les problèmes (parcelle puis étape) pour une sortie déterministe
    pub fn sort(&mut self) {
        self.issues.sort_by(|a, b| {
            a.parcel_id
                .cmp(&b.parcel_id)
                .then(a.stage.cmp(&b.stage))
                .then(a.level.cmp(&b.level))
                .then(a.message.cmp(&b.message))
        });
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}
