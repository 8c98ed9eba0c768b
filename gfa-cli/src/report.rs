//! Rapport d'exécution d'un lot d'estimation
//!
//! Empreintes des fichiers d'entrée, compteurs par zonage, parcelles sans
//! estimation et liste complète des problèmes relevés par le moteur.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use gfa_engine::{Estimation, EstimateStatus, Issue, IssueLevel, ParcelEstimate, RunStats};

/// Statut global du lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Toutes les parcelles traitées sans problème
    Success,
    /// Des parcelles exclues ou partiellement estimées
    PartialSuccess,
    /// Aucune parcelle estimée
    Failed,
}

/// Empreinte d'un fichier d'entrée
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputFingerprint {
    /// Rôle du fichier (parcels, roads, regulations, links)
    pub role: String,
    pub path: String,
    pub bytes: u64,
    /// Hash blake3 du contenu, en hexadécimal
    pub blake3: String,
}

impl InputFingerprint {
    pub fn of_bytes(role: &str, path: &str, content: &[u8]) -> Self {
        Self {
            role: role.to_string(),
            path: path.to_string(),
            bytes: content.len() as u64,
            blake3: hex::encode(blake3::hash(content).as_bytes()),
        }
    }

    pub fn of_file(role: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read(path).context(format!("Failed to read file: {}", path.display()))?;
        Ok(Self::of_bytes(role, &path.display().to_string(), &content))
    }
}

/// Compteurs d'un zonage
#[derive(Debug, Clone, Default, Serialize)]
pub struct ZoneStats {
    pub parcels: usize,
    pub estimated: usize,
    pub unknown: usize,
    pub unclear: usize,
    pub excluded: usize,
    /// Somme des surfaces de plancher maximales connues
    pub total_gfa: f64,
}

/// Rapport complet d'un lot
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Preset ou fichier de configuration utilisé
    pub config: String,
    /// SRID des géométries de calcul
    pub srid: u32,
    pub duration_secs: f64,
    pub status: RunStatus,

    pub inputs: Vec<InputFingerprint>,
    pub stats: RunStats,

    /// Compteurs par zonage
    pub by_zone: BTreeMap<String, ZoneStats>,

    /// Parcelles sans aucune surface connue (hors zonages non constructibles)
    pub unknown_parcels: Vec<String>,

    /// Nombre de problèmes par niveau
    pub issue_counts: BTreeMap<String, usize>,
    pub issues: Vec<Issue>,
}

impl RunReport {
    pub fn new(config: &str, srid: u32) -> Self {
        Self {
            config: config.to_string(),
            srid,
            duration_secs: 0.0,
            status: RunStatus::Success,
            inputs: Vec::new(),
            stats: RunStats::default(),
            by_zone: BTreeMap::new(),
            unknown_parcels: Vec::new(),
            issue_counts: BTreeMap::new(),
            issues: Vec::new(),
        }
    }

    /// Enregistre l'empreinte d'un fichier d'entrée
    pub fn record_input(&mut self, fingerprint: InputFingerprint) {
        self.inputs.push(fingerprint);
    }

    /// Enregistre le résultat d'une parcelle
    pub fn record_estimate(&mut self, estimate: &ParcelEstimate) {
        let zone = self.by_zone.entry(estimate.zone.to_string()).or_default();
        zone.parcels += 1;
        match estimate.status {
            EstimateStatus::Estimated => {
                zone.estimated += 1;
                zone.total_gfa += estimate.max_gfa().value().unwrap_or(0.0);
            }
            EstimateStatus::Unknown => {
                zone.unknown += 1;
                self.unknown_parcels.push(estimate.parcel_id.clone());
            }
            EstimateStatus::Unclear => {
                zone.unclear += 1;
                self.unknown_parcels.push(estimate.parcel_id.clone());
            }
            EstimateStatus::Excluded => zone.excluded += 1,
            EstimateStatus::NonGfaZone => {}
        }
    }

    /// Enregistre un problème
    pub fn record_issue(&mut self, issue: Issue) {
        *self
            .issue_counts
            .entry(format!("{:?}", issue.level))
            .or_default() += 1;
        self.issues.push(issue);
    }

    /// Intègre le résultat complet du moteur
    pub fn record_estimation(&mut self, estimation: &Estimation) {
        for estimate in &estimation.estimates {
            self.record_estimate(estimate);
        }
        for issue in estimation.audit.issues() {
            self.record_issue(issue.clone());
        }
        self.stats = estimation.stats.clone();
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let has_problems = self
            .issues
            .iter()
            .any(|i| matches!(i.level, IssueLevel::Error | IssueLevel::Warning));
        self.status = if self.stats.parcels_in > 0 && self.stats.estimated == 0 {
            RunStatus::Failed
        } else if has_problems {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("GFA ESTIMATION REPORT - config {}", self.config);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);
        println!("SRID: {}", self.srid);

        if !self.inputs.is_empty() {
            println!("\n--- INPUTS ---");
            for input in &self.inputs {
                println!(
                    "  {}: {} ({} bytes, blake3 {})",
                    input.role,
                    input.path,
                    input.bytes,
                    &input.blake3[..16.min(input.blake3.len())]
                );
            }
        }

        println!("\n--- SUMMARY ---");
        println!(
            "Parcels: {} in, {} kept, {} excluded",
            self.stats.parcels_in, self.stats.parcels_kept, self.stats.excluded
        );
        println!(
            "Estimates: {} estimated, {} unknown, {} unclear, {} non-GFA",
            self.stats.estimated, self.stats.unknown, self.stats.unclear, self.stats.non_gfa
        );
        println!(
            "Links: {} ({} development control)",
            self.stats.links, self.stats.development_control_links
        );

        if !self.by_zone.is_empty() {
            println!("\n--- BY ZONE ---");
            for (zone, stats) in &self.by_zone {
                println!(
                    "  {}: {} parcels, {} estimated, {} unknown, {} unclear, {} excluded, GFA {:.0}",
                    zone,
                    stats.parcels,
                    stats.estimated,
                    stats.unknown,
                    stats.unclear,
                    stats.excluded,
                    stats.total_gfa
                );
            }
        }

        if !self.unknown_parcels.is_empty() {
            println!("\n--- UNKNOWN ({}) ---", self.unknown_parcels.len());
            for id in self.unknown_parcels.iter().take(10) {
                println!("  {}", id);
            }
            if self.unknown_parcels.len() > 10 {
                println!("  ... and {} more", self.unknown_parcels.len() - 10);
            }
        }

        if !self.issues.is_empty() {
            println!("\n--- ISSUES ({}) ---", self.issues.len());
            for issue in self.issues.iter().take(20) {
                println!(
                    "  {:?} [{}] {:?}: {}",
                    issue.level, issue.parcel_id, issue.stage, issue.message
                );
            }
            if self.issues.len() > 20 {
                println!("  ... and {} more", self.issues.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).context(format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} estimated, {} unknown, {} unclear, {} excluded, {} issues",
            self.config,
            self.stats.estimated,
            self.stats.unknown,
            self.stats.unclear,
            self.stats.excluded,
            self.issues.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfa_engine::{Gfa, Programme, ProgrammeEstimate, Stage, Zone};

    fn estimate(id: &str, zone: Zone, status: EstimateStatus, gfa: Option<f64>) -> ParcelEstimate {
        ParcelEstimate {
            parcel_id: id.to_string(),
            zone,
            status,
            area: Some(1000.0),
            attributes: None,
            profile: None,
            parts: Vec::new(),
            programmes: gfa
                .map(|g| ProgrammeEstimate {
                    programme: Programme::General,
                    plot_ratio: Some(g / 1000.0),
                    site_coverage: 1.0,
                    setbacks: Vec::new(),
                    footprint_areas: Vec::new(),
                    storeys: Vec::new(),
                    gfa: Gfa::Known(g),
                })
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn test_fingerprint() {
        let a = InputFingerprint::of_bytes("parcels", "a.geojson", b"{}");
        let b = InputFingerprint::of_bytes("parcels", "b.geojson", b"{}");
        let c = InputFingerprint::of_bytes("parcels", "a.geojson", b"[]");
        assert_eq!(a.blake3, b.blake3);
        assert_ne!(a.blake3, c.blake3);
        assert_eq!(a.blake3.len(), 64);
        assert_eq!(a.bytes, 2);
    }

    #[test]
    fn test_record_estimate_by_zone() {
        let mut report = RunReport::new("default", 3857);
        report.record_estimate(&estimate("A", Zone::Residential, EstimateStatus::Estimated, Some(1400.0)));
        report.record_estimate(&estimate("B", Zone::Residential, EstimateStatus::Estimated, Some(2800.0)));
        report.record_estimate(&estimate("C", Zone::Commercial, EstimateStatus::Unknown, None));
        report.record_estimate(&estimate("R", Zone::Road, EstimateStatus::NonGfaZone, None));

        let residential = report.by_zone.get("Residential").unwrap();
        assert_eq!(residential.estimated, 2);
        assert!((residential.total_gfa - 4200.0).abs() < 1e-9);
        assert_eq!(report.unknown_parcels, vec!["C".to_string()]);
        assert_eq!(report.by_zone.get("Road").unwrap().parcels, 1);
    }

    #[test]
    fn test_record_issue_counts() {
        let mut report = RunReport::new("default", 3857);
        report.record_issue(Issue::error("A", Stage::Topology, "multi-polygon"));
        report.record_issue(Issue::warning("B", Stage::Aggregation, "GFA unknown"));
        report.record_issue(Issue::warning("C", Stage::Aggregation, "GFA unknown"));
        assert_eq!(report.issue_counts.get("Error"), Some(&1));
        assert_eq!(report.issue_counts.get("Warning"), Some(&2));
    }

    #[test]
    fn test_finalize() {
        let mut report = RunReport::new("default", 3857);
        report.stats.parcels_in = 2;
        report.stats.estimated = 2;
        report.finalize();
        assert_eq!(report.status, RunStatus::Success);

        report.record_issue(Issue::warning("B", Stage::Aggregation, "GFA unknown"));
        report.finalize();
        assert_eq!(report.status, RunStatus::PartialSuccess);

        report.stats.estimated = 0;
        report.finalize();
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[test]
    fn test_summary() {
        let mut report = RunReport::new("strict", 3857);
        report.stats.estimated = 100;
        report.stats.unknown = 3;
        let summary = report.summary();
        assert!(summary.contains("strict"));
        assert!(summary.contains("100 estimated"));
    }
}
