//! Exécution d'un lot : chargement, estimation, exports et rapport

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use geo::Geometry;
use tracing::info;

use gfa_engine::estimate;

use crate::config::Config;
use crate::export::{export_estimates, export_to_geojson};
use crate::input::{load_snapshot, FieldNames, SnapshotPaths};
use crate::project::Projection;
use crate::report::RunReport;

/// Options d'un lot
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub paths: SnapshotPaths,
    pub output_dir: PathBuf,
    pub config: Config,
    /// Nom affiché du preset ou du fichier de configuration
    pub config_name: String,
    pub fields: FieldNames,
}

/// Lance un lot complet et retourne son rapport
pub fn run(options: &RunOptions) -> Result<RunReport> {
    let start = Instant::now();
    let projection = Projection::for_srid(options.config.srid);
    let srid = projection.output_srid();

    std::fs::create_dir_all(&options.output_dir).context(format!(
        "Failed to create output directory: {}",
        options.output_dir.display()
    ))?;

    let snapshot = load_snapshot(&options.paths, projection, &options.fields)?;
    let mut report = RunReport::new(&options.config_name, srid);
    for fingerprint in snapshot.fingerprints {
        report.record_input(fingerprint);
    }

    let geometries: HashMap<String, Geometry> = if options.config.output.geojson {
        snapshot
            .input
            .parcels
            .iter()
            .map(|p| (p.id.clone(), p.geometry.clone()))
            .collect()
    } else {
        HashMap::new()
    };

    let estimation = estimate(snapshot.input, &options.config.thresholds).context("Estimation aborted")?;
    report.record_estimation(&estimation);

    let output = &options.config.output;
    if output.geojson {
        let path = options.output_dir.join("gfa.geojson");
        export_to_geojson(&estimation.estimates, &geometries, srid, &path)?;
        info!(path = %path.display(), features = estimation.estimates.len(), "GeoJSON written");
    }
    if output.estimates {
        let path = options.output_dir.join("estimates.json");
        export_estimates(&estimation.estimates, &estimation.links, srid, &path)?;
        info!(path = %path.display(), "Estimates written");
    }

    report.set_duration(start.elapsed());
    report.finalize();

    if output.report {
        let path = options.output_dir.join("report.json");
        report.save_to_file(&path)?;
        info!(path = %path.display(), "Report written");
    }

    info!(summary = %report.summary(), "Run finished");
    Ok(report)
}
