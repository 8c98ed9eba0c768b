//! Export détaillé des estimations en JSON

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use gfa_engine::regulation::LinkedRegulation;
use gfa_engine::ParcelEstimate;

/// Document `estimates.json`
#[derive(Debug, Serialize)]
struct EstimatesDocument<'a> {
    srid: u32,
    estimates: &'a [ParcelEstimate],
    links: &'a [LinkedRegulation],
}

/// Écrit les attributs dérivés, les reculs, les parties et les surfaces de
/// chaque parcelle, ainsi que les liens réglementaires résolus.
pub fn export_estimates(
    estimates: &[ParcelEstimate],
    links: &[LinkedRegulation],
    srid: u32,
    output_path: &Path,
) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    let document = EstimatesDocument {
        srid,
        estimates,
        links,
    };
    serde_json::to_writer_pretty(&mut writer, &document).context("Failed to serialize estimates")?;
    writer.flush()?;
    Ok(())
}
