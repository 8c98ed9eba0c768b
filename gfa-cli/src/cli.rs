//! Définition et implémentation des commandes CLI
//!
//! - `estimate` : instantané GeoJSON/JSON → surfaces de plancher par parcelle
//! - `config` : affiche la configuration effective

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use gfa_cli::config::Config;
use gfa_cli::input::{FieldNames, SnapshotPaths};
use gfa_cli::run::{run, RunOptions};

#[derive(Subcommand)]
pub enum Commands {
    /// Estimate allowed GFA for every parcel of a snapshot
    Estimate(EstimateArgs),

    /// Print the effective configuration as JSON
    Config {
        /// Config preset name (default/strict) or path to a JSON config
        #[arg(long, default_value = "default")]
        config: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct EstimateArgs {
    /// Parcel layer (GeoJSON FeatureCollection)
    #[arg(short, long)]
    pub parcels: PathBuf,

    /// Road network layer (GeoJSON FeatureCollection)
    #[arg(short, long)]
    pub roads: Option<PathBuf>,

    /// Regulation tables (JSON)
    #[arg(long)]
    pub regulations: Option<PathBuf>,

    /// Explicit parcel/regulation links (JSON)
    #[arg(long)]
    pub links: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    pub output: PathBuf,

    /// Config preset name (default/strict) or path to a JSON config
    #[arg(long, default_value = "default", env = "GFA_CONFIG")]
    pub config: String,

    /// SRID of the input layers (4326 is projected to 3857)
    #[arg(long, env = "GFA_SRID")]
    pub srid: Option<u32>,

    /// Number of worker threads
    #[arg(long, alias = "threads", env = "GFA_JOBS")]
    pub jobs: Option<usize>,

    /// Parcel id property
    #[arg(long, default_value = "id")]
    pub id_field: String,

    /// Zoning label property
    #[arg(long, default_value = "zone")]
    pub zone_field: String,

    /// Base plot ratio property
    #[arg(long, default_value = "plot_ratio")]
    pub plot_ratio_field: String,

    /// Road type property of the road layer
    #[arg(long, default_value = "road_type")]
    pub road_type_field: String,
}

/// Exécute la commande estimate
pub fn cmd_estimate(args: EstimateArgs) -> Result<()> {
    let config = Config::resolve(&args.config)?.with_overrides(args.srid, args.jobs)?;

    if let Some(jobs) = config.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("Failed to configure worker threads")?;
    }
    info!(
        threads = rayon::current_num_threads(),
        srid = config.srid,
        config = %args.config,
        "Starting estimation"
    );

    let options = RunOptions {
        paths: SnapshotPaths {
            parcels: args.parcels,
            roads: args.roads,
            regulations: args.regulations,
            links: args.links,
        },
        output_dir: args.output,
        config,
        config_name: args.config,
        fields: FieldNames {
            id: args.id_field,
            zone: args.zone_field,
            plot_ratio: args.plot_ratio_field,
            road_type: args.road_type_field,
        },
    };

    let report = run(&options)?;
    report.display();
    Ok(())
}

/// Exécute la commande config
pub fn cmd_config(name: &str) -> Result<()> {
    let config = Config::resolve(name)?.with_overrides(None, None)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
