use anyhow::Context;
use clap::{Parser, Subcommand};
use macvo_compose::config::{LoadOptions, load_with};
use macvo_compose::pipeline::CheckReport;
use macvo_compose::sandbox::{RunConfig, Sandbox};
use macvo_compose::{DatasetManifest, PipelineConfig, Registry, assemble};
use std::path::{Path, PathBuf};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "macvo")]
#[command(about = "Compose and validate MACVO odometry configurations", long_about = None)]
struct Cli {
    /// Resolve `!include_dataset` paths against this directory instead of
    /// the including file's directory.
    #[arg(long, global = true)]
    include_root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and assemble a pipeline, optionally resolving a dataset manifest.
    Check {
        #[arg(long)]
        odom: PathBuf,

        #[arg(long)]
        data: Option<PathBuf>,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write the resolved `Odometry` section in canonical form.
    Dump {
        #[arg(long)]
        odom: PathBuf,

        #[arg(short = 'o', long)]
        out: PathBuf,
    },

    /// Create one result sandbox per dataset with its run configuration.
    Prepare {
        #[arg(long)]
        odom: PathBuf,

        #[arg(long)]
        data: PathBuf,

        #[arg(long, default_value = "./Results")]
        result_root: PathBuf,

        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        seq_from: i64,

        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        seq_to: i64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let options = match &cli.include_root {
        Some(root) => LoadOptions::with_include_root(root),
        None => LoadOptions::default(),
    };
    let registry = Registry::builtin();

    match cli.cmd {
        Commands::Check { odom, data, json } => {
            let config = load_pipeline(&odom, &options)?;
            let pipeline = assemble(&config, &registry)
                .with_context(|| format!("assemble pipeline from {}", odom.display()))?;

            let manifest = data
                .as_ref()
                .map(|path| load_manifest(path, &options))
                .transpose()?;

            if json {
                let report = CheckReport {
                    pipeline: pipeline.summary(),
                    datasets: manifest.as_ref(),
                };
                println!("{}", report.to_json()?);
            } else {
                println!("{} on {}", pipeline.name(), pipeline.device());
                for (stage, type_name) in pipeline.stage_types() {
                    println!("  {:<12} {}", stage, type_name);
                }
                if let Some(manifest) = manifest {
                    println!("{} dataset(s)", manifest.len());
                    for entry in &manifest {
                        println!("  {:<12} {}", entry.type_name, entry.name);
                    }
                }
            }
        }

        Commands::Dump { odom, out } => {
            let config = load_pipeline(&odom, &options)?;
            // Only write configurations that actually assemble.
            assemble(&config, &registry)
                .with_context(|| format!("assemble pipeline from {}", odom.display()))?;
            std::fs::write(&out, config.to_yaml()?)
                .with_context(|| format!("write {}", out.display()))?;
            println!("Wrote {}", out.display());
        }

        Commands::Prepare {
            odom,
            data,
            result_root,
            seq_from,
            seq_to,
        } => {
            let config = load_pipeline(&odom, &options)?;
            assemble(&config, &registry)
                .with_context(|| format!("assemble pipeline from {}", odom.display()))?;
            let manifest = load_manifest(&data, &options)?;

            for dataset in &manifest {
                let run = RunConfig::new(&config, dataset, seq_from, seq_to);
                let sandbox = Sandbox::create(&result_root, &run.project)
                    .with_context(|| format!("create sandbox for {}", run.project))?;
                let path = sandbox.write_config(&run)?;
                println!("Wrote {}", path.display());
            }
        }
    }

    Ok(())
}

fn load_pipeline(path: &Path, options: &LoadOptions) -> Result<PipelineConfig> {
    let doc = load_with(path, options).with_context(|| format!("load odometry config {}", path.display()))?;
    PipelineConfig::from_document(&doc).with_context(|| format!("read Odometry section of {}", path.display()))
}

fn load_manifest(path: &Path, options: &LoadOptions) -> Result<DatasetManifest> {
    let doc = load_with(path, options).with_context(|| format!("load dataset config {}", path.display()))?;
    DatasetManifest::from_document(&doc).with_context(|| format!("resolve datasets of {}", path.display()))
}
