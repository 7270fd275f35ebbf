use clap::{Parser, Subcommand};
use sls_centers::{config, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute area centers from building points and export the table
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the exported table for field lookup
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

const PREVIEW_ROWS: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            println!("Generating area centers with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let aggregation = sls_centers::generate(&app_config)?;

            if aggregation.is_empty_join() {
                println!(
                    "WARNING: no building point fell inside any area. \
                     Check that both files cover the same region and declare the right CRS."
                );
            }

            let schema = app_config.schema();
            println!("{}", schema.header().join("\t"));
            for center in aggregation.centers.iter().take(PREVIEW_ROWS) {
                let mut row = center.names.clone();
                row.extend([center.id.clone(), center.latitude.to_string(), center.longitude.to_string()]);
                println!("{}", row.join("\t"));
            }

            println!(
                "Processed {} areas ({} from building points, {} interior-point fallbacks, {} unassigned points). Wrote {:?}",
                aggregation.centers.len(),
                aggregation.mean_center_areas(),
                aggregation.fallback_areas(),
                aggregation.unassigned_points,
                app_config.output.csv
            );
        }
        Commands::Serve { config } => {
            println!("Serving area centers with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            server::start_server(app_config).await?;
        }
    }

    Ok(())
}
