#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use concierge::cache::{ResponseCache, SqliteResponseCache};
use concierge::config::AppConfig;
use concierge::geocode::{Geocoder, HttpGeocoder};
use concierge::pipeline::Pipeline;
use concierge::places::{HttpPlacesProvider, PlacesProvider};
use concierge::providers::build_registry;
use concierge::types::{Category, RecommendationRequest};

#[derive(Parser)]
#[command(name = "concierge", version, about = "Consensus place recommendations CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one recommendation request through the pipeline
    Recommend {
        /// JSON request file; flags below override its fields
        #[arg(long)]
        request: Option<PathBuf>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lng: Option<f64>,
        #[arg(long)]
        address: Option<String>,
        /// Category name, repeatable (Restaurant, Cafe, ...)
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        max_results: Option<u32>,
        #[arg(long)]
        radius_meters: Option<u32>,
        #[arg(long, default_value_t = false)]
        force_refresh: bool,
        /// Pretty-print the response
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Show response cache statistics
    CacheStats,
    /// Delete expired response cache rows
    CachePurge,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let cache = Arc::new(SqliteResponseCache::new(&config.cache.path)?);

    match cli.command {
        Commands::Recommend {
            request,
            lat,
            lng,
            address,
            categories,
            max_results,
            radius_meters,
            force_refresh,
            pretty,
        } => {
            let mut req: RecommendationRequest = match request {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => RecommendationRequest::default(),
            };
            if lat.is_some() {
                req.latitude = lat;
            }
            if lng.is_some() {
                req.longitude = lng;
            }
            if address.is_some() {
                req.address = address;
            }
            if !categories.is_empty() {
                req.categories = categories
                    .iter()
                    .map(|c| c.parse::<Category>())
                    .collect::<Result<_, _>>()?;
            }
            if let Some(max_results) = max_results {
                req.max_results = max_results;
            }
            if let Some(radius_meters) = radius_meters {
                req.radius_meters = radius_meters;
            }
            req.force_refresh |= force_refresh;

            if config.cache.purge_on_startup {
                cache.purge_expired().await?;
            }

            let geocoder: Option<Arc<dyn Geocoder>> = Some(Arc::new(HttpGeocoder::new(
                &config.geocoder,
            )?));
            let places: Option<Arc<dyn PlacesProvider>> =
                HttpPlacesProvider::from_config(&config.places)?
                    .map(|p| Arc::new(p) as Arc<dyn PlacesProvider>);
            let providers = build_registry(&config);

            let pipeline = Pipeline::new(config, providers, geocoder, places, cache);
            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.cancel();
                }
            });

            match pipeline.run(req, cancel).await {
                Ok(response) => {
                    let rendered = if pretty {
                        serde_json::to_string_pretty(&response)?
                    } else {
                        serde_json::to_string(&response)?
                    };
                    println!("{rendered}");
                }
                Err(e) => {
                    eprintln!("error ({}): {e}", e.status_code());
                    std::process::exit(1);
                }
            }
        }
        Commands::CacheStats => {
            let stats = cache.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::CachePurge => {
            let removed = cache.purge_expired().await?;
            println!("removed {removed} expired entries");
        }
    }

    Ok(())
}
