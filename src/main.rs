use actix_web::{web, App, HttpServer};
use clap::Parser;
use hsb_rss_proxy::cache::FeedCache;
use hsb_rss_proxy::hsb::HttpFetcher;
use hsb_rss_proxy::{configure, AppState, Args};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.ip, args.port);
    let config = args.cache_config();

    let fetcher = HttpFetcher::new(args.fetch_timeout()).map_err(|e| {
        error!(error = %e, "Failed to build HTTP client");
        std::io::Error::new(std::io::ErrorKind::Other, "HTTP client initialization failed")
    })?;

    let cache = Arc::new(FeedCache::new(&config, Arc::new(fetcher)));
    cache.restore().await;
    let flusher = cache.spawn_flusher(config.flush_interval);

    let app_state = web::Data::new(AppState {
        cache: cache.clone(),
    });

    info!("Server running at http://{}", address);
    let res = HttpServer::new(move || App::new().app_data(app_state.clone()).configure(configure))
        .bind(&address)?
        .run()
        .await;

    flusher.abort();
    let _ = flusher.await;
    if let Err(e) = cache.flush().await {
        error!(error = %e, "Failed to save cached feeds on shutdown");
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "Final cache flush failed",
        ));
    }

    res
}
