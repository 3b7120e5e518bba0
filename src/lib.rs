use actix_web::{
    http::{header, Method, StatusCode},
    web, HttpRequest, HttpResponse,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{error, warn};

pub mod cache;
pub mod custom_date;
pub mod database;
pub mod error;
pub mod feed;
pub mod hsb;
pub mod rss;
pub mod stabilize;

use cache::{CacheConfig, CacheEntry, FeedCache};
use error::FetchError;
use feed::FeedKey;

#[derive(Parser, Debug, Clone)]
#[clap(about, version, author)]
pub struct Args {
    #[clap(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    #[clap(short, long, default_value = "3000")]
    pub port: u16,

    /// Seconds a fetched feed is served from cache before the page is fetched again
    #[clap(short, long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_window: u64,

    /// Seconds between writes of the feed cache to disk
    #[clap(short, long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    pub flush_interval: u64,

    /// Directory holding the cache file [default: system temp dir]
    #[clap(short, long)]
    pub cache_dir: Option<PathBuf>,

    #[clap(short, long, default_value = hsb::DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Seconds to wait for the news page before giving up
    #[clap(short = 't', long, default_value = "30")]
    pub fetch_timeout: u64,
}

impl Args {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            refresh_window: Duration::from_secs(self.refresh_window),
            flush_interval: Duration::from_secs(self.flush_interval),
            cache_dir: self.cache_dir.clone().unwrap_or_else(std::env::temp_dir),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

pub struct AppState {
    pub cache: Arc<FeedCache>,
}

/// Mounts the feed routes: `/nyheter`, `/nyheter/{region}` and
/// `/nyheter/{region}/{brf}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(["/nyheter", "/nyheter/{tail:.*}"])
            .route(web::get().to(news_feed))
            .route(web::head().to(news_feed)),
    );
}

async fn news_feed(app_data: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let tail = req.match_info().get("tail").unwrap_or("");

    let Some(key) = FeedKey::from_path(tail) else {
        warn!(path = %req.path(), "Invalid request URI");
        return HttpResponse::NotFound().body("Not found");
    };

    let entry = match app_data.cache.refresh_if_stale(&key, Utc::now()).await {
        Ok(entry) => entry,
        Err(e) => {
            error!(%key, error = %e, "Failed to load news feed");
            return HttpResponse::build(fetch_error_status(&e)).body("Error loading news");
        }
    };

    render_entry(&req, &key, &entry)
}

fn render_entry(req: &HttpRequest, key: &FeedKey, entry: &CacheEntry) -> HttpResponse {
    match rss::render(&entry.snapshot, Utc::now()) {
        Ok(body) => create_response(req, &body, entry.refreshed_at),
        Err(e) => {
            error!(%key, error = %e, "Failed to build XML");
            HttpResponse::InternalServerError().body("Failed to build XML")
        }
    }
}

/// Status to answer with when the upstream page could not be loaded.
pub fn fetch_error_status(err: &FetchError) -> StatusCode {
    match err {
        FetchError::Status { status, .. } => StatusCode::from_u16(*status)
            .ok()
            .filter(|code| code.is_client_error() || code.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        FetchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        FetchError::Transport { .. } => StatusCode::BAD_GATEWAY,
        FetchError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn create_response(req: &HttpRequest, body: &str, cached_at: DateTime<Utc>) -> HttpResponse {
    let last_modified = header::HttpDate::from(SystemTime::from(cached_at));

    let mut response = HttpResponse::Ok();
    response.insert_header((header::CONTENT_TYPE, rss::CONTENT_TYPE));
    response.insert_header((header::LAST_MODIFIED, last_modified.to_string()));

    if req.method() == Method::HEAD {
        response
            .insert_header((header::CONTENT_LENGTH, body.len()))
            .finish()
    } else {
        response.body(body.to_string())
    }
}
