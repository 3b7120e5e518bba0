//! End-to-end tests of the feed routes against a scripted upstream.

use actix_web::{http::header, http::StatusCode, test, web, App};
use async_trait::async_trait;
use hsb_rss_proxy::cache::{CacheConfig, FeedCache};
use hsb_rss_proxy::error::FetchError;
use hsb_rss_proxy::hsb::PageFetcher;
use hsb_rss_proxy::{configure, AppState};
use std::sync::{Arc, Mutex};

const PAGE: &str = r#"<html><body>
  <div class="brf-header-bottom-text"><span>HSB Brf Hagern</span></div>
  <ul class="itemlist">
    <li class="item">
      <a class="linkclickarea" href="/norr/brf/hagern/nyheter/stambyte">
        <div class="iteminformation">
          <h3>Stambyte</h3>
          <div class="itemdate">3 mars 2025</div>
          <div class="itemdescription">Arbetet startar i vecka 12.</div>
        </div>
      </a>
    </li>
  </ul>
</body></html>"#;

/// Answers every fetch with the same result and records requested URLs.
struct StaticFetcher {
    result: Result<&'static str, u16>,
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _user_agent: &str) -> Result<String, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        self.result
            .map(String::from)
            .map_err(|status| FetchError::Status {
                status,
                url: url.to_string(),
            })
    }
}

fn state(
    result: Result<&'static str, u16>,
) -> (web::Data<AppState>, Arc<StaticFetcher>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(StaticFetcher {
        result,
        urls: Mutex::new(Vec::new()),
    });
    let config = CacheConfig {
        cache_dir: dir.path().to_path_buf(),
        ..CacheConfig::default()
    };
    let cache = Arc::new(FeedCache::new(&config, fetcher.clone()));

    (web::Data::new(AppState { cache }), fetcher, dir)
}

#[actix_web::test]
async fn serves_cooperative_feed() {
    let (data, fetcher, _dir) = state(Ok(PAGE));
    let app = test::init_service(App::new().app_data(data).configure(configure)).await;

    let req = test::TestRequest::get().uri("/nyheter/norr/hagern").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/rss+xml; charset=UTF-8"
    );
    assert!(resp.headers().contains_key(header::LAST_MODIFIED));

    let body = test::read_body(resp).await;
    let xml = std::str::from_utf8(&body).unwrap();
    assert!(xml.contains(r#"<rss version="2.0">"#));
    assert!(xml.contains("<title>HSB Brf Hagern</title>"));
    assert!(xml.contains("<link>http://www.hsb.se/norr/brf/hagern/nyheter/stambyte</link>"));
    assert!(xml.contains("<pubDate>Mon, 03 Mar 2025 00:00:00 +0100</pubDate>"));

    assert_eq!(
        *fetcher.urls.lock().unwrap(),
        vec!["http://www.hsb.se/norr/brf/hagern/nyheter".to_string()]
    );
}

#[actix_web::test]
async fn repeated_requests_use_cache() {
    let (data, fetcher, _dir) = state(Ok(PAGE));
    let app = test::init_service(App::new().app_data(data).configure(configure)).await;

    for uri in ["/nyheter", "/nyheter/", "/nyheter"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    assert_eq!(fetcher.urls.lock().unwrap().len(), 1);
}

#[actix_web::test]
async fn head_has_no_body() {
    let (data, _fetcher, _dir) = state(Ok(PAGE));
    let app = test::init_service(App::new().app_data(data).configure(configure)).await;

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::HEAD)
        .uri("/nyheter/stockholm")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(body.is_empty());
}

#[actix_web::test]
async fn too_many_segments_is_not_found() {
    let (data, fetcher, _dir) = state(Ok(PAGE));
    let app = test::init_service(App::new().app_data(data).configure(configure)).await;

    let req = test::TestRequest::get().uri("/nyheter/a/b/c").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(fetcher.urls.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn upstream_status_is_propagated() {
    let (data, _fetcher, _dir) = state(Err(404));
    let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

    let req = test::TestRequest::get().uri("/nyheter/okand").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(data.cache.is_empty().await);
}
