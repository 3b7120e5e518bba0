use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::FetchError;
use crate::feed::{FeedKey, FeedSnapshot};
use crate::stabilize::{last_build_date, stabilize};

pub const DEFAULT_USER_AGENT: &str = "Mozilla";

lazy_static! {
    static ref BRF_TITLE: Selector = selector("div.brf-header-bottom-text > span");
    static ref REGION_TITLE: Selector = selector("div.regionname");
    static ref LIST_ITEM: Selector = selector("ul.itemlist > li.item");
    static ref LINK_AREA: Selector = selector("a.linkclickarea");
    static ref ITEM_INFORMATION: Selector = selector("div.iteminformation");
    static ref ITEM_TITLE: Selector = selector("h3");
    static ref ITEM_DATE: Selector = selector("div.itemdate");
    static ref ITEM_DESCRIPTION: Selector = selector("div.itemdescription");
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Source of raw news pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<String, FetchError>;
}

/// Fetches pages over HTTP with a bounded wait.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn build_user_agent(user_agent: &str) -> Result<HeaderMap, FetchError> {
    let value = HeaderValue::from_str(user_agent)
        .map_err(|_| FetchError::InvalidRequest(format!("bad user agent {user_agent:?}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, value);
    Ok(headers)
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(build_user_agent(user_agent)?)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// One listing entry as found on the page, before any date handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub date_text: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub items: Vec<RawItem>,
}

fn element_text(element: ElementRef<'_>) -> String {
    let text = element.text().collect::<String>();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(element: Option<ElementRef<'_>>, selector: &Selector) -> Option<String> {
    element?.select(selector).next().map(element_text)
}

fn extract_item(base: Option<&Url>, item: ElementRef<'_>) -> RawItem {
    let link_area = item.select(&LINK_AREA).next();
    let information = link_area.and_then(|area| area.select(&ITEM_INFORMATION).next());

    let link = link_area
        .and_then(|area| area.value().attr("href"))
        .and_then(|href| match base {
            Some(base) => base.join(href).ok(),
            None => Url::parse(href).ok(),
        })
        .map(String::from);

    RawItem {
        title: first_text(information, &ITEM_TITLE),
        link,
        date_text: first_text(information, &ITEM_DATE),
        description: first_text(information, &ITEM_DESCRIPTION),
    }
}

/// Pulls the page title and the news listing out of a fetched page.
pub fn extract_page(document: &Html, page_url: &str) -> ExtractedPage {
    let base = Url::parse(page_url).ok();

    let mut title = select_text(document, &BRF_TITLE);
    if title.is_empty() {
        title = select_text(document, &REGION_TITLE);
    }

    let items = document
        .select(&LIST_ITEM)
        .map(|item| extract_item(base.as_ref(), item))
        .collect();

    ExtractedPage { title, items }
}

/// Builds a stabilized snapshot from a fetched page body.
pub fn snapshot_from_body(
    source_url: &str,
    body: &str,
    previous: Option<&FeedSnapshot>,
    now: DateTime<Utc>,
) -> FeedSnapshot {
    let document = Html::parse_document(body);
    let page = extract_page(&document, source_url);
    let items = stabilize(page.items, previous, now);

    FeedSnapshot {
        source_url: source_url.to_string(),
        title: page.title,
        description: String::new(),
        last_build_date: last_build_date(&items),
        items,
    }
}

/// Fetches the page for `key` and turns it into a new snapshot.
#[instrument(level = "debug", skip_all, fields(key = %key))]
pub async fn build_snapshot(
    fetcher: &dyn PageFetcher,
    key: &FeedKey,
    user_agent: &str,
    previous: Option<&FeedSnapshot>,
    now: DateTime<Utc>,
) -> Result<FeedSnapshot, FetchError> {
    let source_url = key.source_url();
    let body = fetcher.fetch(&source_url, user_agent).await?;
    debug!(bytes = body.len(), url = %source_url, "Fetched news page");

    let snapshot = snapshot_from_body(&source_url, &body, previous, now);
    info!(
        items = snapshot.items.len(),
        title = %snapshot.title,
        "Extracted news feed"
    );

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="brf-header-bottom-text"><span>HSB Brf  Hagern</span></div>
  <div class="regionname">HSB Norr</div>
  <ul class="itemlist">
    <li class="item">
      <a class="linkclickarea" href="/norr/brf/hagern/nyheter/arsstamma">
        <div class="iteminformation">
          <h3>Årsstämma</h3>
          <div class="itemdate">17 oktober 2026</div>
          <div class="itemdescription">Välkommen till <b>årsstämman</b>.</div>
        </div>
      </a>
    </li>
    <li class="item">
      <a class="linkclickarea" href="https://www.hsb.se/norr/nyheter/hiss">
        <div class="iteminformation">
          <h3>Hissen är lagad</h3>
        </div>
      </a>
    </li>
    <li class="item"><span>trasig</span></li>
  </ul>
</body></html>"#;

    #[test]
    fn extracts_items_in_order() {
        let document = Html::parse_document(PAGE);
        let page = extract_page(&document, "http://www.hsb.se/norr/brf/hagern/nyheter");

        assert_eq!(page.title, "HSB Brf Hagern");
        assert_eq!(page.items.len(), 3);

        assert_eq!(
            page.items[0],
            RawItem {
                title: Some("Årsstämma".into()),
                link: Some("http://www.hsb.se/norr/brf/hagern/nyheter/arsstamma".into()),
                date_text: Some("17 oktober 2026".into()),
                description: Some("Välkommen till årsstämman.".into()),
            }
        );

        assert_eq!(
            page.items[1],
            RawItem {
                title: Some("Hissen är lagad".into()),
                link: Some("https://www.hsb.se/norr/nyheter/hiss".into()),
                date_text: None,
                description: None,
            }
        );

        assert_eq!(page.items[2], RawItem::default());
    }

    #[test]
    fn falls_back_to_region_name() {
        let body = r#"<html><body>
            <div class="brf-header-bottom-text"><span>  </span></div>
            <div class="regionname">HSB Norr</div>
        </body></html>"#;
        let document = Html::parse_document(body);
        let page = extract_page(&document, "https://www.hsb.se/norr/om-hsb/nyheter");

        assert_eq!(page.title, "HSB Norr");
        assert!(page.items.is_empty());
    }

    #[test]
    fn snapshot_uses_source_url_and_empty_description() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 10, 17, 10, 0, 0).unwrap();
        let snapshot = snapshot_from_body("http://www.hsb.se/norr/brf/hagern/nyheter", PAGE, None, now);

        assert_eq!(snapshot.source_url, "http://www.hsb.se/norr/brf/hagern/nyheter");
        assert_eq!(snapshot.description, "");
        assert_eq!(snapshot.items.len(), 3);
        assert_eq!(snapshot.items[2].title, "");
        assert_eq!(snapshot.items[2].link, None);
        assert_eq!(snapshot.last_build_date, Some(now));
    }

    #[test]
    fn user_agent_header() {
        let headers = build_user_agent(DEFAULT_USER_AGENT).unwrap();
        assert_eq!(headers[USER_AGENT], "Mozilla");
        assert!(build_user_agent("bad\nagent").is_err());
    }

    #[tokio::test]
    async fn silent_upstream_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accepts connections and never answers
        let server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let fetcher = HttpFetcher::new(Duration::from_millis(300)).unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/nyheter"), DEFAULT_USER_AGENT)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
        server.abort();
    }

    #[tokio::test]
    async fn upstream_error_status_is_kept() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/okand/nyheter"), DEFAULT_USER_AGENT)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        server.await.unwrap();
    }
}
