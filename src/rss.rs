//! RSS 2.0 rendering of feed snapshots.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::Write;

use crate::custom_date::{format_rfc822, local_year};
use crate::error::RenderError;
use crate::feed::{FeedSnapshot, NewsItem};

pub const CONTENT_TYPE: &str = "application/rss+xml; charset=UTF-8";

const LANGUAGE: &str = "sv";
const COPYRIGHT_HOLDER: &str = "HSB";
const IMAGE_TITLE: &str = "HSB";
const IMAGE_URL: &str = "http://www.hsb.se/globalassets/centralt-innehall/media/logo/hsblogo.png";
const IMAGE_WIDTH: &str = "181";
const IMAGE_HEIGHT: &str = "132";
const TTL_MINUTES: &str = "60";

type XmlResult = Result<(), RenderError>;

fn start<W: Write>(w: &mut Writer<W>, name: &str) -> XmlResult {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end<W: Write>(w: &mut Writer<W>, name: &str) -> XmlResult {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element<W: Write>(w: &mut Writer<W>, name: &str, text: &str) -> XmlResult {
    start(w, name)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end(w, name)
}

fn date_element<W: Write>(w: &mut Writer<W>, name: &str, date: DateTime<Utc>) -> XmlResult {
    text_element(w, name, &format_rfc822(date))
}

fn write_image<W: Write>(w: &mut Writer<W>, link: &str) -> XmlResult {
    start(w, "image")?;
    text_element(w, "title", IMAGE_TITLE)?;
    text_element(w, "link", link)?;
    text_element(w, "url", IMAGE_URL)?;
    text_element(w, "width", IMAGE_WIDTH)?;
    text_element(w, "height", IMAGE_HEIGHT)?;
    end(w, "image")
}

/// HTML-escapes a description before it is XML-escaped as element text.
///
/// Only `&`, `<`, `>` and `"` are replaced. Letters such as `å` are left as
/// UTF-8 rather than turned into named entities, since the document is UTF-8.
fn escape_description(text: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(text)
}

fn write_item<W: Write>(w: &mut Writer<W>, item: &NewsItem) -> XmlResult {
    start(w, "item")?;
    text_element(w, "title", &item.title)?;
    if let Some(link) = &item.link {
        text_element(w, "link", link)?;
    }
    text_element(w, "description", &escape_description(&item.description))?;
    if let Some(guid) = item.guid() {
        text_element(w, "guid", &guid)?;
    }
    if let Some(date) = item.publish_date {
        date_element(w, "pubDate", date)?;
    }
    end(w, "item")
}

/// Renders `snapshot` as an RSS 2.0 document. `now` only decides the copyright year.
pub fn render(snapshot: &FeedSnapshot, now: DateTime<Utc>) -> Result<String, RenderError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    start(&mut writer, "channel")?;

    text_element(&mut writer, "title", &snapshot.title)?;
    text_element(&mut writer, "link", &snapshot.source_url)?;
    text_element(&mut writer, "description", &snapshot.description)?;
    text_element(&mut writer, "language", LANGUAGE)?;
    text_element(
        &mut writer,
        "copyright",
        &format!("Copyright {}, {COPYRIGHT_HOLDER}", local_year(now)),
    )?;
    write_image(&mut writer, &snapshot.source_url)?;
    if let Some(date) = snapshot.last_build_date {
        date_element(&mut writer, "lastBuildDate", date)?;
    }
    text_element(&mut writer, "ttl", TTL_MINUTES)?;

    for item in &snapshot.items {
        write_item(&mut writer, item)?;
    }

    end(&mut writer, "channel")?;
    end(&mut writer, "rss")?;

    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|err| {
        RenderError::from(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })
}
