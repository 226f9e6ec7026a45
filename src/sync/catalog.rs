use crate::error::SyncError;
use crate::sync::format::FormatProfile;
use crate::sync::ident::EbookId;
use crate::sync::transport::Transport;
use crate::sync::util::parse_rfc3339_z;
use anyhow::Result;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};

/// One catalog entry, immutable for the run. `updated` is the authoritative
/// version marker.
#[derive(Debug, Clone)]
pub struct RemoteEbook {
    pub id: EbookId,
    pub title: String,
    pub author: String,
    pub href: String,
    pub updated: DateTime<Utc>,
}

pub type Catalog = BTreeMap<EbookId, RemoteEbook>;

/// Fetch and parse the OPDS feed into an identifier-keyed snapshot.
///
/// An empty result is fatal, not "nothing to sync": the usual cause is a bad
/// email address, and treating it as an empty catalog would mark the entire
/// local collection extraneous.
pub fn fetch_catalog(
    transport: &dyn Transport,
    opds_url: &str,
    email: &str,
    profile: &FormatProfile,
) -> Result<Catalog> {
    let body = transport
        .get(opds_url, Some(email))
        .map_err(|err| SyncError::CatalogUnavailable(format!("{err:#}")))?;
    let catalog = parse_catalog(BufReader::new(body), profile.link_title)
        .map_err(|err| SyncError::CatalogUnavailable(format!("{err:#}")))?;
    if catalog.is_empty() {
        return Err(SyncError::CatalogUnavailable(
            "feed contained no matching entries; is the email address correct?".to_string(),
        )
        .into());
    }
    Ok(catalog)
}

#[derive(Default)]
struct PartialEntry {
    id: Option<EbookId>,
    title: Option<String>,
    author: Option<String>,
    href: Option<String>,
    updated: Option<DateTime<Utc>>,
}

impl PartialEntry {
    fn finish(self) -> Option<RemoteEbook> {
        Some(RemoteEbook {
            id: self.id?,
            title: self.title?,
            author: self.author?,
            // Entries that do not offer the requested format have no matching
            // link and are skipped here.
            href: self.href?,
            updated: self.updated?,
        })
    }
}

/// Streaming Atom parse. Namespace prefixes vary between feeds, so elements
/// are matched on local name; feed-level `title`/`updated` are excluded by
/// only capturing inside an `entry`.
pub fn parse_catalog<R: BufRead>(reader: R, link_title: &str) -> Result<Catalog> {
    let mut xml = quick_xml::Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut catalog = Catalog::new();
    let mut buf = Vec::new();
    let mut entry: Option<PartialEntry> = None;
    let mut in_author = false;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"entry" => entry = Some(PartialEntry::default()),
                    b"author" if entry.is_some() => in_author = true,
                    b"identifier" => {
                        if let Some(entry) = entry.as_mut()
                            && let Some(text) = next_text(&mut xml, &mut buf)?
                        {
                            entry.id = EbookId::decode(&text);
                        }
                    }
                    b"title" => {
                        if let Some(entry) = entry.as_mut()
                            && entry.title.is_none()
                            && let Some(text) = next_text(&mut xml, &mut buf)?
                        {
                            entry.title = Some(text);
                        }
                    }
                    b"name" if in_author => {
                        if let Some(entry) = entry.as_mut()
                            && entry.author.is_none()
                            && let Some(text) = next_text(&mut xml, &mut buf)?
                        {
                            entry.author = Some(text);
                        }
                    }
                    b"updated" => {
                        if let Some(entry) = entry.as_mut()
                            && let Some(text) = next_text(&mut xml, &mut buf)?
                        {
                            entry.updated = Some(parse_rfc3339_z(&text)?);
                        }
                    }
                    b"link" => capture_link(&e, entry.as_mut(), link_title)?,
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"link" {
                    capture_link(&e, entry.as_mut(), link_title)?;
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"author" => in_author = false,
                b"entry" => {
                    if let Some(remote) = entry.take().and_then(PartialEntry::finish) {
                        catalog.insert(remote.id.clone(), remote);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(catalog)
}

fn capture_link(
    e: &quick_xml::events::BytesStart<'_>,
    entry: Option<&mut PartialEntry>,
    link_title: &str,
) -> Result<()> {
    let Some(entry) = entry else {
        return Ok(());
    };
    let Some(title) = e.try_get_attribute("title")? else {
        return Ok(());
    };
    if title.unescape_value()? != link_title {
        return Ok(());
    }
    if let Some(href) = e.try_get_attribute("href")? {
        entry.href = Some(href.unescape_value()?.into_owned());
    }
    Ok(())
}

fn next_text<R: BufRead>(
    xml: &mut quick_xml::Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<Option<String>> {
    if let Event::Text(text) = xml.read_event_into(buf)? {
        return Ok(Some(text.unescape()?.into_owned()));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::parse_catalog;
    use chrono::{TimeZone, Utc};

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/terms/">
  <title>Standard Ebooks</title>
  <updated>2024-06-01T00:00:00Z</updated>
  <entry>
    <id>https://standardebooks.org/ebooks/jane-austen/persuasion</id>
    <dc:identifier>url:https://standardebooks.org/ebooks/jane-austen/persuasion</dc:identifier>
    <title>Persuasion</title>
    <author><name>Jane Austen</name></author>
    <updated>2024-03-01T08:15:30Z</updated>
    <link href="https://standardebooks.org/ebooks/jane-austen/persuasion/downloads/persuasion.epub" title="Recommended compatible epub" rel="http://opds-spec.org/acquisition/open-access" type="application/epub+zip"/>
    <link href="https://standardebooks.org/ebooks/jane-austen/persuasion/downloads/persuasion.azw3" title="Amazon Kindle azw3" rel="http://opds-spec.org/acquisition/open-access" type="application/x-mobi8-ebook"/>
  </entry>
  <entry>
    <dc:identifier>url:https://standardebooks.org/ebooks/john-galsworthy/the-forsyte-saga</dc:identifier>
    <title>The Forsyte Saga</title>
    <author><name>John Galsworthy</name></author>
    <updated>2024-04-10T12:00:00Z</updated>
    <link href="https://standardebooks.org/ebooks/john-galsworthy/the-forsyte-saga/downloads/saga.epub" title="Recommended compatible epub" rel="http://opds-spec.org/acquisition/open-access" type="application/epub+zip"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_with_the_requested_link() {
        let catalog =
            parse_catalog(FEED.as_bytes(), "Recommended compatible epub").expect("parse");
        assert_eq!(catalog.len(), 2);

        let persuasion = catalog
            .values()
            .find(|e| e.title == "Persuasion")
            .expect("persuasion");
        assert_eq!(persuasion.author, "Jane Austen");
        assert_eq!(
            persuasion.href,
            "https://standardebooks.org/ebooks/jane-austen/persuasion/downloads/persuasion.epub"
        );
        assert_eq!(
            persuasion.updated,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 30).unwrap()
        );
        assert_eq!(
            persuasion.id.encode(),
            "url:https://standardebooks.org/ebooks/jane-austen/persuasion"
        );
    }

    #[test]
    fn entries_without_the_requested_format_are_skipped() {
        let catalog = parse_catalog(FEED.as_bytes(), "Amazon Kindle azw3").expect("parse");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.values().next().unwrap().title, "Persuasion");
    }

    #[test]
    fn feed_level_title_and_updated_are_ignored() {
        let catalog =
            parse_catalog(FEED.as_bytes(), "Recommended compatible epub").expect("parse");
        assert!(catalog.values().all(|e| e.title != "Standard Ebooks"));
        assert!(
            catalog
                .values()
                .all(|e| e.updated != Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_catalog("<feed><entry>".as_bytes(), "x").is_err());
    }
}
