use crate::sync::cache::SideCache;
use crate::sync::format::{CacheKeyScheme, FormatProfile};
use crate::sync::ident::EbookId;
use crate::sync::util::{parse_rfc3339_z, system_time_to_utc};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One local file tied to a catalog identifier. `modified` comes from the
/// embedded metadata for self-describing formats, or from the side cache for
/// opaque ones; it is the publication timestamp, not the filesystem mtime.
#[derive(Debug, Clone)]
pub struct LocalEbook {
    pub id: EbookId,
    pub title: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// Everything a scan found: identifiable books plus files of the right
/// format whose identity could not be resolved.
#[derive(Debug, Default)]
pub struct LibraryScan {
    pub books: Vec<LocalEbook>,
    pub unknown: Vec<PathBuf>,
}

impl LibraryScan {
    pub fn merge(&mut self, mut other: LibraryScan) {
        self.books.append(&mut other.books);
        self.unknown.append(&mut other.unknown);
    }
}

/// Embedded metadata of a self-describing container.
#[derive(Debug, Clone)]
pub struct EpubMetadata {
    pub identifier: String,
    pub title: String,
    pub modified: DateTime<Utc>,
}

/// Recursively scan `root` for files of the profile's format. A file that
/// fails to parse or resolve is reported `unknown`, never fatal to the scan;
/// ebooks from other publishers are skipped silently.
pub fn scan_library(root: &Path, profile: &FormatProfile, cache: &SideCache) -> Result<LibraryScan> {
    let mut scan = LibraryScan::default();

    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !profile.matches_path(path) {
            continue;
        }

        if profile.self_describing {
            match read_epub_metadata(path) {
                Ok(meta) => {
                    let Some(id) = EbookId::decode(&meta.identifier) else {
                        if meta.identifier.contains("standardebooks.org") {
                            scan.unknown.push(path.to_path_buf());
                        }
                        continue;
                    };
                    if !id.is_standard_ebooks() {
                        continue;
                    }
                    scan.books.push(LocalEbook {
                        id,
                        title: meta.title,
                        path: path.to_path_buf(),
                        modified: meta.modified,
                    });
                }
                Err(_) => scan.unknown.push(path.to_path_buf()),
            }
        } else {
            let key = cache_key_for(path, profile.key_scheme)?;
            match cache.get(&key).and_then(|e| EbookId::decode(&e.id).map(|id| (id, e))) {
                Some((id, entry)) => scan.books.push(LocalEbook {
                    id,
                    title: entry.title.clone(),
                    path: path.to_path_buf(),
                    modified: entry.modified,
                }),
                None => scan.unknown.push(path.to_path_buf()),
            }
        }
    }

    Ok(scan)
}

/// The side-cache key for one file under the configured scheme.
pub fn cache_key_for(path: &Path, scheme: CacheKeyScheme) -> Result<String> {
    match scheme {
        CacheKeyScheme::Name => Ok(path
            .file_name()
            .and_then(|n| n.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("file has no UTF-8 name: {}", path.display()))?),
        CacheKeyScheme::Hash => {
            let mut file = fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)
                .with_context(|| format!("failed to hash {}", path.display()))?;
            let digest = hasher.finalize();
            let mut out = String::with_capacity(digest.len() * 2);
            for byte in digest {
                out.push_str(&format!("{byte:02x}"));
            }
            Ok(out)
        }
    }
}

/// Enumerate the cache keys of every live file of the opaque format under
/// the given roots. Used to prune the side cache at the end of a run.
pub fn live_cache_keys(roots: &[&Path], profile: &FormatProfile) -> Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for root in roots {
        for entry in WalkDir::new(root) {
            let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
            if !entry.file_type().is_file() || !profile.matches_path(entry.path()) {
                continue;
            }
            keys.insert(cache_key_for(entry.path(), profile.key_scheme)?);
        }
    }
    Ok(keys)
}

/// The filesystem mtime of a local file, in UTC.
pub fn file_mtime(path: &Path) -> Result<DateTime<Utc>> {
    let meta =
        fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let modified = meta
        .modified()
        .with_context(|| format!("failed to read mtime of {}", path.display()))?;
    Ok(system_time_to_utc(modified))
}

/// Extract identifier, title, and `dcterms:modified` from an EPUB container:
/// `META-INF/container.xml` names the OPF rootfile, the OPF metadata block
/// carries the Dublin Core fields.
pub fn read_epub_metadata(path: &Path) -> Result<EpubMetadata> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("not a zip container: {}", path.display()))?;

    let container = read_archive_entry(&mut archive, "META-INF/container.xml")?;
    let rootfile = container_rootfile(&container)?
        .with_context(|| format!("no rootfile declared in {}", path.display()))?;
    let opf = read_archive_entry(&mut archive, &rootfile)?;
    parse_opf(&opf).with_context(|| format!("invalid package metadata in {}", path.display()))
}

fn read_archive_entry(
    archive: &mut zip::ZipArchive<fs::File>,
    name: &str,
) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("missing archive entry {name}"))?;
    let mut out = Vec::new();
    entry
        .read_to_end(&mut out)
        .with_context(|| format!("failed to read archive entry {name}"))?;
    Ok(out)
}

fn container_rootfile(xml: &[u8]) -> Result<Option<String>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"rootfile"
                    && let Some(attr) = e.try_get_attribute("full-path")?
                {
                    return Ok(Some(attr.unescape_value()?.into_owned()));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_opf(xml: &[u8]) -> Result<EpubMetadata> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut identifier: Option<String> = None;
    let mut title: Option<String> = None;
    let mut modified: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"identifier" if identifier.is_none() => {
                    if let Event::Text(text) = reader.read_event_into(&mut buf)? {
                        identifier = Some(text.unescape()?.into_owned());
                    }
                }
                b"title" if title.is_none() => {
                    if let Event::Text(text) = reader.read_event_into(&mut buf)? {
                        title = Some(text.unescape()?.into_owned());
                    }
                }
                b"meta" if modified.is_none() => {
                    let is_modified = e
                        .try_get_attribute("property")?
                        .map(|a| a.unescape_value())
                        .transpose()?
                        .is_some_and(|v| v == "dcterms:modified");
                    if is_modified
                        && let Event::Text(text) = reader.read_event_into(&mut buf)?
                    {
                        modified = Some(text.unescape()?.into_owned());
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let identifier = identifier.context("missing dc:identifier")?;
    let title = title.context("missing dc:title")?;
    let modified = modified.context("missing dcterms:modified")?;
    Ok(EpubMetadata {
        identifier,
        title,
        modified: parse_rfc3339_z(&modified)?,
    })
}
