use crate::sync::catalog::Catalog;
use crate::sync::ident::EbookId;
use crate::sync::library::LocalEbook;
use crate::sync::transport::Transport;
use anyhow::Result;

/// Whether an orphan local entry's identifier has been retired in favor of
/// one that is still in the catalog.
///
/// The catalog signals a rename with a permanent redirect from the old
/// identifier's URL to the new one. Only a permanent redirect whose target,
/// re-wrapped into identifier form, is present in the current snapshot counts
/// as deprecation; every other outcome means the file is genuinely
/// extraneous.
pub fn is_deprecated(
    local: &LocalEbook,
    catalog: &Catalog,
    transport: &dyn Transport,
) -> Result<bool> {
    let head = transport.head_no_redirect(local.id.url())?;
    if head.status != 301 && head.status != 308 {
        return Ok(false);
    }
    let Some(location) = head.location else {
        return Ok(false);
    };
    let target = resolve_location(local.id.url(), &location);
    Ok(catalog.contains_key(&EbookId::from_url(&target)))
}

/// Resolve a possibly relative `Location` header against the request URL's
/// origin.
fn resolve_location(base: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    let origin = match base.find("://").map(|i| i + 3) {
        Some(host_start) => match base[host_start..].find('/') {
            Some(path_start) => &base[..host_start + path_start],
            None => base,
        },
        None => base,
    };
    format!("{origin}{location}")
}
