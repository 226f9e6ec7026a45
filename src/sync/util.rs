use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Parse an RFC 3339 timestamp that must carry an explicit `Z` offset.
///
/// Both the OPDS feed and EPUB `dcterms:modified` metadata use this form;
/// anything else is treated as malformed rather than silently reinterpreted
/// in local time.
pub fn parse_rfc3339_z(text: &str) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();
    if !trimmed.ends_with('Z') {
        anyhow::bail!("expected an RFC 3339 timestamp ending in Z, got `{trimmed}`");
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .with_context(|| format!("invalid RFC 3339 timestamp `{trimmed}`"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Convert a filesystem modification time into UTC with second precision.
pub fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}
