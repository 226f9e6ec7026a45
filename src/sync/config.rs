use crate::sync::cache;
use crate::sync::format::{BookFormat, CacheKeyScheme};
use crate::sync::naming::NamingMode;
use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_OPDS_URL: &str = "https://standardebooks.org/feeds/opds/all";

/// Fully resolved options for one run. No ambient globals: the engine and
/// every collaborator receive this by reference.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory where the local collection is stored.
    pub books_dir: PathBuf,
    /// Directory where new ebooks are downloaded.
    pub downloads_dir: PathBuf,
    pub opds_url: String,
    /// Email address used to authenticate with the catalog.
    pub email: String,
    pub dry_run: bool,
    /// Replace stale local copies in place.
    pub update: bool,
    /// Delete stale or deprecated local copies instead of reporting them.
    pub remove: bool,
    /// With `update`, re-download matches without classifying them first.
    pub force: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub format: BookFormat,
    pub key_scheme: CacheKeyScheme,
    pub naming: NamingMode,
    pub cache_file: PathBuf,
}

/// Command-line values layered on top of file and environment configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub books: Option<PathBuf>,
    pub downloads: Option<PathBuf>,
    pub email: Option<String>,
    pub opds: Option<String>,
    pub dry_run: bool,
    pub update: bool,
    pub remove: bool,
    pub force: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub format: Option<BookFormat>,
    pub cache_key: Option<CacheKeyScheme>,
    pub naming: Option<NamingMode>,
    pub cache_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    books: Option<PathBuf>,
    downloads: Option<PathBuf>,
    email: Option<String>,
    opds: Option<String>,
    update: Option<bool>,
    remove: Option<bool>,
    format: Option<String>,
    cache_key: Option<String>,
    naming: Option<String>,
    cache_file: Option<PathBuf>,
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn parse_enum<T: ValueEnum>(what: &str, raw: &str) -> Result<T> {
    T::from_str(raw.trim(), true).map_err(|err| anyhow!("invalid {what}: {err}"))
}

fn env_or_enum<T: ValueEnum>(var: &str, fallback: T) -> Result<T> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => parse_enum(var, &v),
        _ => Ok(fallback),
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Some(custom) = env_path("SEBSYNC_CONFIG_PATH") {
        return Some(custom);
    }
    Some(dirs::config_dir()?.join("sebsync").join("config.toml"))
}

fn read_file_config() -> Result<FileConfig> {
    let Some(path) = resolve_config_path() else {
        return Ok(FileConfig::default());
    };
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn existing_dir(path: PathBuf) -> Option<PathBuf> {
    path.is_dir().then_some(path)
}

/// Resolve the run configuration. Precedence, lowest to highest: built-in
/// defaults, the config file, `SEBSYNC_*` environment variables, then
/// command-line flags.
pub fn load_config(overrides: Overrides) -> Result<SyncConfig> {
    let file = read_file_config()?;
    let home = dirs::home_dir();

    let mut books = file
        .books
        .or_else(|| home.as_ref().map(|h| h.join("Books")).and_then(existing_dir));
    let mut downloads = file
        .downloads
        .or_else(|| home.as_ref().map(|h| h.join("Downloads")).and_then(existing_dir));
    let mut email = file.email.unwrap_or_default();
    let mut opds = file.opds.unwrap_or_else(|| DEFAULT_OPDS_URL.to_string());
    let mut format = match file.format {
        Some(raw) => parse_enum("format", &raw)?,
        None => BookFormat::Epub,
    };
    let mut key_scheme = match file.cache_key {
        Some(raw) => parse_enum("cache_key", &raw)?,
        None => CacheKeyScheme::Hash,
    };
    let mut naming = match file.naming {
        Some(raw) => parse_enum("naming", &raw)?,
        None => NamingMode::Sortable,
    };
    let mut cache_file = file.cache_file;

    if let Some(path) = env_path("SEBSYNC_BOOKS") {
        books = Some(path);
    }
    if let Some(path) = env_path("SEBSYNC_DOWNLOADS") {
        downloads = Some(path);
    }
    email = env_or_string("SEBSYNC_EMAIL", &email);
    opds = env_or_string("SEBSYNC_OPDS", &opds);
    format = env_or_enum("SEBSYNC_FORMAT", format)?;
    key_scheme = env_or_enum("SEBSYNC_CACHE_KEY", key_scheme)?;
    naming = env_or_enum("SEBSYNC_NAMING", naming)?;
    if let Some(path) = env_path("SEBSYNC_CACHE_FILE") {
        cache_file = Some(path);
    }

    let cfg = SyncConfig {
        books_dir: overrides
            .books
            .or(books)
            .ok_or_else(|| anyhow!("books directory not found; pass --books"))?,
        downloads_dir: overrides
            .downloads
            .or(downloads)
            .ok_or_else(|| anyhow!("downloads directory not found; pass --downloads"))?,
        email: overrides.email.unwrap_or(email),
        opds_url: overrides.opds.unwrap_or(opds),
        dry_run: overrides.dry_run || env_or_bool("SEBSYNC_DRY_RUN", false),
        update: overrides.update || env_or_bool("SEBSYNC_UPDATE", file.update.unwrap_or(false)),
        remove: overrides.remove || env_or_bool("SEBSYNC_REMOVE", file.remove.unwrap_or(false)),
        force: overrides.force || env_or_bool("SEBSYNC_FORCE", false),
        quiet: overrides.quiet || env_or_bool("SEBSYNC_QUIET", false),
        verbose: overrides.verbose || env_or_bool("SEBSYNC_VERBOSE", false),
        format: overrides.format.unwrap_or(format),
        key_scheme: overrides.cache_key.unwrap_or(key_scheme),
        naming: overrides.naming.unwrap_or(naming),
        cache_file: match overrides.cache_file.or(cache_file) {
            Some(path) => path,
            None => cache::default_cache_path()?,
        },
    };
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &SyncConfig) -> Result<()> {
    if cfg.email.trim().is_empty() {
        return Err(anyhow!(
            "email address is required to fetch the catalog; pass --email or set SEBSYNC_EMAIL"
        ));
    }
    if !cfg.books_dir.is_dir() {
        return Err(anyhow!(
            "books directory does not exist: {}",
            cfg.books_dir.display()
        ));
    }
    if !cfg.downloads_dir.is_dir() {
        return Err(anyhow!(
            "downloads directory does not exist: {}",
            cfg.downloads_dir.display()
        ));
    }
    if cfg.opds_url.trim().is_empty() {
        return Err(anyhow!("OPDS URL cannot be empty"));
    }
    if cfg.force && !cfg.update {
        return Err(anyhow!("--force only makes sense together with --update"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{FileConfig, SyncConfig, validate};
    use crate::sync::format::{BookFormat, CacheKeyScheme};
    use crate::sync::naming::NamingMode;
    use tempfile::tempdir;

    fn valid(root: &std::path::Path) -> SyncConfig {
        SyncConfig {
            books_dir: root.to_path_buf(),
            downloads_dir: root.to_path_buf(),
            opds_url: super::DEFAULT_OPDS_URL.to_string(),
            email: "reader@example.net".to_string(),
            dry_run: false,
            update: false,
            remove: false,
            force: false,
            quiet: false,
            verbose: false,
            format: BookFormat::Epub,
            key_scheme: CacheKeyScheme::Hash,
            naming: NamingMode::Sortable,
            cache_file: root.join("cache.json"),
        }
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let parsed: FileConfig = toml::from_str(
            r#"
            email = "reader@example.net"
            format = "kepub"
            update = true
            "#,
        )
        .expect("parse");
        assert_eq!(parsed.email.as_deref(), Some("reader@example.net"));
        assert_eq!(parsed.format.as_deref(), Some("kepub"));
        assert_eq!(parsed.update, Some(true));
        assert!(parsed.books.is_none());
    }

    #[test]
    fn validate_accepts_a_complete_config() {
        let tmp = tempdir().expect("tempdir");
        assert!(validate(&valid(tmp.path())).is_ok());
    }

    #[test]
    fn validate_rejects_missing_email_and_dirs() {
        let tmp = tempdir().expect("tempdir");

        let mut cfg = valid(tmp.path());
        cfg.email = String::new();
        assert!(validate(&cfg).is_err());

        let mut cfg = valid(tmp.path());
        cfg.books_dir = tmp.path().join("no-such-dir");
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn validate_rejects_force_without_update() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = valid(tmp.path());
        cfg.force = true;
        assert!(validate(&cfg).is_err());
        cfg.update = true;
        assert!(validate(&cfg).is_ok());
    }
}
