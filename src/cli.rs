use crate::sync::cache::SideCache;
use crate::sync::catalog;
use crate::sync::config::{self, Overrides};
use crate::sync::engine::Engine;
use crate::sync::format::{BookFormat, CacheKeyScheme};
use crate::sync::library::{self, LibraryScan};
use crate::sync::naming::NamingMode;
use crate::sync::report::Reporter;
use crate::sync::transport::HttpTransport;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

const STATUS_EPILOG: &str = "\
Statuses reported for ebooks:

  N  new         in the catalog but not found locally; downloaded
  U  update      local copy replaced with the catalog version
  C  current     local copy matches the catalog (shown with --verbose)
  O  outdated    local copy is stale; neither --update nor --remove applied
  R  removed     local copy deleted (with --remove)
  X  extraneous  local ebook not found in the catalog
  ?  unknown     local file whose identity could not be determined

A renamed catalog identifier is detected through its redirect and reported
as outdated rather than extraneous, so a genuine X is rare and generally
safe to delete.

Every option can also be set through an SEBSYNC_-prefixed environment
variable (e.g. SEBSYNC_EMAIL) or through ~/.config/sebsync/config.toml.";

/// Synchronize the Standard Ebooks catalog with a local ebook collection.
#[derive(Debug, Parser)]
#[command(name = "sebsync", version, about, after_help = STATUS_EPILOG)]
pub struct Cli {
    /// Directory where local books are stored.
    #[arg(long, value_name = "DIR")]
    books: Option<PathBuf>,

    /// Directory where new ebooks are downloaded.
    #[arg(long, value_name = "DIR")]
    downloads: Option<PathBuf>,

    /// Email address to authenticate with Standard Ebooks.
    #[arg(long, value_name = "ADDRESS")]
    email: Option<String>,

    /// URL of the Standard Ebooks OPDS catalog.
    #[arg(long, value_name = "URL")]
    opds: Option<String>,

    /// Perform a trial run with no changes made.
    #[arg(long)]
    dry_run: bool,

    /// Replace stale local copies with the catalog version, in place.
    #[arg(long)]
    update: bool,

    /// Delete stale or deprecated local copies instead of reporting them.
    #[arg(long)]
    remove: bool,

    /// With --update, re-download matched books without checking staleness.
    #[arg(long)]
    force: bool,

    /// Suppress non-error messages.
    #[arg(long)]
    quiet: bool,

    /// Increase verbosity.
    #[arg(long)]
    verbose: bool,

    /// Book format to synchronize.
    #[arg(long, value_enum, value_name = "FORMAT")]
    format: Option<BookFormat>,

    /// Key scheme for tracking formats without embedded metadata.
    #[arg(long, value_enum, value_name = "SCHEME")]
    cache_key: Option<CacheKeyScheme>,

    /// Naming strategy for newly downloaded files.
    #[arg(long, value_enum, value_name = "MODE")]
    naming: Option<NamingMode>,

    /// Location of the identity cache file.
    #[arg(long, value_name = "FILE")]
    cache_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(self) -> Overrides {
        Overrides {
            books: self.books,
            downloads: self.downloads,
            email: self.email,
            opds: self.opds,
            dry_run: self.dry_run,
            update: self.update,
            remove: self.remove,
            force: self.force,
            quiet: self.quiet,
            verbose: self.verbose,
            format: self.format,
            cache_key: self.cache_key,
            naming: self.naming,
            cache_file: self.cache_file,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(cli.overrides())?;
    let profile = cfg.format.profile(cfg.key_scheme);
    let reporter = Reporter::new(cfg.quiet, cfg.verbose);
    let transport = HttpTransport::new()?;

    let catalog = catalog::fetch_catalog(&transport, &cfg.opds_url, &cfg.email, &profile)?;
    reporter.info(format!("found {} remote ebooks", catalog.len()));

    let mut cache = SideCache::load(cfg.cache_file.clone())?;
    let mut scan = LibraryScan::default();
    scan.merge(library::scan_library(&cfg.downloads_dir, &profile, &cache)?);
    if cfg.books_dir != cfg.downloads_dir {
        scan.merge(library::scan_library(&cfg.books_dir, &profile, &cache)?);
    }
    reporter.info(format!("found {} local ebooks", scan.books.len()));

    let engine = Engine {
        cfg: &cfg,
        profile: &profile,
        transport: &transport,
        reporter: &reporter,
    };
    let summary = engine.run(&catalog, &scan, &mut cache)?;
    reporter.info(format!(
        "new={} updated={} current={} outdated={} removed={} extra={} unknown={}",
        summary.new,
        summary.updated,
        summary.current,
        summary.outdated,
        summary.removed,
        summary.extra,
        summary.unknown,
    ));
    Ok(())
}
