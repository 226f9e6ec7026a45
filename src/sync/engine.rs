use crate::error::SyncError;
use crate::sync::cache::{CacheEntry, SideCache};
use crate::sync::catalog::{Catalog, RemoteEbook};
use crate::sync::classify::{Freshness, classify};
use crate::sync::config::SyncConfig;
use crate::sync::deprecate::is_deprecated;
use crate::sync::download::install;
use crate::sync::format::FormatProfile;
use crate::sync::ident::EbookId;
use crate::sync::library::{self, LibraryScan, LocalEbook};
use crate::sync::naming;
use crate::sync::report::Reporter;
use crate::sync::transport::Transport;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Per-entry verdict, reported as a single letter next to the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// In the catalog, not found locally; downloaded.
    New,
    /// Local copy replaced in place with the current version.
    Update,
    /// Local copy matches the catalog.
    Current,
    /// Local copy is stale (or deprecated) but update/remove did not apply.
    Outdated,
    /// Local copy deleted under the remove policy.
    Removed,
    /// Local file with no catalog counterpart.
    Extra,
    /// Local file whose identity could not be resolved.
    Unknown,
}

impl SyncStatus {
    pub fn letter(self) -> &'static str {
        match self {
            SyncStatus::New => "N",
            SyncStatus::Update => "U",
            SyncStatus::Current => "C",
            SyncStatus::Outdated => "O",
            SyncStatus::Removed => "R",
            SyncStatus::Extra => "X",
            SyncStatus::Unknown => "?",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub new: usize,
    pub updated: usize,
    pub current: usize,
    pub outdated: usize,
    pub removed: usize,
    pub extra: usize,
    pub unknown: usize,
}

/// One reconciliation run. Owns nothing; operates on the snapshots and cache
/// handed to [`Engine::run`] and reports through the [`Reporter`].
pub struct Engine<'a> {
    pub cfg: &'a SyncConfig,
    pub profile: &'a FormatProfile,
    pub transport: &'a dyn Transport,
    pub reporter: &'a Reporter,
}

impl Engine<'_> {
    /// Reconcile the remote snapshot against the local one.
    ///
    /// Every remote entry is fully resolved (classified and acted on) before
    /// the next begins. Per-entry failures that are not part of the fatal
    /// taxonomy are downgraded to `Unknown` and the run continues;
    /// rate-limit exhaustion and corrupt downloads abort immediately,
    /// leaving already-applied entries in place.
    pub fn run(
        &self,
        catalog: &Catalog,
        scan: &LibraryScan,
        cache: &mut SideCache,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        // Duplicate copies of one book are legitimate; a remote entry is
        // satisfied when any local record matches.
        let mut local_by_id: BTreeMap<&EbookId, Vec<&LocalEbook>> = BTreeMap::new();
        for book in &scan.books {
            local_by_id.entry(&book.id).or_default().push(book);
        }

        for remote in catalog.values() {
            match local_by_id.get(&remote.id) {
                None => self.install_new(remote, cache, &mut summary)?,
                Some(matches) => {
                    for &local in matches.iter() {
                        self.reconcile_match(remote, local, cache, &mut summary)?;
                    }
                }
            }
        }

        for (&id, locals) in &local_by_id {
            if catalog.contains_key(id) {
                continue;
            }
            for &local in locals.iter() {
                self.reconcile_orphan(local, catalog, cache, &mut summary)?;
            }
        }

        for path in &scan.unknown {
            self.reporter.status(SyncStatus::Unknown, path);
            summary.unknown += 1;
        }

        // Prune last, so entries orphaned by anything that happened during
        // the run (including manual deletions) are cleaned too. Only opaque
        // formats use the cache; an epub run must not touch azw3 entries.
        if !self.profile.self_describing && !self.cfg.dry_run {
            let roots = [self.cfg.downloads_dir.as_path(), self.cfg.books_dir.as_path()];
            let live = library::live_cache_keys(&roots, self.profile)?;
            cache.prune(&live);
            cache.save()?;
        }

        Ok(summary)
    }

    fn install_new(
        &self,
        remote: &RemoteEbook,
        cache: &mut SideCache,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let dest = self
            .cfg
            .downloads_dir
            .join(naming::filename(remote, self.cfg.naming, self.profile));
        if !self.install_or_unknown(remote, &dest, summary)? {
            return Ok(());
        }
        self.reporter.status(SyncStatus::New, &dest);
        summary.new += 1;
        if !self.cfg.dry_run {
            self.remember(remote, &dest, cache)?;
        }
        Ok(())
    }

    fn reconcile_match(
        &self,
        remote: &RemoteEbook,
        local: &LocalEbook,
        cache: &mut SideCache,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        if self.cfg.update {
            let stale = if self.cfg.force {
                true
            } else {
                match self.classify_or_unknown(local, remote, summary)? {
                    Some(freshness) => freshness == Freshness::Different,
                    None => return Ok(()),
                }
            };
            if stale {
                let old_key = self.opaque_key(&local.path)?;
                if !self.install_or_unknown(remote, &local.path, summary)? {
                    return Ok(());
                }
                self.reporter.status(SyncStatus::Update, &local.path);
                summary.updated += 1;
                if !self.cfg.dry_run {
                    if let Some(old_key) = old_key {
                        cache.remove(&old_key);
                    }
                    self.remember(remote, &local.path, cache)?;
                }
            } else {
                self.reporter.status(SyncStatus::Current, &local.path);
                summary.current += 1;
            }
            return Ok(());
        }

        match self.classify_or_unknown(local, remote, summary)? {
            Some(Freshness::Different) => self.retire(local, cache, summary),
            Some(Freshness::Current) => {
                self.reporter.status(SyncStatus::Current, &local.path);
                summary.current += 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn reconcile_orphan(
        &self,
        local: &LocalEbook,
        catalog: &Catalog,
        cache: &mut SideCache,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let deprecated = match is_deprecated(local, catalog, self.transport) {
            Ok(deprecated) => deprecated,
            Err(err) => {
                if err.downcast_ref::<SyncError>().is_some() {
                    return Err(err);
                }
                // An unanswerable redirect probe is ambiguous, not
                // deprecated; the file stays and is reported extraneous.
                self.reporter.warn(format!(
                    "could not check {} for deprecation: {err:#}",
                    local.id
                ));
                false
            }
        };
        if deprecated {
            self.retire(local, cache, summary)
        } else {
            self.reporter.status(SyncStatus::Extra, &local.path);
            summary.extra += 1;
            Ok(())
        }
    }

    /// A stale or deprecated local copy: removed under the remove policy,
    /// otherwise only reported.
    fn retire(
        &self,
        local: &LocalEbook,
        cache: &mut SideCache,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        if self.cfg.remove {
            self.reporter.status(SyncStatus::Removed, &local.path);
            if !self.cfg.dry_run {
                let key = self.opaque_key(&local.path)?;
                fs::remove_file(&local.path)
                    .with_context(|| format!("failed to remove {}", local.path.display()))?;
                if let Some(key) = key {
                    cache.remove(&key);
                }
            }
            summary.removed += 1;
        } else {
            self.reporter.status(SyncStatus::Outdated, &local.path);
            summary.outdated += 1;
        }
        Ok(())
    }

    /// Download into `dest`, downgrading failures local to this entry to a
    /// reported `Unknown` so the rest of the run proceeds. Fatal taxonomy
    /// errors (corrupt download, rate-limit exhaustion) still abort.
    fn install_or_unknown(
        &self,
        remote: &RemoteEbook,
        dest: &Path,
        summary: &mut SyncSummary,
    ) -> Result<bool> {
        match install(self.transport, &remote.href, dest, self.profile, self.cfg.dry_run) {
            Ok(()) => Ok(true),
            Err(err) => {
                if err.downcast_ref::<SyncError>().is_some() {
                    return Err(err);
                }
                self.reporter
                    .warn(format!("could not download {}: {err:#}", remote.href));
                self.reporter.status(SyncStatus::Unknown, dest);
                summary.unknown += 1;
                Ok(false)
            }
        }
    }

    fn classify_or_unknown(
        &self,
        local: &LocalEbook,
        remote: &RemoteEbook,
        summary: &mut SyncSummary,
    ) -> Result<Option<Freshness>> {
        match classify(local, remote, self.transport) {
            Ok(freshness) => Ok(Some(freshness)),
            Err(err) => {
                if err.downcast_ref::<SyncError>().is_some() {
                    return Err(err);
                }
                self.reporter
                    .warn(format!("could not classify {}: {err:#}", local.path.display()));
                self.reporter.status(SyncStatus::Unknown, &local.path);
                summary.unknown += 1;
                Ok(None)
            }
        }
    }

    /// Record catalog identity for an installed file of an opaque format.
    fn remember(&self, remote: &RemoteEbook, path: &Path, cache: &mut SideCache) -> Result<()> {
        let Some(key) = self.opaque_key(path)? else {
            return Ok(());
        };
        cache.put(
            key,
            CacheEntry {
                id: remote.id.encode(),
                title: remote.title.clone(),
                modified: remote.updated,
            },
        );
        Ok(())
    }

    fn opaque_key(&self, path: &Path) -> Result<Option<String>> {
        if self.profile.self_describing {
            return Ok(None);
        }
        Ok(Some(library::cache_key_for(path, self.profile.key_scheme)?))
    }
}
