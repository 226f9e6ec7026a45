use crate::sync::catalog::RemoteEbook;
use crate::sync::library::{self, LocalEbook};
use crate::sync::transport::Transport;
use anyhow::{Context, Result};
use std::fs;

/// Verdict on one local/remote pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Current,
    Different,
}

/// Decide whether a local copy matches the remote version. Three tiers, each
/// short-circuiting, ordered so timestamp evidence avoids a network call
/// whenever it is conclusive:
///
/// 1. embedded publication timestamps equal (second precision) → `Current`;
/// 2. remote `updated` newer than the file's own mtime → `Different`, since
///    nothing could have written a newer version before it was published;
/// 3. HEAD the remote resource and compare content length against the local
///    byte size — the fallback for files touched by something other than
///    this tool. A non-success response here is an error, not a verdict.
pub fn classify(
    local: &LocalEbook,
    remote: &RemoteEbook,
    transport: &dyn Transport,
) -> Result<Freshness> {
    if remote.updated == local.modified {
        return Ok(Freshness::Current);
    }

    if remote.updated > library::file_mtime(&local.path)? {
        return Ok(Freshness::Different);
    }

    let head = transport
        .head(&remote.href)
        .with_context(|| format!("HEAD {} failed", remote.href))?;
    if !(200..300).contains(&head.status) {
        anyhow::bail!("HEAD {} returned status {}", remote.href, head.status);
    }
    let local_size = fs::metadata(&local.path)
        .with_context(|| format!("failed to stat {}", local.path.display()))?
        .len();
    match head.content_length {
        Some(remote_size) if remote_size == local_size => Ok(Freshness::Current),
        // A missing content length cannot confirm a match.
        _ => Ok(Freshness::Different),
    }
}

#[cfg(test)]
mod tests {
    use super::{Freshness, classify};
    use crate::sync::catalog::RemoteEbook;
    use crate::sync::ident::EbookId;
    use crate::sync::library::LocalEbook;
    use crate::sync::transport::{HeadResponse, Transport};
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use std::cell::Cell;
    use std::fs;
    use std::io::Read;
    use tempfile::tempdir;

    /// Transport that fails the test on any call unless a canned HEAD
    /// response was provided.
    struct StubTransport {
        head: Option<HeadResponse>,
        heads_issued: Cell<usize>,
    }

    impl StubTransport {
        fn forbidden() -> Self {
            Self {
                head: None,
                heads_issued: Cell::new(0),
            }
        }

        fn with_head(head: HeadResponse) -> Self {
            Self {
                head: Some(head),
                heads_issued: Cell::new(0),
            }
        }
    }

    impl Transport for StubTransport {
        fn head(&self, _url: &str) -> Result<HeadResponse> {
            self.heads_issued.set(self.heads_issued.get() + 1);
            match &self.head {
                Some(head) => Ok(head.clone()),
                None => panic!("classifier issued an unexpected HEAD request"),
            }
        }

        fn head_no_redirect(&self, _url: &str) -> Result<HeadResponse> {
            panic!("classifier issued an unexpected no-redirect HEAD request");
        }

        fn get(&self, _url: &str, _basic_auth_user: Option<&str>) -> Result<Box<dyn Read>> {
            panic!("classifier issued an unexpected GET request");
        }
    }

    fn pair(tmp: &std::path::Path, bytes: &[u8]) -> (LocalEbook, RemoteEbook) {
        let path = tmp.join("persuasion.epub");
        fs::write(&path, bytes).expect("write");
        let id = EbookId::from_url("https://standardebooks.org/ebooks/jane-austen/persuasion");
        let updated = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 30).unwrap();
        let local = LocalEbook {
            id: id.clone(),
            title: "Persuasion".to_string(),
            path,
            modified: updated,
        };
        let remote = RemoteEbook {
            id,
            title: "Persuasion".to_string(),
            author: "Jane Austen".to_string(),
            href: "https://standardebooks.org/dl/persuasion.epub".to_string(),
            updated,
        };
        (local, remote)
    }

    #[test]
    fn equal_timestamps_are_current_without_any_network_call() {
        let tmp = tempdir().expect("tempdir");
        let (local, remote) = pair(tmp.path(), b"contents");
        let transport = StubTransport::forbidden();
        let got = classify(&local, &remote, &transport).expect("classify");
        assert_eq!(got, Freshness::Current);
    }

    #[test]
    fn remote_newer_than_file_mtime_is_different_without_a_head_request() {
        let tmp = tempdir().expect("tempdir");
        let (mut local, mut remote) = pair(tmp.path(), b"contents");
        // Embedded timestamps disagree and the remote postdates the file on disk.
        local.modified = remote.updated - Duration::days(30);
        remote.updated = Utc::now() + Duration::days(1);
        let transport = StubTransport::forbidden();
        let got = classify(&local, &remote, &transport).expect("classify");
        assert_eq!(got, Freshness::Different);
    }

    #[test]
    fn size_mismatch_resolves_the_ambiguous_case_as_different() {
        let tmp = tempdir().expect("tempdir");
        let (mut local, remote) = pair(tmp.path(), b"eight by.");
        // Timestamps disagree but the file mtime (now) postdates the remote.
        local.modified = remote.updated - Duration::days(30);
        let transport = StubTransport::with_head(HeadResponse {
            status: 200,
            content_length: Some(12345),
            location: None,
        });
        let got = classify(&local, &remote, &transport).expect("classify");
        assert_eq!(got, Freshness::Different);
        assert_eq!(transport.heads_issued.get(), 1);
    }

    #[test]
    fn size_match_resolves_the_ambiguous_case_as_current() {
        let tmp = tempdir().expect("tempdir");
        let body = b"exactly sized body";
        let (mut local, remote) = pair(tmp.path(), body);
        local.modified = remote.updated - Duration::days(30);
        let transport = StubTransport::with_head(HeadResponse {
            status: 200,
            content_length: Some(body.len() as u64),
            location: None,
        });
        let got = classify(&local, &remote, &transport).expect("classify");
        assert_eq!(got, Freshness::Current);
    }

    #[test]
    fn non_success_head_is_an_error_not_a_verdict() {
        let tmp = tempdir().expect("tempdir");
        let (mut local, remote) = pair(tmp.path(), b"contents");
        local.modified = remote.updated - Duration::days(30);
        // A 404 cannot say anything about staleness; it must not be read as
        // "sizes differ, the copy is stale".
        let transport = StubTransport::with_head(HeadResponse {
            status: 404,
            content_length: None,
            location: None,
        });
        assert!(classify(&local, &remote, &transport).is_err());
    }

    #[test]
    fn missing_content_length_is_treated_as_different() {
        let tmp = tempdir().expect("tempdir");
        let (mut local, remote) = pair(tmp.path(), b"contents");
        local.modified = remote.updated - Duration::days(30);
        let transport = StubTransport::with_head(HeadResponse {
            status: 200,
            content_length: None,
            location: None,
        });
        let got = classify(&local, &remote, &transport).expect("classify");
        assert_eq!(got, Freshness::Different);
    }
}
