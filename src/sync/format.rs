use clap::ValueEnum;
use std::path::Path;

/// File formats published by the catalog. Resolved once, at configuration
/// time, into a [`FormatProfile`]; nothing downstream branches on the format
/// name again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BookFormat {
    Epub,
    Kepub,
    Azw3,
}

/// How side-cache keys are derived for opaque formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheKeyScheme {
    /// SHA-256 of the file contents; survives renames.
    Hash,
    /// Bare file name; cheap, but a rename orphans the entry.
    Name,
}

/// Per-format behavior, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct FormatProfile {
    pub format: BookFormat,
    /// File extension, without a leading dot.
    pub extension: &'static str,
    /// `title` attribute of the OPDS download link to follow.
    pub link_title: &'static str,
    /// Whether files of this format embed identifier/title/modified metadata.
    /// Opaque formats rely on the side cache instead.
    pub self_describing: bool,
    pub key_scheme: CacheKeyScheme,
}

impl BookFormat {
    pub fn profile(self, key_scheme: CacheKeyScheme) -> FormatProfile {
        match self {
            BookFormat::Epub => FormatProfile {
                format: self,
                extension: "epub",
                link_title: "Recommended compatible epub",
                self_describing: true,
                key_scheme,
            },
            BookFormat::Kepub => FormatProfile {
                format: self,
                extension: "kepub.epub",
                link_title: "Kobo Kepub epub",
                self_describing: true,
                key_scheme,
            },
            BookFormat::Azw3 => FormatProfile {
                format: self,
                extension: "azw3",
                link_title: "Amazon Kindle azw3",
                self_describing: false,
                key_scheme,
            },
        }
    }
}

impl FormatProfile {
    /// Whether `path` is a file of this format. Plain epub must not swallow
    /// `.kepub.epub`, which shares the suffix.
    pub fn matches_path(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let lower = name.to_ascii_lowercase();
        if self.format == BookFormat::Epub && lower.ends_with(".kepub.epub") {
            return false;
        }
        lower.ends_with(&format!(".{}", self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::{BookFormat, CacheKeyScheme};
    use std::path::Path;

    #[test]
    fn epub_profile_excludes_kepub_files() {
        let profile = BookFormat::Epub.profile(CacheKeyScheme::Hash);
        assert!(profile.matches_path(Path::new("books/persuasion.epub")));
        assert!(!profile.matches_path(Path::new("books/persuasion.kepub.epub")));
        assert!(!profile.matches_path(Path::new("books/persuasion.azw3")));
    }

    #[test]
    fn kepub_profile_matches_only_kepub() {
        let profile = BookFormat::Kepub.profile(CacheKeyScheme::Hash);
        assert!(profile.matches_path(Path::new("Persuasion.KEPUB.EPUB")));
        assert!(!profile.matches_path(Path::new("persuasion.epub")));
    }

    #[test]
    fn azw3_is_opaque() {
        let profile = BookFormat::Azw3.profile(CacheKeyScheme::Name);
        assert!(!profile.self_describing);
        assert!(profile.matches_path(Path::new("persuasion.azw3")));
    }
}
