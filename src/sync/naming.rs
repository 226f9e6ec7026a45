use crate::sync::catalog::RemoteEbook;
use crate::sync::format::FormatProfile;
use clap::ValueEnum;

/// Strategy for naming newly downloaded files. Both forms are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NamingMode {
    /// `Surname, Given [, Suffix] - Title.ext`
    Sortable,
    /// The catalog's URL slug, e.g. `jane-austen_persuasion.ext`.
    Slug,
}

/// Characters that are awkward in file names, normalized to safe equivalents.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("/", "-"),
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\"", "'"),
    ("\u{201c}", "'"),
    ("\u{201d}", "'"),
];

/// Generational suffixes that sort with the surname, not the given names.
/// Compared case-insensitively with trailing punctuation stripped.
const GENERATIONAL_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];

/// Surname particles that travel with the final name when reordering,
/// so "Ursula K. Le Guin" files under "Le Guin".
const SURNAME_PARTICLES: &[&str] = &[
    "da", "de", "del", "della", "den", "der", "di", "du", "la", "le", "ten", "ter", "van", "von",
];

pub fn filename(remote: &RemoteEbook, mode: NamingMode, profile: &FormatProfile) -> String {
    let stem = match mode {
        NamingMode::Slug => match remote.id.slug() {
            Some(slug) => slug,
            // Non-catalog URL shapes fall back to the sortable form.
            None => sortable_stem(remote),
        },
        NamingMode::Sortable => sortable_stem(remote),
    };
    normalize(&format!("{stem}.{}", profile.extension))
}

fn sortable_stem(remote: &RemoteEbook) -> String {
    format!("{} - {}", sortable_author(&remote.author), remote.title)
}

fn is_generational_suffix(token: &str) -> bool {
    let bare = token.trim_matches(|c: char| c == '.' || c == ',');
    GENERATIONAL_SUFFIXES
        .iter()
        .any(|s| bare.eq_ignore_ascii_case(s))
}

fn is_surname_particle(token: &str) -> bool {
    SURNAME_PARTICLES.iter().any(|p| token.eq_ignore_ascii_case(p))
}

/// Reorder an author name into `Surname, Given[, Suffix]` form.
pub fn sortable_author(author: &str) -> String {
    let mut tokens: Vec<&str> = author.split_whitespace().collect();
    if tokens.len() < 2 {
        return author.trim().to_string();
    }

    let suffix = if tokens.len() > 2 && is_generational_suffix(tokens[tokens.len() - 1]) {
        tokens.pop()
    } else {
        None
    };

    // The surname group is the last token plus any immediately preceding
    // particles, as long as at least one given-name token remains.
    let mut surname_start = tokens.len() - 1;
    while surname_start > 1 && is_surname_particle(tokens[surname_start - 1]) {
        surname_start -= 1;
    }

    let surname = tokens[surname_start..].join(" ");
    let given = tokens[..surname_start].join(" ");
    match suffix {
        Some(suffix) => format!("{surname}, {given}, {suffix}"),
        None => format!("{surname}, {given}"),
    }
}

fn normalize(name: &str) -> String {
    let mut out = name.to_string();
    for (from, to) in REPLACEMENTS {
        out = out.replace(from, to);
    }
    out
}
