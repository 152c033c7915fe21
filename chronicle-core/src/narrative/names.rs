//! Name normalization for character lookup.
//!
//! Every registry lookup goes through [`normalize`], so "King Alaric",
//! "king alaric" and "Alaric" all land on the same canonical key.

/// Honorific tokens stripped from names before lookup.
pub const HONORIFICS: &[&str] = &[
    "king", "queen", "lord", "lady", "sir", "prince", "princess", "emperor", "empress", "duke",
    "duchess", "baron", "baroness",
];

/// Check whether a single word is an honorific title (case-insensitive).
pub fn is_honorific(word: &str) -> bool {
    let lower = word.to_lowercase();
    HONORIFICS.contains(&lower.as_str())
}

/// Canonicalize a display name into a lookup key.
///
/// Lower-cases, drops honorifics and collapses whitespace. A name made only of
/// honorifics (e.g. "King") falls back to the lower-cased original so it still
/// gets a stable key.
pub fn normalize(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let kept: Vec<&str> = lower
        .split_whitespace()
        .filter(|w| !HONORIFICS.contains(w))
        .collect();

    if kept.is_empty() {
        lower.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        kept.join(" ")
    }
}

/// Normalized tokens of a name, used for word-overlap matching.
pub fn name_tokens(raw: &str) -> Vec<String> {
    normalize(raw)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_titles() {
        assert_eq!(normalize("King Alaric"), "alaric");
        assert_eq!(normalize("Queen  Lyra   Stormborn"), "lyra stormborn");
        assert_eq!(normalize("Lord Kaelen"), normalize("kaelen"));
    }

    #[test]
    fn test_title_only_falls_back() {
        assert_eq!(normalize("King"), "king");
        assert_eq!(normalize("  Lady   Queen "), "lady queen");
    }

    #[test]
    fn test_stable() {
        let once = normalize("Emperor Vorlag the Red");
        assert_eq!(normalize(&once), once);
        assert_eq!(name_tokens("Sir Gareth Blackwood"), vec!["gareth", "blackwood"]);
    }

    #[test]
    fn test_is_honorific() {
        assert!(is_honorific("Queen"));
        assert!(!is_honorific("Lyra"));
    }
}
