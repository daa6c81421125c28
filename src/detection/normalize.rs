//! Title/artist normalization used as the deduplication key for tracks
//! without a standard recording code.

/// Tokens dropped from titles and artist names before comparison.
const NOISE_TOKENS: &[&str] = &[
    "feat",
    "ft",
    "featuring",
    "remix",
    "edit",
    "official",
    "lyrics",
    "lyric",
    "video",
    "audio",
    "version",
    "remaster",
    "remastered",
    "explicit",
];

/// Markers after which an artist credit names guest artists.
const FEATURING_MARKERS: &[&str] = &[" feat.", " feat ", " ft.", " ft ", " featuring "];

/// Normalize a track title.
///
/// Lowercases, removes punctuation (apostrophes are dropped, everything else
/// becomes a separator), removes noise tokens and collapses whitespace.
/// Idempotent: `normalize_title(&normalize_title(t)) == normalize_title(t)`.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !NOISE_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize an artist credit, keeping only the primary artist.
pub fn normalize_artist(artist: &str) -> String {
    let lowered = artist.to_lowercase();
    let primary = FEATURING_MARKERS
        .iter()
        .filter_map(|marker| lowered.find(marker))
        .min()
        .map_or(lowered.as_str(), |idx| &lowered[..idx]);

    normalize_title(primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_title_examples() {
        assert_eq!(normalize_title("Hello World!"), "hello world");
        assert_eq!(normalize_title("Don't Stop"), "dont stop");
        assert_eq!(normalize_title("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(
            normalize_title("Blinding Lights (Official Video)"),
            "blinding lights"
        );
        assert_eq!(normalize_title("Levitating [Remix] ft. DaBaby"), "levitating dababy");
        assert_eq!(normalize_title("Café Del Mar"), "café del mar");
    }

    #[test]
    fn test_normalize_artist_drops_guests() {
        assert_eq!(normalize_artist("Dua Lipa feat. DaBaby"), "dua lipa");
        assert_eq!(normalize_artist("Calvin Harris ft Rihanna"), "calvin harris");
        assert_eq!(normalize_artist("AC/DC"), "ac dc");
        assert_eq!(normalize_artist("The Beatles"), "the beatles");
    }

    #[test]
    fn test_title_variants_share_key() {
        let a = normalize_title("Bohemian Rhapsody - Remastered");
        let b = normalize_title("bohemian rhapsody (remaster)");
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn normalize_title_is_idempotent(input in "[a-zA-Z0-9 éèüÖ'’!?.,()\\[\\]-]{0,60}") {
            let once = normalize_title(&input);
            prop_assert_eq!(normalize_title(&once), once.clone());
        }

        #[test]
        fn normalized_has_no_edge_or_double_spaces(input in "[a-zA-Z !.,-]{0,40}") {
            let n = normalize_title(&input);
            prop_assert!(!n.starts_with(' '));
            prop_assert!(!n.ends_with(' '));
            prop_assert!(!n.contains("  "));
        }
    }
}
