//! Standard recording code (ISRC) validation.
//!
//! Shape: `CC RRR YY NNNNN` - two country letters, three alphanumeric
//! registrant characters, two year digits, five designation digits.

/// Length of a compact ISRC.
pub const ISRC_LEN: usize = 12;

/// Check the compact, uppercase form of an ISRC.
///
/// No normalization happens here; see [`normalize_isrc`] for raw input.
pub fn validate_isrc(code: &str) -> bool {
    let bytes = code.as_bytes();
    if bytes.len() != ISRC_LEN {
        return false;
    }

    bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..5]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

/// Normalize a raw code (hyphens, spaces, lowercase) and validate it.
///
/// Returns `None` for malformed codes, which must never be stored.
pub fn normalize_isrc(raw: &str) -> Option<String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    validate_isrc(&compact).then_some(compact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_code() {
        assert!(validate_isrc("FR6Z91234560"));
        assert!(validate_isrc("USRC17607839"));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(!validate_isrc("FR6Z9123456"));
        assert!(!validate_isrc("FR6Z912345601"));
        assert!(!validate_isrc(""));
    }

    #[test]
    fn test_rejects_character_class_violations() {
        // digits in the country position
        assert!(!validate_isrc("126Z91234560"));
        // letters in the year position
        assert!(!validate_isrc("FR6Z9AB34560"));
        // punctuation in the registrant
        assert!(!validate_isrc("FR6-91234560"));
        // lowercase is not the compact form
        assert!(!validate_isrc("fr6z91234560"));
    }

    #[test]
    fn test_normalize_accepts_display_forms() {
        assert_eq!(
            normalize_isrc("fr-6z9-12-34560").as_deref(),
            Some("FR6Z91234560")
        );
        assert_eq!(
            normalize_isrc(" US RC1 76 07839 ").as_deref(),
            Some("USRC17607839")
        );
        assert_eq!(normalize_isrc("FR6Z9123456"), None);
    }

    proptest! {
        #[test]
        fn accepts_every_well_formed_code(code in "[A-Z]{2}[A-Z0-9]{3}[0-9]{7}") {
            prop_assert!(validate_isrc(&code));
            prop_assert_eq!(normalize_isrc(&code), Some(code.clone()));
        }

        #[test]
        fn rejects_other_lengths(code in "[A-Z0-9]{0,11}|[A-Z0-9]{13,20}") {
            prop_assert!(!validate_isrc(&code));
        }

        #[test]
        fn rejects_digit_in_country(code in "[0-9][A-Z][A-Z0-9]{3}[0-9]{7}") {
            prop_assert!(!validate_isrc(&code));
        }
    }
}
