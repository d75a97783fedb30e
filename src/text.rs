use strsim::normalized_levenshtein;
use unicode_segmentation::UnicodeSegmentation;

/// CJK Unified Ideographs range used for transcript auditing.
/// Matches the range speech recognizers emit for Mandarin output.
const CJK_START: char = '\u{4e00}';
const CJK_END: char = '\u{9fa5}';

/// Returns true for characters the audit alphabet keeps: ASCII letters,
/// ASCII digits and CJK ideographs.
pub(crate) fn is_audit_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_cjk(c)
}

/// Returns true if the character is a CJK ideograph.
pub(crate) fn is_cjk(c: char) -> bool {
    (CJK_START..=CJK_END).contains(&c)
}

/// Returns true if the string contains at least one CJK ideograph.
pub(crate) fn contains_cjk(s: &str) -> bool {
    s.chars().any(is_cjk)
}

/// Normalizes text for auditing: lowercases ASCII letters and strips every
/// character that is not an ASCII letter, an ASCII digit or a CJK ideograph.
///
/// Punctuation, whitespace and recognizer artifacts all disappear, so the
/// audit pointer counts only characters that can participate in a match.
/// Idempotent: normalizing already-normalized text is a no-op.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| is_audit_char(*c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Normalized Levenshtein similarity in [0.0, 1.0].
///
/// Defined as `1 - distance / max(len_a, len_b)` over characters, with 1.0
/// for identical strings including the both-empty case. One-character edits
/// on short keys land around 0.5-0.8, which is what the fuzzy tier's
/// threshold is calibrated against.
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

/// Counts words using Unicode segmentation rules, which handles CJK text
/// where words are not separated by spaces.
pub fn count_words(text: &str) -> usize {
    text.unicode_words().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_whitespace() {
        assert_eq!(normalize("Hello, world!"), "helloworld");
        assert_eq!(normalize("  a b\tc\n"), "abc");
    }

    #[test]
    fn test_normalize_keeps_cjk_and_digits() {
        assert_eq!(normalize("我们讨论私域流量。"), "我们讨论私域流量");
        assert_eq!(normalize("型号A-100（测试）"), "型号a100测试");
    }

    #[test]
    fn test_normalize_drops_non_ascii_letters_outside_cjk() {
        // Accented latin and fullwidth forms are outside the audit alphabet.
        assert_eq!(normalize("café"), "caf");
        assert_eq!(normalize("ＡＢＣ"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize("We talk about 私域流量!");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_similarity_identical_is_one() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn test_similarity_disjoint_is_zero() {
        assert_eq!(similarity("a", ""), 0.0);
        assert_eq!(similarity("", "xyz"), 0.0);
    }

    #[test]
    fn test_similarity_single_edit() {
        // One substitution over four chars.
        let s = similarity("siyu", "siyi");
        assert!((s - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_counts_chars_not_bytes() {
        // One edit over two ideographs, not six bytes.
        let s = similarity("私域", "思域");
        assert!((s - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("abc私def"));
        assert!(!contains_cjk("abc123"));
        assert!(!contains_cjk(""));
    }

    #[test]
    fn test_count_words_english() {
        assert_eq!(count_words("Hello world"), 2);
        assert_eq!(count_words("One, two, three."), 3);
    }

    #[test]
    fn test_count_words_cjk() {
        assert!(count_words("我们讨论私域流量") > 1);
    }
}
