// Arabic text canonicalization applied before chunking and embedding


const ALEF: char = '\u{0627}';
const HAA: char = '\u{0647}';
const YAA: char = '\u{064A}';

/// Returns true for the tashkil range (fathatan through sukun)
#[inline]
pub const fn is_diacritic(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{0652}')
}

/// Canonicalize Arabic letterforms so lexical variants share one form.
///
/// Diacritics are dropped, hamza/madda alef variants become bare alef,
/// taa marbuta becomes haa and alef maksura becomes yaa. Characters outside
/// those code points pass through untouched, so the function is idempotent.
#[inline]
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|&c| !is_diacritic(c))
        .map(|c| match c {
            '\u{0622}' | '\u{0623}' | '\u{0625}' => ALEF,
            '\u{0629}' => HAA,
            '\u{0649}' => YAA,
            other => other,
        })
        .collect()
}

/// Prepare raw extracted text for chunking.
///
/// Each line is trimmed and normalized, empty lines are dropped and the
/// remaining paragraphs are joined with single newlines.
#[inline]
pub fn prepare_document(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(normalize)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns true if the text contains at least one character from the Arabic block
#[inline]
pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}
