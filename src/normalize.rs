/// Characters that export tools leave inside codes but that never carry meaning.
const INVISIBLE: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Canonicalizes a raw contract code so every table joins on the same key.
///
/// Non-breaking spaces become plain spaces, zero-width characters are dropped,
/// runs of whitespace collapse to a single space and the ends are trimmed.
/// Case is preserved: codes are case-sensitive. Returns `None` when nothing
/// is left.
pub fn normalize_contract_code(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !INVISIBLE.contains(c))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect();

    let normalized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Staff keys are trimmed the same way codes are; they are never empty in a valid row.
pub fn normalize_staff_key(raw: &str) -> Option<String> {
    normalize_contract_code(raw)
}
