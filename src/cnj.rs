// =============================================================================
// cnj.rs - CNJ NUMBER ARITHMETIC
// =============================================================================
//
// The two "DD" digits after the sequence are an ISO 7064 mod 97-10 check
// value computed over the rest of the number. The portal rejects numbers
// with a wrong check value outright, so candidates we probe carry a real one.
// =============================================================================

/// Components of a CNJ unified process number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CnjParts {
    pub sequence: u32,
    pub year: u16,
    pub segment: u8,
    pub tribunal: u8,
    pub origin: u16,
}

fn mod97(digits: &str) -> u32 {
    digits
        .bytes()
        .filter(u8::is_ascii_digit)
        .fold(0u32, |acc, b| (acc * 10 + u32::from(b - b'0')) % 97)
}

/// Check value for the given components.
pub fn check_digits(parts: &CnjParts) -> u8 {
    let body = format!(
        "{:07}{:04}{}{:02}{:04}00",
        parts.sequence, parts.year, parts.segment, parts.tribunal, parts.origin
    );
    (98 - mod97(&body)) as u8
}

/// Render `NNNNNNN-DD.AAAA.J.TR.OOOO` with a correct check value.
pub fn format_number(parts: &CnjParts) -> String {
    format!(
        "{:07}-{:02}.{:04}.{}.{:02}.{:04}",
        parts.sequence,
        check_digits(parts),
        parts.year,
        parts.segment,
        parts.tribunal,
        parts.origin
    )
}

/// Whether a 20-digit (after stripping) number carries a valid check value.
pub fn has_valid_check_digits(number: &str) -> bool {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 20 {
        return false;
    }
    let rearranged = format!("{}{}{}", &digits[..7], &digits[9..], &digits[7..9]);
    mod97(&rearranged) == 1
}
