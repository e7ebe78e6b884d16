//! Display and input normalisation for one-time codes.

/// Default number of digits in a code
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Separator inserted at the midpoint for display
pub const DISPLAY_SEPARATOR: char = '-';

/// Strip every non-digit character
///
/// ```
/// use school_attendance::otc::normalize_code;
///
/// assert_eq!(normalize_code("123-456"), "123456");
/// assert_eq!(normalize_code(" 12 34 56 "), "123456");
/// ```
pub fn normalize_code(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Whether `code` is exactly `length` ASCII digits
pub fn is_well_formed(code: &str, length: usize) -> bool {
    code.len() == length && code.bytes().all(|b| b.is_ascii_digit())
}

/// Insert the display separator at the midpoint
///
/// ```
/// use school_attendance::otc::format_code;
///
/// assert_eq!(format_code("123456"), "123-456");
/// ```
pub fn format_code(code: &str) -> String {
    let digits = normalize_code(code);
    if digits.len() < 2 {
        return digits;
    }
    let (head, tail) = digits.split_at(digits.len() / 2);
    format!("{head}{DISPLAY_SEPARATOR}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_inserts_midpoint_dash() {
        assert_eq!(format_code("123456"), "123-456");
        assert_eq!(format_code("12345678"), "1234-5678");
    }

    #[test]
    fn test_format_is_idempotent() {
        assert_eq!(format_code("123-456"), "123-456");
    }

    #[test]
    fn test_normalize_drops_letters_and_separators() {
        assert_eq!(normalize_code("12a-45 6"), "12456");
        assert_eq!(normalize_code(""), "");
    }

    #[test]
    fn test_well_formed_requires_exact_length() {
        assert!(is_well_formed("000123", 6));
        assert!(!is_well_formed("12345", 6));
        assert!(!is_well_formed("1234567", 6));
        assert!(!is_well_formed("12345a", 6));
    }
}
