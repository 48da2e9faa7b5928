/// Values accepted as "on" for boolean settings, compared case-insensitively.
const TRUTHY: &[&str] = &["true", "yes", "yep", "on", "y", "yeah", "hell yeah", "1"];

/// Interpret a configuration value as a boolean flag.
///
/// Surrounding whitespace is ignored. Anything outside the truthy set,
/// including an empty string, is `false`.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for v in ["true", "YES", "Yep", "on", "y", " yeah ", "Hell Yeah", "1"] {
            assert!(parse_flag(v), "{v:?} should be true");
        }
    }

    #[test]
    fn falsy_values() {
        for v in ["", "false", "no", "off", "0", "enabled", "truee"] {
            assert!(!parse_flag(v), "{v:?} should be false");
        }
    }
}
