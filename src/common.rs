//! Identifier and numeric helpers shared by every element parser.

/// Length used when a field has no upper serialization bound.
pub const MAX_POSSIBLE_LENGTH: usize = usize::MAX;

pub const SIBLING_REF_PREFIX: char = '$';
pub const STRING_REF_PREFIX: char = '^';
pub const SCHEMA_REF_PREFIX: char = '@';
pub const INTERFACE_REF_PREFIX: char = '%';

/// Byte order of serialized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    pub fn as_str(self) -> &'static str {
        match self {
            Endian::Little => "little",
            Endian::Big => "big",
        }
    }
}

/// Empty `value` selects `default`; unknown names give `None`.
pub fn parse_endian(value: &str, default: Endian) -> Option<Endian> {
    match value.to_ascii_lowercase().as_str() {
        "" => Some(default),
        "little" => Some(Endian::Little),
        "big" => Some(Endian::Big),
        _ => None,
    }
}

pub fn is_valid_name(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Dotted reference, optionally starting with the cross-schema prefix.
pub fn is_valid_ref_name(value: &str) -> bool {
    let value = value.strip_prefix(SCHEMA_REF_PREFIX).unwrap_or(value);
    if value.is_empty() {
        return false;
    }
    value.split('.').all(is_valid_name)
}

pub fn is_valid_external_ref_name(value: &str) -> bool {
    value
        .strip_prefix(STRING_REF_PREFIX)
        .map(is_valid_ref_name)
        .unwrap_or(false)
}

/// Parse an integer the way schema authors write them: optional sign, `0x`
/// hex, leading-zero octal or decimal. The result covers both the `i64` and the
/// `u64` domains.
pub fn str_to_int(s: &str) -> Option<i128> {
    let s = s.trim();
    let (neg, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if body.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()?
    } else if body.len() > 1 && body.starts_with('0') {
        u64::from_str_radix(&body[1..], 8).ok()?
    } else {
        body.parse::<u64>().ok()?
    };
    let value = i128::from(magnitude);
    if neg {
        let v = -value;
        if v < i128::from(i64::MIN) {
            return None;
        }
        Some(v)
    } else {
        Some(value)
    }
}

pub fn str_to_unsigned(s: &str) -> Option<u32> {
    str_to_int(s).and_then(|v| u32::try_from(v).ok())
}

pub fn str_to_usize(s: &str) -> Option<usize> {
    str_to_int(s).and_then(|v| usize::try_from(v).ok())
}

/// `true`/`1` and `false`/`0`, case insensitive.
pub fn str_to_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Split `[min, max]` into its two trimmed parts.
pub fn parse_range(s: &str) -> Option<(String, String)> {
    let inner = s.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut parts = inner.split(',');
    let first = parts.next()?.trim();
    let second = parts.next()?.trim();
    if parts.next().is_some() || first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first.to_string(), second.to_string()))
}

/// Collapse tabs/newlines into single spaces, as multi-line text values are
/// written in schema files.
pub fn normalise_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.trim().chars() {
        let c = if matches!(c, '\t' | '\r' | '\n') { ' ' } else { c };
        if c == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
    }
    out
}

/// Saturating length accumulation.
pub fn add_length(acc: usize, len: usize) -> usize {
    acc.saturating_add(len)
}

pub fn mul_length(len: usize, factor: usize) -> usize {
    len.saturating_mul(factor)
}

/// Split `a.b.c` into `("a", "b.c")`; the rest is empty when there is no dot.
pub fn split_first(path: &str) -> (&str, &str) {
    match path.find('.') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => (path, ""),
    }
}

/// Split `a.b.c` into `("a.b", "c")`.
pub fn split_last(path: &str) -> Option<(&str, &str)> {
    path.rfind('.').map(|pos| (&path[..pos], &path[pos + 1..]))
}

/// Parse a hex string (whitespace ignored) into bytes.
pub fn str_to_data(s: &str) -> Option<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(is_valid_name("Msg_1"));
        assert!(is_valid_name("_x"));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a.b"));
        assert!(is_valid_ref_name("ns.Field.val"));
        assert!(is_valid_ref_name("@Other.ns.Field"));
        assert!(!is_valid_ref_name("ns..Field"));
        assert!(!is_valid_ref_name("ns.Field."));
        assert!(!is_valid_ref_name("@"));
        assert!(is_valid_external_ref_name("^Str"));
        assert!(!is_valid_external_ref_name("Str"));
    }

    #[test]
    fn integers() {
        assert_eq!(str_to_int("10"), Some(10));
        assert_eq!(str_to_int("-10"), Some(-10));
        assert_eq!(str_to_int("0x1f"), Some(31));
        assert_eq!(str_to_int("010"), Some(8));
        assert_eq!(str_to_int("0"), Some(0));
        assert_eq!(str_to_int("18446744073709551615"), Some(u64::MAX as i128));
        assert_eq!(str_to_int("-9223372036854775808"), Some(i64::MIN as i128));
        assert_eq!(str_to_int("-9223372036854775809"), None);
        assert_eq!(str_to_int("abc"), None);
        assert_eq!(str_to_int("-"), None);
    }

    #[test]
    fn ranges_and_bools() {
        assert_eq!(
            parse_range("[0, 255]"),
            Some(("0".to_string(), "255".to_string()))
        );
        assert_eq!(parse_range("[0,1,2]"), None);
        assert_eq!(parse_range("0,1"), None);
        assert_eq!(str_to_bool("TRUE"), Some(true));
        assert_eq!(str_to_bool("0"), Some(false));
        assert_eq!(str_to_bool("yes"), None);
    }

    #[test]
    fn lengths_saturate() {
        assert_eq!(add_length(MAX_POSSIBLE_LENGTH - 1, 5), MAX_POSSIBLE_LENGTH);
        assert_eq!(mul_length(MAX_POSSIBLE_LENGTH / 2, 3), MAX_POSSIBLE_LENGTH);
        assert_eq!(mul_length(3, 4), 12);
    }

    #[test]
    fn text_helpers() {
        assert_eq!(normalise_string("  a\n\t b  c "), "a b c");
        assert_eq!(split_first("a.b.c"), ("a", "b.c"));
        assert_eq!(split_first("a"), ("a", ""));
        assert_eq!(split_last("a.b.c"), Some(("a.b", "c")));
        assert_eq!(str_to_data("01 ab"), Some(vec![0x01, 0xab]));
        assert_eq!(str_to_data("abc"), None);
    }
}
