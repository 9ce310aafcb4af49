//! Element-name lexing.
//!
//! An element name is either `ID` or `ID:ID`, where `ID` starts with an
//! ASCII letter or underscore and continues with letters, digits,
//! underscore, dot, or hyphen. The part before the colon is the namespace
//! prefix; a name with a prefix is called *extended*.

use crate::error::{Error, Result};

/// Check whether `s` is a legal identifier (`[A-Za-z_][A-Za-z0-9_.-]*`).
pub fn is_identifier(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-')
}

/// Parse an element name into `(prefix, local_part)`.
///
/// The prefix is empty for unprefixed names. The prefix does not have to be
/// declared in any registry; this is a purely lexical operation. For every
/// legal input, `prefix + ":" + local` (or `local` when the prefix is
/// empty) reproduces the input exactly.
///
/// # Errors
///
/// `BadPathName` if the name is not of the form `ID` or `ID:ID`.
pub fn parse_element_name(element_name: &str) -> Result<(String, String)> {
    match element_name.split_once(':') {
        None => {
            if is_identifier(element_name) {
                Ok((String::new(), element_name.to_owned()))
            } else {
                Err(Error::bad_path_name(format!(
                    "illegal element name: {element_name:?}"
                )))
            }
        }
        Some((prefix, local)) => {
            if is_identifier(prefix) && is_identifier(local) {
                Ok((prefix.to_owned(), local.to_owned()))
            } else {
                Err(Error::bad_path_name(format!(
                    "illegal element name: {element_name:?}"
                )))
            }
        }
    }
}

/// True if the element name parses and carries a nonempty prefix.
///
/// Never errors; a malformed name is simply not extended.
pub fn is_element_name_extended(element_name: &str) -> bool {
    matches!(parse_element_name(element_name), Ok((prefix, _)) if !prefix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn plain_name_parses() {
        let (prefix, local) = parse_element_name("foo").unwrap();
        assert_eq!(prefix, "");
        assert_eq!(local, "foo");
    }

    #[test]
    fn prefixed_name_parses() {
        let (prefix, local) = parse_element_name("a:b").unwrap();
        assert_eq!(prefix, "a");
        assert_eq!(local, "b");
    }

    #[test]
    fn leading_digit_rejected() {
        let err = parse_element_name("1bad").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadPathName);
    }

    #[test]
    fn double_colon_rejected() {
        let err = parse_element_name("a::b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadPathName);
    }

    #[test]
    fn empty_and_colon_edge_cases_rejected() {
        for bad in ["", ":", "a:", ":b", "a:b:c", "a b", "é", "a/b"] {
            assert!(parse_element_name(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn dots_and_hyphens_allowed_after_first() {
        assert!(parse_element_name("_x.y-z").is_ok());
        assert!(parse_element_name("-x").is_err());
        assert!(parse_element_name(".x").is_err());
    }

    #[test]
    fn extended_detection() {
        assert!(is_element_name_extended("demo:extra"));
        assert!(!is_element_name_extended("extra"));
        assert!(!is_element_name_extended("1bad:extra"));
    }

    fn identifier_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z_][A-Za-z0-9_.-]{0,12}"
    }

    proptest! {
        #[test]
        fn recombined_output_equals_input_unprefixed(id in identifier_strategy()) {
            let (prefix, local) = parse_element_name(&id).unwrap();
            prop_assert_eq!(prefix, "");
            prop_assert_eq!(local, id);
        }

        #[test]
        fn recombined_output_equals_input_prefixed(
            p in identifier_strategy(),
            l in identifier_strategy(),
        ) {
            let name = format!("{p}:{l}");
            let (prefix, local) = parse_element_name(&name).unwrap();
            prop_assert_eq!(format!("{prefix}:{local}"), name);
        }
    }
}
