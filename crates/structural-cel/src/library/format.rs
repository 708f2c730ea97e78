//! Named string formats.
//!
//! The same registry backs the `isFormat` functions and the schema `format`
//! keyword.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;

use super::str_arg;
use super::networking::Cidr;
use crate::eval::{EvalError, Value};
use crate::types::{CelType, FunctionDecl, OverloadDecl};

pub const DNS1123_LABEL_MAX_LENGTH: usize = 63;
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
pub const DNS1035_LABEL_MAX_LENGTH: usize = 63;

static DNS1123_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

static DNS1035_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").unwrap());

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?(\.[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?)*$")
        .unwrap()
});

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").unwrap());

pub fn is_dns1123_label(value: &str) -> bool {
    value.len() <= DNS1123_LABEL_MAX_LENGTH && DNS1123_LABEL.is_match(value)
}

pub fn is_dns1123_subdomain(value: &str) -> bool {
    value.len() <= DNS1123_SUBDOMAIN_MAX_LENGTH && DNS1123_SUBDOMAIN.is_match(value)
}

pub fn is_dns1035_label(value: &str) -> bool {
    value.len() <= DNS1035_LABEL_MAX_LENGTH && DNS1035_LABEL.is_match(value)
}

fn is_uuid(value: &str) -> bool {
    // Only the hyphenated form; the uuid crate also takes braced and simple forms.
    value.len() == 36 && uuid::Uuid::try_parse(value).is_ok()
}

fn is_byte(value: &str) -> bool {
    base64::engine::general_purpose::STANDARD.decode(value).is_ok()
}

fn is_date(value: &str) -> bool {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn is_date_time(value: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(value).is_ok()
}

fn is_hostname(value: &str) -> bool {
    value.len() <= DNS1123_SUBDOMAIN_MAX_LENGTH && HOSTNAME.is_match(value)
}

fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

fn is_ipv4(value: &str) -> bool {
    value.parse::<Ipv4Addr>().is_ok()
}

fn is_ipv6(value: &str) -> bool {
    value.parse::<Ipv6Addr>().is_ok()
}

fn is_cidr(value: &str) -> bool {
    Cidr::parse(value).is_ok()
}

const FORMATS: &[(&str, fn(&str) -> bool)] = &[
    ("dns1123subdomain", is_dns1123_subdomain),
    ("dns1123label", is_dns1123_label),
    ("dns1035label", is_dns1035_label),
    ("uuid", is_uuid),
    ("byte", is_byte),
    ("date", is_date),
    ("date-time", is_date_time),
    ("datetime", is_date_time),
    ("hostname", is_hostname),
    ("email", is_email),
    ("ipv4", is_ipv4),
    ("ipv6", is_ipv6),
    ("cidr", is_cidr),
];

/// Looks up the validator for a named format.
pub fn validator(format: &str) -> Option<fn(&str) -> bool> {
    FORMATS
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, check)| *check)
}

/// `None` when the format is not known.
pub fn validate(format: &str, value: &str) -> Option<bool> {
    validator(format).map(|check| check(value))
}

/// Replaces a trailing dash with a letter so a `generateName` prefix can be
/// checked against the full-name format.
fn mask_trailing_dash(name: &str) -> String {
    match name.strip_suffix('-') {
        Some(prefix) if name.len() > 1 => format!("{}a", prefix),
        _ => name.to_string(),
    }
}

fn is_format(args: &[Value]) -> Result<Value, EvalError> {
    let value = str_arg(args, 0, "isFormat")?;
    let format = str_arg(args, 1, "isFormat")?;
    validate(format, value)
        .map(Value::Bool)
        .ok_or_else(|| EvalError::invalid_argument(format!("invalid format: {}", format)))
}

fn is_generate_name_of_format(args: &[Value]) -> Result<Value, EvalError> {
    let value = str_arg(args, 0, "isGenerateNameOfFormat")?;
    let format = str_arg(args, 1, "isGenerateNameOfFormat")?;
    match format {
        "dns1123subdomain" | "dns1123label" | "dns1035label" => {}
        _ => {
            return Err(EvalError::invalid_argument(format!(
                "unsupported format for generate name: {}",
                format
            )))
        }
    }
    validate(format, &mask_trailing_dash(value))
        .map(Value::Bool)
        .ok_or_else(|| EvalError::invalid_argument(format!("invalid format: {}", format)))
}

pub(super) fn functions() -> Vec<FunctionDecl> {
    let params = || vec![CelType::String, CelType::String];
    vec![
        FunctionDecl::new("isFormat").with_overload(
            OverloadDecl::method("is_format", params(), CelType::Bool).with_impl(is_format),
        ),
        FunctionDecl::new("isGenerateNameOfFormat").with_overload(
            OverloadDecl::method("is_generate_name_of_format", params(), CelType::Bool)
                .with_impl(is_generate_name_of_format),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::FunctionRegistry;

    #[test]
    fn test_dns_formats() {
        assert_eq!(validate("dns1123label", "my-name"), Some(true));
        assert_eq!(validate("dns1123label", "My-Name"), Some(false));
        assert_eq!(validate("dns1123label", &"a".repeat(64)), Some(false));
        assert_eq!(validate("dns1123subdomain", "a.b-c.d"), Some(true));
        assert_eq!(validate("dns1035label", "1abc"), Some(false));
        assert_eq!(validate("dns1123label", "1abc"), Some(true));
    }

    #[test]
    fn test_openapi_formats() {
        assert_eq!(validate("uuid", "67e55044-10b1-426f-9247-bb680e5fe0c8"), Some(true));
        assert_eq!(validate("uuid", "67e5504410b1426f9247bb680e5fe0c8"), Some(false));
        assert_eq!(validate("date", "2024-02-29"), Some(true));
        assert_eq!(validate("date", "2023-02-29"), Some(false));
        assert_eq!(validate("date-time", "2024-01-01T10:00:00Z"), Some(true));
        assert_eq!(validate("byte", "aGVsbG8="), Some(true));
        assert_eq!(validate("ipv4", "10.0.0.1"), Some(true));
        assert_eq!(validate("ipv6", "10.0.0.1"), Some(false));
        assert_eq!(validate("cidr", "10.0.0.0/8"), Some(true));
        assert_eq!(validate("email", "someone@example.com"), Some(true));
        assert_eq!(validate("nope", "x"), None);
    }

    #[test]
    fn test_mask_trailing_dash() {
        assert_eq!(mask_trailing_dash("web-"), "weba");
        assert_eq!(mask_trailing_dash("-"), "-");
        assert_eq!(mask_trailing_dash("web"), "web");
    }

    #[test]
    fn test_library_functions() {
        let registry = FunctionRegistry::from_decls(functions().iter());
        let call = |name: &str, a: &str, b: &str| {
            registry
                .dispatch(name, &[Value::from(a), Value::from(b)], true, &[])
                .map(|(v, _)| v)
        };
        assert_eq!(call("isFormat", "abc", "dns1123label").unwrap(), Value::Bool(true));
        assert_eq!(
            call("isFormat", "abc", "bogus").unwrap_err().message,
            "invalid format: bogus"
        );
        assert_eq!(
            call("isGenerateNameOfFormat", "web-", "dns1123label").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("isGenerateNameOfFormat", "x", "uuid").unwrap_err().message,
            "unsupported format for generate name: uuid"
        );
    }
}
