//! Field rules shared by the request types.

use crate::error::ValidationErrors;

/// Trimmed value of a required string field, or a message on `field`.
pub(crate) fn required(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => max_len(errors, field, Some(v), max).map(str::to_string),
        _ => {
            errors.add(field, format!("The {field} field is required."));
            None
        }
    }
}

/// Trimmed value of an optional string field; blank counts as absent.
pub(crate) fn optional(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty());
    max_len(errors, field, value, max).map(str::to_string)
}

fn max_len<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&'a str>,
    max: usize,
) -> Option<&'a str> {
    let value = value?;
    if value.chars().count() > max {
        errors.add(
            field,
            format!("The {field} field must not be greater than {max} characters."),
        );
        return None;
    }
    Some(value)
}

/// Loose structural check: `local@domain.tld`, no whitespace.
pub(crate) fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
