//! Environment variable access helpers.

use std::env;
use std::str::FromStr;

/// Read a variable, treating empty values as unset.
pub(super) fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Parse a variable, failing with the variable name on malformed input.
pub(super) fn parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {raw} ({e})")),
        None => Ok(None),
    }
}

/// Parse a boolean variable. Accepts true/false, 1/0, yes/no, on/off.
pub(super) fn flag(name: &str) -> Result<Option<bool>, String> {
    match var(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid boolean for {name}: {raw}")),
        },
        None => Ok(None),
    }
}
