//! Attribute bags.
//!
//! Entities carry a list of free-form `(name, value)` pairs that the compiler
//! interprets as policy settings. Values are always strings; the typed
//! getters fall back to a caller-supplied default when a value is missing or
//! does not parse.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Literal value meaning "enabled".
pub const VALUE_TRUE: &str = "true";

/// Literal value meaning "disabled".
pub const VALUE_FALSE: &str = "false";

/// A single name/value pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: String,
}

impl Attribute {
    /// Create an attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The attribute bag of one entity.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use switchyard_core::{Attribute, Attributes};
///
/// let attrs = Attributes::from(vec![
///     Attribute::new(" Timeout ", " 2s "),
///     Attribute::new("NumRetries", "x"),
/// ])
/// .tidy();
///
/// assert_eq!(attrs.get_as_duration("Timeout", Duration::ZERO), Duration::from_secs(2));
/// assert_eq!(attrs.get_as_u32("NumRetries", 2), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the bag.
    ///
    /// Names and values are trimmed, later duplicates of a name are dropped
    /// and the result is sorted by name.
    #[must_use]
    pub fn tidy(self) -> Self {
        let mut tidied: Vec<Attribute> = Vec::with_capacity(self.0.len());
        for attribute in self.0 {
            let name = attribute.name.trim();
            if tidied.iter().any(|a| a.name == name) {
                continue;
            }
            tidied.push(Attribute::new(name, attribute.value.trim()));
        }
        tidied.sort_by(|a, b| a.name.cmp(&b.name));
        Self(tidied)
    }

    /// Value of the first attribute called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of `name`, or `default` when absent.
    #[must_use]
    pub fn get_as_string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or(default).to_string()
    }

    /// Value of `name` as `u32`, or `default` when absent or unparsable.
    #[must_use]
    pub fn get_as_u32(&self, name: &str, default: u32) -> u32 {
        self.get(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Value of `name` as a duration, or `default` when absent or unparsable.
    #[must_use]
    pub fn get_as_duration(&self, name: &str, default: Duration) -> Duration {
        self.get(name).and_then(parse_duration).unwrap_or(default)
    }

    /// Whether `name` is set to [`VALUE_TRUE`].
    #[must_use]
    pub fn is_true(&self, name: &str) -> bool {
        self.get(name) == Some(VALUE_TRUE)
    }

    /// Insert or replace an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Attribute { name, value }),
        }
    }

    /// Iterate over the attributes.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Attribute>> for Attributes {
    fn from(attributes: Vec<Attribute>) -> Self {
        Self(attributes)
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parse a duration string such as `2s`, `500ms`, `1m30s` or `1.5h`.
///
/// A bare `0` is accepted. Negative or unit-less values return `None`.
#[must_use]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() || input.starts_with('-') {
        return None;
    }
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    let mut total_nanos: f64 = 0.0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos += number * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}
