//! Front Server Address Templates
//!
//! Expands a compact server-address template into the ordered list of
//! endpoints registered with a feed session before it initializes.
//!
//! # Template Forms
//!
//! 1. Single address: `tcp://127.0.0.1:8888`
//! 2. Comma-separated list: `tcp://127.0.0.1:8888,tcp://127.0.0.2:8888`
//! 3. Range template: `ctp1-front{1,3/5,8,10/18}.example.com:41213`
//!
//! A range body is a comma-separated list of integers or inclusive
//! `start/end` pairs. The union of all integers is substituted, in ascending
//! order, for the whole bracket expression. A reversed pair (`start > end`)
//! contributes nothing.
//!
//! Every returned endpoint carries a transport scheme; bare addresses are
//! prefixed with `tcp://`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

// =============================================================================
// Constants
// =============================================================================

/// Scheme prepended to addresses that carry none.
pub const DEFAULT_SCHEME: &str = "tcp://";

/// Prefixes accepted as an explicit transport scheme.
const RECOGNIZED_SCHEMES: &[&str] = &["tcp://", "ssl://", "socks"];

/// Upper bound on the number of endpoints a single template may produce.
pub const MAX_ENDPOINTS: usize = 1024;

#[allow(clippy::expect_used)]
static RANGE_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^{}]*\}").expect("static range expression pattern is valid")
});

// =============================================================================
// Endpoint
// =============================================================================

/// A scheme-qualified network address (`scheme://host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    /// Build an endpoint, prepending [`DEFAULT_SCHEME`] when the address has
    /// no recognized scheme.
    #[must_use]
    pub fn new(address: &str) -> Self {
        let address = address.trim();
        if has_recognized_scheme(address) {
            Self(address.to_string())
        } else {
            Self(format!("{DEFAULT_SCHEME}{address}"))
        }
    }

    /// The full address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme part without the `://` separator.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.split_once("://").map_or("", |(scheme, _)| scheme)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn has_recognized_scheme(address: &str) -> bool {
    RECOGNIZED_SCHEMES
        .iter()
        .any(|scheme| address.starts_with(scheme))
}

// =============================================================================
// Errors
// =============================================================================

/// A template that cannot be expanded into at least one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The template is empty or whitespace.
    #[error("address template is empty")]
    Empty,

    /// A list or range entry is empty (e.g. `a,,b` or `{1,,3}`).
    #[error("address template {template:?} contains an empty entry")]
    EmptyEntry {
        /// The offending template.
        template: String,
    },

    /// A range bound is not a non-negative integer.
    #[error("invalid range bound {bound:?} in address template {template:?}")]
    InvalidBound {
        /// The offending template.
        template: String,
        /// The bound that failed to parse.
        bound: String,
    },

    /// A range entry has more than one `/`.
    #[error("malformed range {part:?} in address template {template:?}")]
    MalformedRange {
        /// The offending template.
        template: String,
        /// The range entry.
        part: String,
    },

    /// The range expression describes no integers.
    #[error("range expression in address template {template:?} yields no endpoints")]
    EmptyRange {
        /// The offending template.
        template: String,
    },

    /// The expansion exceeds [`MAX_ENDPOINTS`].
    #[error("address template {template:?} expands to more than {MAX_ENDPOINTS} endpoints")]
    TooManyEndpoints {
        /// The offending template.
        template: String,
    },
}

// =============================================================================
// Expansion
// =============================================================================

/// Expand an address template into its ordered endpoint list.
///
/// # Errors
///
/// Returns [`AddressError`] when the template is empty, a range bound is not
/// numeric, or the template would expand to no endpoints.
///
/// # Example
///
/// ```rust
/// use md_recorder::domain::address::expand;
///
/// let endpoints = expand("front{1,3/4}.example.com:41213").unwrap();
/// let addresses: Vec<_> = endpoints.iter().map(|e| e.as_str()).collect();
/// assert_eq!(
///     addresses,
///     [
///         "tcp://front1.example.com:41213",
///         "tcp://front3.example.com:41213",
///         "tcp://front4.example.com:41213",
///     ]
/// );
/// ```
pub fn expand(template: &str) -> Result<Vec<Endpoint>, AddressError> {
    let template = template.trim();
    if template.is_empty() {
        return Err(AddressError::Empty);
    }

    if let Some(range) = RANGE_EXPRESSION.find(template) {
        let body = &template[range.start() + 1..range.end() - 1];
        let numbers = parse_range_body(template, body)?;

        // Every copy of the same expression takes the same number.
        return Ok(numbers
            .into_iter()
            .map(|n| Endpoint::new(&template.replace(range.as_str(), &n.to_string())))
            .collect());
    }

    if template.contains(',') {
        return template
            .split(',')
            .map(str::trim)
            .map(|part| {
                if part.is_empty() {
                    Err(AddressError::EmptyEntry {
                        template: template.to_string(),
                    })
                } else {
                    Ok(Endpoint::new(part))
                }
            })
            .collect();
    }

    Ok(vec![Endpoint::new(template)])
}

fn parse_range_body(template: &str, body: &str) -> Result<BTreeSet<u64>, AddressError> {
    let mut numbers = BTreeSet::new();

    for part in body.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(AddressError::EmptyEntry {
                template: template.to_string(),
            });
        }

        if let Some((start, end)) = part.split_once('/') {
            if end.contains('/') {
                return Err(AddressError::MalformedRange {
                    template: template.to_string(),
                    part: part.to_string(),
                });
            }
            let start = parse_bound(template, start)?;
            let end = parse_bound(template, end)?;

            if start > end {
                continue;
            }
            if end - start >= u64::try_from(MAX_ENDPOINTS).unwrap_or(u64::MAX) {
                return Err(AddressError::TooManyEndpoints {
                    template: template.to_string(),
                });
            }
            numbers.extend(start..=end);
        } else {
            numbers.insert(parse_bound(template, part)?);
        }

        if numbers.len() > MAX_ENDPOINTS {
            return Err(AddressError::TooManyEndpoints {
                template: template.to_string(),
            });
        }
    }

    if numbers.is_empty() {
        return Err(AddressError::EmptyRange {
            template: template.to_string(),
        });
    }

    Ok(numbers)
}

fn parse_bound(template: &str, bound: &str) -> Result<u64, AddressError> {
    let bound = bound.trim();
    bound.parse().map_err(|_| AddressError::InvalidBound {
        template: template.to_string(),
        bound: bound.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
