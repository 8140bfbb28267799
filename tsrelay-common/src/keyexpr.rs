use crate::error::{Error, Result};

/// Default key expression prefix for all tsrelay traffic.
pub const KEY_PREFIX: &str = "tsrelay";

/// Key segment under which metric batches are published.
pub const METRICS_SEGMENT: &str = "metrics";

/// Builder for constructing tsrelay key expressions.
///
/// Metric batches are published under `<prefix>/metrics/<source>`, where
/// `source` identifies the publishing process (host name, agent id...).
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExprBuilder {
    /// Create a builder using the default prefix.
    pub fn new() -> Self {
        Self {
            prefix: KEY_PREFIX.to_string(),
        }
    }

    /// Create a builder with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Build the key expression a source publishes its batches to.
    ///
    /// # Example
    /// ```
    /// use tsrelay_common::keyexpr::KeyExprBuilder;
    ///
    /// let key = KeyExprBuilder::new().metrics("collector-01").unwrap();
    /// assert_eq!(key, "tsrelay/metrics/collector-01");
    /// ```
    pub fn metrics(&self, source: &str) -> Result<String> {
        validate_source(source)?;
        Ok(format!("{}/{}/{}", self.prefix, METRICS_SEGMENT, source))
    }

    /// Build a wildcard matching batches from every source.
    ///
    /// # Example
    /// ```
    /// use tsrelay_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::new().metrics_wildcard(), "tsrelay/metrics/**");
    /// ```
    pub fn metrics_wildcard(&self) -> String {
        format!("{}/{}/**", self.prefix, METRICS_SEGMENT)
    }
}

/// Wildcard key expression for all metric batches under the default prefix.
pub fn all_metrics_wildcard() -> String {
    KeyExprBuilder::new().metrics_wildcard()
}

/// Check that a source name can be used as a single key segment.
pub fn validate_source(source: &str) -> Result<()> {
    if source.is_empty() {
        return Err(Error::KeyExpr("source cannot be empty".to_string()));
    }
    if source.contains(['/', '*', '$', '?', '#']) {
        return Err(Error::KeyExpr(format!(
            "source '{}' contains a reserved character",
            source
        )));
    }
    Ok(())
}

/// Parse a metrics key expression to extract the publishing source.
///
/// Returns `None` if the key expression doesn't match
/// `tsrelay/metrics/<source>`.
pub fn parse_key_expr(key: &str) -> Option<ParsedKeyExpr<'_>> {
    let mut parts = key.split('/');

    if parts.next()? != KEY_PREFIX || parts.next()? != METRICS_SEGMENT {
        return None;
    }

    let source = parts.next()?;
    if parts.next().is_some() || validate_source(source).is_err() {
        return None;
    }

    Some(ParsedKeyExpr { source })
}

/// Parsed components of a tsrelay metrics key expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKeyExpr<'a> {
    pub source: &'a str,
}
