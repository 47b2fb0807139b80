use std::collections::HashMap;

use crate::error::StoreError;

/// Flat request parameters, as they arrive from a query string or a form.
#[derive(Debug, Clone, Default)]
pub(crate) struct Params(HashMap<String, String>);

impl From<HashMap<String, String>> for Params {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl Params {
    /// Overlays `other` on top of these parameters.
    pub(crate) fn merge(mut self, other: HashMap<String, String>) -> Self {
        self.0.extend(other);
        self
    }

    pub(crate) fn action(&self) -> Option<&str> {
        self.text(crate::api::ACTION_PARAM)
    }

    /// Trimmed value, blanks count as absent.
    fn text(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<String, StoreError> {
        self.text(key)
            .map(str::to_owned)
            .ok_or_else(|| StoreError::validation(format!("{key} is required")))
    }

    pub(crate) fn optional_str(&self, key: &str) -> Option<String> {
        self.text(key).map(str::to_owned)
    }

    pub(crate) fn required_id(&self, key: &str) -> Result<i32, StoreError> {
        self.optional_id(key)?
            .ok_or_else(|| StoreError::validation(format!("{key} is required")))
    }

    pub(crate) fn optional_id(&self, key: &str) -> Result<Option<i32>, StoreError> {
        self.text(key)
            .map(|raw| {
                raw.parse::<i32>()
                    .ok()
                    .filter(|id| *id > 0)
                    .ok_or_else(|| StoreError::validation(format!("{key} must be a positive integer")))
            })
            .transpose()
    }

    /// A non-negative decimal amount such as a price or a quantity.
    pub(crate) fn required_amount(&self, key: &str) -> Result<f64, StoreError> {
        let raw = self
            .text(key)
            .ok_or_else(|| StoreError::validation(format!("{key} is required")))?;
        raw.parse::<f64>()
            .ok()
            .filter(|amount| amount.is_finite() && *amount >= 0.0)
            .ok_or_else(|| StoreError::validation(format!("{key} must be a non-negative number")))
    }
}

/// Builds a typed field set out of request parameters.
///
/// Implementations read only the keys they know about, so anything else the
/// client sends is dropped before it can reach a query.
pub(crate) trait FromParams: Sized {
    fn from_params(params: &Params) -> Result<Self, StoreError>;
}

#[cfg(test)]
pub(crate) fn params(pairs: &[(&str, &str)]) -> Params {
    Params(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}
