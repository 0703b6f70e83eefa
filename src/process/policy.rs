use serde::{Deserialize, Serialize};

/// What to do with empty default-fillable cells. A `quantity` that fails to
/// parse is rejected either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillPolicy {
    /// Fill `product_name`/`category` with sentinels and `transaction_id`/
    /// `quantity` with 0.
    #[default]
    FillDefaults,
    /// Leave them null so the row is rejected when the column is required.
    StrictReject,
}

/// Granularity of the accept/reject decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingPolicy {
    /// Valid rows go to `clean/`, invalid rows go to `error/`.
    #[default]
    SplitByRow,
    /// Any invalid row sends the whole file, untouched, to `error/`.
    WholeFile,
}

impl RoutingPolicy {
    pub fn from_strict_file_mode(strict_file_mode: bool) -> Self {
        if strict_file_mode {
            RoutingPolicy::WholeFile
        } else {
            RoutingPolicy::SplitByRow
        }
    }
}

/// Sentinels used by [`FillPolicy::FillDefaults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultValues {
    pub product_name: String,
    pub category: String,
}

impl Default for DefaultValues {
    fn default() -> Self {
        Self {
            product_name: "Unknown Product".to_string(),
            category: "Catégorie inconnue".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub fill: FillPolicy,
    pub routing: RoutingPolicy,
    pub defaults: DefaultValues,
}

impl ValidationPolicy {
    pub fn fills(&self) -> bool {
        self.fill == FillPolicy::FillDefaults
    }
}
