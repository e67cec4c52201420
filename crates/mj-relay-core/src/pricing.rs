//! Per-action pricing and the balance pre-check.

use std::collections::HashMap;

use tracing::warn;

use crate::action::Action;
use crate::error::RelayError;

/// Price used when neither the configured nor the built-in table knows a key.
pub const FALLBACK_PRICE: f64 = 0.1;

/// Quota units per one unit of price.
pub const DEFAULT_QUOTA_PER_UNIT: f64 = 500_000.0;

/// Built-in prices, consulted when the configured table has no entry.
pub const DEFAULT_MODEL_PRICE: &[(&str, f64)] = &[
    ("mj_imagine", 0.1),
    ("mj_variation", 0.1),
    ("mj_reroll", 0.1),
    ("mj_blend", 0.1),
    ("mj_inpaint", 0.1),
    ("mj_zoom", 0.1),
    ("mj_inpaint_pre", 0.0),
    ("mj_describe", 0.05),
    ("mj_upscale", 0.05),
    ("swap_face", 0.05),
];

/// Immutable price configuration handed to the engine at construction.
#[derive(Debug, Clone)]
pub struct PriceTable {
    model_price: HashMap<String, f64>,
    group_ratio: HashMap<String, f64>,
    quota_per_unit: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new(HashMap::new(), default_group_ratio(), DEFAULT_QUOTA_PER_UNIT)
    }
}

/// The charge for one submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub group_ratio: f64,
    pub quota: i64,
    /// `false` for placeholder actions that are never billed.
    pub chargeable: bool,
}

impl PriceTable {
    pub fn new(
        model_price: HashMap<String, f64>,
        group_ratio: HashMap<String, f64>,
        quota_per_unit: f64,
    ) -> Self {
        Self {
            model_price,
            group_ratio,
            quota_per_unit,
        }
    }

    /// Configured price, then built-in default, then [`FALLBACK_PRICE`].
    pub fn price_of(&self, action: Action) -> f64 {
        let key = action.charge_key();
        if let Some(price) = self.model_price.get(&key) {
            return *price;
        }
        DEFAULT_MODEL_PRICE
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, p)| *p)
            .unwrap_or(FALLBACK_PRICE)
    }

    /// Discount ratio of `group`; unknown groups pay full price.
    pub fn group_ratio(&self, group: &str) -> f64 {
        match self.group_ratio.get(group) {
            Some(ratio) => *ratio,
            None => {
                warn!(group, "group ratio not found; using 1");
                1.0
            }
        }
    }

    pub fn quote(&self, action: Action, group: &str) -> Quote {
        let price = self.price_of(action);
        let group_ratio = self.group_ratio(group);
        let quota = (price * group_ratio * self.quota_per_unit).round() as i64;
        Quote {
            price,
            group_ratio,
            quota,
            chargeable: action.is_chargeable(),
        }
    }
}

pub fn default_group_ratio() -> HashMap<String, f64> {
    [("default", 1.0), ("vip", 1.0), ("svip", 1.0)]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}

/// Reject a chargeable submission the caller cannot afford.
pub fn ensure_affordable(quote: &Quote, balance: i64) -> Result<(), RelayError> {
    if quote.chargeable && balance - quote.quota < 0 {
        return Err(RelayError::QuotaNotEnough);
    }
    Ok(())
}
