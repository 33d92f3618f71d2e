//! Cost Model
//!
//! Converts bytes processed into an estimated on-demand price.

use serde::{Deserialize, Serialize};

/// On-demand pricing constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Bytes in one billing unit (1 TiB).
    pub bytes_per_unit: u64,
    pub price_per_unit_usd: f64,
    /// Decimal places kept in estimates.
    pub precision: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            bytes_per_unit: 1_099_511_627_776,
            price_per_unit_usd: 6.25,
            precision: 6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CostModel {
    pricing: PricingConfig,
}

impl CostModel {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Estimated USD cost of scanning `bytes_processed` bytes.
    pub fn estimate(&self, bytes_processed: u64) -> f64 {
        if bytes_processed == 0 || self.pricing.bytes_per_unit == 0 {
            return 0.0;
        }
        let units = bytes_processed as f64 / self.pricing.bytes_per_unit as f64;
        round_to(units * self.pricing.price_per_unit_usd, self.pricing.precision)
    }

    /// Unknown byte counts cost nothing.
    pub fn estimate_optional(&self, bytes_processed: Option<u64>) -> f64 {
        bytes_processed.map(|b| self.estimate(b)).unwrap_or(0.0)
    }
}

fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bytes_costs_nothing() {
        let model = CostModel::default();
        assert_eq!(model.estimate(0), 0.0);
        assert_eq!(model.estimate_optional(None), 0.0);
    }

    #[test]
    fn test_one_tib_costs_unit_price() {
        let model = CostModel::default();
        assert_eq!(model.estimate(1_099_511_627_776), 6.25);
    }

    #[test]
    fn test_estimate_is_rounded() {
        let model = CostModel::default();
        // 1 GiB = 6.25 / 1024 = 0.006103515625
        assert_eq!(model.estimate(1_073_741_824), 0.006104);
    }

    #[test]
    fn test_estimate_is_monotonic() {
        let model = CostModel::default();
        let mut previous = 0.0;
        for bytes in (0..200u64).map(|i| i * 7_919_000_003) {
            let cost = model.estimate(bytes);
            assert!(cost >= previous, "cost decreased at {} bytes", bytes);
            previous = cost;
        }
    }

    #[test]
    fn test_custom_pricing() {
        let model = CostModel::new(PricingConfig {
            bytes_per_unit: 1000,
            price_per_unit_usd: 2.0,
            precision: 2,
        });
        assert_eq!(model.estimate(2500), 5.0);
        assert_eq!(model.estimate(1), 0.0);
    }
}
