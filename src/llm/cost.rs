//! Usage and cost accounting.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// USD per 1k tokens for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostKind {
    /// Recorded before a call from estimated token counts
    Estimated,
    /// Recorded after a successful call
    Actual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub provider: String,
    pub model: String,
    pub kind: CostKind,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Cost estimator consumed by the client manager.
pub trait CostTracker: Send + Sync {
    /// Record a pre-call estimate and return it.
    fn estimate_cost(&self, provider: &str, model: &str, input_tokens: u32, output_tokens: u32) -> CostRecord;

    /// Record the actual cost of a finished call and return it.
    fn update_cost(&self, provider: &str, model: &str, input_tokens: u32, output_tokens: u32) -> CostRecord;

    /// Sum of all actual costs.
    fn total_cost(&self) -> f64;

    fn cost_by_provider(&self) -> HashMap<String, f64>;

    fn cost_by_model(&self) -> HashMap<String, f64>;
}

/// Append-only in-memory ledger priced from a per-model table.
///
/// Models missing from the table cost nothing but are still recorded.
#[derive(Debug, Default)]
pub struct CostLedger {
    pricing: HashMap<String, ModelPricing>,
    records: Mutex<Vec<CostRecord>>,
}

impl CostLedger {
    pub fn new(pricing: HashMap<String, ModelPricing>) -> Self {
        Self {
            pricing,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<CostRecord> {
        self.records.lock().clone()
    }

    fn append(
        &self,
        kind: CostKind,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> CostRecord {
        let cost = self
            .pricing
            .get(model)
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0);
        let record = CostRecord {
            provider: provider.to_string(),
            model: model.to_string(),
            kind,
            input_tokens,
            output_tokens,
            cost,
            timestamp: Utc::now(),
        };
        self.records.lock().push(record.clone());
        record
    }

    fn sum_actual_by(&self, key: impl Fn(&CostRecord) -> &str) -> HashMap<String, f64> {
        let mut totals = HashMap::new();
        for record in self.records.lock().iter().filter(|r| r.kind == CostKind::Actual) {
            *totals.entry(key(record).to_string()).or_insert(0.0) += record.cost;
        }
        totals
    }
}

impl CostTracker for CostLedger {
    fn estimate_cost(&self, provider: &str, model: &str, input_tokens: u32, output_tokens: u32) -> CostRecord {
        self.append(CostKind::Estimated, provider, model, input_tokens, output_tokens)
    }

    fn update_cost(&self, provider: &str, model: &str, input_tokens: u32, output_tokens: u32) -> CostRecord {
        self.append(CostKind::Actual, provider, model, input_tokens, output_tokens)
    }

    fn total_cost(&self) -> f64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.kind == CostKind::Actual)
            .map(|r| r.cost)
            .sum()
    }

    fn cost_by_provider(&self) -> HashMap<String, f64> {
        self.sum_actual_by(|r| &r.provider)
    }

    fn cost_by_model(&self) -> HashMap<String, f64> {
        self.sum_actual_by(|r| &r.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> CostLedger {
        CostLedger::new(HashMap::from([
            (
                "gpt-4o-mini".to_string(),
                ModelPricing {
                    input_per_1k: 0.15,
                    output_per_1k: 0.6,
                },
            ),
            (
                "grok-2".to_string(),
                ModelPricing {
                    input_per_1k: 2.0,
                    output_per_1k: 10.0,
                },
            ),
        ]))
    }

    #[test]
    fn test_pricing_math() {
        let pricing = ModelPricing {
            input_per_1k: 1.0,
            output_per_1k: 2.0,
        };
        assert!((pricing.cost(500, 250) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimates_do_not_count_towards_totals() {
        let ledger = ledger();
        ledger.estimate_cost("openai", "gpt-4o-mini", 1000, 1000);
        assert_eq!(ledger.total_cost(), 0.0);
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn test_totals_by_provider_and_model() {
        let ledger = ledger();
        let a = ledger.update_cost("openai", "gpt-4o-mini", 1000, 1000);
        let b = ledger.update_cost("xai", "grok-2", 1000, 0);
        let c = ledger.update_cost("openai", "gpt-4o-mini", 0, 1000);

        let total = a.cost + b.cost + c.cost;
        assert!((ledger.total_cost() - total).abs() < 1e-9);

        let by_provider = ledger.cost_by_provider();
        assert!((by_provider["openai"] - (a.cost + c.cost)).abs() < 1e-9);
        assert!((by_provider["xai"] - 2.0).abs() < 1e-9);

        let by_model = ledger.cost_by_model();
        assert_eq!(by_model.len(), 2);
    }

    #[test]
    fn test_unpriced_model_is_recorded_at_zero() {
        let ledger = ledger();
        let record = ledger.update_cost("local", "llama3.2", 400, 400);
        assert_eq!(record.cost, 0.0);
        assert_eq!(ledger.cost_by_model()["llama3.2"], 0.0);
    }
}
