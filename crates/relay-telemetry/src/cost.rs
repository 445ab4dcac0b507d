//! Model pricing and cost calculation.
//!
//! The pricing table maps model id prefixes to per-1K-token rates. Lookup
//! is longest-prefix so dated model ids (`claude-sonnet-4-5-20250929`)
//! match their family entry. Unknown models fall back to a default rate so
//! every `UsageRecord` carries a cost.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pricing for one model family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per 1K prompt tokens (USD)
    pub input_cost_per_1k: f64,
    /// Cost per 1K completion tokens (USD)
    pub output_cost_per_1k: f64,
}

impl ModelPricing {
    /// Create pricing rates
    #[must_use]
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_cost_per_1k: input_per_1k,
            output_cost_per_1k: output_per_1k,
        }
    }

    /// Calculate cost for the given token counts
    #[must_use]
    pub fn calculate(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let input = (f64::from(prompt_tokens) / 1000.0) * self.input_cost_per_1k;
        let output = (f64::from(completion_tokens) / 1000.0) * self.output_cost_per_1k;
        input + output
    }
}

/// Prefix-keyed pricing table
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: HashMap<String, ModelPricing>,
    default: ModelPricing,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        let mut add = |prefix: &str, input: f64, output: f64| {
            entries.insert(prefix.to_string(), ModelPricing::new(input, output));
        };

        add("gpt-4o-mini", 0.000_15, 0.000_6);
        add("gpt-4o", 0.002_5, 0.01);
        add("gpt-4", 0.03, 0.06);
        add("openai/gpt-4o", 0.002_5, 0.01);
        add("claude-opus", 0.015, 0.075);
        add("claude-sonnet", 0.003, 0.015);
        add("claude-haiku", 0.000_8, 0.004);
        add("anthropic/claude-opus", 0.015, 0.075);
        add("anthropic/claude-sonnet", 0.003, 0.015);
        add("gemini-1.5-pro", 0.001_25, 0.005);
        add("gemini-1.5-flash", 0.000_075, 0.000_3);
        add("gemini-2.0-flash", 0.000_1, 0.000_4);
        add("meta-llama/", 0.000_2, 0.000_2);
        add("mistralai/", 0.000_2, 0.000_2);
        add("deepseek-ai/", 0.000_5, 0.001_5);

        Self {
            entries,
            default: ModelPricing::new(0.001, 0.002),
        }
    }
}

impl PricingTable {
    /// Create a table with the built-in entries
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, prefix: impl Into<String>, pricing: ModelPricing) {
        self.entries.insert(prefix.into(), pricing);
    }

    /// Pricing for a model, longest matching prefix wins
    #[must_use]
    pub fn pricing_for(&self, model: &str) -> &ModelPricing {
        let lowered = model.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|(prefix, _)| lowered.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(&self.default, |(_, pricing)| pricing)
    }

    /// Cost for a request against a model
    #[must_use]
    pub fn cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        self.pricing_for(model).calculate(prompt_tokens, completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let table = PricingTable::new();
        // gpt-4o-mini must not match the gpt-4o entry
        let mini = table.pricing_for("gpt-4o-mini-2024-07-18");
        assert!((mini.input_cost_per_1k - 0.000_15).abs() < f64::EPSILON);
        let full = table.pricing_for("gpt-4o-2024-08-06");
        assert!((full.input_cost_per_1k - 0.002_5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dated_claude_matches_family() {
        let table = PricingTable::new();
        let pricing = table.pricing_for("claude-sonnet-4-5-20250929");
        assert!((pricing.input_cost_per_1k - 0.003).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_model_uses_default() {
        let table = PricingTable::new();
        let cost = table.cost("totally-unknown-model", 1000, 1000);
        assert!((cost - 0.003).abs() < 1e-9);
    }

    #[test]
    fn test_cost_calculation() {
        let pricing = ModelPricing::new(0.01, 0.03);
        let cost = pricing.calculate(2000, 1000);
        assert!((cost - 0.05).abs() < 1e-9);
    }
}
