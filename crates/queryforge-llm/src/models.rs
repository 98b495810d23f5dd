//! Foundation model catalog and token pricing.

use serde::Serialize;

pub const DEFAULT_MODEL_ID: &str = "databricks-llama-4-maverick";

/// USD per million tokens used for models missing from the catalog.
const DEFAULT_INPUT_PRICE: f64 = 0.15;
const DEFAULT_OUTPUT_PRICE: f64 = 0.60;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub key: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

pub static MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        key: "llama-maverick",
        id: "databricks-llama-4-maverick",
        name: "Llama 4 Maverick",
        description: "Fast and efficient for general tasks",
        input_price_per_million: 0.15,
        output_price_per_million: 0.60,
    },
    ModelInfo {
        key: "llama-70b",
        id: "databricks-meta-llama-3-3-70b-instruct",
        name: "Llama 3.3 70B",
        description: "Powerful model for complex reasoning",
        input_price_per_million: 0.20,
        output_price_per_million: 0.80,
    },
    ModelInfo {
        key: "llama-405b",
        id: "databricks-meta-llama-3-1-405b-instruct",
        name: "Llama 3.1 405B",
        description: "Largest Llama model for most complex tasks",
        input_price_per_million: 0.50,
        output_price_per_million: 2.00,
    },
    ModelInfo {
        key: "claude-sonnet-4-5",
        id: "databricks-claude-sonnet-4-5",
        name: "Claude Sonnet 4.5",
        description: "Latest Claude model with superior reasoning",
        input_price_per_million: 3.00,
        output_price_per_million: 15.00,
    },
    ModelInfo {
        key: "claude-opus-4-1",
        id: "databricks-claude-opus-4-1",
        name: "Claude Opus 4.1",
        description: "Most powerful Claude model",
        input_price_per_million: 15.00,
        output_price_per_million: 75.00,
    },
    ModelInfo {
        key: "gpt-5",
        id: "databricks-gpt-5",
        name: "GPT-5",
        description: "Latest OpenAI model",
        input_price_per_million: 1.25,
        output_price_per_million: 10.00,
    },
    ModelInfo {
        key: "gemini-2-5-pro",
        id: "databricks-gemini-2-5-pro",
        name: "Gemini 2.5 Pro",
        description: "Google's most capable model",
        input_price_per_million: 1.25,
        output_price_per_million: 10.00,
    },
    ModelInfo {
        key: "qwen3-80b",
        id: "databricks-qwen3-next-80b-a3b-instruct",
        name: "Qwen 3 80B",
        description: "Advanced Qwen model",
        input_price_per_million: 0.15,
        output_price_per_million: 1.20,
    },
    ModelInfo {
        key: "gpt-oss-120b",
        id: "databricks-gpt-oss-120b",
        name: "GPT OSS 120B",
        description: "Open source GPT-scale model",
        input_price_per_million: 0.15,
        output_price_per_million: 0.60,
    },
];

/// Look a model up by short key or provider id.
pub fn resolve_model(key_or_id: &str) -> Option<&'static ModelInfo> {
    let needle = key_or_id.trim();
    MODEL_CATALOG.iter().find(|m| m.id == needle || m.key == needle)
}

/// Estimated USD cost of one completion.
pub fn estimate_cost(model_id: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let (input, output) = resolve_model(model_id)
        .map(|m| (m.input_price_per_million, m.output_price_per_million))
        .unwrap_or((DEFAULT_INPUT_PRICE, DEFAULT_OUTPUT_PRICE));

    (prompt_tokens as f64 / 1_000_000.0) * input + (completion_tokens as f64 / 1_000_000.0) * output
}
