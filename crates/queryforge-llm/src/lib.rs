//! queryforge-llm: model-serving client, model catalog, prompt construction
//! and the heuristic parsers that turn free-text replies into structured output.

pub mod backend;
pub mod models;
pub mod parser;
pub mod prompts;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message, ServingEndpointBackend};
pub use models::{estimate_cost, resolve_model, ModelInfo, DEFAULT_MODEL_ID, MODEL_CATALOG};
