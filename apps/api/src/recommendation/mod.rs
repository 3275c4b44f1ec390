// AI-assisted influencer recommendations.
// All provider calls go through llm_client; this module owns key rotation,
// retry policy, prompt assembly, and recovery of the JSON result.

pub mod error;
pub mod extractor;
pub mod handlers;
pub mod key_rotator;
pub mod orchestrator;
pub mod prompts;
