//! Prompt construction for code generation.

use crate::blocks::BlockDefinition;
use crate::providers::GenerationRequest;

/// Builds the prompt for a block. Pure; identical inputs give identical text.
#[must_use]
pub fn build_prompt(name: &str, description: &str) -> String {
    format!(
        "You are a Python expert. Generate a function based on the following description:\n\
         \n\
         Block name: {name}\n\
         Description: \"{description}\"\n\
         \n\
         Requirements:\n\
         - Signature: def {name}(context: dict) -> dict\n\
         - Read and write using the `context` dictionary.\n\
         - Return the updated `context` dictionary.\n\
         - Return python code only without any other description\n"
    )
}

/// Builds the generation request for a block.
#[must_use]
pub fn build_request(name: &str, description: &str) -> GenerationRequest {
    GenerationRequest::new(name, build_prompt(name, description))
}

/// Builds the generation request for a parsed block definition.
#[must_use]
pub fn request_for(block: &BlockDefinition) -> GenerationRequest {
    build_request(block.name(), block.description())
}
