pub mod client;
pub mod prompt;

pub use client::{
    GenerationMessage, LlmClient, LlmProvider, MessageRequest, ProviderOptions,
    RowGeneratorClient,
};
