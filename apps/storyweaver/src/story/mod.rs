// Story engine: content model, state machine, illustration and persistence.
// All text generation goes through llm_client::structured; media goes through providers.

pub mod engine;
pub mod handlers;
pub mod illustration;
pub mod model;
pub mod modules;
pub mod part;
pub mod prompts;
pub mod session;
pub mod store;
pub mod writer;
