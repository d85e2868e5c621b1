pub mod extract;
pub mod llm;
pub mod model;
pub mod prompts;
pub mod ranker;
pub mod responder;
pub mod router;
pub mod workflow;
