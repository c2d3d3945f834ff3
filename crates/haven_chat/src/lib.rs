//! # haven_chat - Multi-agent chat pipeline for Haven
//!
//! This crate routes a tenant's conversational turn (text and/or a photo) to
//! one of several specialists and streams the answer back:
//! - Turn classification into a routing decision
//! - Specialist configurations (persona, model, tools, web search)
//! - Generation sessions with inline tool execution
//! - Request-scoped image attachments
//! - Removal of leaked tool-call arguments from the visible stream
//! - A frame protocol shared by streaming and buffered callers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   TurnRequest   │────▶│   Classifier    │────▶│    Registry     │
//! └────────┬────────┘     └─────────────────┘     └────────┬────────┘
//!          │ image                                         │
//!          ▼                                               ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ AttachmentStore │◀────│     ToolBox     │◀────│    Session      │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          ▼
//!                         ┌─────────────────┐     ┌─────────────────┐
//!                         │     Emitter     │◀────│     Filter      │
//!                         └─────────────────┘     └─────────────────┘
//! ```

pub mod attachment;
pub mod classifier;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod history;
pub mod llm;
pub mod mock;
pub mod registry;
pub mod service;
pub mod session;
pub mod settings;
pub mod tools;
pub mod types;

pub use attachment::*;
pub use classifier::*;
pub use emitter::*;
pub use error::*;
pub use filter::*;
pub use llm::*;
pub use registry::*;
pub use service::*;
pub use session::*;
pub use settings::*;
pub use tools::*;
pub use types::*;
