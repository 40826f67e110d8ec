//! Generation orchestration
//!
//! A generation is one attempt at producing an image in one of the [`modes::Mode`]s.
//! `engine` holds the blocking, database-free steps (validate inputs, build the prompt, call
//! the image API) shared with the chat flows; `service` wraps them with the persisted
//! `running` to `succeeded`/`failed` lifecycle.

pub mod engine;
pub mod modes;
pub mod request;
pub mod service;

pub use modes::{ChatMode, Mode};
pub use request::{EditMode, GenerationRequest, ModeInputs};
pub use service::{GenerationOutcome, GenerationService};
