// Process wiring: configuration in, running HTTP server out
pub mod controller_handler;

pub use controller_handler::{AppContext, Controller};
