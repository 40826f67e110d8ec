// Web Interface module root
pub mod form;
pub mod handlers;
pub mod reply;
pub mod routes;
pub mod types;
pub mod web_server;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use reply::ApiReply;
pub use web_server::WebServer;
