pub mod accounts;
pub mod chat;
pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod generation;
pub mod imaging;
pub mod prompts;
pub mod provider;
pub mod storage;
pub mod web_interface;
