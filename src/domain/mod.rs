pub mod connection_manager;
pub mod connector;
pub mod error;
pub mod models;
pub mod settings;
