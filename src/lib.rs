pub mod api;
pub mod assets;
pub mod audio;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod source;
