pub mod aggregate;
pub mod backup;
pub mod chat;
pub mod db;
pub mod gemini;
pub mod models;
pub mod service;
pub mod store;
