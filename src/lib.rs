pub mod access;
pub mod app;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod events;
pub mod jwt;
pub mod models;
pub mod routes;
pub mod store;
pub mod utils;

pub use access::{Hooks, Portier, Visitor};
pub use app::{create_app, create_app_with};
pub use config::PortierConfig;
