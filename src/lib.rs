pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod handlers;
pub mod models;
pub mod permissions;
pub mod posts;
pub mod reviews;
pub mod templates;
