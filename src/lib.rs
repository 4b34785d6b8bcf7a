//! A small JSON API over a single todo resource, backed by SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod routes;

pub use db::{Database, TodoRepository};
pub use routes::app;
