#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod compose;
pub mod config;
pub mod data;
pub mod feed;
pub mod likes;
pub mod link;
pub mod model;
pub mod replies;
pub mod search;
pub mod session;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
