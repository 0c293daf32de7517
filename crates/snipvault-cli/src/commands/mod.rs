pub mod add;
pub mod common;
pub mod config;
pub mod context;
pub mod delete;
pub mod edit;
pub mod export;
pub mod list;
pub mod project;
pub mod search;
pub mod sync;
