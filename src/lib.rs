pub mod app;
pub mod build;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod mapping;
pub mod model;
pub mod output;
pub mod ownership;
pub mod parse;
pub mod portal;
pub mod providers;
pub mod store;
pub mod validate;
pub mod walker;
