pub mod config;
pub mod context;
pub mod embedding;
pub mod errors;
pub mod graph;
pub mod index;
pub mod logging;
pub mod search;
pub mod store;
