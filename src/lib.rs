pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod jobs;
pub mod parsers;
pub mod progress;
pub mod sink;
pub mod types;
pub mod walker;
pub mod workers;

#[cfg(test)]
mod testutil;
