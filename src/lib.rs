pub mod aggregator;
pub mod config;
pub mod curated;
pub mod domain;
pub mod error;
pub mod eutils;
pub mod limiter;
pub mod organism;
pub mod output;
pub mod parser;
pub mod platform;
pub mod report;
