//! fetchladder - adaptive retrieval for sites that resist automated access.
//!
//! A probe phase classifies each site's accessibility over plain HTTP and a
//! headless browser and recommends a strategy. An escalation phase then
//! walks a fixed ladder of fetch strategies per URL, logging every attempt
//! to SQLite, until one yields usable content.

pub mod cli;
pub mod config;
pub mod escalation;
pub mod models;
pub mod probe;
pub mod repository;
pub mod scrapers;
pub mod utils;
