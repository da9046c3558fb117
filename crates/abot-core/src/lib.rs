//! Core domain + application logic for the applicant management bot.
//!
//! This crate is framework-agnostic. The hosted record store, the file buckets
//! and Telegram live behind ports (traits) implemented in adapter crates.

pub mod alerts;
pub mod applicant;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod repository;
pub mod security;
pub mod session;
pub mod subscription;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
