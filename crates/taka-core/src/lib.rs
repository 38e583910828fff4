//! taka-core - Core library for Taka
//!
//! This crate contains the shared models, database layer, remote client,
//! and offline-first sync logic used by all Taka interfaces.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Transaction, TransactionId, TransactionKind};
