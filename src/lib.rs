// src/lib.rs

//! Archdeps
//!
//! Repository metadata indexing and dependency resolution for Arch-style
//! package managers.
//!
//! # Architecture
//!
//! - Archives: compressed repository databases are decoded in memory and
//!   walked as TAR streams
//! - Descriptors: `%FIELD%` records and RPC JSON map onto one package entity
//! - Databases: name-indexed arenas with provides/replaces aliases
//! - Sync: one job per repository on a bounded worker pool
//! - Resolution: installed packages and their dependencies become a SAT
//!   instance whose model is the install set

pub mod archive;
pub mod config;
pub mod db;
mod error;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
