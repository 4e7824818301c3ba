// src/packages/mod.rs

//! Package descriptors
//!
//! A descriptor is the parsed metadata of one package. Repository archives
//! and the local install tree carry descriptors in the `%FIELD%` record
//! format (`desc`), the contributed-source web API returns them as JSON
//! objects (`json`). Both decode into the same [`PackageDescriptor`].

pub mod dependency;
pub mod desc;
pub mod descriptor;
pub mod json;

pub use dependency::{Constraint, Dependency};
pub use descriptor::{DescFlags, DescId, PackageDescriptor};
