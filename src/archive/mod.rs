// src/archive/mod.rs

//! Repository archive handling
//!
//! Repository databases are compressed TAR archives. This module turns the
//! compressed bytes (cached on disk or arriving from a mirror) into a
//! decompressed buffer and walks its TAR/PAX entries.

pub mod decompress;
pub mod tar;

pub use decompress::{Compression, StreamDecoder, decompress, decompress_reader};
pub use tar::{EntryKind, TarEntry, TarError, TarReader};
