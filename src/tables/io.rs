//! Tables artifact: JSON with a format tag and a SHA-256 digest.
//!
//! ```text
//! { "format": "treeburg-tables/1", "digest": "<sha256 hex>", "tables": { ... } }
//! ```
//!
//! The digest covers the compact JSON encoding of `tables`, so a hand-edited
//! or truncated artifact is rejected instead of producing wrong labels. Tables
//! that hash correctly still go through `CompiledTables::check` on load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::CompiledTables;

pub const FORMAT: &str = "treeburg-tables/1";

#[derive(Debug, Error)]
pub enum TablesError {
    #[error("unsupported tables format {0:?} (expected {expected:?})", expected = FORMAT)]
    UnsupportedFormat(String),
    #[error("tables digest mismatch: header says {expected}, content hashes to {found}")]
    DigestMismatch { expected: String, found: String },
    #[error("inconsistent tables: {0}")]
    Inconsistent(String),
    #[error("invalid tables JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct TablesFileOut<'a> {
    format: &'static str,
    digest: String,
    tables: &'a CompiledTables,
}

#[derive(Deserialize)]
struct TablesFileIn {
    format: String,
    digest: String,
    tables: CompiledTables,
}

/// SHA-256 hex digest of the compact JSON encoding of `tables`.
pub fn digest(tables: &CompiledTables) -> Result<String, TablesError> {
    let bytes = serde_json::to_vec(tables)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let hash = hasher.finalize();
    Ok(format!("{:x}", hash))
}

pub fn to_json_string(tables: &CompiledTables) -> Result<String, TablesError> {
    let file = TablesFileOut {
        format: FORMAT,
        digest: digest(tables)?,
        tables,
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

pub fn save_tables_json(path: &Path, tables: &CompiledTables) -> Result<(), TablesError> {
    fs::write(path, to_json_string(tables)?)?;
    Ok(())
}

pub fn load_tables_json_bytes(data: &[u8]) -> Result<CompiledTables, TablesError> {
    let file: TablesFileIn = serde_json::from_slice(data)?;
    if file.format != FORMAT {
        return Err(TablesError::UnsupportedFormat(file.format));
    }
    let found = digest(&file.tables)?;
    if found != file.digest {
        return Err(TablesError::DigestMismatch {
            expected: file.digest,
            found,
        });
    }
    file.tables.check().map_err(TablesError::Inconsistent)?;
    Ok(file.tables)
}

pub fn load_tables_json(path: &Path) -> Result<CompiledTables, TablesError> {
    let data = fs::read(path)?;
    load_tables_json_bytes(&data)
}
