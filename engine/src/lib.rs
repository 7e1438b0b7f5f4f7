pub mod config;
pub mod core;

pub use crate::core::{
    compute::{BlockSelector, Engine, QueryRequest, QueryResponse},
    error::{ErrorKind, IndexerError},
    registry::FormulaType,
    storage::SledStorage,
};
