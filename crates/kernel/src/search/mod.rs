//! JSON search DSL.
//!
//! A search request names the fields to select, joins, a boolean filter
//! tree, grouping, a post-aggregation filter, ordering, and pagination,
//! all as plain JSON. The request is validated into typed structures
//! ([`schema`]), its field references are resolved against the model
//! registry ([`field`]), and every node is dispatched to the operator or
//! function registry ([`evaluate`]). [`Search`] then drives a
//! [`QueryEngine`] through the clauses in order. Caller strings are
//! never spliced into SQL; sea-query renders everything.

pub mod compiler;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod expr;
pub mod field;
pub mod filter;
pub mod functions;
pub mod operators;
pub mod params;
pub mod schema;
pub mod service;
pub mod types;

pub use compiler::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, Pagination, Search};
pub use engine::{Bounds, FunctionCaller, QueryEngine, QueryHandle, SeaQueryEngine};
pub use error::ValidationError;
pub use filter::{make_filter, normalize};
pub use functions::{Function, FunctionRegistry};
pub use operators::{Operator, OperatorRegistry};
pub use service::{CompiledSql, SearchResult, SearchService};
pub use types::{FilterTree, SearchRequest};

/// Operator and function tables, built once at startup and shared
/// read-only.
#[derive(Default)]
pub struct SearchRegistry {
    pub operators: OperatorRegistry,
    pub functions: FunctionRegistry,
}

impl SearchRegistry {
    /// Both registries with every built-in registered.
    pub fn new() -> Self {
        Self {
            operators: OperatorRegistry::new(),
            functions: FunctionRegistry::new(),
        }
    }
}

impl std::fmt::Debug for SearchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRegistry")
            .field("operators", &self.operators.aliases().len())
            .field("functions", &self.functions.aliases().len())
            .finish()
    }
}
