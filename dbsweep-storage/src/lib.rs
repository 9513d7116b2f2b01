//! dbsweep Storage - Query Source and Context Traits
//!
//! Defines how a sweep reaches its backends: [`QuerySource`] runs catalog
//! queries and returns [`dbsweep_core::ResultTable`]s, [`ContextProvider`]
//! prepares the per-entity resource checks run against. The Postgres
//! implementation lives in [`pg`], in-memory doubles in [`mock`].

pub mod mock;
pub mod pg;
pub mod source;

pub use mock::{MockContextProvider, MockQuerySource};
pub use pg::{column_kind, DbConfig, PgQuerySource};
pub use source::{ContextProvider, EntityContext, NoopContextProvider, QuerySource, ResourceContext};
