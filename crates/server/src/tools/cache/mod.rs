//! Cache maintenance MCP tools.
//!
//! Both tools operate on the query cache only; the spatial store is never
//! touched.

pub mod invalidate;
pub mod purge;

pub use invalidate::{CacheInvalidateParams, invalidate_impl};
pub use purge::purge_impl;
