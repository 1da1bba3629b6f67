//! Workspace root crate. No logic of its own — it exists so the top-level
//! `tests/` directory can drive the `gateway` crate end to end, the way the
//! teacher's workspace root aggregates its per-service crates for the same
//! purpose.

pub use gateway;
