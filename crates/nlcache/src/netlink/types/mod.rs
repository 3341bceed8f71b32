//! Fixed-layout wire structures.

pub mod bridge;
