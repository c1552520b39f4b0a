//! Workspace root package.
//!
//! Real code lives in the `crates/` members; this package exists so
//! workspace-wide dev tooling (git hooks via `cargo-husky`) has an
//! anchor to install from.
