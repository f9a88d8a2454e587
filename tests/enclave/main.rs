//! Enclave lifecycle: approve, pull, package, verify, clean.

#[path = "../common/mod.rs"]
mod common;

mod locking;
mod pull;
mod retention;
mod transfer;
