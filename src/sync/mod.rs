pub mod cache;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod deprecate;
pub mod download;
pub mod engine;
pub mod format;
pub mod ident;
pub mod library;
pub mod naming;
pub mod report;
pub mod transport;
pub mod util;

#[cfg(test)]
pub mod testutil;
