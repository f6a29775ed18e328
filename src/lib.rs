//! Contact and message sync for the UniChat client: a local contact cache
//! reconciled with a remote document collection, plus a live message feed.

pub mod auth;
pub mod common;
pub mod config;
pub mod error;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod ui;

pub use error::SyncError;
