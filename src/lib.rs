//! Terminal front-end for the Bitwarden CLI: session caching, vault
//! listing and search, and clipboard delivery of the selected password.

pub mod app;
pub mod clipboard;
pub mod error;
pub mod logging;
pub mod models;
pub mod process;
pub mod storage;
pub mod ui;
pub mod vault;
