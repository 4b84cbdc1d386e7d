// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Shelfscan: Retail Shelf Photo Analysis
//!
//! Sends a shelf photo and a named instruction template to a hosted vision
//! model, shows the answer, and keeps running usage counters in a small JSON
//! document next to the templates.

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod request;
pub mod session;
pub mod store;
pub mod web;

pub use config::AppConfig;
pub use error::{Result, ShelfError};
pub use session::Session;
pub use store::{ConfigStore, Document};
