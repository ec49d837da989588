//! market-cloud: marketplace payment reconciliation service
//!
//! Receives payment provider webhooks and turns them into order, payment,
//! sales and cart changes, each event applied at most once.

pub mod api;
pub mod config;
pub mod db;
pub mod notify;
pub mod reconcile;
pub mod state;
pub mod stripe;
pub mod util;
pub mod webhook;
