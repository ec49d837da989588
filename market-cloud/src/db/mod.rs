//! Database access layer

pub mod audit;
pub mod carts;
pub mod catalog;
pub mod orders;
pub mod payments;
pub mod pg_store;
pub mod processed_events;
pub mod users;

pub use pg_store::PgStore;
