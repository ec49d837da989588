//! Marketplace data models
//!
//! Amounts are integer minor-currency units, timestamps are UTC epoch millis.

pub mod audit;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod payment;

pub use audit::{AuditAction, AuditLogEntry};
pub use cart::Cart;
pub use catalog::{Pack, Workflow};
pub use order::{Order, OrderItem, OrderStatus, PackItem};
pub use payment::{Payment, PaymentStatus};
