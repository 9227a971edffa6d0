//! # Booking Hex
//!
//! Application service layer and HTTP adapter for the booking engine.
//!
//! ## Architecture
//!
//! - `service/` - Application service (lifecycle, messaging, payments, reviews)
//! - `fanout/` - Outbox delivery into per-user notifications
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `R: BookingRepository`, allowing
//! different repository implementations to be injected.

pub mod fanout;
pub mod inbound;
pub mod openapi;
pub mod service;


pub use fanout::{Fanout, FanoutWorker};
pub use service::{BookingService, ServiceConfig};
