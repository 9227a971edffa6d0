//! # Booking Types
//!
//! Domain types and port traits for the booking lifecycle engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (ServiceRequest, Conversation, Notification, ...)
//! - `access` - Who may do what to a booking
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod access;
pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Actor, ApiKey, ApiKeyId, BookingEvent, BookingSummary, Conversation, ConversationId,
    ConversationSummary, Currency, EventId, Message, MessageId, Money, NewMessage,
    NewNotification, NewServiceRequest, Notification, NotificationId, OutboxEvent, OutboxStatus,
    PaymentStatus, RelatedRef, RequestStatus, Review, ReviewId, Role, ServiceRequest,
    ServiceRequestId, Transition, UserId,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    BookingRepository, IntentRequest, IntentStatus, PaymentIntent, PaymentProcessor,
    ProcessorError,
};
