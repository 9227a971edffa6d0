//! Service request (booking) and its lifecycle state machine.
//!
//! ```text
//! pending ──accept──► accepted ──complete──► completed
//!    │                   │
//!    └──────cancel───────┴──────► cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. Payment is only collectable on
//! `completed`, which keeps `payment_status = paid ⇒ status = completed`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::event::BookingEvent;
use super::ids::{ServiceRequestId, UserId};
use super::money::Money;
use crate::error::DomainError;

/// Lifecycle status of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(DomainError::Validation(format!("Unknown status: {}", other))),
        }
    }
}

/// Whether the booking has been paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(DomainError::Validation(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

/// A state change requested on a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A provider takes the job.
    Accept { provider: UserId },
    /// The accepting provider finishes the job.
    Complete { provider: UserId },
    /// A participant calls the job off.
    Cancel { by: UserId },
}

impl Transition {
    /// States this transition may start from.
    pub fn allowed_from(&self) -> &'static [RequestStatus] {
        match self {
            Transition::Accept { .. } => &[RequestStatus::Pending],
            Transition::Complete { .. } => &[RequestStatus::Accepted],
            Transition::Cancel { .. } => &[RequestStatus::Pending, RequestStatus::Accepted],
        }
    }

    /// State reached on success.
    pub fn target(&self) -> RequestStatus {
        match self {
            Transition::Accept { .. } => RequestStatus::Accepted,
            Transition::Complete { .. } => RequestStatus::Completed,
            Transition::Cancel { .. } => RequestStatus::Cancelled,
        }
    }

    /// Verb used in error messages and logs.
    pub fn action(&self) -> &'static str {
        match self {
            Transition::Accept { .. } => "accept",
            Transition::Complete { .. } => "complete",
            Transition::Cancel { .. } => "cancel",
        }
    }

    /// Domain event describing the transition, built from the updated booking.
    pub fn event_for(&self, updated: &ServiceRequest) -> BookingEvent {
        match *self {
            Transition::Accept { provider } => BookingEvent::RequestAccepted {
                request_id: updated.id,
                requester_id: updated.requester_id,
                provider_id: provider,
            },
            Transition::Complete { provider } => BookingEvent::RequestCompleted {
                request_id: updated.id,
                requester_id: updated.requester_id,
                provider_id: provider,
            },
            Transition::Cancel { by } => BookingEvent::RequestCancelled {
                request_id: updated.id,
                cancelled_by: by,
                counterpart: updated.counterpart_of(by),
            },
        }
    }
}

/// Input for a new booking, validated by [`ServiceRequest::new`].
#[derive(Debug, Clone)]
pub struct NewServiceRequest {
    pub service_type: String,
    pub address: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub price: Option<Money>,
}

/// A booking between a requester and (once accepted) a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceRequest {
    pub id: ServiceRequestId,
    pub requester_id: UserId,
    /// Unset while pending; immutable once accepted.
    pub provider_id: Option<UserId>,
    #[schema(example = "mowing")]
    pub service_type: String,
    #[schema(example = "123 Maple Ave")]
    pub address: String,
    pub scheduled_date: NaiveDate,
    pub price: Option<Money>,
    pub status: RequestStatus,
    pub payment_status: PaymentStatus,
    /// Processor reference of the latest payment intent.
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Creates a pending booking.
    ///
    /// # Validation
    /// - service type cannot be blank
    /// - address and scheduled date are required
    pub fn new(requester_id: UserId, input: NewServiceRequest) -> Result<Self, DomainError> {
        if input.service_type.trim().is_empty() {
            return Err(DomainError::Validation("Service type cannot be empty".into()));
        }
        let address = input
            .address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| DomainError::Validation("Address is required".into()))?;
        let scheduled_date = input
            .scheduled_date
            .ok_or_else(|| DomainError::Validation("Scheduled date is required".into()))?;

        let now = Utc::now();
        Ok(Self {
            id: ServiceRequestId::new(),
            requester_id,
            provider_id: None,
            service_type: input.service_type,
            address,
            scheduled_date,
            price: input.price,
            status: RequestStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// The other participant of the booking, if there is one.
    pub fn counterpart_of(&self, user: UserId) -> Option<UserId> {
        if user == self.requester_id {
            self.provider_id.filter(|p| *p != user)
        } else if Some(user) == self.provider_id {
            Some(self.requester_id)
        } else {
            None
        }
    }

    /// Checks that `transition` may start from the current state.
    pub fn check_transition(&self, transition: &Transition) -> Result<(), DomainError> {
        if transition.allowed_from().contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                from: self.status,
                action: transition.action(),
            })
        }
    }

    /// Applies a transition in place and returns the event it produces.
    ///
    /// Storage adapters perform the same change as a compare-and-set update;
    /// this is the reference implementation of those semantics.
    pub fn apply(&mut self, transition: &Transition) -> Result<BookingEvent, DomainError> {
        self.check_transition(transition)?;
        match *transition {
            Transition::Accept { provider } => self.provider_id = Some(provider),
            Transition::Complete { provider } => {
                if self.provider_id != Some(provider) {
                    return Err(DomainError::Unauthorized(
                        "Only the accepting provider can complete this request".into(),
                    ));
                }
            }
            Transition::Cancel { .. } => {}
        }
        self.status = transition.target();
        self.updated_at = Utc::now();
        Ok(transition.event_for(self))
    }

    /// Marks the booking paid. Only completed, unpaid bookings qualify.
    pub fn mark_paid(&mut self) -> Result<(), DomainError> {
        if self.is_paid() {
            return Err(DomainError::AlreadyPaid);
        }
        if self.status != RequestStatus::Completed {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                action: "pay",
            });
        }
        self.payment_status = PaymentStatus::Paid;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Both lifecycle invariants hold.
    pub fn invariants_hold(&self) -> bool {
        let provider_ok = match self.status {
            RequestStatus::Pending => self.provider_id.is_none(),
            RequestStatus::Accepted | RequestStatus::Completed => self.provider_id.is_some(),
            RequestStatus::Cancelled => true,
        };
        let payment_ok = !self.is_paid() || self.status == RequestStatus::Completed;
        provider_ok && payment_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    fn new_request(requester: UserId) -> ServiceRequest {
        ServiceRequest::new(
            requester,
            NewServiceRequest {
                service_type: "mowing".into(),
                address: Some("123 Maple Ave".into()),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                price: Some(Money::new(4500, Currency::USD).unwrap()),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_new_request_is_pending_without_provider() {
        let req = new_request(UserId::new());
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(req.provider_id.is_none());
        assert_eq!(req.payment_status, PaymentStatus::Unpaid);
        assert!(req.invariants_hold());
    }

    #[test]
    fn test_missing_address_fails() {
        let result = ServiceRequest::new(
            UserId::new(),
            NewServiceRequest {
                service_type: "mowing".into(),
                address: Some("   ".into()),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                price: None,
            },
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_missing_scheduled_date_fails() {
        let result = ServiceRequest::new(
            UserId::new(),
            NewServiceRequest {
                service_type: "mowing".into(),
                address: Some("123 Maple Ave".into()),
                scheduled_date: None,
                price: None,
            },
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_full_lifecycle() {
        let requester = UserId::new();
        let provider = UserId::new();
        let mut req = new_request(requester);

        let event = req.apply(&Transition::Accept { provider }).unwrap();
        assert_eq!(req.status, RequestStatus::Accepted);
        assert_eq!(req.provider_id, Some(provider));
        assert!(matches!(event, BookingEvent::RequestAccepted { .. }));

        req.apply(&Transition::Complete { provider }).unwrap();
        assert_eq!(req.status, RequestStatus::Completed);

        req.mark_paid().unwrap();
        assert!(req.is_paid());
        assert!(req.invariants_hold());
    }

    #[test]
    fn test_second_accept_is_invalid_transition() {
        let mut req = new_request(UserId::new());
        req.apply(&Transition::Accept {
            provider: UserId::new(),
        })
        .unwrap();

        let result = req.apply(&Transition::Accept {
            provider: UserId::new(),
        });
        assert!(matches!(
            result,
            Err(DomainError::InvalidTransition {
                from: RequestStatus::Accepted,
                ..
            })
        ));
    }

    #[test]
    fn test_complete_by_other_user_leaves_state_unchanged() {
        let provider = UserId::new();
        let mut req = new_request(UserId::new());
        req.apply(&Transition::Accept { provider }).unwrap();

        let result = req.apply(&Transition::Complete {
            provider: UserId::new(),
        });
        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
        assert_eq!(req.status, RequestStatus::Accepted);
    }

    #[test]
    fn test_cancel_from_terminal_state_fails() {
        let provider = UserId::new();
        let requester = UserId::new();
        let mut req = new_request(requester);
        req.apply(&Transition::Accept { provider }).unwrap();
        req.apply(&Transition::Complete { provider }).unwrap();

        let result = req.apply(&Transition::Cancel { by: requester });
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[test]
    fn test_cancel_event_targets_counterpart() {
        let provider = UserId::new();
        let requester = UserId::new();
        let mut req = new_request(requester);
        req.apply(&Transition::Accept { provider }).unwrap();

        let event = req.apply(&Transition::Cancel { by: provider }).unwrap();
        assert_eq!(
            event,
            BookingEvent::RequestCancelled {
                request_id: req.id,
                cancelled_by: provider,
                counterpart: Some(requester),
            }
        );
    }

    #[test]
    fn test_cannot_pay_before_completion() {
        let mut req = new_request(UserId::new());
        assert!(matches!(
            req.mark_paid(),
            Err(DomainError::InvalidTransition { action: "pay", .. })
        ));
        assert!(!req.is_paid());
    }

    #[test]
    fn test_counterpart_resolution() {
        let requester = UserId::new();
        let provider = UserId::new();
        let mut req = new_request(requester);
        assert_eq!(req.counterpart_of(requester), None);

        req.apply(&Transition::Accept { provider }).unwrap();
        assert_eq!(req.counterpart_of(requester), Some(provider));
        assert_eq!(req.counterpart_of(provider), Some(requester));
        assert_eq!(req.counterpart_of(UserId::new()), None);
    }
}
