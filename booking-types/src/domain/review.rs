//! Post-completion reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{ReviewId, ServiceRequestId, UserId};
use super::service_request::{RequestStatus, ServiceRequest};
use crate::error::DomainError;

/// Longest accepted review comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// A requester's rating of the provider who completed their booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Review {
    pub id: ReviewId,
    pub service_request_id: ServiceRequestId,
    pub reviewer_id: UserId,
    pub provider_id: UserId,
    #[schema(minimum = 1, maximum = 5, example = 5)]
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Creates a review for a completed booking.
    ///
    /// Ownership (reviewer = requester) is an access decision and is checked
    /// by the caller; this validates the booking state and the payload.
    pub fn new(
        request: &ServiceRequest,
        reviewer_id: UserId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Self, DomainError> {
        if request.status != RequestStatus::Completed {
            return Err(DomainError::InvalidTransition {
                from: request.status,
                action: "review",
            });
        }
        let provider_id = request
            .provider_id
            .ok_or_else(|| DomainError::Validation("Completed request has no provider".into()))?;

        if !(1..=5).contains(&rating) {
            return Err(DomainError::Validation(
                "Rating must be between 1 and 5".into(),
            ));
        }
        let comment = comment.filter(|c| !c.trim().is_empty());
        if let Some(c) = &comment {
            if c.chars().count() > MAX_COMMENT_CHARS {
                return Err(DomainError::Validation(format!(
                    "Comment cannot exceed {} characters",
                    MAX_COMMENT_CHARS
                )));
            }
        }

        Ok(Self {
            id: ReviewId::new(),
            service_request_id: request.id,
            reviewer_id,
            provider_id,
            rating,
            comment,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewServiceRequest, Transition};
    use chrono::NaiveDate;

    fn completed_request(requester: UserId, provider: UserId) -> ServiceRequest {
        let mut req = ServiceRequest::new(
            requester,
            NewServiceRequest {
                service_type: "edging".into(),
                address: Some("456 Oak Lane".into()),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 4, 2),
                price: None,
            },
        )
        .unwrap();
        req.apply(&Transition::Accept { provider }).unwrap();
        req.apply(&Transition::Complete { provider }).unwrap();
        req
    }

    #[test]
    fn test_review_completed_request() {
        let requester = UserId::new();
        let provider = UserId::new();
        let req = completed_request(requester, provider);

        let review = Review::new(&req, requester, 5, Some("Great job".into())).unwrap();
        assert_eq!(review.provider_id, provider);
        assert_eq!(review.rating, 5);
    }

    #[test]
    fn test_rating_out_of_range_fails() {
        let requester = UserId::new();
        let req = completed_request(requester, UserId::new());
        assert!(matches!(
            Review::new(&req, requester, 0, None),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Review::new(&req, requester, 6, None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_long_comment_fails() {
        let requester = UserId::new();
        let req = completed_request(requester, UserId::new());
        let comment = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            Review::new(&req, requester, 4, Some(comment)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_pending_request_cannot_be_reviewed() {
        let requester = UserId::new();
        let req = ServiceRequest::new(
            requester,
            NewServiceRequest {
                service_type: "mowing".into(),
                address: Some("123 Maple Ave".into()),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 4, 2),
                price: None,
            },
        )
        .unwrap();
        assert!(matches!(
            Review::new(&req, requester, 5, None),
            Err(DomainError::InvalidTransition { action: "review", .. })
        ));
    }
}
