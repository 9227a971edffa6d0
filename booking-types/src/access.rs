//! Access control for bookings and everything hanging off them.
//!
//! Every component asks these helpers instead of comparing ids inline, so the
//! rules live in one place. Conversations have no participants of their own:
//! participation is always derived from the owning request.

use crate::domain::{Actor, RequestStatus, Role, ServiceRequest, UserId};
use crate::dto::RequestFilter;
use crate::error::DomainError;

/// How a user stands with respect to a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Requester,
    Provider,
    /// Requester and provider are the same user (self-accepted booking).
    Both,
    Neither,
}

impl Relation {
    pub fn is_participant(&self) -> bool {
        !matches!(self, Relation::Neither)
    }

    pub fn is_requester(&self) -> bool {
        matches!(self, Relation::Requester | Relation::Both)
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, Relation::Provider | Relation::Both)
    }
}

pub fn relation(request: &ServiceRequest, user: UserId) -> Relation {
    let requester = request.requester_id == user;
    let provider = request.provider_id == Some(user);
    match (requester, provider) {
        (true, true) => Relation::Both,
        (true, false) => Relation::Requester,
        (false, true) => Relation::Provider,
        (false, false) => Relation::Neither,
    }
}

pub fn require_requester(request: &ServiceRequest, actor: &Actor) -> Result<(), DomainError> {
    if relation(request, actor.user_id).is_requester() {
        Ok(())
    } else {
        Err(DomainError::Unauthorized(
            "Only the requester can perform this action".into(),
        ))
    }
}

pub fn require_provider(request: &ServiceRequest, actor: &Actor) -> Result<(), DomainError> {
    if relation(request, actor.user_id).is_provider() {
        Ok(())
    } else {
        Err(DomainError::Unauthorized(
            "Only the assigned provider can perform this action".into(),
        ))
    }
}

pub fn require_participant(request: &ServiceRequest, actor: &Actor) -> Result<(), DomainError> {
    if relation(request, actor.user_id).is_participant() {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "Not a participant of this service request".into(),
        ))
    }
}

pub fn require_admin(actor: &Actor) -> Result<(), DomainError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(DomainError::Forbidden("Admin role required".into()))
    }
}

pub fn require_role(actor: &Actor, role: Role) -> Result<(), DomainError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!("{} role required", role)))
    }
}

/// Participants and admins always see a booking; everyone sees open ones.
pub fn can_view(request: &ServiceRequest, actor: &Actor) -> Result<(), DomainError> {
    if actor.is_admin()
        || request.status == RequestStatus::Pending
        || relation(request, actor.user_id).is_participant()
    {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "Not allowed to view this service request".into(),
        ))
    }
}

/// Admins list anything. Everyone else must scope the query to themselves
/// or to the open board; wider queries are refused, never narrowed.
pub fn can_list(actor: &Actor, filter: &RequestFilter) -> Result<(), DomainError> {
    let own = filter.requester_id == Some(actor.user_id)
        || filter.provider_id == Some(actor.user_id);
    let open_board = filter.status == Some(RequestStatus::Pending);
    if actor.is_admin() || own || open_board {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "List must be scoped to your own requests or to pending requests".into(),
        ))
    }
}

/// Only the requester reviews the work done for them.
pub fn require_reviewer(request: &ServiceRequest, actor: &Actor) -> Result<(), DomainError> {
    if relation(request, actor.user_id).is_requester() {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "Only the requester can review this service request".into(),
        ))
    }
}

/// Cancellation is open to both participants and admins.
pub fn can_cancel(request: &ServiceRequest, actor: &Actor) -> Result<(), DomainError> {
    if actor.is_admin() {
        return Ok(());
    }
    require_participant(request, actor)
}

/// Only the recipient may read or mark their notifications.
pub fn require_self(owner: UserId, actor: &Actor) -> Result<(), DomainError> {
    if owner == actor.user_id {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "Notifications belong to another user".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewServiceRequest, Transition};
    use chrono::NaiveDate;

    fn request(requester: UserId) -> ServiceRequest {
        ServiceRequest::new(
            requester,
            NewServiceRequest {
                service_type: "mowing".into(),
                address: Some("123 Maple Ave".into()),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                price: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_relation() {
        let requester = UserId::new();
        let provider = UserId::new();
        let mut req = request(requester);
        assert_eq!(relation(&req, provider), Relation::Neither);

        req.apply(&Transition::Accept { provider }).unwrap();
        assert_eq!(relation(&req, requester), Relation::Requester);
        assert_eq!(relation(&req, provider), Relation::Provider);
        assert_eq!(relation(&req, UserId::new()), Relation::Neither);
    }

    #[test]
    fn test_self_accepted_booking_is_both() {
        let user = UserId::new();
        let mut req = request(user);
        req.apply(&Transition::Accept { provider: user }).unwrap();
        assert_eq!(relation(&req, user), Relation::Both);
        assert!(require_requester(&req, &Actor::provider(user)).is_ok());
        assert!(require_provider(&req, &Actor::provider(user)).is_ok());
    }

    #[test]
    fn test_pending_requests_are_visible_to_anyone() {
        let req = request(UserId::new());
        assert!(can_view(&req, &Actor::provider(UserId::new())).is_ok());
    }

    #[test]
    fn test_accepted_request_hidden_from_outsiders() {
        let mut req = request(UserId::new());
        req.apply(&Transition::Accept {
            provider: UserId::new(),
        })
        .unwrap();

        let outsider = Actor::provider(UserId::new());
        assert!(matches!(
            can_view(&req, &outsider),
            Err(DomainError::Forbidden(_))
        ));
        assert!(can_view(&req, &Actor::admin(UserId::new())).is_ok());
    }

    #[test]
    fn test_requester_and_provider_checks_are_unauthorized() {
        let req = request(UserId::new());
        let stranger = Actor::homeowner(UserId::new());
        assert!(matches!(
            require_requester(&req, &stranger),
            Err(DomainError::Unauthorized(_))
        ));
        assert!(matches!(
            require_provider(&req, &stranger),
            Err(DomainError::Unauthorized(_))
        ));
        assert!(matches!(
            require_participant(&req, &stranger),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn test_list_must_be_scoped() {
        let user = UserId::new();
        let actor = Actor::homeowner(user);

        assert!(can_list(&actor, &RequestFilter::requested_by(user)).is_ok());
        assert!(can_list(&actor, &RequestFilter::open()).is_ok());
        assert!(can_list(&actor, &RequestFilter::provided_by(user)).is_ok());

        assert!(matches!(
            can_list(&actor, &RequestFilter::default()),
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            can_list(&actor, &RequestFilter::requested_by(UserId::new())),
            Err(DomainError::Forbidden(_))
        ));
        assert!(can_list(&Actor::admin(UserId::new()), &RequestFilter::default()).is_ok());
    }

    #[test]
    fn test_only_requester_reviews() {
        let requester = UserId::new();
        let provider = UserId::new();
        let mut req = request(requester);
        req.apply(&Transition::Accept { provider }).unwrap();

        assert!(require_reviewer(&req, &Actor::homeowner(requester)).is_ok());
        assert!(matches!(
            require_reviewer(&req, &Actor::provider(provider)),
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            require_reviewer(&req, &Actor::admin(UserId::new())),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_checks() {
        assert!(require_admin(&Actor::admin(UserId::new())).is_ok());
        assert!(require_admin(&Actor::homeowner(UserId::new())).is_err());
        assert!(require_role(&Actor::provider(UserId::new()), Role::Provider).is_ok());
        assert!(require_role(&Actor::homeowner(UserId::new()), Role::Provider).is_err());
    }
}
