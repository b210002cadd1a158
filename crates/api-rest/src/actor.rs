//! Actor extraction.
//!
//! Authentication happens in front of this service. The gateway forwards the
//! authenticated user as three headers, which are trusted as-is:
//!
//! - `x-actor-id`: numeric user id
//! - `x-actor-username`: login name
//! - `x-actor-role`: one of the LIMS roles

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use lims_core::{Actor, Role, UserId};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_USERNAME_HEADER: &str = "x-actor-username";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The caller of a mutating endpoint.
pub struct RequestActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &'static str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Unauthenticated(format!("missing {name} header")))
        };

        let id = header(ACTOR_ID_HEADER)?
            .parse::<u64>()
            .map_err(|_| ApiError::Unauthenticated(format!("invalid {ACTOR_ID_HEADER} header")))?;
        let username = header(ACTOR_USERNAME_HEADER)?;
        let role = header(ACTOR_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|_| ApiError::Unauthenticated(format!("invalid {ACTOR_ROLE_HEADER} header")))?;

        let actor = Actor::new(UserId(id), username, role)?;
        Ok(Self(actor))
    }
}
