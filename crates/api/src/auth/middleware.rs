//! Bearer-token middleware for staff and admin routes

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use helpline_shared::ParticipantRole;

use super::jwt::{JwtError, StaffClaims};
use crate::{error::ApiError, state::AppState};

/// Verified staff identity placed in request extensions
#[derive(Debug, Clone)]
pub struct StaffIdentity {
    pub staff_id: String,
    pub name: String,
    pub role: ParticipantRole,
}

impl StaffIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == ParticipantRole::Admin
    }
}

impl From<StaffClaims> for StaffIdentity {
    fn from(claims: StaffClaims) -> Self {
        Self {
            staff_id: claims.sub,
            name: claims.name,
            role: claims.role,
        }
    }
}

/// Require a valid staff or admin bearer token
pub async fn require_staff(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = authenticate(&state, &request)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Require a valid admin bearer token
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = authenticate(&state, &request)?;
    if !identity.is_admin() {
        tracing::warn!(staff_id = %identity.staff_id, "Admin route refused for non-admin");
        return Err(ApiError::Forbidden);
    }
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn authenticate(state: &AppState, request: &Request) -> Result<StaffIdentity, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    match state.jwt.validate_token(token) {
        Ok(claims) => Ok(claims.into()),
        Err(JwtError::NotStaff) => Err(ApiError::Forbidden),
        Err(e) => {
            tracing::debug!(error = %e, "Bearer token rejected");
            Err(ApiError::InvalidToken)
        }
    }
}
