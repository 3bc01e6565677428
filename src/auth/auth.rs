use axum::{http::StatusCode, Json};

use crate::models::ErrorResponse;
use crate::services::auth_service::Authenticated;

const ADMIN_ROLE: &str = "admin";
const SERVICE_TOKEN: &str = "service";

pub fn is_admin(caller: &Authenticated) -> bool {
    caller.roles.iter().any(|r| r == ADMIN_ROLE)
}

pub fn is_service(caller: &Authenticated) -> bool {
    caller.token_type == SERVICE_TOKEN
}

/// Monitoring endpoints are open to admins and service tokens only.
pub fn ensure_admin_or_service(caller: &Authenticated) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(caller) || is_service(caller) {
        return Ok(());
    }
    Err(ErrorResponse::reply(StatusCode::FORBIDDEN, "Admin access required"))
}
