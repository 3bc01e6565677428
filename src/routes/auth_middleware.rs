use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{error, info};

use crate::services::auth_service::authenticate;
use crate::AppState;

/// Validate the caller's token and expose it to handlers as an extension
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let caller = match authenticate(req.headers(), None, state.auth_jwt_secret.as_deref()) {
        Ok(caller) => caller,
        Err(e) => {
            error!("Request rejected: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    info!("{} token validated for {}", caller.token_type, caller.identity.user_id);
    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}
