use crate::error::AppError;
use crate::session::CeremonySession;
use axum::{extract::Request, middleware::Next, response::Response};
use tower_sessions::Session;

/// Let the request through only if the session has signed in
pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match session.identity().await? {
        Some(_) => Ok(next.run(request).await),
        None => Err(AppError::Unauthorized("Not authenticated".to_string())),
    }
}
