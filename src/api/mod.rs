use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::{ErrorBody, GuardFailure};

mod admin;
mod public;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(voting::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![json_error]
}

/// Report every uncaught failure in the same JSON shape as route errors.
#[catch(default)]
fn json_error(status: Status, req: &Request<'_>) -> (Status, Json<ErrorBody>) {
    if let GuardFailure(Some(body)) = req.local_cache(GuardFailure::default) {
        return (status, Json(body.clone()));
    }

    let message = status.reason().unwrap_or("Unknown failure").to_string();
    let (status, reason) = match status.code {
        401 => (status, "Unauthenticated"),
        403 => (status, "Forbidden"),
        404 => (status, "NotFound"),
        // Malformed or unparseable request bodies.
        400 | 415 | 422 => (Status::BadRequest, "ValidationError"),
        503 => (status, "StoreUnavailable"),
        _ => (status, "InternalError"),
    };
    (status, Json(ErrorBody::new(reason, message)))
}
