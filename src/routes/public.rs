use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any client.
/// These cover the identity gateway (registration, token exchange) and the
/// read-only exam catalog an applicant browses before applying.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load balancer checks.
        // Returns "ok" immediately to verify the service is running and responsive.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Creates the applicant identity and its credential in one transaction.
        // Payload validation happens before any storage write.
        .route("/register", post(handlers::register_applicant))
        // POST /token
        // Exchanges email + password for a signed session token. All failures
        // collapse into the same 401 response.
        .route("/token", post(handlers::login))
        // GET /exam-centers
        // Lists the exam centers. Public so applicants can see where exams run
        // before registering.
        .route("/exam-centers", get(handlers::list_exam_centers))
        // GET /exam-units
        // Lists the exam units (admission test sessions) across all centers.
        .route("/exam-units", get(handlers::list_exam_units))
}
