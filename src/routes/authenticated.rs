use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Defines the routes accessible to any applicant with a live session. Every
/// handler here relies on the `AuthApplicant` extractor middleware being
/// present on the router layer above this module, so each request arrives
/// with a resolved applicant identity. Handlers never take an applicant id
/// from the payload; the session decides whose data is touched.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /applicants/me
        // Retrieves the applicant record the session token resolves to.
        .route("/applicants/me", get(handlers::get_me))
        // GET /dashboard
        // The applicant's consolidated view: marks, result status, merit
        // position. 404 until a result row exists.
        .route("/dashboard", get(handlers::get_dashboard))
        // --- Admit Card ---
        // GET /admit-card
        // Retrieves the caller's admit card; the photo comes back base64-encoded.
        .route("/admit-card", get(handlers::get_admit_card))
        // POST /upload-photo
        // Attaches a base64 photo to the caller's admit card. Requires the
        // card to exist; a re-upload replaces the stored photo.
        .route("/upload-photo", post(handlers::upload_photo))
        // --- Payments & Results ---
        // POST /make-payment
        // Records an application fee payment, always attributed to the
        // session identity regardless of payload.
        .route("/make-payment", post(handlers::make_payment))
        // GET /results
        // Lists the caller's exam results.
        .route("/results", get(handlers::get_results))
}
