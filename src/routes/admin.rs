use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Admin Router Module
///
/// Defines the staff-side operations: building the exam catalog, issuing
/// admit cards, and entering results.
///
/// Access Control:
/// These routes are nested under `/admin` and each handler takes the
/// `AuthApplicant` extractor, so a live session is required. There is no
/// separate admin role in the data model, so any authenticated session may
/// call them; a role column on the credential row would be the place to
/// tighten this.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /admin/exam-centers
        // Registers a new exam center.
        .route("/exam-centers", post(handlers::create_exam_center))
        // POST /admin/exam-units
        // Registers a new exam unit under an existing center.
        .route("/exam-units", post(handlers::create_exam_unit))
        // POST /admin/admit-cards
        // Issues an admit card with the next sequential exam roll. The roll
        // allocator serializes concurrent issuances via the uniqueness
        // constraint on exam_roll.
        .route("/admit-cards", post(handlers::create_admit_card))
        // POST /admin/results
        // Enters an exam result, deriving Passed/Failed from the pass mark
        // when the payload leaves the status Pending.
        .route("/results", post(handlers::create_result))
}
