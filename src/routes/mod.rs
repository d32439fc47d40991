/// Router Module Index
///
/// Organizes the application's routing logic into security-segregated modules.
/// Access control is applied explicitly at the module level (via Axum layers),
/// so a route's file location states its exposure.

/// Routes accessible to any client (anonymous, plus registration and login).
pub mod public;

/// Routes protected by the `AuthApplicant` extractor middleware.
/// Requires a validated applicant session.
pub mod authenticated;

/// Routes for staff operations (catalog management, issuance, result entry).
/// Session-gated; the data model carries no separate admin role.
pub mod admin;
