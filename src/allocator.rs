use crate::{
    config::AppConfig,
    error::ApiError,
    models::{AdmitCard, IssueAdmitCardRequest},
    repository::{RepoError, RepositoryState},
};

/// Maximum allocation attempts before giving up.
///
/// Each retry means another issuance won the roll this one read; five rounds
/// absorbs bursts of concurrent admin activity without spinning forever.
pub const MAX_ATTEMPTS: u32 = 5;

/// issue_admit_card
///
/// Assigns the next exam roll and creates the admit card. Rolls are derived
/// from storage on every attempt: read the current maximum (or the configured
/// floor when no cards exist), add one, and insert under the exam_roll
/// uniqueness constraint. A constraint rejection means a concurrent issuance
/// claimed the candidate first, so the loop re-reads and tries again, at most
/// `MAX_ATTEMPTS` times. The insert is a single statement, so a failed
/// attempt leaves no partial card behind.
///
/// Preflight checks run before the loop so the common failures (unknown
/// unit, unknown applicant, second card for the same applicant) do not
/// consume allocation attempts.
pub async fn issue_admit_card(
    repo: &RepositoryState,
    config: &AppConfig,
    req: IssueAdmitCardRequest,
) -> Result<AdmitCard, ApiError> {
    // --- Preflight ---
    if repo.get_exam_unit(req.unit_id).await?.is_none() {
        return Err(ApiError::UnitNotFound);
    }
    if repo.get_applicant(req.applicant_id).await?.is_none() {
        return Err(ApiError::Validation("applicant does not exist".to_string()));
    }
    // One card per applicant. The existing card is left untouched.
    if repo.get_admit_card(req.applicant_id).await?.is_some() {
        return Err(ApiError::DuplicateAdmitCard);
    }

    // --- Allocation Loop ---
    for attempt in 1..=MAX_ATTEMPTS {
        let current_max = repo.max_exam_roll().await?.unwrap_or(config.roll_floor);
        let candidate = current_max + 1;

        if let Some(ceiling) = config.roll_ceiling {
            if candidate > ceiling {
                tracing::warn!(candidate, ceiling, "exam roll space exhausted");
                return Err(ApiError::AllocationExhausted);
            }
        }

        match repo.insert_admit_card(candidate, req.clone()).await {
            Ok(card) => {
                if attempt > 1 {
                    tracing::debug!(
                        exam_roll = card.exam_roll,
                        attempt,
                        "admit card issued after roll contention"
                    );
                }
                return Ok(card);
            }
            // A concurrent issuance holds this roll. The winner keeps it; we
            // re-read the new maximum and try the next candidate.
            Err(RepoError::DuplicateRoll) => {
                tracing::debug!(candidate, attempt, "exam roll taken, retrying");
                continue;
            }
            // The applicant gained a card between preflight and insert.
            Err(RepoError::CardAlreadyIssued) => return Err(ApiError::DuplicateAdmitCard),
            // The unit vanished between preflight and insert.
            Err(RepoError::MissingUnit) => return Err(ApiError::UnitNotFound),
            Err(RepoError::MissingApplicant) => {
                return Err(ApiError::Validation("applicant does not exist".to_string()));
            }
            Err(other) => return Err(other.into()),
        }
    }

    Err(ApiError::Persistence(format!(
        "exam roll allocation did not converge after {MAX_ATTEMPTS} attempts"
    )))
}
