use crate::{
    AppState, allocator,
    auth::{self, AuthApplicant},
    error::{ApiError, ErrorBody},
    models::{
        AdmitCardResponse, Applicant, ApplicantDashboard, CreateExamCenterRequest,
        CreateExamUnitRequest, CreateResultRequest, ExamCenter, ExamResult, ExamUnit,
        IssueAdmitCardRequest, LoginRequest, MakePaymentRequest, Payment,
        RegisterApplicantRequest, RegisterResponse, ResultStatus, TokenResponse,
        UploadPhotoRequest,
    },
};
use axum::{Json, extract::State, http::StatusCode};
use base64::{Engine, engine::general_purpose};
use chrono::Utc;

/// Pass mark for result entry: 40% of the default 80 total.
const PASS_MARK: f64 = 32.0;

// --- Public Handlers ---

/// register_applicant
///
/// [Public Route] Creates an applicant identity together with its login
/// credential. Payload validation runs before anything touches storage, and
/// the two rows are written in a single transaction.
///
/// *Note*: Only the argon2 digest of the password is stored. The raw
/// password is never persisted or logged.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterApplicantRequest,
    responses(
        (status = 201, description = "Registered", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 422, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn register_applicant(
    State(state): State<AppState>,
    Json(payload): Json<RegisterApplicantRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.validate()?;

    let password_hash = auth::hash_password(&payload.password)?;
    let applicant_id = state.repo.register_applicant(payload, password_hash).await?;

    tracing::info!(applicant_id, "applicant registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { applicant_id })))
}

/// login
///
/// [Public Route] Exchanges an email and password for a signed session token.
///
/// *Note*: Unknown email and wrong password produce the same response. When
/// the email is unknown a digest is still computed so both paths cost about
/// the same.
#[utoipa::path(
    post,
    path = "/token",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Some(credential) = state.repo.get_credential(&payload.email).await? else {
        let _ = auth::hash_password(&payload.password);
        return Err(ApiError::InvalidCredentials);
    };

    if !auth::verify_password(&credential.password_hash, &payload.password) {
        return Err(ApiError::InvalidCredentials);
    }

    state.repo.touch_last_login(&payload.email).await?;

    let token = auth::mint_token(
        &payload.email,
        &state.config.jwt_secret,
        state.config.token_ttl_minutes,
    )?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}

/// list_exam_centers
///
/// [Public Route] Lists all exam centers.
#[utoipa::path(
    get,
    path = "/exam-centers",
    responses((status = 200, description = "Exam centers", body = [ExamCenter]))
)]
pub async fn list_exam_centers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ExamCenter>>, ApiError> {
    let centers = state.repo.list_exam_centers().await?;
    Ok(Json(centers))
}

/// list_exam_units
///
/// [Public Route] Lists all exam units across centers.
#[utoipa::path(
    get,
    path = "/exam-units",
    responses((status = 200, description = "Exam units", body = [ExamUnit]))
)]
pub async fn list_exam_units(
    State(state): State<AppState>,
) -> Result<Json<Vec<ExamUnit>>, ApiError> {
    let units = state.repo.list_exam_units().await?;
    Ok(Json(units))
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] Returns the applicant record the session token
/// resolves to.
#[utoipa::path(
    get,
    path = "/applicants/me",
    responses(
        (status = 200, description = "Applicant record", body = Applicant),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn get_me(AuthApplicant { applicant }: AuthApplicant) -> Json<Applicant> {
    Json(applicant)
}

/// get_dashboard
///
/// [Authenticated Route] Returns the caller's dashboard row (marks, result
/// status, merit position). The row only exists once a result has been
/// entered for the applicant.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard", body = ApplicantDashboard),
        (status = 404, description = "No dashboard row yet", body = ErrorBody)
    )
)]
pub async fn get_dashboard(
    AuthApplicant { applicant }: AuthApplicant,
    State(state): State<AppState>,
) -> Result<Json<ApplicantDashboard>, ApiError> {
    match state.repo.get_dashboard(applicant.applicant_id).await? {
        Some(dashboard) => Ok(Json(dashboard)),
        None => Err(ApiError::NotFound("dashboard information".to_string())),
    }
}

/// get_admit_card
///
/// [Authenticated Route] Returns the caller's admit card, with the photo
/// base64-encoded when one is attached.
#[utoipa::path(
    get,
    path = "/admit-card",
    responses(
        (status = 200, description = "Admit card", body = AdmitCardResponse),
        (status = 404, description = "No card issued", body = ErrorBody)
    )
)]
pub async fn get_admit_card(
    AuthApplicant { applicant }: AuthApplicant,
    State(state): State<AppState>,
) -> Result<Json<AdmitCardResponse>, ApiError> {
    match state.repo.get_admit_card(applicant.applicant_id).await? {
        Some(card) => Ok(Json(AdmitCardResponse::from(card))),
        None => Err(ApiError::NotFound("admit card".to_string())),
    }
}

/// upload_photo
///
/// [Authenticated Route] Attaches a base64-encoded photo to the caller's
/// admit card. Fails with 404 when no card has been issued yet; re-uploading
/// replaces the previous photo.
#[utoipa::path(
    post,
    path = "/upload-photo",
    request_body = UploadPhotoRequest,
    responses(
        (status = 204, description = "Photo stored"),
        (status = 404, description = "No card issued", body = ErrorBody),
        (status = 422, description = "Photo is not valid base64", body = ErrorBody)
    )
)]
pub async fn upload_photo(
    AuthApplicant { applicant }: AuthApplicant,
    State(state): State<AppState>,
    Json(payload): Json<UploadPhotoRequest>,
) -> Result<StatusCode, ApiError> {
    let photo = general_purpose::STANDARD
        .decode(&payload.photo)
        .map_err(|_| ApiError::Validation("photo must be valid base64".to_string()))?;

    let updated = state
        .repo
        .attach_admit_card_photo(applicant.applicant_id, photo)
        .await?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("admit card".to_string()))
    }
}

/// make_payment
///
/// [Authenticated Route] Records an application fee payment for the caller.
///
/// *Note*: The payment is always attributed to the session identity; the
/// payload carries no applicant id. An omitted payment_datetime defaults to
/// the current time.
#[utoipa::path(
    post,
    path = "/make-payment",
    request_body = MakePaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = Payment),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn make_payment(
    AuthApplicant { applicant }: AuthApplicant,
    State(state): State<AppState>,
    Json(mut payload): Json<MakePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    payload.payment_datetime.get_or_insert_with(Utc::now);

    let payment = state
        .repo
        .create_payment(applicant.applicant_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// get_results
///
/// [Authenticated Route] Lists the caller's exam results.
#[utoipa::path(
    get,
    path = "/results",
    responses(
        (status = 200, description = "Results", body = [ExamResult]),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn get_results(
    AuthApplicant { applicant }: AuthApplicant,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExamResult>>, ApiError> {
    let results = state.repo.list_results(applicant.applicant_id).await?;
    Ok(Json(results))
}

// --- Admin Handlers ---
//
// Admin routes are session-gated but not role-gated: the data model has no
// admin role, so any live session may call them.

/// create_exam_center
///
/// [Admin Route] Registers a new exam center.
#[utoipa::path(
    post,
    path = "/admin/exam-centers",
    request_body = CreateExamCenterRequest,
    responses((status = 201, description = "Center created", body = ExamCenter))
)]
pub async fn create_exam_center(
    AuthApplicant { .. }: AuthApplicant,
    State(state): State<AppState>,
    Json(payload): Json<CreateExamCenterRequest>,
) -> Result<(StatusCode, Json<ExamCenter>), ApiError> {
    let center = state.repo.create_exam_center(payload).await?;
    Ok((StatusCode::CREATED, Json(center)))
}

/// create_exam_unit
///
/// [Admin Route] Registers a new exam unit under an existing center. An
/// omitted duration falls back to the 60-minute default.
#[utoipa::path(
    post,
    path = "/admin/exam-units",
    request_body = CreateExamUnitRequest,
    responses(
        (status = 201, description = "Unit created", body = ExamUnit),
        (status = 422, description = "Unknown exam center", body = ErrorBody)
    )
)]
pub async fn create_exam_unit(
    AuthApplicant { .. }: AuthApplicant,
    State(state): State<AppState>,
    Json(payload): Json<CreateExamUnitRequest>,
) -> Result<(StatusCode, Json<ExamUnit>), ApiError> {
    let unit = state.repo.create_exam_unit(payload).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

/// create_admit_card
///
/// [Admin Route] Issues an admit card with the next sequential exam roll.
/// Allocation is delegated to the roll allocator, which retries lost races
/// against concurrent issuances.
#[utoipa::path(
    post,
    path = "/admin/admit-cards",
    request_body = IssueAdmitCardRequest,
    responses(
        (status = 201, description = "Card issued", body = AdmitCardResponse),
        (status = 404, description = "Unknown exam unit", body = ErrorBody),
        (status = 409, description = "Applicant already holds a card", body = ErrorBody),
        (status = 503, description = "Roll space exhausted", body = ErrorBody)
    )
)]
pub async fn create_admit_card(
    AuthApplicant { .. }: AuthApplicant,
    State(state): State<AppState>,
    Json(payload): Json<IssueAdmitCardRequest>,
) -> Result<(StatusCode, Json<AdmitCardResponse>), ApiError> {
    let card = allocator::issue_admit_card(&state.repo, &state.config, payload).await?;

    tracing::info!(
        exam_roll = card.exam_roll,
        applicant_id = card.applicant_id,
        "admit card issued"
    );
    Ok((StatusCode::CREATED, Json(AdmitCardResponse::from(card))))
}

/// create_result
///
/// [Admin Route] Enters an exam result. When the payload leaves the status
/// Pending and carries marks, the status is derived from the pass mark.
/// A Passed or Failed result gets its publication timestamp stamped here.
#[utoipa::path(
    post,
    path = "/admin/results",
    request_body = CreateResultRequest,
    responses(
        (status = 201, description = "Result recorded", body = ExamResult),
        (status = 422, description = "Unknown applicant or unit", body = ErrorBody)
    )
)]
pub async fn create_result(
    AuthApplicant { .. }: AuthApplicant,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateResultRequest>,
) -> Result<(StatusCode, Json<ExamResult>), ApiError> {
    if payload.status == ResultStatus::Pending {
        if let Some(marks) = payload.marks_obtained {
            payload.status = if marks >= PASS_MARK {
                ResultStatus::Passed
            } else {
                ResultStatus::Failed
            };
        }
    }

    let result_published =
        matches!(payload.status, ResultStatus::Passed | ResultStatus::Failed).then(Utc::now);

    let result = state.repo.create_result(payload, result_published).await?;
    Ok((StatusCode::CREATED, Json(result)))
}
