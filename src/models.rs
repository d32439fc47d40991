use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::ApiError;

// --- Enumerations (Mapped to Postgres Enum Types) ---

/// Gender
///
/// Applicant gender as recorded at registration. Maps to the `gender`
/// Postgres enum; the SQL values match the variant names exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "gender")]
#[ts(export)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

/// PaymentStatus
///
/// Lifecycle state of a fee payment. Maps to the `payment_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "payment_status")]
#[ts(export)]
pub enum PaymentStatus {
    Paid,
    #[default]
    Pending,
    Failed,
}

/// ResultStatus
///
/// Outcome state of an exam result. Maps to the `result_status` Postgres enum.
/// `Pending` rows are unpublished; `Passed`/`Failed` rows carry a publication timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "result_status")]
#[ts(export)]
pub enum ResultStatus {
    Passed,
    Failed,
    #[default]
    Pending,
}

// --- Core Application Schemas (Mapped to Database) ---

/// Applicant
///
/// The applicant's canonical identity record, stored in `applicant_info`.
/// Created once at registration and never deleted; this is also the identity
/// shape the session resolver hands to protected handlers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Applicant {
    // Primary Key (BIGSERIAL).
    pub applicant_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub phone_number: Option<String>,
    // The login identifier; unique across all applicants.
    pub email: String,
    pub address: Option<String>,
    // Academic scores, each constrained to [0.0, 5.0].
    pub ssc_gpa: f64,
    pub hsc_gpa: f64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Credential
///
/// Raw Database Row (Internal Use). One-to-one with `Applicant` via email,
/// stored in `applicant_login`. Holds the argon2 PHC digest of the password,
/// never the password itself. This struct is only ever read by the session
/// manager and is deliberately not serializable.
#[derive(Debug, Clone, FromRow, Default)]
pub struct Credential {
    pub email: String,
    pub password_hash: String,
    pub last_login: Option<DateTime<Utc>>,
}

/// ExamCenter
///
/// A physical examination venue, stored in `exam_center`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ExamCenter {
    pub center_id: i32,
    pub center_name: String,
    pub center_address: String,
}

/// ExamUnit
///
/// An admission-exam sitting (faculty unit, date, time) hosted at a center,
/// stored in `exam_units`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ExamUnit {
    pub unit_id: i32,
    pub unit_code: String,
    // FK to exam_center.center_id.
    pub center_id: i32,
    pub exam_date: NaiveDate,
    pub exam_time: String,
    // Minutes; defaults to 60 in the schema.
    pub exam_duration: i32,
}

/// AdmitCard
///
/// Raw Database Row (Internal Use). The issued admission credential binding an
/// applicant to an exam unit, stored in `admit_card`. The `exam_roll` is the
/// allocator-assigned identifier and is immutable once assigned; the photo is
/// opaque bytes. Transformed into [`AdmitCardResponse`] before leaving the API.
#[derive(Debug, Clone, FromRow, Default)]
pub struct AdmitCard {
    pub exam_roll: i64,
    pub applicant_id: i64,
    pub unit_id: i32,
    pub room_no: Option<i32>,
    pub issued_at: DateTime<Utc>,
    pub applicant_photo: Option<Vec<u8>>,
}

/// AdmitCardResponse
///
/// Wire form of an admit card: identical to the row except the photo bytes
/// are base64-encoded for JSON transport.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdmitCardResponse {
    pub exam_roll: i64,
    pub applicant_id: i64,
    pub unit_id: i32,
    pub room_no: Option<i32>,
    #[ts(type = "string")]
    pub issued_at: DateTime<Utc>,
    /// Base64-encoded photo, omitted when none has been uploaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_photo: Option<String>,
}

impl From<AdmitCard> for AdmitCardResponse {
    fn from(card: AdmitCard) -> Self {
        Self {
            exam_roll: card.exam_roll,
            applicant_id: card.applicant_id,
            unit_id: card.unit_id,
            room_no: card.room_no,
            issued_at: card.issued_at,
            applicant_photo: card
                .applicant_photo
                .map(|bytes| general_purpose::STANDARD.encode(bytes)),
        }
    }
}

/// Payment
///
/// A recorded fee payment, stored in `payment`. Bookkeeping only; gateway
/// integration is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Payment {
    pub payment_id: i64,
    pub applicant_id: i64,
    pub fee_amount: f64,
    pub payment_status: PaymentStatus,
    pub payment_datetime: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// ExamResult
///
/// A result row from `result`. Named `ExamResult` to stay clear of
/// `std::result::Result` at call sites.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ExamResult {
    pub result_id: i64,
    pub applicant_id: i64,
    pub unit_id: i32,
    pub marks_obtained: Option<f64>,
    // Defaults to 80 in the schema.
    pub total_marks: i32,
    pub status: ResultStatus,
    pub result_published: Option<DateTime<Utc>>,
}

/// ApplicantDashboard
///
/// One row of the `applicant_dashboard` view: the applicant's scores joined
/// with their result and unit, plus the merit position ranked within the unit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ApplicantDashboard {
    pub applicant_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub ssc_gpa: f64,
    pub hsc_gpa: f64,
    pub unit_code: String,
    pub marks_obtained: f64,
    pub result_status: String,
    // Rank rendered as text by the view.
    pub merit_position: String,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterApplicantRequest
///
/// Input payload for the public registration endpoint (POST /register).
/// The password is digested immediately in the handler and never persisted
/// or logged in raw form.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterApplicantRequest {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub phone_number: Option<String>,
    pub email: String,
    pub address: Option<String>,
    pub ssc_gpa: f64,
    pub hsc_gpa: f64,
    pub password: String,
}

impl RegisterApplicantRequest {
    /// validate
    ///
    /// Rejects malformed registrations before anything touches storage:
    /// the email must be syntactically plausible, the password non-empty,
    /// and both GPAs within [0.0, 5.0].
    pub fn validate(&self) -> Result<(), ApiError> {
        if !is_valid_email(&self.email) {
            return Err(ApiError::Validation(format!(
                "'{}' is not a valid email address",
                self.email
            )));
        }
        if self.password.is_empty() {
            return Err(ApiError::Validation("password must not be empty".to_string()));
        }
        for (name, gpa) in [("ssc_gpa", self.ssc_gpa), ("hsc_gpa", self.hsc_gpa)] {
            if !(0.0..=5.0).contains(&gpa) {
                return Err(ApiError::Validation(format!(
                    "{name} must be within [0.0, 5.0], got {gpa}"
                )));
            }
        }
        Ok(())
    }
}

/// is_valid_email
///
/// Minimal syntactic check: one '@', a non-empty local part, and a domain
/// with an interior dot. Deliverability is not our problem; gross typos are.
fn is_valid_email(email: &str) -> bool {
    if email.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// RegisterResponse
///
/// Output of a successful registration: the freshly assigned applicant id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterResponse {
    pub applicant_id: i64,
}

/// LoginRequest
///
/// Input payload for POST /token. The password only ever exists in memory
/// for the duration of the digest comparison.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// TokenResponse
///
/// A freshly minted session token. The token is opaque to clients; they send
/// it back verbatim as `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// CreateExamCenterRequest
///
/// Input payload for POST /admin/exam-centers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateExamCenterRequest {
    pub center_name: String,
    pub center_address: String,
}

/// CreateExamUnitRequest
///
/// Input payload for POST /admin/exam-units.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateExamUnitRequest {
    pub unit_code: String,
    pub center_id: i32,
    pub exam_date: NaiveDate,
    pub exam_time: String,
    /// Minutes; the schema default of 60 applies when omitted.
    pub exam_duration: Option<i32>,
}

/// IssueAdmitCardRequest
///
/// Input payload for POST /admin/admit-cards. The exam roll is never part of
/// the request: it is allocated server-side by the roll allocator.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct IssueAdmitCardRequest {
    pub applicant_id: i64,
    pub unit_id: i32,
    pub room_no: Option<i32>,
}

/// UploadPhotoRequest
///
/// Input payload for POST /upload-photo: the photo as base64 text. The bytes
/// are stored opaquely; format handling is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UploadPhotoRequest {
    pub photo: String,
}

/// MakePaymentRequest
///
/// Input payload for POST /make-payment. The paying applicant is always the
/// session identity; no applicant id is accepted from the client.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MakePaymentRequest {
    pub fee_amount: f64,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    /// Defaults to the current instant when omitted.
    pub payment_datetime: Option<DateTime<Utc>>,
}

/// CreateResultRequest
///
/// Input payload for POST /admin/results. When marks are supplied and the
/// status is left `Pending`, the handler derives Passed/Failed from the marks.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateResultRequest {
    pub applicant_id: i64,
    pub unit_id: i32,
    pub marks_obtained: Option<f64>,
    #[serde(default)]
    pub status: ResultStatus,
}
