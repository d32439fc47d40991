use crate::models::{
    AdmitCard, Applicant, ApplicantDashboard, CreateExamCenterRequest, CreateExamUnitRequest,
    CreateResultRequest, Credential, ExamCenter, ExamResult, ExamUnit, IssueAdmitCardRequest,
    MakePaymentRequest, Payment, RegisterApplicantRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

/// RepoError
///
/// Persistence-layer failures, expressed in domain terms. Constraint
/// violations that the application can react to (duplicate email, taken roll,
/// second admit card) get their own variants; everything else stays wrapped
/// in `Db`.
#[derive(Error, Debug)]
pub enum RepoError {
    /// The email already has a credential row.
    #[error("email already registered")]
    DuplicateEmail,
    /// The exam roll is already taken. The roll allocator treats this as
    /// "lost the race, retry"; any other caller treats it as a failure.
    #[error("exam roll already taken")]
    DuplicateRoll,
    /// The applicant already holds an admit card.
    #[error("applicant already holds an admit card")]
    CardAlreadyIssued,
    /// The referenced exam unit does not exist.
    #[error("exam unit does not exist")]
    MissingUnit,
    /// The referenced exam center does not exist.
    #[error("exam center does not exist")]
    MissingCenter,
    /// The referenced applicant does not exist.
    #[error("applicant does not exist")]
    MissingApplicant,
    /// Any other database failure.
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations. This is the core
/// of the Repository Abstraction pattern, allowing the handlers to interact with
/// the data layer without knowing the specific implementation (Postgres, Mock, etc.).
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// safely shareable and usable across Axum's asynchronous task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Registration & Credentials ---
    // Inserts the applicant_info and applicant_login rows in one transaction:
    // both are created or neither is. Takes the precomputed password digest;
    // the raw password never reaches this layer.
    async fn register_applicant(
        &self,
        req: RegisterApplicantRequest,
        password_hash: String,
    ) -> Result<i64, RepoError>;
    // Only the session manager reads credentials.
    async fn get_credential(&self, email: &str) -> Result<Option<Credential>, RepoError>;
    // Refreshes last_login after a successful authentication.
    async fn touch_last_login(&self, email: &str) -> Result<(), RepoError>;
    async fn get_applicant_by_email(&self, email: &str) -> Result<Option<Applicant>, RepoError>;
    async fn get_applicant(&self, applicant_id: i64) -> Result<Option<Applicant>, RepoError>;
    async fn get_dashboard(
        &self,
        applicant_id: i64,
    ) -> Result<Option<ApplicantDashboard>, RepoError>;

    // --- Exam Catalog ---
    async fn list_exam_centers(&self) -> Result<Vec<ExamCenter>, RepoError>;
    async fn create_exam_center(
        &self,
        req: CreateExamCenterRequest,
    ) -> Result<ExamCenter, RepoError>;
    async fn list_exam_units(&self) -> Result<Vec<ExamUnit>, RepoError>;
    async fn create_exam_unit(&self, req: CreateExamUnitRequest) -> Result<ExamUnit, RepoError>;
    async fn get_exam_unit(&self, unit_id: i32) -> Result<Option<ExamUnit>, RepoError>;

    // --- Admit Cards (the roll allocator's storage contract) ---
    // Current maximum allocated roll, None when no cards exist yet.
    async fn max_exam_roll(&self) -> Result<Option<i64>, RepoError>;
    // Single-statement insert under the exam_roll uniqueness constraint.
    // DuplicateRoll signals a lost allocation race; CardAlreadyIssued a
    // second card for the same applicant.
    async fn insert_admit_card(
        &self,
        exam_roll: i64,
        req: IssueAdmitCardRequest,
    ) -> Result<AdmitCard, RepoError>;
    async fn get_admit_card(&self, applicant_id: i64) -> Result<Option<AdmitCard>, RepoError>;
    // Returns false when the applicant has no admit card to attach to.
    async fn attach_admit_card_photo(
        &self,
        applicant_id: i64,
        photo: Vec<u8>,
    ) -> Result<bool, RepoError>;

    // --- Payments & Results ---
    async fn create_payment(
        &self,
        applicant_id: i64,
        req: MakePaymentRequest,
    ) -> Result<Payment, RepoError>;
    async fn list_results(&self, applicant_id: i64) -> Result<Vec<ExamResult>, RepoError>;
    // req.status arrives final (the handler applies the pass-mark derivation).
    async fn create_result(
        &self,
        req: CreateResultRequest,
        result_published: Option<DateTime<Utc>>,
    ) -> Result<ExamResult, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// map_db_err
///
/// Translates constraint violations into domain errors by constraint name.
/// The names are the Postgres defaults produced by migrations/0001_init.sql;
/// renaming a constraint there breaks this mapping.
fn map_db_err(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => match db.constraint() {
                Some("applicant_info_email_key") | Some("applicant_login_pkey") => {
                    return RepoError::DuplicateEmail;
                }
                Some("admit_card_pkey") => return RepoError::DuplicateRoll,
                Some("admit_card_applicant_id_key") => return RepoError::CardAlreadyIssued,
                _ => {}
            },
            sqlx::error::ErrorKind::ForeignKeyViolation => match db.constraint() {
                Some("admit_card_unit_id_fkey") | Some("result_unit_id_fkey") => {
                    return RepoError::MissingUnit;
                }
                Some("exam_units_center_id_fkey") => return RepoError::MissingCenter,
                Some("admit_card_applicant_id_fkey")
                | Some("payment_applicant_id_fkey")
                | Some("result_applicant_id_fkey")
                | Some("applicant_login_email_fkey") => return RepoError::MissingApplicant,
                _ => {}
            },
            _ => {}
        }
    }
    RepoError::Db(e)
}

#[async_trait]
impl Repository for PostgresRepository {
    /// register_applicant
    ///
    /// Creates the identity record and its credential in a single transaction.
    /// A failure at any point rolls the whole registration back (the
    /// transaction is dropped uncommitted), so no identity can exist without
    /// a credential or vice versa.
    async fn register_applicant(
        &self,
        req: RegisterApplicantRequest,
        password_hash: String,
    ) -> Result<i64, RepoError> {
        let mut tx = self.pool.begin().await?;

        let applicant_id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO applicant_info
                   (first_name, last_name, date_of_birth, gender, phone_number, email, address, ssc_gpa, hsc_gpa)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING applicant_id"#,
        )
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(req.date_of_birth)
        .bind(req.gender)
        .bind(&req.phone_number)
        .bind(&req.email)
        .bind(&req.address)
        .bind(req.ssc_gpa)
        .bind(req.hsc_gpa)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        sqlx::query("INSERT INTO applicant_login (email, password_hash) VALUES ($1, $2)")
            .bind(&req.email)
            .bind(&password_hash)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

        tx.commit().await?;
        Ok(applicant_id)
    }

    /// get_credential
    ///
    /// Fetches the credential row for an email, if one exists. Absence is not
    /// an error here: the login handler folds it into the generic
    /// invalid-credentials failure.
    async fn get_credential(&self, email: &str) -> Result<Option<Credential>, RepoError> {
        sqlx::query_as::<_, Credential>(
            "SELECT email, password_hash, last_login FROM applicant_login WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    /// touch_last_login
    ///
    /// Stamps the credential's last-authenticated timestamp.
    async fn touch_last_login(&self, email: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE applicant_login SET last_login = NOW() WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// get_applicant_by_email
    ///
    /// Resolves a session-token subject back to the current applicant record.
    async fn get_applicant_by_email(&self, email: &str) -> Result<Option<Applicant>, RepoError> {
        sqlx::query_as::<_, Applicant>(
            r#"SELECT applicant_id, first_name, last_name, date_of_birth, gender,
                      phone_number, email, address, ssc_gpa, hsc_gpa, created_at, updated_at
               FROM applicant_info
               WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    /// get_applicant
    ///
    /// Retrieval by primary key, used by the issuance preflight and the
    /// local-development auth bypass.
    async fn get_applicant(&self, applicant_id: i64) -> Result<Option<Applicant>, RepoError> {
        sqlx::query_as::<_, Applicant>(
            r#"SELECT applicant_id, first_name, last_name, date_of_birth, gender,
                      phone_number, email, address, ssc_gpa, hsc_gpa, created_at, updated_at
               FROM applicant_info
               WHERE applicant_id = $1"#,
        )
        .bind(applicant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    /// get_dashboard
    ///
    /// Reads the applicant's row from the applicant_dashboard view. The view
    /// only has rows for applicants with a result.
    async fn get_dashboard(
        &self,
        applicant_id: i64,
    ) -> Result<Option<ApplicantDashboard>, RepoError> {
        sqlx::query_as::<_, ApplicantDashboard>(
            r#"SELECT applicant_id, first_name, last_name, ssc_gpa, hsc_gpa,
                      unit_code, marks_obtained, result_status, merit_position
               FROM applicant_dashboard
               WHERE applicant_id = $1"#,
        )
        .bind(applicant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    // --- EXAM CATALOG ---

    async fn list_exam_centers(&self) -> Result<Vec<ExamCenter>, RepoError> {
        sqlx::query_as::<_, ExamCenter>(
            "SELECT center_id, center_name, center_address FROM exam_center ORDER BY center_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    async fn create_exam_center(
        &self,
        req: CreateExamCenterRequest,
    ) -> Result<ExamCenter, RepoError> {
        sqlx::query_as::<_, ExamCenter>(
            r#"INSERT INTO exam_center (center_name, center_address)
               VALUES ($1, $2)
               RETURNING center_id, center_name, center_address"#,
        )
        .bind(&req.center_name)
        .bind(&req.center_address)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn list_exam_units(&self) -> Result<Vec<ExamUnit>, RepoError> {
        sqlx::query_as::<_, ExamUnit>(
            r#"SELECT unit_id, unit_code, center_id, exam_date, exam_time, exam_duration
               FROM exam_units ORDER BY unit_id"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    /// create_exam_unit
    ///
    /// Uses COALESCE so an omitted duration falls back to the schema default.
    async fn create_exam_unit(&self, req: CreateExamUnitRequest) -> Result<ExamUnit, RepoError> {
        sqlx::query_as::<_, ExamUnit>(
            r#"INSERT INTO exam_units (unit_code, center_id, exam_date, exam_time, exam_duration)
               VALUES ($1, $2, $3, $4, COALESCE($5, 60))
               RETURNING unit_id, unit_code, center_id, exam_date, exam_time, exam_duration"#,
        )
        .bind(&req.unit_code)
        .bind(req.center_id)
        .bind(req.exam_date)
        .bind(&req.exam_time)
        .bind(req.exam_duration)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn get_exam_unit(&self, unit_id: i32) -> Result<Option<ExamUnit>, RepoError> {
        sqlx::query_as::<_, ExamUnit>(
            r#"SELECT unit_id, unit_code, center_id, exam_date, exam_time, exam_duration
               FROM exam_units WHERE unit_id = $1"#,
        )
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    // --- ADMIT CARDS ---

    /// max_exam_roll
    ///
    /// The derived "current maximum" the allocator works from. Always read
    /// from persisted rows; the application never caches this value.
    async fn max_exam_roll(&self) -> Result<Option<i64>, RepoError> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(exam_roll) FROM admit_card")
            .fetch_one(&self.pool)
            .await
            .map_err(RepoError::Db)
    }

    /// insert_admit_card
    ///
    /// One INSERT, no read-modify-write: atomicity comes from the statement
    /// itself, and the exam_roll primary key rejects a roll that a concurrent
    /// issuance claimed first. No partial card can remain on failure.
    async fn insert_admit_card(
        &self,
        exam_roll: i64,
        req: IssueAdmitCardRequest,
    ) -> Result<AdmitCard, RepoError> {
        sqlx::query_as::<_, AdmitCard>(
            r#"INSERT INTO admit_card (exam_roll, applicant_id, unit_id, room_no)
               VALUES ($1, $2, $3, $4)
               RETURNING exam_roll, applicant_id, unit_id, room_no, issued_at, applicant_photo"#,
        )
        .bind(exam_roll)
        .bind(req.applicant_id)
        .bind(req.unit_id)
        .bind(req.room_no)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn get_admit_card(&self, applicant_id: i64) -> Result<Option<AdmitCard>, RepoError> {
        sqlx::query_as::<_, AdmitCard>(
            r#"SELECT exam_roll, applicant_id, unit_id, room_no, issued_at, applicant_photo
               FROM admit_card WHERE applicant_id = $1"#,
        )
        .bind(applicant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    /// attach_admit_card_photo
    ///
    /// Returns true only if a card row was updated; false means the applicant
    /// has no card yet.
    async fn attach_admit_card_photo(
        &self,
        applicant_id: i64,
        photo: Vec<u8>,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query("UPDATE admit_card SET applicant_photo = $1 WHERE applicant_id = $2")
            .bind(&photo)
            .bind(applicant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- PAYMENTS & RESULTS ---

    async fn create_payment(
        &self,
        applicant_id: i64,
        req: MakePaymentRequest,
    ) -> Result<Payment, RepoError> {
        sqlx::query_as::<_, Payment>(
            r#"INSERT INTO payment (applicant_id, fee_amount, payment_status, payment_datetime)
               VALUES ($1, $2, $3, $4)
               RETURNING payment_id, applicant_id, fee_amount, payment_status, payment_datetime, created_at"#,
        )
        .bind(applicant_id)
        .bind(req.fee_amount)
        .bind(req.payment_status)
        .bind(req.payment_datetime)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn list_results(&self, applicant_id: i64) -> Result<Vec<ExamResult>, RepoError> {
        sqlx::query_as::<_, ExamResult>(
            r#"SELECT result_id, applicant_id, unit_id, marks_obtained, total_marks, status, result_published
               FROM result WHERE applicant_id = $1 ORDER BY result_id"#,
        )
        .bind(applicant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::Db)
    }

    async fn create_result(
        &self,
        req: CreateResultRequest,
        result_published: Option<DateTime<Utc>>,
    ) -> Result<ExamResult, RepoError> {
        sqlx::query_as::<_, ExamResult>(
            r#"INSERT INTO result (applicant_id, unit_id, marks_obtained, status, result_published)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING result_id, applicant_id, unit_id, marks_obtained, total_marks, status, result_published"#,
        )
        .bind(req.applicant_id)
        .bind(req.unit_id)
        .bind(req.marks_obtained)
        .bind(req.status)
        .bind(result_published)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)
    }
}
