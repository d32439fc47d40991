use admission_portal::{
    AppState,
    auth::Claims,
    config::AppConfig,
    create_router,
    models::{
        AdmitCard, Applicant, ApplicantDashboard, CreateExamCenterRequest, CreateExamUnitRequest,
        CreateResultRequest, Credential, ExamCenter, ExamResult, ExamUnit, IssueAdmitCardRequest,
        MakePaymentRequest, Payment, RegisterApplicantRequest,
    },
    repository::{RepoError, Repository},
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, Ordering},
    },
};
use tower::util::ServiceExt;
use uuid::Uuid;

// --- In-Memory Repository ---

/// A behavioral in-memory repository, rich enough to drive full request
/// flows (register, token, authenticated reads, admit-card issuance)
/// through the real router without Postgres.
#[derive(Default)]
struct InMemoryRepo {
    applicants: Mutex<HashMap<i64, Applicant>>,
    credentials: Mutex<HashMap<String, Credential>>,
    units: Mutex<HashMap<i32, ExamUnit>>,
    centers: Mutex<HashMap<i32, ExamCenter>>,
    cards: Mutex<HashMap<i64, AdmitCard>>,
    next_id: AtomicI64,
}

impl InMemoryRepo {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn seed_applicant(&self, email: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.applicants.lock().unwrap().insert(
            id,
            Applicant {
                applicant_id: id,
                email: email.to_string(),
                ..Applicant::default()
            },
        );
        id
    }

    fn seed_unit(&self, unit_id: i32) {
        self.units.lock().unwrap().insert(
            unit_id,
            ExamUnit {
                unit_id,
                unit_code: "A".to_string(),
                ..ExamUnit::default()
            },
        );
    }
}

#[async_trait]
impl Repository for InMemoryRepo {
    async fn register_applicant(
        &self,
        req: RegisterApplicantRequest,
        password_hash: String,
    ) -> Result<i64, RepoError> {
        let mut credentials = self.credentials.lock().unwrap();
        if credentials.contains_key(&req.email) {
            return Err(RepoError::DuplicateEmail);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.applicants.lock().unwrap().insert(
            id,
            Applicant {
                applicant_id: id,
                first_name: req.first_name,
                last_name: req.last_name,
                date_of_birth: req.date_of_birth,
                gender: req.gender,
                phone_number: req.phone_number,
                email: req.email.clone(),
                address: req.address,
                ssc_gpa: req.ssc_gpa,
                hsc_gpa: req.hsc_gpa,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        credentials.insert(
            req.email.clone(),
            Credential {
                email: req.email,
                password_hash,
                last_login: None,
            },
        );
        Ok(id)
    }

    async fn get_credential(&self, email: &str) -> Result<Option<Credential>, RepoError> {
        Ok(self.credentials.lock().unwrap().get(email).cloned())
    }

    async fn touch_last_login(&self, email: &str) -> Result<(), RepoError> {
        if let Some(cred) = self.credentials.lock().unwrap().get_mut(email) {
            cred.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_applicant_by_email(&self, email: &str) -> Result<Option<Applicant>, RepoError> {
        Ok(self
            .applicants
            .lock()
            .unwrap()
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn get_applicant(&self, applicant_id: i64) -> Result<Option<Applicant>, RepoError> {
        Ok(self.applicants.lock().unwrap().get(&applicant_id).cloned())
    }

    async fn get_dashboard(
        &self,
        _applicant_id: i64,
    ) -> Result<Option<ApplicantDashboard>, RepoError> {
        Ok(None)
    }

    async fn list_exam_centers(&self) -> Result<Vec<ExamCenter>, RepoError> {
        Ok(self.centers.lock().unwrap().values().cloned().collect())
    }

    async fn create_exam_center(
        &self,
        req: CreateExamCenterRequest,
    ) -> Result<ExamCenter, RepoError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32;
        let center = ExamCenter {
            center_id: id,
            center_name: req.center_name,
            center_address: req.center_address,
        };
        self.centers.lock().unwrap().insert(id, center.clone());
        Ok(center)
    }

    async fn list_exam_units(&self) -> Result<Vec<ExamUnit>, RepoError> {
        Ok(self.units.lock().unwrap().values().cloned().collect())
    }

    async fn create_exam_unit(&self, req: CreateExamUnitRequest) -> Result<ExamUnit, RepoError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32;
        let unit = ExamUnit {
            unit_id: id,
            unit_code: req.unit_code,
            center_id: req.center_id,
            exam_date: req.exam_date,
            exam_time: req.exam_time,
            exam_duration: req.exam_duration.unwrap_or(60),
        };
        self.units.lock().unwrap().insert(id, unit.clone());
        Ok(unit)
    }

    async fn get_exam_unit(&self, unit_id: i32) -> Result<Option<ExamUnit>, RepoError> {
        Ok(self.units.lock().unwrap().get(&unit_id).cloned())
    }

    async fn max_exam_roll(&self) -> Result<Option<i64>, RepoError> {
        Ok(self.cards.lock().unwrap().keys().copied().max())
    }

    async fn insert_admit_card(
        &self,
        exam_roll: i64,
        req: IssueAdmitCardRequest,
    ) -> Result<AdmitCard, RepoError> {
        let mut cards = self.cards.lock().unwrap();
        if cards.contains_key(&exam_roll) {
            return Err(RepoError::DuplicateRoll);
        }
        if cards.values().any(|c| c.applicant_id == req.applicant_id) {
            return Err(RepoError::CardAlreadyIssued);
        }
        let card = AdmitCard {
            exam_roll,
            applicant_id: req.applicant_id,
            unit_id: req.unit_id,
            room_no: req.room_no,
            issued_at: Utc::now(),
            applicant_photo: None,
        };
        cards.insert(exam_roll, card.clone());
        Ok(card)
    }

    async fn get_admit_card(&self, applicant_id: i64) -> Result<Option<AdmitCard>, RepoError> {
        Ok(self
            .cards
            .lock()
            .unwrap()
            .values()
            .find(|c| c.applicant_id == applicant_id)
            .cloned())
    }

    async fn attach_admit_card_photo(
        &self,
        applicant_id: i64,
        photo: Vec<u8>,
    ) -> Result<bool, RepoError> {
        let mut cards = self.cards.lock().unwrap();
        match cards.values_mut().find(|c| c.applicant_id == applicant_id) {
            Some(card) => {
                card.applicant_photo = Some(photo);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_payment(
        &self,
        applicant_id: i64,
        req: MakePaymentRequest,
    ) -> Result<Payment, RepoError> {
        Ok(Payment {
            payment_id: 1,
            applicant_id,
            fee_amount: req.fee_amount,
            payment_status: req.payment_status,
            payment_datetime: req.payment_datetime,
            created_at: Utc::now(),
        })
    }

    async fn list_results(&self, _applicant_id: i64) -> Result<Vec<ExamResult>, RepoError> {
        Ok(vec![])
    }

    async fn create_result(
        &self,
        req: CreateResultRequest,
        result_published: Option<DateTime<Utc>>,
    ) -> Result<ExamResult, RepoError> {
        Ok(ExamResult {
            result_id: 1,
            applicant_id: req.applicant_id,
            unit_id: req.unit_id,
            marks_obtained: req.marks_obtained,
            total_marks: 80,
            status: req.status,
            result_published,
        })
    }
}

// --- Test Utilities ---

fn test_app() -> (Arc<InMemoryRepo>, Router) {
    let repo = Arc::new(InMemoryRepo::new());
    let state = AppState {
        repo: repo.clone(),
        config: AppConfig::default(),
    };
    (repo, create_router(state))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_body(email: &str) -> Value {
    json!({
        "first_name": "Aisha",
        "last_name": "Rahman",
        "gender": "Female",
        "email": email,
        "ssc_gpa": 4.8,
        "hsc_gpa": 5.0,
        "password": "s3cret-password"
    })
}

// --- Public Surface ---

#[tokio::test]
async fn test_health_endpoint_is_public() {
    let (_repo, app) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_responses_carry_request_id_header() {
    let (_repo, app) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (_repo, app) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert!(doc.get("openapi").is_some());
    assert!(doc["paths"].get("/admin/admit-cards").is_some());
}

// --- Registration & Login over HTTP ---

#[tokio::test]
async fn test_register_token_me_flow() {
    let (_repo, app) = test_app();

    // Register.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/register",
            register_body("aisha@example.com"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let applicant_id = body["applicant_id"].as_i64().unwrap();
    assert!(applicant_id > 0);

    // Exchange credentials for a token.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/token",
            json!({ "email": "aisha@example.com", "password": "s3cret-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "bearer");
    let token = body["access_token"].as_str().unwrap().to_string();

    // The token opens the protected surface.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/applicants/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert_eq!(me["email"], "aisha@example.com");
    assert_eq!(me["applicant_id"].as_i64().unwrap(), applicant_id);
}

#[tokio::test]
async fn test_distinct_registrations_get_distinct_ids() {
    let (_repo, app) = test_app();

    let mut ids = Vec::new();
    for email in ["first@example.com", "second@example.com"] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/register", register_body(email)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        ids.push(body_json(response).await["applicant_id"].as_i64().unwrap());
    }

    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_register_invalid_email_yields_422_body() {
    let (_repo, app) = test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/register",
            register_body("not-an-email"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_register_duplicate_email_yields_409_body() {
    let (_repo, app) = test_app();

    let first = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/register",
            register_body("dup@example.com"),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(json_request(
            "POST",
            "/register",
            register_body("dup@example.com"),
        ))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["error"]["code"], "DUPLICATE_IDENTITY");
}

#[tokio::test]
async fn test_wrong_password_yields_generic_401() {
    let (_repo, app) = test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/register",
            register_body("aisha@example.com"),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "POST",
            "/token",
            json!({ "email": "aisha@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    assert_eq!(body["error"]["message"], "invalid authentication credentials");
}

// --- Protected Surface ---

#[tokio::test]
async fn test_protected_route_rejects_missing_token() {
    let (_repo, app) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/applicants/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // Challenge header advertises the expected scheme.
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_expired_token_rejected_with_same_generic_401() {
    let (repo, app) = test_app();
    repo.seed_applicant("old@example.com");

    // Hand-roll a token that expired an hour ago, signed with the right key.
    let config = AppConfig::default();
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: "old@example.com".to_string(),
        iat: (now - 7200) as usize,
        exp: (now - 3600) as usize,
        jti: Uuid::new_v4(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/applicants/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Expired and malformed tokens are indistinguishable on the wire.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
}

// --- Admin Issuance over HTTP ---

#[tokio::test]
async fn test_admin_route_rejects_missing_session() {
    let (repo, app) = test_app();
    let applicant_id = repo.seed_applicant("candidate@example.com");
    repo.seed_unit(1);

    // No bearer token and no bypass header: the handler's session extractor
    // refuses before any issuance work happens.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/admit-cards")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "applicant_id": applicant_id,
                        "unit_id": 1
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    assert!(repo.cards.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_admit_card_issuance_assigns_first_roll() {
    let (repo, app) = test_app();
    let applicant_id = repo.seed_applicant("candidate@example.com");
    repo.seed_unit(1);

    // Default config runs Env::Local, so the dev bypass header stands in
    // for a staff session.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/admit-cards")
                .header("x-applicant-id", applicant_id.to_string())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "applicant_id": applicant_id,
                        "unit_id": 1,
                        "room_no": 204
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["exam_roll"].as_i64().unwrap(), 220431);
    assert_eq!(body["applicant_id"].as_i64().unwrap(), applicant_id);
    // No photo uploaded yet, so the field is omitted entirely.
    assert!(body.get("applicant_photo").is_none());
}

#[tokio::test]
async fn test_second_card_over_http_yields_conflict_body() {
    let (repo, app) = test_app();
    let applicant_id = repo.seed_applicant("candidate@example.com");
    repo.seed_unit(1);

    let issue = |app: Router| {
        let body = json!({ "applicant_id": applicant_id, "unit_id": 1 });
        async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/admit-cards")
                    .header("x-applicant-id", applicant_id.to_string())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap()
        }
    };

    let first = issue(app.clone()).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = issue(app).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["error"]["code"], "DUPLICATE_ADMIT_CARD");
}

#[tokio::test]
async fn test_issuance_with_unknown_unit_yields_404_body() {
    let (repo, app) = test_app();
    let applicant_id = repo.seed_applicant("candidate@example.com");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/admit-cards")
                .header("x-applicant-id", applicant_id.to_string())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "applicant_id": applicant_id, "unit_id": 9 }))
                        .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNIT_NOT_FOUND");
}

#[tokio::test]
async fn test_upload_then_fetch_admit_card_round_trips_photo() {
    let (repo, app) = test_app();
    let applicant_id = repo.seed_applicant("candidate@example.com");
    repo.seed_unit(1);

    // Issue a card first.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/admit-cards")
                .header("x-applicant-id", applicant_id.to_string())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "applicant_id": applicant_id, "unit_id": 1 }))
                        .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Attach a photo through the applicant surface (bypass header again).
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-photo")
                .header("x-applicant-id", applicant_id.to_string())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "photo": "AQID" })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The card comes back with the same base64 payload.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admit-card")
                .header("x-applicant-id", applicant_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["applicant_photo"], "AQID");
}
