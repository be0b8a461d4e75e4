//! HTTP router.
//!
//! Public routes (health, login, registration, specializations) sit next to
//! the protected ones, which carry the full middleware stack.
//!
//! Middleware stack (outermost → innermost):
//! 1. Rate limiter → 2. Auth validator → 3. Audit logger → 4. `no-store`

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::{AppConfig, ReportStoreConfig};
use crate::core_state::CoreState;

/// Multipart framing allowance on top of the report size cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    let config = &ctx.core.config;
    let upload_limit = config.report_max_bytes + MULTIPART_OVERHEAD;

    // Middleware uses `Extension<ApiContext>` (outermost layer), handlers use
    // `State<ApiContext>`. Path params use `:param` syntax (axum 0.7).
    let mut protected = Router::new()
        .route("/auth/me", get(endpoints::auth::me))
        .route(
            "/auth/register/employee",
            post(endpoints::employees::create),
        )
        .route(
            "/appointments",
            get(endpoints::appointments::list).post(endpoints::appointments::create),
        )
        .route("/appointments/:id", get(endpoints::appointments::detail))
        .route(
            "/appointments/:id/status",
            patch(endpoints::appointments::update_status),
        )
        .route(
            "/appointments/:id/payment",
            post(endpoints::appointments::pay),
        )
        .route(
            "/prescriptions",
            get(endpoints::prescriptions::list).post(endpoints::prescriptions::create),
        )
        .route(
            "/prescriptions/:id",
            get(endpoints::prescriptions::detail)
                .put(endpoints::prescriptions::update)
                .delete(endpoints::prescriptions::delete),
        )
        .route(
            "/lab-tests",
            get(endpoints::lab_tests::list).post(endpoints::lab_tests::create),
        )
        .route(
            "/lab-tests/:id/payment",
            patch(endpoints::lab_tests::update_payment),
        )
        .route(
            "/lab-tests/:id/upload",
            post(endpoints::lab_tests::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/employees",
            get(endpoints::employees::list).post(endpoints::employees::create),
        )
        .route(
            "/employees/:id",
            axum::routing::delete(endpoints::employees::delete),
        )
        .route("/doctors", get(endpoints::doctors::list))
        .route("/patients", get(endpoints::patients::list))
        .route("/patients/:id", get(endpoints::patients::detail))
        .route(
            "/schedules",
            get(endpoints::schedules::list).post(endpoints::schedules::upsert),
        )
        .route("/payments", get(endpoints::payments::list));

    if let ReportStoreConfig::Local { dir, .. } = &config.report_store {
        protected = protected.nest_service("/reports", ServeDir::new(dir));
    }

    let protected = protected
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last). `route_layer`
        // keeps unmatched paths out of auth so they stay 404.
        .route_layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .route_layer(axum::middleware::from_fn(middleware::audit::log_access))
        .route_layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .route_layer(axum::middleware::from_fn(middleware::rate::limit))
        // Extension must be outermost so middleware can extract ApiContext
        .route_layer(axum::Extension(ctx.clone()));

    // Unprotected routes (rate-limited only)
    let unprotected = Router::new()
        .route("/auth/login", post(endpoints::auth::login))
        .route(
            "/auth/register/patient",
            post(endpoints::auth::register_patient),
        )
        .route(
            "/auth/specializations",
            get(endpoints::auth::specializations),
        )
        .with_state(ctx.clone())
        .route_layer(axum::middleware::from_fn(middleware::rate::limit))
        .route_layer(axum::Extension(ctx.clone()));

    let mut app = Router::new()
        .route("/health", get(endpoints::health::check))
        .merge(unprotected)
        .merge(protected)
        .layer(cors_layer(config));

    if !config.production {
        app = app.layer(axum::middleware::from_fn(middleware::errors::reveal_internal));
    }
    app
}

/// Permissive when no origins are configured, otherwise an exact allow-list.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::db;
    use crate::models::enums::{Role, RoleSet, Specialization};
    use crate::models::{NewUser, PatientProfile, User};
    use crate::storage::memory::MemoryReportStore;

    struct TestApp {
        ctx: ApiContext,
        reports: Arc<MemoryReportStore>,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with_config(|_| {})
        }

        fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("hms.db");
            db::open_database(&path).unwrap();

            let mut config = AppConfig::for_tests(path);
            adjust(&mut config);

            let reports = Arc::new(MemoryReportStore::default());
            let core = CoreState::new(config)
                .unwrap()
                .with_report_store(reports.clone());
            Self {
                ctx: ApiContext::new(Arc::new(core)),
                reports,
                _dir: dir,
            }
        }

        fn router(&self) -> Router {
            build_router(self.ctx.clone())
        }

        /// Insert a user straight into the store and sign a token for them.
        fn user(&self, name: &str, role: Role) -> (User, String) {
            let mut conn = self.ctx.core.open_db().unwrap();
            let new = NewUser {
                name: name.into(),
                email: format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4()),
                password: "secret1".into(),
                role,
                specialization: (role == Role::Doctor).then_some(Specialization::Cardiology),
            };
            let hash = self.ctx.core.hasher().hash(&new.password);
            let user = db::create_user(&mut conn, &new, &hash, &PatientProfile::default()).unwrap();
            let token = self.ctx.core.tokens().issue(user.id, user.role).unwrap();
            (user, token)
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                builder = builder.header("Authorization", format!("Bearer {t}"));
            }
            let request = match body {
                Some(json) => builder
                    .header("Content-Type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router().oneshot(request).await.unwrap();
            let status = response.status();
            (status, response_json(response).await)
        }

        async fn upload(
            &self,
            lab_test_id: Uuid,
            token: &str,
            field: &str,
            content_type: &str,
            data: &[u8],
        ) -> (StatusCode, Value) {
            let boundary = "hms-test-boundary";
            let mut body = format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"report.pdf\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .into_bytes();
            body.extend_from_slice(data);
            body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

            let request = Request::builder()
                .method("POST")
                .uri(format!("/lab-tests/{lab_test_id}/upload"))
                .header("Authorization", format!("Bearer {token}"))
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap();
            let response = self.router().oneshot(request).await.unwrap();
            let status = response.status();
            (status, response_json(response).await)
        }
    }

    async fn response_json(response: axum::http::Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        if bytes.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }

    fn booking(patient: &User, doctor: &User, date: &str, time: &str) -> Value {
        json!({
            "patient_id": patient.id,
            "doctor_id": doctor.id,
            "date": date,
            "time": time,
        })
    }

    // ── Public surface ─────────────────────────────────────

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn specializations_are_public() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/auth/specializations", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 12);
        assert!(list.contains(&json!("General Medicine")));
        assert!(list.contains(&json!("ENT")));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = TestApp::new();
        let (status, _) = app.send("GET", "/nonexistent", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ── Registration & login ───────────────────────────────

    #[tokio::test]
    async fn register_then_login() {
        let app = TestApp::new();
        let (status, body) = app
            .send(
                "POST",
                "/auth/register/patient",
                None,
                Some(json!({
                    "name": "Pat",
                    "email": "Pat@Example.com",
                    "password": "secret1",
                    "contact_number": "555-0100",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["role"], "Patient");
        assert_eq!(body["user"]["email"], "pat@example.com");
        assert!(body["user"].get("password_hash").is_none());
        let token = body["token"].as_str().unwrap().to_string();

        let (status, me) = app.send("GET", "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "Pat");

        let (status, login) = app
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": "pat@example.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["user"]["id"], body["user"]["id"]);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_and_keeps_original() {
        let app = TestApp::new();
        let register = |password: &str, name: &str| {
            json!({ "name": name, "email": "ada@example.com", "password": password })
        };

        let (status, first) = app
            .send("POST", "/auth/register/patient", None, Some(register("original", "Ada")))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .send("POST", "/auth/register/patient", None, Some(register("hijack1", "Eve")))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");
        assert!(body["error"].is_string());

        let (status, login) = app
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": "ada@example.com", "password": "original" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["user"]["name"], "Ada");
        assert_eq!(login["user"]["id"], first["user"]["id"]);

        let (status, _) = app
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": "ada@example.com", "password": "hijack1" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn registration_validates_input() {
        let app = TestApp::new();
        let (status, body) = app
            .send(
                "POST",
                "/auth/register/patient",
                None,
                Some(json!({ "name": "Pat", "email": "pat@example.com", "password": "123" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, body) = app
            .send("POST", "/auth/register/patient", None, Some(json!({ "name": "Pat" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_401() {
        let app = TestApp::new();
        let (user, _) = app.user("Ada", Role::Admin);
        let (status, body) = app
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": user.email, "password": "wrong-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn admin_registers_doctor_with_specialization() {
        let app = TestApp::new();
        let (_, admin) = app.user("Root", Role::Admin);

        let (status, body) = app
            .send(
                "POST",
                "/auth/register/employee",
                Some(&admin),
                Some(json!({
                    "name": "Doc",
                    "email": "doc@example.com",
                    "password": "secret1",
                    "role": "Doctor",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("specialization"));

        let (status, body) = app
            .send(
                "POST",
                "/employees",
                Some(&admin),
                Some(json!({
                    "name": "Doc",
                    "email": "doc@example.com",
                    "password": "secret1",
                    "role": "Doctor",
                    "specialization": "Neurology",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["specialization"], "Neurology");

        let (status, doctors) = app
            .send("GET", "/doctors?specialization=Neurology", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doctors.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lab_technician_role_uses_display_name() {
        let app = TestApp::new();
        let (_, admin) = app.user("Root", Role::Admin);
        let (status, body) = app
            .send(
                "POST",
                "/employees",
                Some(&admin),
                Some(json!({
                    "name": "Lab",
                    "email": "lab@example.com",
                    "password": "secret1",
                    "role": "Lab Technician",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["role"], "Lab Technician");

        let (status, _) = app
            .send(
                "POST",
                "/employees",
                Some(&admin),
                Some(json!({
                    "name": "Janitor",
                    "email": "j@example.com",
                    "password": "secret1",
                    "role": "Janitor",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // ── Authentication ─────────────────────────────────────

    #[tokio::test]
    async fn missing_token_is_401() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/appointments", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn garbage_token_is_401() {
        let app = TestApp::new();
        let (status, body) = app
            .send("GET", "/appointments", Some("not.a.token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn expired_token_is_401() {
        let app = TestApp::new();
        let (user, _) = app.user("Ada", Role::Admin);
        let issued = chrono::Utc::now().timestamp() - 25 * 3600;
        let stale = app
            .ctx
            .core
            .tokens()
            .issue_at(user.id, user.role, issued)
            .unwrap();

        let (status, body) = app.send("GET", "/auth/me", Some(&stale), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_401() {
        let app = TestApp::new();
        let (_, admin) = app.user("Root", Role::Admin);
        let (rita, rita_token) = app.user("Rita", Role::Receptionist);

        let (status, _) = app
            .send("DELETE", &format!("/employees/{}", rita.id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app.send("GET", "/auth/me", Some(&rita_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn authenticated_responses_are_not_cached() {
        let app = TestApp::new();
        let (_, token) = app.user("Ada", Role::Admin);
        let request = Request::builder()
            .uri("/auth/me")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
    }

    // ── Authorization ──────────────────────────────────────

    #[tokio::test]
    async fn route_role_sets_are_enforced() {
        let app = TestApp::new();
        let staff = RoleSet::of(&[Role::Admin, Role::Doctor, Role::Receptionist]);
        let routes: &[(&str, RoleSet)] = &[
            ("/auth/me", RoleSet::ANY),
            (
                "/appointments",
                RoleSet::of(&[Role::Admin, Role::Doctor, Role::Receptionist, Role::Patient]),
            ),
            (
                "/prescriptions",
                RoleSet::of(&[Role::Admin, Role::Doctor, Role::Receptionist, Role::Patient]),
            ),
            ("/lab-tests", RoleSet::ANY),
            ("/employees", RoleSet::of(&[Role::Admin])),
            ("/doctors", RoleSet::ANY),
            ("/patients", staff),
            ("/schedules", RoleSet::ANY),
            ("/payments", RoleSet::of(&[Role::Admin, Role::Receptionist])),
        ];

        for role in Role::ALL {
            let (_, token) = app.user(role.as_str(), *role);
            for (path, allowed) in routes {
                let (status, _) = app.send("GET", path, Some(&token), None).await;
                if allowed.contains(*role) {
                    assert_eq!(status, StatusCode::OK, "{role} on {path}");
                } else {
                    assert_eq!(status, StatusCode::FORBIDDEN, "{role} on {path}");
                }
            }
        }
    }

    #[tokio::test]
    async fn forbidden_body_is_structured() {
        let app = TestApp::new();
        let (_, patient) = app.user("Pat", Role::Patient);
        let (status, body) = app.send("GET", "/payments", Some(&patient), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn only_doctors_prescribe() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (_, admin) = app.user("Root", Role::Admin);
        let body = json!({ "patient_id": patient.id, "medication": "Aspirin", "dosage": "1 tab" });

        let (status, _) = app
            .send("POST", "/prescriptions", Some(&admin), Some(body))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    // ── Appointments ───────────────────────────────────────

    #[tokio::test]
    async fn create_then_filter_round_trip() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (other_doctor, _) = app.user("Other", Role::Doctor);
        let (_, desk) = app.user("Rita", Role::Receptionist);

        let (status, created) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, &doctor, "2025-03-10", "09:00")),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        app.send(
            "POST",
            "/appointments",
            Some(&desk),
            Some(booking(&patient, &other_doctor, "2025-03-10", "09:00")),
        )
        .await;
        app.send(
            "POST",
            "/appointments",
            Some(&desk),
            Some(booking(&patient, &doctor, "2025-03-11", "09:00")),
        )
        .await;

        let (status, found) = app
            .send(
                "GET",
                &format!("/appointments?doctor_id={}&date=2025-03-10", doctor.id),
                Some(&desk),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], created["id"]);
        assert_eq!(found[0]["status"], "Scheduled");
        assert_eq!(found[0]["time"], "09:00");
        assert_eq!(found[0]["patient_name"], "Pat");
        assert_eq!(found[0]["doctor_name"], "Doc");
    }

    #[tokio::test]
    async fn patient_sees_exactly_own_appointments_whatever_the_filter() {
        let app = TestApp::new();
        let (me, my_token) = app.user("Pat", Role::Patient);
        let (someone, _) = app.user("Sam", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (other_doctor, _) = app.user("Other", Role::Doctor);
        let (_, desk) = app.user("Rita", Role::Receptionist);

        for (patient, doc) in [
            (&me, &doctor),
            (&me, &other_doctor),
            (&someone, &doctor),
            (&someone, &other_doctor),
        ] {
            let (status, _) = app
                .send(
                    "POST",
                    "/appointments",
                    Some(&desk),
                    Some(booking(patient, doc, "2025-03-10", "10:00")),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, unfiltered) = app.send("GET", "/appointments", Some(&my_token), None).await;
        assert_eq!(status, StatusCode::OK);
        let unfiltered = unfiltered.as_array().unwrap();
        assert_eq!(unfiltered.len(), 2);
        assert!(unfiltered
            .iter()
            .all(|a| a["patient_id"] == json!(me.id)));

        for query in [
            format!("doctor_id={}", doctor.id),
            format!("doctor_id={}&patient_id={}", other_doctor.id, someone.id),
            format!("patient_id={}", someone.id),
        ] {
            let (status, filtered) = app
                .send("GET", &format!("/appointments?{query}"), Some(&my_token), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(filtered.as_array().unwrap(), unfiltered, "query {query}");
        }
    }

    #[tokio::test]
    async fn staff_doctor_filter_still_narrows() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (other_doctor, _) = app.user("Other", Role::Doctor);
        let (_, desk) = app.user("Rita", Role::Receptionist);
        for doc in [&doctor, &other_doctor] {
            app.send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, doc, "2025-03-10", "10:00")),
            )
            .await;
        }

        let (_, found) = app
            .send("GET", &format!("/appointments?doctor_id={}", doctor.id), Some(&desk), None)
            .await;
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["doctor_id"], json!(doctor.id));
    }

    #[tokio::test]
    async fn patient_books_for_self_only() {
        let app = TestApp::new();
        let (me, my_token) = app.user("Pat", Role::Patient);
        let (someone, _) = app.user("Sam", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);

        let (status, created) = app
            .send(
                "POST",
                "/appointments",
                Some(&my_token),
                Some(booking(&someone, &doctor, "2025-03-10", "9:30")),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["patient_id"], json!(me.id));
        assert_eq!(created["time"], "09:30");
    }

    #[tokio::test]
    async fn booking_rejects_bad_references_and_times() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (_, desk) = app.user("Rita", Role::Receptionist);

        let (status, _) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&doctor, &patient, "2025-03-10", "09:00")),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, &doctor, "2025-03-10", "noon")),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, &doctor, "10/03/2025", "09:00")),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_update_is_idempotent() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (doctor, doctor_token) = app.user("Doc", Role::Doctor);
        let (_, desk) = app.user("Rita", Role::Receptionist);
        let (_, created) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, &doctor, "2025-03-10", "09:00")),
            )
            .await;
        let uri = format!("/appointments/{}/status", created["id"].as_str().unwrap());

        for _ in 0..2 {
            let (status, body) = app
                .send("PATCH", &uri, Some(&doctor_token), Some(json!({ "status": "Completed" })))
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "Completed");
        }
    }

    #[tokio::test]
    async fn patient_may_only_cancel_own_appointment() {
        let app = TestApp::new();
        let (me, my_token) = app.user("Pat", Role::Patient);
        let (_, other_token) = app.user("Sam", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (_, created) = app
            .send(
                "POST",
                "/appointments",
                Some(&my_token),
                Some(booking(&me, &doctor, "2025-03-10", "09:00")),
            )
            .await;
        let id = created["id"].as_str().unwrap();
        let uri = format!("/appointments/{id}/status");

        let (status, _) = app
            .send("PATCH", &uri, Some(&my_token), Some(json!({ "status": "Completed" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send("PATCH", &uri, Some(&other_token), Some(json!({ "status": "Cancelled" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .send("GET", &format!("/appointments/{id}"), Some(&other_token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .send("PATCH", &uri, Some(&my_token), Some(json!({ "status": "Cancelled" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Cancelled");
    }

    #[tokio::test]
    async fn invalid_status_is_rejected() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (_, desk) = app.user("Rita", Role::Receptionist);
        let (_, created) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, &doctor, "2025-03-10", "09:00")),
            )
            .await;
        let uri = format!("/appointments/{}/status", created["id"].as_str().unwrap());
        let (status, body) = app
            .send("PATCH", &uri, Some(&desk), Some(json!({ "status": "Teleported" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn misspelled_filter_is_rejected() {
        let app = TestApp::new();
        let (_, desk) = app.user("Rita", Role::Receptionist);
        let (status, body) = app
            .send("GET", "/appointments?doctorid=abc", Some(&desk), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    // ── Payments ───────────────────────────────────────────

    #[tokio::test]
    async fn paying_updates_appointment_and_records_one_payment() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (desk_user, desk) = app.user("Rita", Role::Receptionist);
        let (_, created) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, &doctor, "2025-03-10", "09:00")),
            )
            .await;
        let id = created["id"].as_str().unwrap().to_string();
        let uri = format!("/appointments/{id}/payment");

        let (status, paid) = app
            .send("POST", &uri, Some(&desk), Some(json!({ "amount": 500, "method": "Cash" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(paid["appointment"]["payment_status"], "Paid");
        assert_eq!(paid["appointment"]["payment_amount"], 500.0);
        assert_eq!(paid["payment"]["amount"], 500.0);
        assert_eq!(paid["payment"]["status"], "Paid");
        assert_eq!(paid["payment"]["processed_by"], json!(desk_user.id));

        let (_, payments) = app
            .send("GET", &format!("/payments?appointment_id={id}"), Some(&desk), None)
            .await;
        assert_eq!(payments.as_array().unwrap().len(), 1);

        let (status, _) = app
            .send("POST", &uri, Some(&desk), Some(json!({ "amount": 500, "method": "Cash" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (_, payments) = app.send("GET", "/payments", Some(&desk), None).await;
        assert_eq!(payments.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payment_validates_amount_and_method() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (doctor, _) = app.user("Doc", Role::Doctor);
        let (_, desk) = app.user("Rita", Role::Receptionist);
        let (_, created) = app
            .send(
                "POST",
                "/appointments",
                Some(&desk),
                Some(booking(&patient, &doctor, "2025-03-10", "09:00")),
            )
            .await;
        let uri = format!("/appointments/{}/payment", created["id"].as_str().unwrap());

        let (status, _) = app
            .send("POST", &uri, Some(&desk), Some(json!({ "amount": 0, "method": "Cash" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send("POST", &uri, Some(&desk), Some(json!({ "amount": 10, "method": "Barter" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, payments) = app.send("GET", "/payments", Some(&desk), None).await;
        assert!(payments.as_array().unwrap().is_empty());
    }

    // ── Prescriptions ──────────────────────────────────────

    #[tokio::test]
    async fn prescriber_owns_their_prescriptions() {
        let app = TestApp::new();
        let (patient, patient_token) = app.user("Pat", Role::Patient);
        let (_, doctor) = app.user("Doc", Role::Doctor);
        let (_, other_doctor) = app.user("Other", Role::Doctor);

        let (status, rx) = app
            .send(
                "POST",
                "/prescriptions",
                Some(&doctor),
                Some(json!({
                    "patient_id": patient.id,
                    "medication": "Amoxicillin",
                    "dosage": "500mg",
                    "instructions": "Twice daily",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/prescriptions/{}", rx["id"].as_str().unwrap());

        let (status, _) = app
            .send("PUT", &uri, Some(&other_doctor), Some(json!({ "dosage": "1g" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, updated) = app
            .send("PUT", &uri, Some(&doctor), Some(json!({ "dosage": "250mg" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["dosage"], "250mg");
        assert_eq!(updated["medication"], "Amoxicillin");

        let (_, mine) = app.send("GET", "/prescriptions", Some(&patient_token), None).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);
        let (_, others) = app.send("GET", "/prescriptions", Some(&other_doctor), None).await;
        assert!(others.as_array().unwrap().is_empty());

        let (status, _) = app.send("DELETE", &uri, Some(&doctor), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.send("GET", &uri, Some(&doctor), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ── Lab tests ──────────────────────────────────────────

    async fn order_lab_test(app: &TestApp, patient: &User) -> Uuid {
        let (_, desk) = app.user("Rita", Role::Receptionist);
        let (status, body) = app
            .send(
                "POST",
                "/lab-tests",
                Some(&desk),
                Some(json!({ "patient_id": patient.id, "test_name": "CBC", "date": "2025-03-10" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "Pending");
        assert_eq!(body["payment_status"], "Pending");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn non_pdf_upload_is_rejected_before_any_mutation() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (_, tech) = app.user("Lab", Role::LabTechnician);
        let id = order_lab_test(&app, &patient).await;

        let (status, body) = app
            .upload(id, &tech, "report", "image/png", b"\x89PNG fake")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, _) = app
            .upload(id, &tech, "report", "application/pdf", b"not really a pdf")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .upload(id, &tech, "file", "application/pdf", b"%PDF-1.7")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(app.reports.len(), 0);
        let conn = app.ctx.core.open_db().unwrap();
        let test = db::get_lab_test(&conn, &id).unwrap();
        assert_eq!(test.status.as_str(), "Pending");
        assert!(test.report_url.is_none());
    }

    #[tokio::test]
    async fn pdf_upload_marks_report_sent() {
        let app = TestApp::new();
        let (patient, patient_token) = app.user("Pat", Role::Patient);
        let (_, tech) = app.user("Lab", Role::LabTechnician);
        let id = order_lab_test(&app, &patient).await;

        let (status, body) = app
            .upload(id, &tech, "report", "application/pdf", b"%PDF-1.7\n...")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Report Sent");
        let url = body["report_url"].as_str().unwrap();
        assert!(url.starts_with(&format!("memory://lab-reports/{id}-")));
        assert!(url.ends_with(".pdf"));
        assert_eq!(app.reports.len(), 1);

        let (_, mine) = app.send("GET", "/lab-tests", Some(&patient_token), None).await;
        assert_eq!(mine[0]["status"], "Report Sent");
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let app = TestApp::with_config(|c| c.report_max_bytes = 16);
        let (patient, _) = app.user("Pat", Role::Patient);
        let (_, tech) = app.user("Lab", Role::LabTechnician);
        let id = order_lab_test(&app, &patient).await;

        let mut big = b"%PDF-1.7".to_vec();
        big.extend(std::iter::repeat(b'x').take(64));
        let (status, body) = app.upload(id, &tech, "report", "application/pdf", &big).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(app.reports.len(), 0);
    }

    #[tokio::test]
    async fn only_lab_technicians_upload() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (_, admin) = app.user("Root", Role::Admin);
        let id = order_lab_test(&app, &patient).await;
        let (status, _) = app
            .upload(id, &admin, "report", "application/pdf", b"%PDF-1.7")
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn lab_payment_status_update() {
        let app = TestApp::new();
        let (patient, _) = app.user("Pat", Role::Patient);
        let (_, tech) = app.user("Lab", Role::LabTechnician);
        let id = order_lab_test(&app, &patient).await;

        let (status, body) = app
            .send(
                "PATCH",
                &format!("/lab-tests/{id}/payment"),
                Some(&tech),
                Some(json!({ "payment_status": "Payment Verified" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payment_status"], "Payment Verified");
    }

    // ── Schedules ──────────────────────────────────────────

    #[tokio::test]
    async fn doctor_writes_own_schedule() {
        let app = TestApp::new();
        let (doctor, doctor_token) = app.user("Doc", Role::Doctor);
        let (other, _) = app.user("Other", Role::Doctor);

        let (status, body) = app
            .send(
                "POST",
                "/schedules",
                Some(&doctor_token),
                Some(json!({
                    "doctor_id": other.id,
                    "day_of_week": "Monday",
                    "time_slots": ["14:00", "9:00", "09:00"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["doctor_id"], json!(doctor.id));
        assert_eq!(body["time_slots"], json!(["09:00", "14:00"]));

        let (status, _) = app
            .send(
                "POST",
                "/schedules",
                Some(&doctor_token),
                Some(json!({ "day_of_week": "Monday", "time_slots": ["soon"] })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // ── Middleware ─────────────────────────────────────────

    #[tokio::test]
    async fn rate_limit_returns_429_with_retry_after() {
        let app = TestApp::with_config(|c| c.rate_limit_max = 2);
        let (_, token) = app.user("Ada", Role::Admin);

        for _ in 0..2 {
            let (status, _) = app.send("GET", "/auth/me", Some(&token), None).await;
            assert_eq!(status, StatusCode::OK);
        }

        let request = Request::builder()
            .uri("/auth/me")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
    }

    #[tokio::test]
    async fn internal_detail_shown_outside_production() {
        let app = TestApp::new();
        std::fs::remove_file(&app.ctx.core.config.database_path).unwrap();

        let (status, body) = app
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": "a@example.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL");
        assert!(body["error"].as_str().unwrap().contains("no such table"));
    }

    #[tokio::test]
    async fn internal_detail_hidden_in_production() {
        let app = TestApp::with_config(|c| c.production = true);
        std::fs::remove_file(&app.ctx.core.config.database_path).unwrap();

        let (status, body) = app
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": "a@example.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], crate::api::error::INTERNAL_MESSAGE);
    }
}
