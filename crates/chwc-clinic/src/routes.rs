use super::{
    appointments, approval, eligibility, emergency,
    error::Error,
    login::{login, logout, BackEnd},
    onboarding,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Json,
};
use axum_login::{login_required, tower_sessions::MemoryStore, AuthManagerLayer};
use tower_http::trace::TraceLayer;

pub(super) fn setup(
    app_state: super::AppState,
    auth_manager: AuthManagerLayer<BackEnd, MemoryStore>,
    max_upload_size: usize,
) -> axum::routing::Router {
    axum::Router::new()
        .route("/check-onboarding", post(eligibility::check_onboarding::post))
        .route("/check-por", post(eligibility::check_por::post))
        .route("/onboarding", post(onboarding::submit::post))
        .route("/onboarding/{student_number}", get(onboarding::record::get))
        .route(
            "/upload-por",
            post(approval::upload_por::post).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/student-files/{student_number}", get(approval::student_files::get))
        .route("/por/{student_number}", get(approval::por::get))
        .route("/por/{student_number}/decision", post(approval::por_decision::post))
        .route("/save-appointment", post(appointments::save_appointment::post))
        .route(
            "/student-appointments/{student_number}",
            get(appointments::student_appointments::get),
        )
        .route(
            "/appointments/student/{student_number}",
            get(appointments::student_appointments_by_date::get),
        )
        .route("/appointments", get(appointments::all_appointments::get))
        .route("/appointments/{id}", put(appointments::update_appointment::put))
        .route("/appointments/{id}/cancel", put(appointments::cancel_appointment::put))
        .route(
            "/emergency-reports",
            get(emergency::reports::get).post(emergency::reports::post),
        )
        .route(
            "/emergency-reports/{id}",
            get(emergency::report::get)
                .put(emergency::report::put)
                .delete(emergency::report::delete),
        )
        .route_layer(login_required!(BackEnd))
        .route("/login", post(login::post))
        .route("/logout", post(logout::post))
        .route("/health", get(health))
        .layer(auth_manager)
        .layer(TraceLayer::new_for_http())
        .fallback(fallback)
        .with_state(app_state)
}

#[derive(serde::Serialize)]
pub struct Health {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn fallback(uri: axum::http::Uri) -> Error {
    tracing::debug!(%uri, "no route");
    Error::NotFound("Not found".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        approval::UploadDir,
        cipher::test_cipher,
        clinic::Clinic,
        domain::{Role, StudentNumber},
        login::{create_backend, hash_pass_phrase},
        memory::{test_clinic, MemoryStore as ClinicMemoryStore},
        AppState,
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use axum_login::{tower_sessions::SessionManagerLayer, AuthManagerLayerBuilder};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    const PASS_PHRASE: &str = "a long enough pass phrase";

    fn app(clinic: Clinic) -> Router {
        let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);
        let auth_layer = AuthManagerLayerBuilder::new(create_backend(clinic.clone()), session_layer)
            .build();
        let app_state = AppState {
            clinic,
            cipher: Arc::new(test_cipher()),
            uploads: UploadDir::new(std::env::temp_dir()),
        };
        setup(app_state, auth_layer, 1024 * 1024)
    }

    fn with_accounts() -> (Router, Arc<ClinicMemoryStore>) {
        let (clinic, store) = test_clinic();
        let hash = hash_pass_phrase(PASS_PHRASE);
        store.add_account(
            "thandi",
            &hash,
            Role::Student,
            Some(StudentNumber::parse("12345").unwrap()),
        );
        store.add_account("sister", &hash, Role::Nurse, None);
        (app(clinic), store)
    }

    fn json_request(
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn log_in(app: &Router, logon_name: &str) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/login",
                None,
                serde_json::json!({ "logonName": logon_name, "passPhrase": PASS_PHRASE }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("a session cookie")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_owned()
    }

    #[tokio::test]
    async fn health_needs_no_login() {
        let (app, _) = with_accounts();
        let response = app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn api_routes_require_login() {
        let (app, _) = with_accounts();
        let response = app
            .oneshot(json_request(
                "POST",
                "/check-por",
                None,
                serde_json::json!({ "studentNumber": "12345" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn a_wrong_pass_phrase_is_unauthorized() {
        let (app, _) = with_accounts();
        let response = app
            .oneshot(json_request(
                "POST",
                "/login",
                None,
                serde_json::json!({ "logonName": "thandi", "passPhrase": "nope" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn a_logged_in_student_checks_their_proof() {
        let (app, _) = with_accounts();
        let cookie = log_in(&app, "thandi").await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/check-por",
                Some(&cookie),
                serde_json::json!({ "studentNumber": "12345" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "exists": false, "approved": false })
        );
    }

    #[tokio::test]
    async fn booking_without_approval_is_not_eligible() {
        let (app, store) = with_accounts();
        let cookie = log_in(&app, "thandi").await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/save-appointment",
                Some(&cookie),
                serde_json::json!({
                    "studentNumber": "12345",
                    "appointmentType": "Health and Wellness Booking",
                    "appointmentFor": "General Consultation",
                    "appointmentTime": "09:30"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "NOT_ELIGIBLE");
        assert_eq!(store.appointment_count(), 0);
    }

    #[tokio::test]
    async fn students_cannot_list_every_appointment() {
        let (app, _) = with_accounts();
        let cookie = log_in(&app, "thandi").await;
        let response = app
            .clone()
            .oneshot(get_request("/appointments", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "FORBIDDEN");

        let cookie = log_in(&app, "sister").await;
        let response = app
            .oneshot(get_request("/appointments", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn staff_get_not_found_for_a_missing_onboarding_record() {
        let (app, _) = with_accounts();
        let cookie = log_in(&app, "sister").await;
        let response = app
            .oneshot(get_request("/onboarding/12345", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_routes_are_json_not_found() {
        let (app, _) = with_accounts();
        let response = app.oneshot(get_request("/nowhere", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }
}
