//! HTTP API.
//!
//! JSON endpoints over the operator, camera, visitor and visit records,
//! plus authenticated access to stored photos.

mod cameras;
mod error;
pub mod extract;
mod session;
pub mod state;
mod users;
mod visitors;
mod visits;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_extractor_with_state,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::storage::Storage;

pub use extract::AuthUser;
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors = if server.cors_allow_any_origin {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };
    let body_limit = server.max_upload_bytes;

    let photos = Router::new()
        .nest_service("/photos", ServeDir::new(state.photos.store().dir()))
        .layer(from_extractor_with_state::<AuthUser, _>(state.clone()));

    Router::new()
        .route("/", get(session::index))
        .route("/healthz", get(session::healthz))
        .route("/token", post(session::token))
        .route("/users", get(users::list).post(users::create))
        .route("/users/me", get(users::me))
        .route("/users/:id", get(users::get).delete(users::delete))
        .route("/cameras", get(cameras::list).post(cameras::create))
        .route(
            "/cameras/:id",
            get(cameras::get)
                .put(cameras::update)
                .delete(cameras::delete),
        )
        .route("/cameras/:id/start", post(cameras::start))
        .route("/cameras/:id/stop", post(cameras::stop))
        .route("/cameras/:id/snapshot", post(cameras::snapshot))
        .route("/visitors", get(visitors::list).post(visitors::create))
        .route("/visitors/:id", get(visitors::get).delete(visitors::delete))
        .route("/visitors/:id/exit", post(visitors::exit))
        .route("/visitors/:id/photo", put(visitors::upload_photo))
        .route("/visits", get(visits::list))
        .route("/visits/upload", post(visits::upload))
        .route("/visits/capture/:camera_id", post(visits::capture))
        .route("/visits/:id", get(visits::get).delete(visits::delete))
        .route("/visits/:id/checkout", post(visits::check_out))
        .merge(photos)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Open the database and serve the API until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, a service cannot be
/// configured, or the listener cannot be bound.
pub async fn serve(config: Config) -> Result<()> {
    let storage = Storage::open(config.database_path())?;
    let address = config.bind_address();
    let state = AppState::from_config(config, storage)?;

    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, TokenIssuer};
    use crate::camera::tests::{OfflineSource, StaticSource};
    use crate::camera::{CameraHub, SnapshotSource};
    use crate::models::Role;
    use crate::storage::SharedStorage;
    use crate::vision::photo::tests::{sample_jpeg, temp_dir};
    use crate::vision::{NoFaceDetector, PhotoPipeline, PhotoStore};
    use crate::visits::VisitService;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        dir: PathBuf,
    }

    impl Drop for TestApp {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    fn test_app() -> TestApp {
        test_app_with_source(Arc::new(StaticSource(sample_jpeg(48, 48))))
    }

    fn test_app_with_source(source: Arc<dyn SnapshotSource>) -> TestApp {
        crate::logging::init_test_logging();
        let dir = temp_dir("api");
        let storage = Storage::open_in_memory().unwrap();
        for (login, role) in [("admin", Role::Admin), ("guard", Role::User)] {
            let hash = hash_password("password1").unwrap();
            storage.insert_user(login, &hash, role, None).unwrap();
        }

        let storage = SharedStorage::new(storage);
        let cameras = CameraHub::new(storage.clone(), source, None);
        let photos = PhotoPipeline::new(Arc::new(NoFaceDetector), PhotoStore::new(&dir, 90));
        let visits = VisitService::new(storage.clone(), photos.clone(), cameras.clone(), 10);
        let state = AppState {
            storage,
            tokens: TokenIssuer::new_dev(Duration::from_secs(600)),
            cameras,
            photos,
            visits,
            config: Arc::new(Config::default()),
        };

        TestApp {
            router: router(state),
            dir,
        }
    }

    async fn send(
        app: &TestApp,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn send_bytes(
        app: &TestApp,
        method: Method,
        uri: &str,
        token: &str,
        bytes: Vec<u8>,
    ) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(Body::from(bytes))
            .unwrap();
        app.router.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &TestApp, login: &str) -> String {
        let response = send(
            app,
            Method::POST,
            "/token",
            None,
            Some(json!({"login": login, "password": "password1"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn create_camera(app: &TestApp, admin: &str) -> i64 {
        let response = send(
            app,
            Method::POST,
            "/cameras",
            Some(admin),
            Some(json!({"name": "Gate", "ip": "10.0.0.2", "type": "ip"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let app = test_app();

        let response = send(&app, Method::GET, "/healthz", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"status": "ok"}));

        let response = send(&app, Method::GET, "/", None, None).await;
        assert_eq!(json_body(response).await["service"], "visitlog");
    }

    #[tokio::test]
    async fn test_token_with_form_body() {
        let app = test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=guard&password=password1"))
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["token_type"], "bearer");
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let app = test_app();
        let response = send(
            &app,
            Method::POST,
            "/token",
            None,
            Some(json!({"login": "guard", "password": "nope"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(json_body(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn test_requires_token() {
        let app = test_app();

        let response = send(&app, Method::GET, "/users", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&app, Method::GET, "/users", Some("garbage"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_users_me_and_admin_only_create() {
        let app = test_app();
        let guard = login(&app, "guard").await;
        let admin = login(&app, "admin").await;

        let me = json_body(send(&app, Method::GET, "/users/me", Some(&guard), None).await).await;
        assert_eq!(me["login"], "guard");
        assert_eq!(me["role"], "user");
        assert!(me.get("password_hash").is_none());

        let new_user = json!({"login": "night", "password": "secret12"});
        let response = send(&app, Method::POST, "/users", Some(&guard), Some(new_user.clone())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::POST, "/users", Some(&admin), Some(new_user.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&app, Method::POST, "/users", Some(&admin), Some(new_user)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let app = test_app();
        let admin = login(&app, "admin").await;
        let me = json_body(send(&app, Method::GET, "/users/me", Some(&admin), None).await).await;
        let id = me["id"].as_i64().unwrap();

        let response = send(&app, Method::DELETE, &format!("/users/{id}"), Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_camera_lifecycle() {
        let app = test_app();
        let admin = login(&app, "admin").await;
        let id = create_camera(&app, &admin).await;

        let uri = format!("/cameras/{id}/start");
        let response = send(&app, Method::POST, &uri, Some(&admin), None).await;
        assert_eq!(json_body(response).await["status"], "started");

        let camera = json_body(
            send(&app, Method::GET, &format!("/cameras/{id}"), Some(&admin), None).await,
        )
        .await;
        assert_eq!(camera["status"], "active");
        assert_eq!(camera["type"], "ip");

        let response = send(&app, Method::POST, "/cameras/999/start", Some(&admin), None).await;
        assert_eq!(json_body(response).await["status"], "failed");

        let response = send(
            &app,
            Method::PUT,
            &format!("/cameras/{id}"),
            Some(&admin),
            Some(json!({"location": "North gate"})),
        )
        .await;
        assert_eq!(json_body(response).await["location"], "North gate");

        let response = send(&app, Method::DELETE, &format!("/cameras/{id}"), Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_visitor_with_capture_and_exit() {
        let app = test_app();
        let admin = login(&app, "admin").await;
        let guard = login(&app, "guard").await;
        let camera_id = create_camera(&app, &admin).await;

        let response = send(
            &app,
            Method::POST,
            "/visitors?capture=true",
            Some(&guard),
            Some(json!({"full_name": "Ada Lovelace", "camera_id": camera_id})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let visitor = json_body(response).await;
        assert_eq!(visitor["operator"], "guard");
        let photo = visitor["photo"].as_str().unwrap().to_string();
        assert!(photo.starts_with("visitor_"));

        let response = send(&app, Method::GET, &format!("/photos/{photo}"), Some(&guard), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, Method::GET, &format!("/photos/{photo}"), None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let id = visitor["id"].as_i64().unwrap();
        let response = send(&app, Method::GET, "/visitors?inside=true", Some(&guard), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

        let uri = format!("/visitors/{id}/exit");
        let response = send(&app, Method::POST, &uri, Some(&guard), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["exit_time"].is_string());

        let response = send(&app, Method::POST, &uri, Some(&guard), None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = send(&app, Method::DELETE, &format!("/cameras/{camera_id}"), Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_visitor_unknown_camera() {
        let app = test_app();
        let guard = login(&app, "guard").await;

        let response = send(
            &app,
            Method::POST,
            "/visitors",
            Some(&guard),
            Some(json!({"full_name": "Ghost", "camera_id": 404})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_visitor_recorded_when_camera_offline() {
        let app = test_app_with_source(Arc::new(OfflineSource));
        let admin = login(&app, "admin").await;
        let guard = login(&app, "guard").await;
        let camera_id = create_camera(&app, &admin).await;

        let response = send(
            &app,
            Method::POST,
            "/visitors?capture=true",
            Some(&guard),
            Some(json!({"full_name": "Grace Hopper", "camera_id": camera_id})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let visitor = json_body(response).await;
        assert!(visitor["photo"].is_null());
        assert_eq!(visitor["operator"], "guard");

        let response = send(&app, Method::GET, "/visitors", Some(&guard), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_visitor_photo_upload() {
        let app = test_app();
        let admin = login(&app, "admin").await;
        let guard = login(&app, "guard").await;
        let camera_id = create_camera(&app, &admin).await;

        let response = send(
            &app,
            Method::POST,
            "/visitors",
            Some(&guard),
            Some(json!({"full_name": "Alan Turing", "camera_id": camera_id})),
        )
        .await;
        let visitor = json_body(response).await;
        assert!(visitor["photo"].is_null());
        let uri = format!("/visitors/{}/photo", visitor["id"]);

        let response = send_bytes(&app, Method::PUT, &uri, &guard, sample_jpeg(40, 40)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = json_body(response).await;
        let photo = updated["photo"].as_str().unwrap();
        assert!(photo.starts_with("visitor_"));
        assert!(app.dir.join(photo).is_file());

        let response = send_bytes(&app, Method::PUT, &uri, &guard, b"not an image".to_vec()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            send_bytes(&app, Method::PUT, "/visitors/999/photo", &guard, sample_jpeg(40, 40)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_visit_upload_checks_in_and_out() {
        let app = test_app();
        let guard = login(&app, "guard").await;
        let frame = sample_jpeg(64, 64);

        let upload = |bytes: Vec<u8>| {
            Request::builder()
                .method(Method::POST)
                .uri("/visits/upload")
                .header(header::AUTHORIZATION, format!("Bearer {guard}"))
                .header(header::CONTENT_TYPE, "image/jpeg")
                .body(Body::from(bytes))
                .unwrap()
        };

        let response = app.router.clone().oneshot(upload(frame.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = json_body(response).await;
        assert_eq!(first["action"], "checked_in");

        let response = app.router.clone().oneshot(upload(frame)).await.unwrap();
        let second = json_body(response).await;
        assert_eq!(second["action"], "checked_out");
        assert_eq!(second["visit"]["id"], first["visit"]["id"]);
        assert_eq!(second["visit"]["exited"], true);

        let response = send(&app, Method::GET, "/visits?open=true", Some(&guard), None).await;
        assert!(json_body(response).await.as_array().unwrap().is_empty());

        let response = app
            .router
            .clone()
            .oneshot(upload(b"not an image".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_visit_capture_and_manual_checkout() {
        let app = test_app();
        let admin = login(&app, "admin").await;
        let camera_id = create_camera(&app, &admin).await;

        let uri = format!("/visits/capture/{camera_id}");
        let outcome = json_body(send(&app, Method::POST, &uri, Some(&admin), None).await).await;
        assert_eq!(outcome["action"], "checked_in");
        let id = outcome["visit"]["id"].as_i64().unwrap();

        let uri = format!("/visits/{id}/checkout");
        let response = send(&app, Method::POST, &uri, Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["exited"], true);

        let response = send(&app, Method::DELETE, &format!("/visits/{id}"), Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&app, Method::GET, &format!("/visits/{id}"), Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
