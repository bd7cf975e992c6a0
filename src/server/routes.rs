use crate::{
    error::{ErrorBody, GatewayError},
    models::{HealthResponse, ServiceInfo, SolveJsonRequest, SolveWithKeyRequest},
    solver::Solver,
};
use actix_multipart::{Multipart, MultipartError};
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;

pub const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "POST /solve",
    "POST /solve-json",
    "POST /api/solve-with-key",
];

const UPLOAD_FIELD: &str = "file";

/// Known paths answer other methods with a JSON 405 instead of actix's empty one.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(service_info))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/health")
            .route(web::get().to(health))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/solve")
            .route(web::post().to(solve_upload))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/solve-json")
            .route(web::post().to(solve_json))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/api/solve-with-key")
            .route(web::post().to(solve_with_key))
            .default_service(web::to(method_not_allowed)),
    );
}

async fn service_info() -> HttpResponse {
    HttpResponse::Ok().json(ServiceInfo {
        message: "Vibe Math API - send a photo of a problem, get the answer",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ENDPOINTS.to_vec(),
    })
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "healthy" })
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody {
        detail: "Not Found".to_string(),
    })
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ErrorBody {
        detail: "Method not allowed".to_string(),
    })
}

async fn solve_upload(
    solver: web::Data<Solver>,
    mut payload: Multipart,
) -> Result<HttpResponse, GatewayError> {
    let normalizer = solver.normalizer();

    while let Some(mut field) = payload.try_next().await.map_err(malformed_multipart)? {
        if field.name() != Some(UPLOAD_FIELD) {
            while field.try_next().await.map_err(malformed_multipart)?.is_some() {}
            continue;
        }

        // Reject on the headers before reading anything, then stop reading as
        // soon as the ceiling is crossed.
        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string());
        normalizer.check_media_type(content_type.as_deref())?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed_multipart)? {
            bytes.extend_from_slice(&chunk);
            normalizer.check_size(bytes.len())?;
        }

        log::info!("Received upload ({} bytes)", bytes.len());
        let response = solver
            .solve_upload(&bytes, content_type.as_deref())
            .await?;
        return Ok(HttpResponse::Ok().json(response));
    }

    Err(GatewayError::InvalidRequestShape(format!(
        "Multipart field '{}' is required",
        UPLOAD_FIELD
    )))
}

async fn solve_json(
    solver: web::Data<Solver>,
    body: web::Json<SolveJsonRequest>,
) -> Result<HttpResponse, GatewayError> {
    let response = solver.solve_encoded(&body.image, None).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn solve_with_key(
    solver: web::Data<Solver>,
    body: web::Json<SolveWithKeyRequest>,
) -> Result<HttpResponse, GatewayError> {
    let response = solver
        .solve_encoded(&body.image, Some(&body.api_key))
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

fn malformed_multipart(err: MultipartError) -> GatewayError {
    log::debug!("Rejected multipart body: {}", err);
    GatewayError::InvalidRequestShape("Request must be multipart/form-data with a file".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        credential::{Credential, CredentialResolver},
        error::Result,
        inference::InferenceBackend,
        models::SolveResponse,
        payload::{DataUri, PayloadNormalizer},
        server::json_config,
    };
    use actix_web::{http::header, http::StatusCode, test, App};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    enum Reply {
        Text(&'static str),
        EchoKey,
        Fail(fn() -> GatewayError),
    }

    struct FakeBackend {
        reply: Reply,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeBackend {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn solve(&self, image: &DataUri, credential: &Credential) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((image.to_string(), credential.expose().to_string()));

            match &self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::EchoKey => {
                    // Give the other in-flight request a chance to interleave.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(format!("key={}", credential.expose()))
                }
                Reply::Fail(make) => Err(make()),
            }
        }
    }

    fn solver_with(backend: Arc<FakeBackend>) -> web::Data<Solver> {
        web::Data::new(Solver::new(
            PayloadNormalizer::new(1024),
            CredentialResolver::from_default_key("default-key").unwrap(),
            backend,
        ))
    }

    macro_rules! test_app {
        ($backend:expr) => {
            test::init_service(
                App::new()
                    .app_data(solver_with($backend))
                    .app_data(json_config(1024))
                    .configure(configure_routes)
                    .default_service(web::route().to(not_found)),
            )
            .await
        };
    }

    fn multipart_request(content_type: &str, bytes: &[u8]) -> test::TestRequest {
        let boundary = "vibe-math-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {ct}\r\n\r\n",
                b = boundary,
                ct = content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        test::TestRequest::post()
            .uri("/solve")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_solve_json_returns_answer() {
        let backend = FakeBackend::new(Reply::Text("Answer: 4"));
        let app = test_app!(backend.clone());

        let req = test::TestRequest::post()
            .uri("/solve-json")
            .set_json(json!({"image": "iVBORw0KGgo="}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: SolveResponse = test::read_body_json(resp).await;
        assert_eq!(body.answer, "Answer: 4");
        assert_eq!(backend.call_count(), 1);
    }

    #[actix_web::test]
    async fn test_solve_json_empty_image_is_422_without_upstream_call() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        let req = test::TestRequest::post()
            .uri("/solve-json")
            .set_json(json!({"image": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_solve_json_missing_field_and_bad_json_are_422() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        let req = test::TestRequest::post()
            .uri("/solve-json")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["detail"].is_string());

        let req = test::TestRequest::post()
            .uri("/solve-json")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("invalid json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_solve_json_undecodable_image_is_400() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        let req = test::TestRequest::post()
            .uri("/solve-json")
            .set_json(json!({"image": "data:image/png;base64,@@@"}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"detail": "Invalid image data provided"}));
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_data_uri_and_bare_reach_backend_identically() {
        let backend = FakeBackend::new(Reply::Text("ok"));
        let app = test_app!(backend.clone());

        for image in ["data:image/png;base64,AAAA", "AAAA"] {
            let req = test::TestRequest::post()
                .uri("/solve-json")
                .set_json(json!({ "image": image }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[actix_web::test]
    async fn test_upload_non_image_is_400_without_upstream_call() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        let req = multipart_request("text/plain", b"not an image").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_upload_over_ceiling_is_413() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        let req = multipart_request("image/png", &[7u8; 2048]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_upload_image_uses_default_credential() {
        let backend = FakeBackend::new(Reply::Text("Answer: x = 2"));
        let app = test_app!(backend.clone());

        let req = multipart_request("image/jpeg", &[0xff, 0xd8, 0xff]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: SolveResponse = test::read_body_json(resp).await;
        assert_eq!(body.answer, "Answer: x = 2");

        let calls = backend.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            (
                "data:image/jpeg;base64,/9j/".to_string(),
                "default-key".to_string()
            )
        );
    }

    #[actix_web::test]
    async fn test_upload_without_file_field_is_422() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        let req = test::TestRequest::post()
            .uri("/solve")
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=x"))
            .set_payload("--x--\r\n")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_upstream_failures_map_to_status() {
        let cases: [(fn() -> GatewayError, StatusCode); 4] = [
            (
                || GatewayError::UpstreamRateLimited("429 from upstream".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                || GatewayError::UpstreamUnavailable("connection refused".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                || GatewayError::InternalError("something odd".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                || GatewayError::UpstreamAuthRejected("bad key".into()),
                StatusCode::UNAUTHORIZED,
            ),
        ];

        for (make, expected) in cases {
            let backend = FakeBackend::new(Reply::Fail(make));
            let app = test_app!(backend.clone());

            let req = test::TestRequest::post()
                .uri("/solve-json")
                .set_json(json!({"image": "AAAA"}))
                .to_request();
            let resp = test::call_service(&app, req).await;

            assert_eq!(resp.status(), expected);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert!(body["detail"].is_string());
            assert_eq!(backend.call_count(), 1);
        }
    }

    #[actix_web::test]
    async fn test_solve_with_key_empty_fields_are_422() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        for body in [
            json!({"image": "", "api_key": "k"}),
            json!({"image": "AAAA", "api_key": ""}),
            json!({"image": "AAAA"}),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/solve-with-key")
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_concurrent_keys_do_not_cross() {
        let backend = FakeBackend::new(Reply::EchoKey);
        let app = test_app!(backend.clone());

        let first = test::TestRequest::post()
            .uri("/api/solve-with-key")
            .set_json(json!({"image": "AAAA", "api_key": "key-one"}))
            .to_request();
        let second = test::TestRequest::post()
            .uri("/api/solve-with-key")
            .set_json(json!({"image": "AAAA", "api_key": "key-two"}))
            .to_request();

        let (first, second) = futures::join!(
            test::call_service(&app, first),
            test::call_service(&app, second)
        );

        let first: SolveResponse = test::read_body_json(first).await;
        let second: SolveResponse = test::read_body_json(second).await;
        assert_eq!(first.answer, "key=key-one");
        assert_eq!(second.answer, "key=key-two");

        let mut keys: Vec<String> = backend
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["key-one", "key-two"]);

        // The default credential is unaffected by either call.
        let req = test::TestRequest::post()
            .uri("/solve-json")
            .set_json(json!({"image": "AAAA"}))
            .to_request();
        let resp: SolveResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.answer, "key=default-key");
    }

    #[actix_web::test]
    async fn test_health_is_stable() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        for _ in 0..3 {
            let req = test::TestRequest::get().uri("/health").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({"status": "healthy"}));
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_root_lists_endpoints_and_unknown_path_is_json_404() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend);

        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["message"].is_string());
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["endpoints"].as_array().unwrap().len(), ENDPOINTS.len());

        let req = test::TestRequest::get().uri("/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"detail": "Not Found"}));
    }

    #[actix_web::test]
    async fn test_wrong_method_on_known_path_is_json_405() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        for req in [
            test::TestRequest::get().uri("/solve-json").to_request(),
            test::TestRequest::get().uri("/solve").to_request(),
            test::TestRequest::delete().uri("/api/solve-with-key").to_request(),
            test::TestRequest::post().uri("/health").to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({"detail": "Method not allowed"}));
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_solve_json_body_over_limit_is_413_without_upstream_call() {
        let backend = FakeBackend::new(Reply::Text("unused"));
        let app = test_app!(backend.clone());

        let req = test::TestRequest::post()
            .uri("/solve-json")
            .set_json(json!({"image": "A".repeat(70_000)}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["detail"].is_string());
        assert_eq!(backend.call_count(), 0);
    }
}
