mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use common::{ExhaustedExecutor, MemoryExecutor, TEST_KEY};
use entregas::db::{Database, Engine};
use entregas::router::{EntregasState, entregas_router};
use entregas::service::DeliveryService;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(engine: Engine) -> (Router, MemoryExecutor) {
    let mem = MemoryExecutor::new(engine);
    let state = EntregasState::new(DeliveryService::new(mem.database()), Arc::from(TEST_KEY));
    (entregas_router(state), mem)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TEST_KEY}"));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn sample() -> Value {
    json!({
        "cliente": "Ana <b>Pérez</b>",
        "direccion": "Av. Providencia 1234",
        "comuna": "Providencia",
        "region": "Metropolitana",
        "telefono": "+56 9 1234 5678",
        "email": "ana@correo.cl",
        "producto": "Caja mediana"
    })
}

#[tokio::test]
async fn health_and_index_are_public() {
    let (app, _) = app(Engine::MsSql);

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["engine"], "mssql");

    let (status, body) = send(&app, Request::builder().uri("/api").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"]["deliveries"].is_string());
}

#[tokio::test]
async fn rut_endpoint_validates_and_formats() {
    let (app, _) = app(Engine::MySql);

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/rut/12345678-5").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": true, "formatted": "12.345.678-5" }));

    let (_, body) = send(
        &app,
        Request::builder().uri("/api/rut/12345678-9").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn delivery_routes_require_the_key() {
    let (app, _) = app(Engine::MySql);

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/deliveries").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert!(body["message"].as_str().is_some_and(|m| m.starts_with("Acceso denegado")));

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/api/deliveries")
            .header("x-api-key", "wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Request::builder()
            .uri(format!("/api/deliveries?key={TEST_KEY}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn delivery_lifecycle_behaves_the_same_on_both_engines() {
    for engine in [Engine::MySql, Engine::MsSql] {
        let (app, mem) = app(engine);

        let (status, body) = send(&app, authed("POST", "/api/deliveries", Some(sample()))).await;
        assert_eq!(status, StatusCode::CREATED, "{engine}: {body}");
        let id = body["data"]["id"].as_i64().unwrap();
        assert_eq!(body["data"]["cliente"], "Ana bPérez/b");
        assert_eq!(body["data"]["estado"], "proceso");
        assert_eq!(body["message"], "Entrega creada exitosamente");

        let (status, body) = send(
            &app,
            authed("PUT", &format!("/api/deliveries/{id}"), Some(json!({ "estado": "entregado" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{engine}: {body}");
        assert_eq!(body["data"]["estado"], "entregado");
        assert_eq!(body["message"], "Entrega actualizada exitosamente");
        assert_eq!(body["data"]["comuna"], "Providencia");
        assert!(body["data"]["fecha_actualizacion"].is_string());

        let (status, body) = send(&app, authed("GET", "/api/deliveries?estado=entregado", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, body) = send(&app, authed("GET", "/api/deliveries?estado=proceso", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        let (status, body) =
            send(&app, authed("DELETE", &format!("/api/deliveries/{id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "message": "Entrega eliminada exitosamente" }));
        assert_eq!(mem.row_count(), 0);

        let (status, body) = send(&app, authed("GET", &format!("/api/deliveries/{id}"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{engine}");
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "Entrega no encontrada");
    }
}

#[tokio::test]
async fn invalid_input_is_rejected_before_storage() {
    let (app, mem) = app(Engine::MySql);

    let (status, body) = send(
        &app,
        authed("POST", "/api/deliveries", Some(json!({ "cliente": "Ana" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(body["message"], "Cliente, dirección, comuna y región son requeridos");

    let mut bad_email = sample();
    bad_email["email"] = json!("not-an-email");
    let (status, body) = send(&app, authed("POST", "/api/deliveries", Some(bad_email))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email inválido");

    let (status, _) = send(
        &app,
        authed("GET", "/api/deliveries?fecha_desde=yesterday", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(mem.row_count(), 0);
    assert!(mem.executed().is_empty());
}

#[tokio::test]
async fn missing_delivery_is_not_found() {
    let (app, _) = app(Engine::MsSql);

    let (status, _) = send(&app, authed("DELETE", "/api/deliveries/99", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        authed("PUT", "/api/deliveries/99", Some(json!({ "estado": "entregado" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn communes_and_unknown_routes() {
    let (app, _) = app(Engine::MySql);

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/comunas").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["data"][0]["region_nombre"], "Metropolitana");

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/nope").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "success": false, "code": "NOT_FOUND", "message": "Ruta no encontrada" }));
}

#[tokio::test]
async fn exhausted_pool_is_a_generic_server_error() {
    let db = Database::with_executor(
        Arc::new(ExhaustedExecutor(Engine::MySql)),
        std::time::Duration::from_secs(1),
    );
    let app = entregas_router(EntregasState::new(DeliveryService::new(db), Arc::from(TEST_KEY)));

    let (status, body) = send(&app, authed("GET", "/api/deliveries", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "success": false, "code": "INTERNAL_ERROR", "message": "Error interno del servidor" })
    );
}
