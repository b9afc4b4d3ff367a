//! Case filing against an in-process table API.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use parley_core::TicketingConfig;
use parley_ticketing::{CaseDraft, CaseFiler, SagaStep, TableClient, TicketingError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Instance {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    fail_table: Option<&'static str>,
}

fn authorized(headers: &HeaderMap) -> bool {
    // admin:secret
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Basic YWRtaW46c2VjcmV0")
}

async fn insert(
    State(instance): State<Instance>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "auth"})));
    }
    let n = {
        let mut calls = instance.calls.lock().unwrap();
        calls.push((table.clone(), body));
        calls.len()
    };
    if instance.fail_table == Some(table.as_str()) {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "denied"})));
    }
    let mut result = json!({"sys_id": format!("{table}-{n}")});
    if table == "sn_hr_core_case" {
        result["number"] = json!("HRC0001001");
    }
    (StatusCode::CREATED, Json(json!({"result": result})))
}

async fn fetch(Path((table, id)): Path<(String, String)>) -> (StatusCode, Json<Value>) {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})));
    }
    (
        StatusCode::OK,
        Json(json!({"result": {"sys_id": id, "number": format!("{table}-NUM")}})),
    )
}

async fn spawn(instance: Instance) -> String {
    let app = Router::new()
        .route("/api/now/table/:table", post(insert))
        .route("/api/now/table/:table/:id", get(fetch))
        .with_state(instance);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/now/table")
}

fn filer(base: String) -> CaseFiler {
    let client = TableClient::new(base, "admin", "secret", Duration::from_secs(5)).unwrap();
    CaseFiler::new(Arc::new(client), TicketingConfig::default())
}

fn draft() -> CaseDraft {
    CaseDraft {
        first_name: "Alex".to_string(),
        last_name: "Caller".to_string(),
        email: "alex@example.com".to_string(),
        short_description: "Laptop screen broken".to_string(),
        description: "Alex reports a cracked laptop screen.".to_string(),
        work_notes: "Alex: my laptop screen is broken".to_string(),
    }
}

#[tokio::test]
async fn four_steps_run_in_order_and_chain_ids() {
    let instance = Instance::default();
    let filer = filer(spawn(instance.clone()).await);

    let record = filer.file(&draft()).await.unwrap();
    assert_eq!(record.identity_id, "sys_user-1");
    assert_eq!(record.interaction_id, "interaction-2");
    assert_eq!(record.case_id, "sn_hr_core_case-3");
    assert_eq!(record.link_id, "interaction_related_record-4");
    assert_eq!(record.case_number.as_deref(), Some("HRC0001001"));

    let calls = instance.calls.lock().unwrap();
    let tables: Vec<_> = calls.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        tables,
        vec!["sys_user", "interaction", "sn_hr_core_case", "interaction_related_record"]
    );
    assert_eq!(calls[0].1["first_name"], "Alex");
    assert_eq!(calls[1].1["opened_for"], "sys_user-1");
    assert_eq!(calls[2].1["opened_for"], "sys_user-1");
    assert_eq!(calls[2].1["description"], "Alex reports a cracked laptop screen.");
    assert_eq!(calls[3].1["interaction"], "interaction-2");
    assert_eq!(calls[3].1["document_id"], "sn_hr_core_case-3");
    assert_eq!(calls[3].1["document_table"], "sn_hr_core_case");
}

#[tokio::test]
async fn failure_stops_later_steps() {
    let instance = Instance {
        fail_table: Some("interaction"),
        ..Default::default()
    };
    let filer = filer(spawn(instance.clone()).await);

    let err = filer.file(&draft()).await.unwrap_err();
    assert_eq!(err.step, SagaStep::CreateInteraction);
    assert!(matches!(err.source, TicketingError::Status { status: 403, .. }));
    // the identity stays; nothing after the failed step is attempted
    assert_eq!(instance.calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn wrong_credentials_fail_the_first_step() {
    let base = spawn(Instance::default()).await;
    let client = TableClient::new(base, "admin", "nope", Duration::from_secs(5)).unwrap();
    let filer = CaseFiler::new(Arc::new(client), TicketingConfig::default());

    let err = filer.file(&draft()).await.unwrap_err();
    assert_eq!(err.step, SagaStep::CreateIdentity);
}

#[tokio::test]
async fn case_number_lookup() {
    let filer = filer(spawn(Instance::default()).await);
    assert_eq!(
        filer.case_number("abc").await.unwrap().as_deref(),
        Some("sn_hr_core_case-NUM")
    );
    assert!(filer.case_number("missing").await.is_err());
}
