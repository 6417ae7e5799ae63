//! Scripted API server for tests: answers requests in order and records them.

use hyper::{Body, Request, Response};
use kube::Client;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower_test::mock;

pub struct Exchange {
    method: &'static str,
    path: String,
    status: u16,
    body: Value,
}

impl Exchange {
    pub fn ok(method: &'static str, path: &str, body: Value) -> Self {
        Self {
            method,
            path: path.to_string(),
            status: 200,
            body,
        }
    }

    pub fn status(method: &'static str, path: &str, code: u16, reason: &str, message: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            status: code,
            body: json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": message,
                "reason": reason,
                "code": code
            }),
        }
    }

    pub fn not_found(method: &'static str, path: &str) -> Self {
        Self::status(method, path, 404, "NotFound", "not found")
    }
}

#[derive(Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: Option<Value>,
}

/// Client backed by `script`. The returned task yields every request seen.
pub fn serve(script: Vec<Exchange>) -> (Client, JoinHandle<Vec<Recorded>>) {
    let (service, mut handle) = mock::pair::<Request<Body>, Response<Body>>();
    let server = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for exchange in script {
            let (request, send) = handle
                .next_request()
                .await
                .expect("client issued fewer requests than scripted");
            assert_eq!(request.method().as_str(), exchange.method);
            assert_eq!(request.uri().path(), exchange.path);

            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let query = request.uri().query().unwrap_or_default().to_string();
            let bytes = hyper::body::to_bytes(request.into_body()).await.unwrap();
            let body = (!bytes.is_empty()).then(|| serde_json::from_slice(&bytes).unwrap());
            recorded.push(Recorded {
                method,
                path,
                query,
                body,
            });

            send.send_response(
                Response::builder()
                    .status(exchange.status)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&exchange.body).unwrap()))
                    .unwrap(),
            );
        }
        recorded
    });
    (Client::new(service, "default"), server)
}

pub fn pod_list(pods: &[(&str, &str)]) -> Value {
    let items: Vec<Value> = pods
        .iter()
        .map(|(namespace, name)| {
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": { "name": name, "namespace": namespace }
            })
        })
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "PodList",
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
}

pub fn success_status() -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Success",
        "code": 201
    })
}
