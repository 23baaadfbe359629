#![allow(dead_code)]

use async_trait::async_trait;
use maintdash::auth::{AuthSession, MemorySessionStore};
use maintdash::config::InvalidationPolicy;
use maintdash::navigation::{Navigator, Route};
use maintdash::types::ApiRequest;
use maintdash::{ApiResult, ApiSuccess, Backend, ErrorInfo, RequestClient};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Remembers every navigation request
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

type Reply = ApiResult<Value>;

/// Backend whose answers are scripted per key and optionally held back
///
/// The key is the bearer token for authenticated requests and the `code`
/// payload field for the OAuth exchange. Unknown keys get a network error.
#[derive(Default)]
pub struct GatedBackend {
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: AtomicUsize,
}

impl GatedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, key: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(key.to_string(), reply);
    }

    /// Hold the reply for `key` until the returned sender fires
    pub fn gate(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(key.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for GatedBackend {
    async fn request(&self, request: ApiRequest) -> ApiResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = match &request.token {
            Some(token) => token.clone(),
            None => request
                .payload
                .as_ref()
                .and_then(|payload| payload["code"].as_str())
                .unwrap_or_default()
                .to_string(),
        };

        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.replies
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(ErrorInfo::network("connection refused")))
    }
}

pub fn profile(username: &str) -> Reply {
    Ok(ApiSuccess {
        message: "Successfully authorized the user.".to_string(),
        status_code: 200,
        data: serde_json::json!({ "username": username }),
    })
}

pub fn token(token: &str) -> Reply {
    Ok(ApiSuccess {
        message: "Successfully authenticated.".to_string(),
        status_code: 200,
        data: serde_json::json!({ "token": token }),
    })
}

pub struct Harness {
    pub backend: Arc<GatedBackend>,
    pub store: Arc<MemorySessionStore>,
    pub navigator: Arc<RecordingNavigator>,
    pub client: RequestClient,
    pub session: AuthSession,
}

pub fn harness(store: MemorySessionStore, policy: InvalidationPolicy) -> Harness {
    let backend = GatedBackend::new();
    let store = Arc::new(store);
    let navigator = Arc::new(RecordingNavigator::default());
    let client = RequestClient::new(backend.clone());
    let session = AuthSession::builder(client.clone(), store.clone())
        .navigator(navigator.clone())
        .policy(policy)
        .build();

    Harness {
        backend,
        store,
        navigator,
        client,
        session,
    }
}
