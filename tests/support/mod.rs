#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ipo_pilot::api::{
    DepositoryClient, HttpRequest, HttpResponse, HttpTransport, RetryPolicy,
    RetryableFetchClient, SubmissionClient,
};
use ipo_pilot::core::TransportError;
use ipo_pilot::monitoring::records::{NewSource, SourceKind};
use ipo_pilot::monitoring::{RecordStore, SessionContext, SqliteRecordStore};
use ipo_pilot::profiles::{NewProfile, ProfileManager};
use ipo_pilot::scanner::{Aggregator, SourceRegistry};

pub const BASE: &str = "http://depository.test/api/meroShare";
pub const FEED: &str = "http://results.test";

pub type Reply = Result<HttpResponse, TransportError>;

/// In-process transport answering from per-route scripts. The last reply of
/// a route repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, url: impl Into<String>, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.into()))
            .or_default()
            .push_back(reply);
    }

    pub fn ok(&self, method: Method, url: impl Into<String>, status: u16, body: &str) {
        self.on(
            method,
            url,
            Ok(HttpResponse::new(StatusCode::from_u16(status).unwrap(), body)),
        );
    }

    /// Every reply is held back this long.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(request.method.clone(), request.url.clone())) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) if !script.is_empty() => script[0].clone(),
            _ => Err(TransportError::Connect(format!(
                "no route for {} {}",
                request.method, request.url
            ))),
        }
    }
}

/// Scripts a depository that accepts the login of `new_profile`.
pub fn script_login(transport: &ScriptedTransport) {
    transport.ok(
        Method::GET,
        format!("{}/capital/", BASE),
        200,
        r#"[{"id":128,"code":"13700","name":"Example Capital"}]"#,
    );
    transport.on(
        Method::POST,
        format!("{}/auth/", BASE),
        Ok(HttpResponse::new(StatusCode::OK, "{}").with_header("Authorization", "tok-1")),
    );
    transport.ok(
        Method::GET,
        format!("{}/ownDetail/", BASE),
        200,
        r#"{"demat":"1301370000000001","boid":"00000001","name":"Alice"}"#,
    );
    transport.ok(
        Method::GET,
        format!("{}/bank/44", BASE),
        200,
        r#"[{"accountNumber":"0010","accountBranchId":3,"accountTypeId":1,"id":9}]"#,
    );
}

pub fn issues_url() -> String {
    format!("{}/companyShare/applicableIssue/", BASE)
}

pub fn apply_url() -> String {
    format!("{}/applicantForm/share/apply", BASE)
}

pub fn new_profile(name: &str) -> NewProfile {
    NewProfile {
        name: name.to_string(),
        dpid: "13700".to_string(),
        boid: "00000001".to_string(),
        password: "hunter2".to_string(),
        transaction_pin: "1234".to_string(),
        crn: "CRN-77".to_string(),
        default_bank_id: 44,
        default_quantity: None,
        ask_for_quantity: false,
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        backoff_step: Duration::from_millis(1),
    }
}

pub struct Harness {
    pub store: Arc<dyn RecordStore>,
    pub transport: Arc<ScriptedTransport>,
    pub context: SessionContext,
}

impl Harness {
    pub async fn new() -> Self {
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::in_memory().await.unwrap());
        let transport = ScriptedTransport::new();

        let fetcher = RetryableFetchClient::new(transport.clone(), fast_policy());
        let aggregator = Aggregator::new(
            store.clone(),
            fetcher.clone(),
            Arc::new(SourceRegistry::with_defaults()),
        );

        let context = SessionContext {
            store: store.clone(),
            profiles: ProfileManager::new(store.clone()),
            depository: DepositoryClient::new(fetcher, BASE),
            submissions: SubmissionClient::new(transport.clone(), BASE),
            aggregator,
        };

        Self {
            store,
            transport,
            context,
        }
    }

    pub async fn add_native_source(&self) -> i64 {
        self.store
            .insert_source(NewSource {
                name: "depository".to_string(),
                kind: SourceKind::NativeDepository,
                base_url: BASE.to_string(),
                api_key: None,
                is_active: true,
                priority: 10,
                description: None,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn add_profile(&self, name: &str) -> i64 {
        self.context
            .profiles
            .create(new_profile(name))
            .await
            .unwrap()
            .id
    }
}
