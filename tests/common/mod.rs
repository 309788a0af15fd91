#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_orders::{
    auth::{AuthConfig, AuthService, AuthUser},
    config::AppConfig,
    db,
    entities::{
        order::ShippingAddress,
        product_variant::{self, Size},
        user::{self, UserRole},
        user_address,
    },
    events::{Event, EventSender},
    handlers::AppServices,
    notifications::{EmailMessage, Mailer, NotificationError},
    services::{
        cart::{AddCartItem, CartView},
        inventory,
        payment_gateway::{
            GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway, SignatureVerifier,
        },
    },
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const GATEWAY_SECRET: &str = "test_gateway_secret_for_signatures";
pub const ADMIN_EMAIL: &str = "ops@storefront.test";

/// Payment gateway double that records every order request.
#[derive(Default)]
pub struct StubGateway {
    requests: Mutex<Vec<GatewayOrderRequest>>,
    fail: AtomicBool,
}

impl StubGateway {
    pub fn fail_next_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<GatewayOrderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        request: GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 503,
                body: "gateway unavailable".to_string(),
            });
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(GatewayOrder {
            id: format!("order_test_{}", requests.len()),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: "created".to_string(),
        })
    }
}

/// Mailer double that keeps every message it is asked to deliver.
/// While `fail_deliveries(true)` is set it rejects messages instead.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failed: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn failed(&self) -> Vec<EmailMessage> {
        self.failed.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects_to(&self, to: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == to)
            .map(|m| m.subject)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            self.failed.lock().unwrap().push(message);
            return Err(NotificationError::Rejected(502));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Helper harness for spinning up an application state backed by a
/// throwaway SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    pub mailer: Arc<RecordingMailer>,
    events: Arc<Mutex<Vec<Event>>>,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_key_id = "rzp_test_key".to_string();
        cfg.payment_key_secret = GATEWAY_SECRET.to_string();
        cfg.admin_email = ADMIN_EMAIL.to_string();
        cfg.api_default_page_size = 10;
        cfg.api_max_page_size = 100;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_sender, mut event_rx) = EventSender::channel(256);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let event_task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                sink.lock().unwrap().push(event);
            }
        });

        let gateway = Arc::new(StubGateway::default());
        let mailer = Arc::new(RecordingMailer::default());

        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            &cfg,
            gateway.clone(),
            mailer.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            auth,
            services,
        };

        Self {
            router: storefront_orders::build_router(state.clone()),
            state,
            gateway,
            mailer,
            events,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Waits briefly for the event consumer to catch up.
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    pub async fn seed_user(&self, name: &str, role: UserRole) -> user::Model {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4().simple())),
            phone: Set(None),
            role: Set(role),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_customer(&self, name: &str) -> (user::Model, AuthUser) {
        let user = self.seed_user(name, UserRole::Customer).await;
        let actor = AuthUser::customer(user.id);
        (user, actor)
    }

    pub async fn seed_admin(&self) -> (user::Model, AuthUser) {
        let user = self.seed_user("Admin", UserRole::Admin).await;
        let actor = AuthUser::admin(user.id);
        (user, actor)
    }

    pub async fn seed_address(&self, user_id: Uuid, city: &str, is_default: bool) -> user_address::Model {
        user_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            house_number: Set("12B".to_string()),
            street: Set("Lake Road".to_string()),
            colony: Set("Green Park".to_string()),
            city: Set(city.to_string()),
            state: Set("Karnataka".to_string()),
            country: Set("India".to_string()),
            postal_code: Set("560001".to_string()),
            is_default: Set(is_default),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
    }

    /// Seeds a variant with the given on-hand quantity per size.
    pub async fn seed_variant(&self, price: Decimal, stock: &[(Size, i32)]) -> product_variant::Model {
        let now = Utc::now();
        let variant = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_name: Set("Classic Tee".to_string()),
            color_name: Set("Navy".to_string()),
            sku: Set(format!("TEE-{}", Uuid::new_v4().simple())),
            price: Set(price),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed variant");

        for (size, quantity) in stock {
            inventory::restock(&*self.state.db, variant.id, *size, *quantity)
                .await
                .expect("seed stock");
        }
        variant
    }

    pub async fn add_to_cart(
        &self,
        actor: &AuthUser,
        variant_id: Uuid,
        size: Size,
        quantity: i32,
    ) -> CartView {
        self.state
            .services
            .carts
            .add_item(
                actor,
                AddCartItem {
                    variant_id,
                    size,
                    quantity,
                },
            )
            .await
            .expect("add item to cart")
    }

    pub async fn stock(&self, variant_id: Uuid, size: Size) -> i32 {
        inventory::available(&*self.state.db, variant_id, size)
            .await
            .expect("read stock")
    }

    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        SignatureVerifier::new(GATEWAY_SECRET)
            .sign(gateway_order_id, gateway_payment_id)
            .expect("sign payment")
    }

    pub fn token_for(&self, actor: &AuthUser) -> String {
        self.state.auth.issue_token(actor).expect("issue token")
    }

    pub fn sample_address() -> ShippingAddress {
        ShippingAddress {
            house_number: "7".to_string(),
            street: "MG Road".to_string(),
            colony: "Indiranagar".to_string(),
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            country: "India".to_string(),
            postal_code: "560038".to_string(),
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is json")
    };
    (status, json)
}
