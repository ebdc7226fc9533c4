#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use quote_engine::{
    build_router,
    config::AppConfig,
    events,
    integrations::{
        InMemoryInventory, InMemoryProductCatalog, InMemoryPurchaseOrders, InMemorySalesOrders,
    },
    models::{NewLineItem, Quote},
    repositories::InMemoryQuoteStore,
    services::{quotes::CreateQuote, Backends, ServiceContainer},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Application wired against the in-memory backends, keeping concrete handles so tests
/// can seed stock and inspect the documents the engine produced.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub quotes: Arc<InMemoryQuoteStore>,
    pub inventory: Arc<InMemoryInventory>,
    pub sales_orders: Arc<InMemorySalesOrders>,
    pub purchase_orders: Arc<InMemoryPurchaseOrders>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig {
            environment: "test".to_string(),
            ..AppConfig::default()
        })
    }

    pub fn with_config(cfg: AppConfig) -> Self {
        let quotes = Arc::new(InMemoryQuoteStore::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let sales_orders = Arc::new(InMemorySalesOrders::new(
            cfg.sales_order_number_prefix.clone(),
        ));
        let purchase_orders = Arc::new(InMemoryPurchaseOrders::new(
            cfg.purchase_order_number_prefix.clone(),
        ));

        let backends = Backends {
            quotes: quotes.clone(),
            catalog: Arc::new(InMemoryProductCatalog::new()),
            inventory: inventory.clone(),
            sales_orders: sales_orders.clone(),
            purchase_orders: purchase_orders.clone(),
        };

        let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = ServiceContainer::new(backends, (&cfg).into(), event_sender);
        let state = AppState {
            db: None,
            config: Arc::new(cfg),
            services,
        };

        Self {
            router: build_router(state.clone()),
            state,
            quotes,
            inventory,
            sales_orders,
            purchase_orders,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Sends `body` verbatim as a JSON request.
    pub async fn request_raw(&self, method: Method, uri: &str, body: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Stocks `quantity` of `product_id` at a fresh location.
    pub fn stock(&self, product_id: Uuid, quantity: Decimal) {
        self.inventory
            .set_available(product_id, Uuid::new_v4(), quantity);
    }

    pub async fn draft_quote(&self, lines: Vec<NewLineItem>) -> Quote {
        self.state
            .services
            .quotes
            .create_quote(CreateQuote {
                contact_id: Uuid::new_v4(),
                currency: None,
                quote_date: None,
                valid_until: None,
                estimated_eta: None,
                notes: None,
                lines,
            })
            .await
            .expect("quote is created")
    }

    pub async fn accepted_quote(&self, lines: Vec<NewLineItem>) -> Quote {
        let quote = self.draft_quote(lines).await;
        let quotes = &self.state.services.quotes;
        quotes.send_quote(quote.id).await.expect("quote is sent");
        quotes.accept_quote(quote.id).await.expect("quote is accepted")
    }
}

pub fn line(product_id: Uuid, quantity: Decimal, unit_price: Decimal) -> NewLineItem {
    NewLineItem {
        product_id,
        description: None,
        quantity,
        unit_price,
        discount_amount: None,
        tax_amount: None,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
