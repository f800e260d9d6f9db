use actix_web::{web, HttpResponse};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::account::{AccountService, NewPaymentMethod, PaymentMethodType};
use crate::domain::order::{
    ChangeStatus, OrderCriteria, OrderEngine, OrderLine, OrderQueryService, OrderStatus, PlaceOrder,
    RequestedScope,
};
use crate::domain::review::{NewReview, ReviewChanges, ReviewService};
use crate::metrics::Metrics;
use crate::store::Store;
use super::error::{ApiError, Result};
use super::identity::Identity;

/// Application state shared by every worker
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub orders: OrderEngine,
    pub queries: OrderQueryService,
    pub accounts: AccountService,
    pub reviews: ReviewService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, metrics: Arc<Metrics>) -> Self {
        Self {
            orders: OrderEngine::new(store.clone(), metrics),
            queries: OrderQueryService::new(store.clone()),
            accounts: AccountService::new(store.clone()),
            reviews: ReviewService::new(store.clone()),
            store,
        }
    }
}

/// Mount every `/api` route plus extractor error handlers
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::validation(format!("invalid JSON body: {}", err)).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::validation(format!("invalid query string: {}", err)).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::not_found("NotFound", format!("invalid path: {}", err)).into()),
    )
    .service(
        web::scope("/api")
            .service(
                web::resource("/orders")
                    .route(web::post().to(create_order))
                    .route(web::get().to(list_orders)),
            )
            .service(
                web::resource("/orders/{id}")
                    .route(web::get().to(get_order))
                    .route(web::put().to(update_order_status)),
            )
            .service(web::resource("/users/addresses").route(web::get().to(list_addresses)))
            .service(
                web::resource("/users/payment-methods")
                    .route(web::get().to(list_payment_methods))
                    .route(web::post().to(add_payment_method)),
            )
            .service(
                web::resource("/reviews/products/{product_id}")
                    .route(web::get().to(list_reviews))
                    .route(web::post().to(create_review)),
            )
            .service(
                web::resource("/reviews/{id}")
                    .route(web::put().to(update_review))
                    .route(web::delete().to(delete_review)),
            ),
    );
}

// ============================================================================
// Order Endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLine>,
    pub shipping_address_id: Uuid,
    #[serde(rename = "payment_method")]
    pub payment_method_id: Uuid,
}

/// POST /api/orders
pub async fn create_order(
    Identity(user): Identity,
    state: web::Data<AppState>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let order = state
        .orders
        .create_order(
            &user,
            PlaceOrder {
                items: body.items,
                shipping_address_id: body.shipping_address_id,
                payment_method_id: body.payment_method_id,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(order))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub scope: Option<String>,
}

/// GET /api/orders
pub async fn list_orders(
    Identity(user): Identity,
    state: web::Data<AppState>,
    query: web::Query<ListOrdersQuery>,
) -> Result<HttpResponse> {
    let criteria = criteria_from_query(&query)?;
    let orders = state.queries.list_orders(&user, criteria).await?;
    Ok(HttpResponse::Ok().json(orders))
}

/// GET /api/orders/{id}
pub async fn get_order(
    Identity(user): Identity,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let order = state.queries.get_order(&user, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
}

/// PUT /api/orders/{id}
pub async fn update_order_status(
    Identity(user): Identity,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let order = state
        .orders
        .update_status(
            &user,
            ChangeStatus {
                order_id: path.into_inner(),
                status: body.status,
                note: body.note,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(order))
}

fn criteria_from_query(query: &ListOrdersQuery) -> Result<OrderCriteria> {
    let scope = match query.scope.as_deref() {
        None | Some("own") => RequestedScope::Own,
        Some("seller") => RequestedScope::Seller,
        Some("all") => RequestedScope::All,
        Some(other) => return Err(ApiError::validation(format!("unknown scope: {}", other))),
    };

    let status = query
        .status
        .as_deref()
        .map(|raw| raw.parse::<OrderStatus>().map_err(ApiError::validation))
        .transpose()?;

    let from = query
        .from_date
        .as_deref()
        .map(|raw| parse_date_bound("from_date", raw, DayEdge::Start))
        .transpose()?;
    let to = query
        .to_date
        .as_deref()
        .map(|raw| parse_date_bound("to_date", raw, DayEdge::End))
        .transpose()?;

    Ok(OrderCriteria { scope, status, from, to })
}

#[derive(Debug, Clone, Copy)]
enum DayEdge {
    Start,
    End,
}

/// RFC 3339 timestamps are taken as-is; plain dates cover the whole UTC day
fn parse_date_bound(field: &str, raw: &str, edge: DayEdge) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let invalid = || ApiError::validation(format!("{} must be YYYY-MM-DD or RFC 3339, got {:?}", field, raw));
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    let moment = match edge {
        DayEdge::Start => date.and_hms_opt(0, 0, 0),
        DayEdge::End => date.and_hms_nano_opt(23, 59, 59, 999_999_999),
    };

    moment.map(|m| m.and_utc()).ok_or_else(invalid)
}

// ============================================================================
// Account Endpoints
// ============================================================================

/// GET /api/users/addresses
pub async fn list_addresses(Identity(user): Identity, state: web::Data<AppState>) -> Result<HttpResponse> {
    let addresses = state.accounts.list_addresses(&user).await?;
    Ok(HttpResponse::Ok().json(addresses))
}

/// GET /api/users/payment-methods
pub async fn list_payment_methods(Identity(user): Identity, state: web::Data<AppState>) -> Result<HttpResponse> {
    let methods = state.accounts.list_payment_methods(&user).await?;
    Ok(HttpResponse::Ok().json(methods))
}

#[derive(Debug, Deserialize)]
pub struct AddPaymentMethodRequest {
    #[serde(rename = "type")]
    pub method_type: PaymentMethodType,
    pub last_four: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// POST /api/users/payment-methods
pub async fn add_payment_method(
    Identity(user): Identity,
    state: web::Data<AppState>,
    body: web::Json<AddPaymentMethodRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let method = state
        .accounts
        .add_payment_method(
            &user,
            NewPaymentMethod {
                method_type: body.method_type,
                last_four: body.last_four,
                is_default: body.is_default,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(method))
}

// ============================================================================
// Review Endpoints
// ============================================================================

/// GET /api/reviews/products/{product_id} - public
pub async fn list_reviews(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let reviews = state.reviews.list_product_reviews(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reviews))
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i16,
    pub comment: Option<String>,
}

/// POST /api/reviews/products/{product_id}
pub async fn create_review(
    Identity(user): Identity,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<CreateReviewRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let review = state
        .reviews
        .create_review(
            &user,
            path.into_inner(),
            NewReview {
                rating: body.rating,
                comment: body.comment,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(review))
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

/// PUT /api/reviews/{id}
pub async fn update_review(
    Identity(user): Identity,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateReviewRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let review = state
        .reviews
        .update_review(
            &user,
            path.into_inner(),
            ReviewChanges {
                rating: body.rating,
                comment: body.comment,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(review))
}

/// DELETE /api/reviews/{id}
pub async fn delete_review(
    Identity(user): Identity,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let review_id = path.into_inner();
    state.reviews.delete_review(&user, review_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Review deleted",
        "id": review_id
    })))
}

// ============================================================================
// Unit Tests
// ============================================================================
