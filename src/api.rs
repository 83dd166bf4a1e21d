use {
    crate::{
        auction::service::Service as AuctionService,
        auth::{
            Claims,
            TokenIssuer,
        },
        config::RunOptions,
        kernel::entities::Page,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        user::service::Service as UserService,
    },
    anyhow::Result,
    async_trait::async_trait,
    axum::{
        http::{
            header,
            request::Parts,
            HeaderMap,
            StatusCode,
        },
        extract::FromRequestParts,
        response::{
            IntoResponse,
            Response,
        },
        routing::{
            get,
            post,
        },
        Json,
        Router,
    },
    axum_prometheus::PrometheusMetricLayer,
    bigdecimal::{
        BigDecimal,
        Zero,
    },
    clap::crate_version,
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        str::FromStr,
        sync::{
            atomic::Ordering,
            Arc,
        },
    },
    tower_http::cors::CorsLayer,
};

pub mod auction;
pub mod auth;
pub mod bid;
pub mod category;
pub mod ws;

/// Failure taxonomy for the whole surface. Business-rule and validation
/// failures are ordinary outcomes carried in the response envelope; only
/// `Unknown` hides an unanticipated error behind a generic message.
#[derive(Clone, Debug, PartialEq)]
pub enum RestError {
    /// Field-level problems with the request body or parameters.
    Validation(Vec<String>),
    /// A well-formed request the auction rules refuse.
    BusinessRule(String),
    /// The bid did not reach the minimum the auction currently requires.
    BidTooLow { minimum: BigDecimal },
    Unauthorized,
    AuctionNotFound,
    CategoryNotFound,
    /// The entity changed while the request was in flight; retry.
    Conflict,
    /// The per-auction lock could not be acquired within the wait budget.
    ServerBusy,
    TemporarilyUnavailable,
    Unknown,
}

impl RestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::Validation(_)
            | RestError::BusinessRule(_)
            | RestError::BidTooLow { .. } => StatusCode::BAD_REQUEST,
            RestError::Unauthorized => StatusCode::UNAUTHORIZED,
            RestError::AuctionNotFound | RestError::CategoryNotFound => StatusCode::NOT_FOUND,
            RestError::Conflict => StatusCode::CONFLICT,
            RestError::ServerBusy | RestError::TemporarilyUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RestError::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RestError::Validation(_) => "Validation failed".to_string(),
            RestError::BusinessRule(message) => message.clone(),
            RestError::BidTooLow { minimum } => {
                format!("Bid must be at least {}", minimum)
            }
            RestError::Unauthorized => "Missing or invalid credentials".to_string(),
            RestError::AuctionNotFound => "Auction not found".to_string(),
            RestError::CategoryNotFound => "Category not found".to_string(),
            RestError::Conflict => {
                "The auction changed while processing your request; please retry".to_string()
            }
            RestError::ServerBusy => "Server busy, please retry".to_string(),
            RestError::TemporarilyUnavailable => {
                "This service is temporarily unavailable".to_string()
            }
            RestError::Unknown => "An unexpected error occurred".to_string(),
        }
    }

    fn errors(&self) -> Option<Vec<String>> {
        match self {
            RestError::Validation(errors) => Some(errors.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Display for RestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            message: Some(self.message()),
            data:    None,
            errors:  self.errors(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Uniform envelope for every HTTP response body.
#[derive(Serialize, Clone, Debug)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: Option<String>,
    pub data:    Option<T>,
    pub errors:  Option<Vec<String>>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data:    Some(data),
            errors:  None,
        })
    }

    pub fn with_message(data: T, message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data:    Some(data),
            errors:  None,
        })
    }
}

impl ApiResponse<()> {
    pub fn message_only(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data:    None,
            errors:  None,
        })
    }
}

pub struct ServerState {
    pub auction_service:          AuctionService,
    pub user_service:             UserService,
    pub token_issuer:             Arc<TokenIssuer>,
    pub ws:                       ws::WsState,
    pub requester_ip_header_name: String,
}

/// Extracts and verifies the bearer access token of the caller.
pub struct Auth(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<ServerState>> for Auth {
    type Rejection = RestError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(RestError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(RestError::Unauthorized)?;
        let claims = state
            .token_issuer
            .verify(token)
            .ok_or(RestError::Unauthorized)?;
        Ok(Auth(claims))
    }
}

/// Monetary amounts arrive as strings and must be exact two-decimal
/// values; floating point never enters the pipeline.
pub fn parse_money(field: &str, value: &str) -> Result<BigDecimal, RestError> {
    let amount = BigDecimal::from_str(value.trim()).map_err(|_| {
        RestError::Validation(vec![format!("{} must be a decimal number", field)])
    })?;
    if amount <= BigDecimal::zero() {
        return Err(RestError::Validation(vec![format!(
            "{} must be positive",
            field
        )]));
    }
    if amount.fractional_digit_count() > 2 {
        return Err(RestError::Validation(vec![format!(
            "{} must have at most 2 decimal places",
            field
        )]));
    }
    Ok(amount.with_scale(2))
}

pub const MAX_SOURCE_ADDRESS_LENGTH: usize = 45;

/// Source address of the caller from the configured proxy header, bounded
/// to what the store accepts. Recorded on bids verbatim, nothing more.
pub fn requester_ip(state: &ServerState, headers: &HeaderMap) -> Option<String> {
    headers
        .get(&state.requester_ip_header_name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| {
            let trimmed = value.trim();
            trimmed.chars().take(MAX_SOURCE_ADDRESS_LENGTH).collect()
        })
        .filter(|value: &String| !value.is_empty())
}

#[derive(Deserialize, Clone, Debug)]
pub struct PageParams {
    pub page:      Option<u32>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u32>,
}

impl PageParams {
    pub fn to_page(&self) -> Page {
        Page::new(self.page, self.page_size)
    }
}

async fn root() -> String {
    format!("Gavel Auction Server API {}", crate_version!())
}

pub async fn start_api(
    run_options: RunOptions,
    state: Arc<ServerState>,
    metric_layer: PrometheusMetricLayer<'static>,
) -> Result<()> {
    let app: Router = Router::new()
        .route("/", get(root))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh-token", post(auth::refresh_token))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/auctions",
            get(auction::list_active).post(auction::create),
        )
        .route("/api/auctions/my-auctions", get(auction::my_auctions))
        .route("/api/auctions/my-bids", get(bid::my_bids))
        .route(
            "/api/auctions/category/:category_id",
            get(auction::by_category),
        )
        .route(
            "/api/auctions/:auction_id",
            get(auction::get_detail).delete(auction::cancel),
        )
        .route("/api/auctions/:auction_id/activate", post(auction::activate))
        .route(
            "/api/auctions/:auction_id/bids",
            get(bid::get_history).post(bid::place_bid),
        )
        .route(
            "/api/categories",
            get(category::list).post(category::create),
        )
        .route("/api/categories/:category_id", get(category::get))
        .route("/hubs/auction", get(ws::ws_route_handler))
        .layer(CorsLayer::permissive())
        .layer(metric_layer)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&run_options.server.listen_addr).await?;
    tracing::info!(
        listen_addr = %run_options.server.listen_addr,
        "Starting API server..."
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down API server...");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_money_accepts_two_decimal_amounts() {
        assert_eq!(
            parse_money("amount", "100").unwrap(),
            BigDecimal::from_str("100.00").unwrap()
        );
        assert_eq!(
            parse_money("amount", " 105.50 ").unwrap(),
            BigDecimal::from_str("105.50").unwrap()
        );
    }

    #[test]
    fn parse_money_rejects_bad_input() {
        assert!(parse_money("amount", "abc").is_err());
        assert!(parse_money("amount", "0").is_err());
        assert!(parse_money("amount", "-5.00").is_err());
        assert!(parse_money("amount", "1.999").is_err());
    }

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        assert_eq!(
            RestError::Validation(vec![]).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RestError::BidTooLow {
                minimum: BigDecimal::from_str("10.00").unwrap()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(RestError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RestError::AuctionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(RestError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            RestError::ServerBusy.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RestError::Unknown.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
