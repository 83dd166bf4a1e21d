use {
    crate::{
        api::{
            bid::BidResponse,
            parse_money,
            ApiResponse,
            Auth,
            PageParams,
            RestError,
            ServerState,
        },
        auction::{
            entities,
            service::{
                activate_auction::ActivateAuctionInput,
                cancel_auction::CancelAuctionInput,
                create_auction::CreateAuctionInput,
                get_auction::GetAuctionInput,
                list_auctions::{
                    ListActiveAuctionsInput,
                    ListSellerAuctionsInput,
                },
            },
        },
        kernel::entities::UserId,
    },
    axum::{
        extract::{
            Path,
            Query,
            State,
        },
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    bigdecimal::BigDecimal,
    serde::{
        Deserialize,
        Serialize,
    },
    std::sync::Arc,
    time::OffsetDateTime,
};

/// Public view of an auction. The reserve price never leaves the store.
#[derive(Serialize, Clone, Debug)]
pub struct AuctionResponse {
    pub id:             entities::AuctionId,
    pub title:          String,
    pub description:    String,
    pub image_url:      Option<String>,
    pub starting_price: BigDecimal,
    pub current_price:  BigDecimal,
    pub min_increment:  BigDecimal,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at:       OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at:         OffsetDateTime,
    pub status:         entities::AuctionStatus,
    pub seller_id:      UserId,
    pub category_id:    entities::CategoryId,
    pub winner_bid_id:  Option<entities::BidId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at:     OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at:     OffsetDateTime,
}

impl From<&entities::Auction> for AuctionResponse {
    fn from(auction: &entities::Auction) -> Self {
        Self {
            id:             auction.id,
            title:          auction.title.clone(),
            description:    auction.description.clone(),
            image_url:      auction.image_url.clone(),
            starting_price: auction.starting_price.clone(),
            current_price:  auction.current_price.clone(),
            min_increment:  auction.min_increment.clone(),
            start_at:       auction.start_at,
            end_at:         auction.end_at,
            status:         auction.status,
            seller_id:      auction.seller_id,
            category_id:    auction.category_id,
            winner_bid_id:  auction.winner_bid_id,
            created_at:     auction.created_at,
            updated_at:     auction.updated_at,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct AuctionDetailResponse {
    #[serde(flatten)]
    pub auction:    AuctionResponse,
    pub latest_bid: Option<BidResponse>,
}

pub async fn list_active(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<AuctionResponse>>>, RestError> {
    let auctions = state
        .auction_service
        .list_active_auctions(ListActiveAuctionsInput {
            category_id: None,
            page:        params.to_page(),
        })
        .await?;
    Ok(ApiResponse::ok(
        auctions.iter().map(AuctionResponse::from).collect(),
    ))
}

pub async fn by_category(
    State(state): State<Arc<ServerState>>,
    Path(category_id): Path<entities::CategoryId>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<AuctionResponse>>>, RestError> {
    let auctions = state
        .auction_service
        .list_active_auctions(ListActiveAuctionsInput {
            category_id: Some(category_id),
            page:        params.to_page(),
        })
        .await?;
    Ok(ApiResponse::ok(
        auctions.iter().map(AuctionResponse::from).collect(),
    ))
}

pub async fn get_detail(
    State(state): State<Arc<ServerState>>,
    Path(auction_id): Path<entities::AuctionId>,
) -> Result<Json<ApiResponse<AuctionDetailResponse>>, RestError> {
    let (auction, top_bid) = state
        .auction_service
        .get_auction(GetAuctionInput { auction_id })
        .await?;
    Ok(ApiResponse::ok(AuctionDetailResponse {
        auction:    AuctionResponse::from(&auction),
        latest_bid: top_bid.as_ref().map(BidResponse::from),
    }))
}

#[derive(Deserialize, Clone, Debug)]
pub struct CreateAuctionRequest {
    pub title:          String,
    pub description:    String,
    pub image_url:      Option<String>,
    pub starting_price: String,
    pub reserve_price:  Option<String>,
    pub min_increment:  String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at:       OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at:         OffsetDateTime,
    pub category_id:    entities::CategoryId,
}

pub async fn create(
    Auth(claims): Auth,
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateAuctionRequest>,
) -> Result<impl IntoResponse, RestError> {
    let starting_price = parse_money("starting_price", &request.starting_price)?;
    let min_increment = parse_money("min_increment", &request.min_increment)?;
    let reserve_price = request
        .reserve_price
        .as_deref()
        .map(|value| parse_money("reserve_price", value))
        .transpose()?;

    let auction = state
        .auction_service
        .create_auction(CreateAuctionInput {
            create: entities::AuctionCreate {
                title: request.title,
                description: request.description,
                image_url: request.image_url,
                starting_price,
                reserve_price,
                min_increment,
                start_at: request.start_at,
                end_at: request.end_at,
                seller_id: claims.sub,
                category_id: request.category_id,
            },
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(AuctionResponse::from(&auction), "Auction created"),
    ))
}

pub async fn activate(
    Auth(claims): Auth,
    State(state): State<Arc<ServerState>>,
    Path(auction_id): Path<entities::AuctionId>,
) -> Result<Json<ApiResponse<AuctionResponse>>, RestError> {
    let auction = state
        .auction_service
        .activate_auction(ActivateAuctionInput {
            auction_id,
            caller_id: claims.sub,
        })
        .await?;
    Ok(ApiResponse::with_message(
        AuctionResponse::from(&auction),
        "Auction activated",
    ))
}

pub async fn cancel(
    Auth(claims): Auth,
    State(state): State<Arc<ServerState>>,
    Path(auction_id): Path<entities::AuctionId>,
) -> Result<Json<ApiResponse<AuctionResponse>>, RestError> {
    let auction = state
        .auction_service
        .cancel_auction(CancelAuctionInput {
            auction_id,
            caller_id: claims.sub,
        })
        .await?;
    Ok(ApiResponse::with_message(
        AuctionResponse::from(&auction),
        "Auction cancelled",
    ))
}

pub async fn my_auctions(
    Auth(claims): Auth,
    State(state): State<Arc<ServerState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<AuctionResponse>>>, RestError> {
    let auctions = state
        .auction_service
        .list_seller_auctions(ListSellerAuctionsInput {
            seller_id: claims.sub,
            page:      params.to_page(),
        })
        .await?;
    Ok(ApiResponse::ok(
        auctions.iter().map(AuctionResponse::from).collect(),
    ))
}
