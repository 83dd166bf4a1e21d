use {
    crate::{
        api::{
            parse_money,
            requester_ip,
            ApiResponse,
            Auth,
            PageParams,
            RestError,
            ServerState,
        },
        auction::{
            entities,
            service::{
                get_bids::{
                    GetAuctionBidsInput,
                    GetUserBidsInput,
                },
                place_bid::PlaceBidInput,
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
        http::{
            HeaderMap,
            StatusCode,
        },
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

#[derive(Serialize, Clone, Debug)]
pub struct BidResponse {
    pub id:         entities::BidId,
    pub auction_id: entities::AuctionId,
    pub bidder_id:  UserId,
    pub amount:     BigDecimal,
    #[serde(with = "time::serde::rfc3339")]
    pub placed_at:  OffsetDateTime,
    pub is_winning: bool,
}

impl From<&entities::Bid> for BidResponse {
    fn from(bid: &entities::Bid) -> Self {
        Self {
            id:         bid.id,
            auction_id: bid.auction_id,
            bidder_id:  bid.bidder_id,
            amount:     bid.amount.clone(),
            placed_at:  bid.placed_at,
            is_winning: bid.is_winning,
        }
    }
}

/// Bid history for an auction, newest first.
pub async fn get_history(
    State(state): State<Arc<ServerState>>,
    Path(auction_id): Path<entities::AuctionId>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<BidResponse>>>, RestError> {
    let bids = state
        .auction_service
        .get_auction_bids(GetAuctionBidsInput {
            auction_id,
            page: params.to_page(),
        })
        .await?;
    Ok(ApiResponse::ok(bids.iter().map(BidResponse::from).collect()))
}

#[derive(Deserialize, Clone, Debug)]
pub struct PlaceBidRequest {
    pub amount: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct PlaceBidResponse {
    pub bid:                 BidResponse,
    pub new_current_price:   BigDecimal,
    pub total_bids:          i64,
    pub previous_top_bidder: Option<UserId>,
}

impl From<&entities::PlacedBid> for PlaceBidResponse {
    fn from(placed: &entities::PlacedBid) -> Self {
        Self {
            bid:                 BidResponse::from(&placed.bid),
            new_current_price:   placed.new_current_price.clone(),
            total_bids:          placed.total_bids,
            previous_top_bidder: placed
                .previous_top_bid
                .as_ref()
                .map(|bid| bid.bidder_id),
        }
    }
}

/// The core operation: submit a monetary offer against a live auction.
pub async fn place_bid(
    Auth(claims): Auth,
    State(state): State<Arc<ServerState>>,
    Path(auction_id): Path<entities::AuctionId>,
    headers: HeaderMap,
    Json(request): Json<PlaceBidRequest>,
) -> Result<impl IntoResponse, RestError> {
    let amount = parse_money("amount", &request.amount)?;
    let placed = state
        .auction_service
        .place_bid(PlaceBidInput {
            auction_id,
            bidder_id: claims.sub,
            amount,
            source_address: requester_ip(&state, &headers),
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(PlaceBidResponse::from(&placed), "Bid accepted"),
    ))
}

/// The caller's own bid history across auctions.
pub async fn my_bids(
    Auth(claims): Auth,
    State(state): State<Arc<ServerState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<BidResponse>>>, RestError> {
    let bids = state
        .auction_service
        .get_user_bids(GetUserBidsInput {
            bidder_id: claims.sub,
            page:      params.to_page(),
        })
        .await?;
    Ok(ApiResponse::ok(bids.iter().map(BidResponse::from).collect()))
}
