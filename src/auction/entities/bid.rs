use {
    super::auction::AuctionId,
    crate::kernel::entities::UserId,
    bigdecimal::BigDecimal,
    time::OffsetDateTime,
    uuid::Uuid,
};

pub type BidId = Uuid;

/// An accepted bid. Immutable after creation except for `is_winning`, which
/// only the coordinator toggles while holding the auction lock.
#[derive(Clone, Debug, PartialEq)]
pub struct Bid {
    pub id:             BidId,
    pub auction_id:     AuctionId,
    pub bidder_id:      UserId,
    pub amount:         BigDecimal,
    /// Server-assigned at acceptance; audit metadata, not the ordering key.
    pub placed_at:      OffsetDateTime,
    pub is_winning:     bool,
    pub source_address: Option<String>,
    pub is_auto_bid:    bool,
}

#[derive(Clone, Debug)]
pub struct BidCreate {
    pub auction_id:     AuctionId,
    pub bidder_id:      UserId,
    pub amount:         BigDecimal,
    pub source_address: Option<String>,
}

/// Outcome of an accepted `place_bid`, carrying what the caller and the
/// event fan-out need without re-reading the store.
#[derive(Clone, Debug)]
pub struct PlacedBid {
    pub bid:                 Bid,
    pub new_current_price:   BigDecimal,
    pub total_bids:          i64,
    pub previous_top_bid:    Option<Bid>,
}
