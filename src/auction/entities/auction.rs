use {
    super::{
        bid::BidId,
        category::CategoryId,
    },
    crate::kernel::entities::UserId,
    bigdecimal::BigDecimal,
    serde::{
        Deserialize,
        Serialize,
    },
    time::OffsetDateTime,
    uuid::Uuid,
};

pub type AuctionId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl AuctionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuctionStatus::Completed | AuctionStatus::Cancelled | AuctionStatus::Expired
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Auction {
    pub id:             AuctionId,
    pub title:          String,
    pub description:    String,
    pub image_url:      Option<String>,
    pub starting_price: BigDecimal,
    pub current_price:  BigDecimal,
    /// Hidden from every read surface; recorded for the seller only.
    pub reserve_price:  Option<BigDecimal>,
    pub min_increment:  BigDecimal,
    pub start_at:       OffsetDateTime,
    pub end_at:         OffsetDateTime,
    pub status:         AuctionStatus,
    pub seller_id:      UserId,
    pub category_id:    CategoryId,
    pub winner_bid_id:  Option<BidId>,
    pub created_at:     OffsetDateTime,
    pub updated_at:     OffsetDateTime,
}

impl Auction {
    pub fn is_open_for_bids(&self, now: OffsetDateTime) -> bool {
        self.status == AuctionStatus::Active && now < self.end_at
    }

    /// Whole seconds until `end_at`, floored at zero.
    pub fn time_remaining(&self, now: OffsetDateTime) -> i64 {
        (self.end_at - now).whole_seconds().max(0)
    }

    /// The lowest amount the next bid must reach: the starting price while
    /// the auction has no bids, one increment above the current price after.
    pub fn minimum_next_bid(&self, has_top_bid: bool) -> BigDecimal {
        if has_top_bid {
            &self.current_price + &self.min_increment
        } else {
            self.starting_price.clone()
        }
    }
}

/// Seller-supplied fields for a new auction; everything else is derived.
#[derive(Clone, Debug)]
pub struct AuctionCreate {
    pub title:          String,
    pub description:    String,
    pub image_url:      Option<String>,
    pub starting_price: BigDecimal,
    pub reserve_price:  Option<BigDecimal>,
    pub min_increment:  BigDecimal,
    pub start_at:       OffsetDateTime,
    pub end_at:         OffsetDateTime,
    pub seller_id:      UserId,
    pub category_id:    CategoryId,
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::str::FromStr,
        time::Duration,
    };

    fn money(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn auction(status: AuctionStatus, now: OffsetDateTime) -> Auction {
        Auction {
            id: Uuid::new_v4(),
            title: "Walnut writing desk".to_string(),
            description: "Early 20th century, restored".to_string(),
            image_url: None,
            starting_price: money("100.00"),
            current_price: money("100.00"),
            reserve_price: None,
            min_increment: money("5.00"),
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            status,
            seller_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            winner_bid_id: None,
            created_at: now - Duration::hours(2),
            updated_at: now - Duration::hours(1),
        }
    }

    #[test]
    fn only_active_auctions_before_end_take_bids() {
        let now = OffsetDateTime::now_utc();
        assert!(auction(AuctionStatus::Active, now).is_open_for_bids(now));
        assert!(!auction(AuctionStatus::Pending, now).is_open_for_bids(now));
        assert!(!auction(AuctionStatus::Cancelled, now).is_open_for_bids(now));

        let mut ended = auction(AuctionStatus::Active, now);
        ended.end_at = now - Duration::seconds(1);
        assert!(!ended.is_open_for_bids(now));
    }

    #[test]
    fn minimum_next_bid_steps_from_current_price() {
        let now = OffsetDateTime::now_utc();
        let mut auction = auction(AuctionStatus::Active, now);
        assert_eq!(auction.minimum_next_bid(false), money("100.00"));

        auction.current_price = money("120.00");
        assert_eq!(auction.minimum_next_bid(true), money("125.00"));
    }

    #[test]
    fn time_remaining_floors_at_zero() {
        let now = OffsetDateTime::now_utc();
        let mut auction = auction(AuctionStatus::Active, now);
        assert_eq!(auction.time_remaining(now), 3600);

        auction.end_at = now - Duration::minutes(5);
        assert_eq!(auction.time_remaining(now), 0);
    }
}
