use {
    crate::{
        api::RestError,
        auction::entities,
        kernel::entities::UserId,
    },
    bigdecimal::BigDecimal,
    time::OffsetDateTime,
};

/// Admission checks for a bid, in order; the first failure is the reason
/// the caller sees. Runs inside the per-auction critical section, so the
/// snapshot it judges cannot move underneath it.
pub fn verify_bid(
    auction: &entities::Auction,
    top_bid: Option<&entities::Bid>,
    bidder_id: UserId,
    amount: &BigDecimal,
    now: OffsetDateTime,
) -> Result<(), RestError> {
    if auction.status != entities::AuctionStatus::Active {
        return Err(RestError::BusinessRule(
            "Auction is not active".to_string(),
        ));
    }
    if now >= auction.end_at {
        return Err(RestError::BusinessRule("Auction has ended".to_string()));
    }
    if bidder_id == auction.seller_id {
        return Err(RestError::BusinessRule(
            "Sellers cannot bid on their own auction".to_string(),
        ));
    }
    let minimum = auction.minimum_next_bid(top_bid.is_some());
    if *amount < minimum {
        return Err(RestError::BidTooLow { minimum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::auction::entities::{
            Auction,
            AuctionStatus,
            Bid,
        },
        std::str::FromStr,
        time::Duration,
        uuid::Uuid,
    };

    fn money(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn active_auction(now: OffsetDateTime) -> Auction {
        Auction {
            id: Uuid::new_v4(),
            title: "Art deco floor lamp".to_string(),
            description: "Brass, rewired".to_string(),
            image_url: None,
            starting_price: money("100.00"),
            current_price: money("100.00"),
            reserve_price: None,
            min_increment: money("5.00"),
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            status: AuctionStatus::Active,
            seller_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            winner_bid_id: None,
            created_at: now - Duration::hours(2),
            updated_at: now - Duration::hours(1),
        }
    }

    fn top_bid(auction: &Auction, amount: &str, now: OffsetDateTime) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            auction_id: auction.id,
            bidder_id: Uuid::new_v4(),
            amount: money(amount),
            placed_at: now - Duration::minutes(5),
            is_winning: true,
            source_address: None,
            is_auto_bid: false,
        }
    }

    #[test]
    fn accepts_first_bid_at_starting_price() {
        let now = OffsetDateTime::now_utc();
        let auction = active_auction(now);
        assert!(verify_bid(&auction, None, Uuid::new_v4(), &money("100.00"), now).is_ok());
    }

    #[test]
    fn rejects_first_bid_below_starting_price() {
        let now = OffsetDateTime::now_utc();
        let auction = active_auction(now);
        let result = verify_bid(&auction, None, Uuid::new_v4(), &money("99.99"), now);
        assert_eq!(
            result.unwrap_err(),
            RestError::BidTooLow {
                minimum: money("100.00")
            }
        );
    }

    #[test]
    fn requires_a_full_increment_over_current_price() {
        let now = OffsetDateTime::now_utc();
        let mut auction = active_auction(now);
        auction.current_price = money("105.00");
        let top = top_bid(&auction, "105.00", now);

        let result = verify_bid(&auction, Some(&top), Uuid::new_v4(), &money("107.00"), now);
        assert_eq!(
            result.unwrap_err(),
            RestError::BidTooLow {
                minimum: money("110.00")
            }
        );
        assert!(
            verify_bid(&auction, Some(&top), Uuid::new_v4(), &money("110.00"), now).is_ok()
        );
    }

    #[test]
    fn rejects_inactive_statuses() {
        let now = OffsetDateTime::now_utc();
        for status in [
            AuctionStatus::Pending,
            AuctionStatus::Completed,
            AuctionStatus::Cancelled,
            AuctionStatus::Expired,
        ] {
            let mut auction = active_auction(now);
            auction.status = status;
            let result = verify_bid(&auction, None, Uuid::new_v4(), &money("100.00"), now);
            assert_eq!(
                result.unwrap_err(),
                RestError::BusinessRule("Auction is not active".to_string())
            );
        }
    }

    #[test]
    fn rejects_bids_after_end() {
        let now = OffsetDateTime::now_utc();
        let mut auction = active_auction(now);
        auction.end_at = now - Duration::seconds(1);
        let result = verify_bid(&auction, None, Uuid::new_v4(), &money("100.00"), now);
        assert_eq!(
            result.unwrap_err(),
            RestError::BusinessRule("Auction has ended".to_string())
        );
    }

    #[test]
    fn rejects_the_seller() {
        let now = OffsetDateTime::now_utc();
        let auction = active_auction(now);
        let result = verify_bid(&auction, None, auction.seller_id, &money("100.00"), now);
        assert_eq!(
            result.unwrap_err(),
            RestError::BusinessRule("Sellers cannot bid on their own auction".to_string())
        );
    }

    #[test]
    fn status_outranks_the_amount_check() {
        let now = OffsetDateTime::now_utc();
        let mut auction = active_auction(now);
        auction.status = AuctionStatus::Cancelled;
        // Both the status and amount are wrong; the status is the reason.
        let result = verify_bid(&auction, None, Uuid::new_v4(), &money("1.00"), now);
        assert_eq!(
            result.unwrap_err(),
            RestError::BusinessRule("Auction is not active".to_string())
        );
    }
}
