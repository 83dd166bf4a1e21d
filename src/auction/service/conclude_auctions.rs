use {
    super::Service,
    crate::{
        api::{
            bid::BidResponse,
            ws::{
                AuctionStatusEvent,
                UpdateEvent,
            },
            RestError,
        },
        auction::entities,
    },
    time::OffsetDateTime,
};

pub struct ConcludeAuctionInput {
    pub auction_id: entities::AuctionId,
}

impl Service {
    /// Materializes the time-driven transition for one Active auction past
    /// its end: Completed with the top bid as winner, or Expired with no
    /// bids. Runs under the auction lock with the same discipline as bids.
    #[tracing::instrument(skip_all, fields(auction_id = %input.auction_id), err(level = tracing::Level::TRACE))]
    pub async fn conclude_auction(&self, input: ConcludeAuctionInput) -> Result<(), RestError> {
        let guard = self.lock_auction(input.auction_id).await?;
        let result = self.conclude_auction_locked(input.auction_id).await;
        guard.release().await;
        result
    }

    async fn conclude_auction_locked(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<(), RestError> {
        let (auction, top_bid) = self.repo.get_auction_with_top_bid(auction_id).await?;
        let now = OffsetDateTime::now_utc();
        if auction.status != entities::AuctionStatus::Active || now < auction.end_at {
            // Lost the race with a cancel or an earlier sweep; nothing to do.
            return Ok(());
        }

        let (status, winner_bid_id) = match &top_bid {
            Some(top) => (entities::AuctionStatus::Completed, Some(top.id)),
            None => (entities::AuctionStatus::Expired, None),
        };
        if !self
            .repo
            .conclude_auction(auction_id, status, winner_bid_id, now)
            .await?
        {
            return Ok(());
        }

        let message = match &top_bid {
            Some(top) => format!("Auction ended with a winning bid of {}", top.amount),
            None => "Auction ended with no bids".to_string(),
        };
        tracing::info!(
            auction_id = auction_id.to_string(),
            status = ?status,
            "Concluded auction"
        );
        self.emit(UpdateEvent::AuctionEnded(AuctionStatusEvent {
            auction_id,
            status,
            message,
            winner_bid: top_bid.as_ref().map(BidResponse::from),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::auction::repository::{
            Auction as AuctionRow,
            AuctionStatus as AuctionStatusRow,
            Bid as BidRow,
            MockDatabase,
        },
        bigdecimal::BigDecimal,
        std::str::FromStr,
        time::{
            Duration,
            PrimitiveDateTime,
        },
        uuid::Uuid,
    };

    fn primitive(datetime: OffsetDateTime) -> PrimitiveDateTime {
        PrimitiveDateTime::new(datetime.date(), datetime.time())
    }

    fn ended_row() -> AuctionRow {
        let now = OffsetDateTime::now_utc();
        let price = BigDecimal::from_str("40.00").unwrap();
        AuctionRow {
            id: Uuid::new_v4(),
            title: "Set of six pewter tankards".to_string(),
            description: "Matched hallmarks".to_string(),
            image_url: None,
            starting_price: price.clone(),
            current_price: price,
            reserve_price: None,
            min_increment: BigDecimal::from_str("2.00").unwrap(),
            start_at: primitive(now - Duration::days(1)),
            end_at: primitive(now - Duration::minutes(1)),
            status: AuctionStatusRow::Active,
            seller_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            winner_bid_id: None,
            created_at: primitive(now - Duration::days(2)),
            updated_at: primitive(now - Duration::days(1)),
        }
    }

    #[tokio::test]
    async fn ended_auction_with_bids_completes_with_winner() {
        let row = ended_row();
        let auction_id = row.id;
        let top = BidRow {
            id:             Uuid::new_v4(),
            auction_id,
            bidder_id:      Uuid::new_v4(),
            amount:         BigDecimal::from_str("55.00").unwrap(),
            placed_at:      primitive(OffsetDateTime::now_utc() - Duration::hours(1)),
            is_winning:     true,
            source_address: None,
            is_auto_bid:    false,
        };
        let top_id = top.id;

        let mut db = MockDatabase::new();
        db.expect_get_auction_with_top_bid()
            .returning(move |_| Ok((row.clone(), Some(top.clone()))));
        db.expect_conclude_auction()
            .withf(move |_, status, winner, _| {
                *status == AuctionStatusRow::Completed && *winner == Some(top_id)
            })
            .returning(|_, _, _, _| Ok(true));

        let (service, mut events) = Service::new_with_mock_db(db);
        service
            .conclude_auction(ConcludeAuctionInput { auction_id })
            .await
            .unwrap();

        match events.try_recv().unwrap() {
            UpdateEvent::AuctionEnded(event) => {
                assert_eq!(event.status, entities::AuctionStatus::Completed);
                assert_eq!(event.winner_bid.unwrap().id, top_id);
            }
            other => panic!("Expected AuctionEnded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ended_auction_without_bids_expires() {
        let row = ended_row();
        let auction_id = row.id;

        let mut db = MockDatabase::new();
        db.expect_get_auction_with_top_bid()
            .returning(move |_| Ok((row.clone(), None)));
        db.expect_conclude_auction()
            .withf(|_, status, winner, _| {
                *status == AuctionStatusRow::Expired && winner.is_none()
            })
            .returning(|_, _, _, _| Ok(true));

        let (service, mut events) = Service::new_with_mock_db(db);
        service
            .conclude_auction(ConcludeAuctionInput { auction_id })
            .await
            .unwrap();

        match events.try_recv().unwrap() {
            UpdateEvent::AuctionEnded(event) => {
                assert_eq!(event.status, entities::AuctionStatus::Expired);
                assert!(event.winner_bid.is_none());
            }
            other => panic!("Expected AuctionEnded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn auction_still_running_is_left_alone() {
        let mut row = ended_row();
        row.end_at = primitive(OffsetDateTime::now_utc() + Duration::hours(1));
        let auction_id = row.id;

        // No conclude expectation: a write would panic the mock.
        let mut db = MockDatabase::new();
        db.expect_get_auction_with_top_bid()
            .returning(move |_| Ok((row.clone(), None)));

        let (service, mut events) = Service::new_with_mock_db(db);
        service
            .conclude_auction(ConcludeAuctionInput { auction_id })
            .await
            .unwrap();
        assert!(events.try_recv().is_err());
    }
}
