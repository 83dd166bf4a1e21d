#[cfg(test)]
use mockall::automock;
use {
    super::super::entities,
    crate::{
        api::RestError,
        kernel::{
            db::DB,
            entities::UserId,
        },
    },
    async_trait::async_trait,
    sqlx::{
        types::BigDecimal,
        FromRow,
    },
    std::fmt::Debug,
    time::{
        OffsetDateTime,
        PrimitiveDateTime,
        UtcOffset,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, sqlx::Type)]
#[sqlx(type_name = "auction_status", rename_all = "lowercase")]
pub enum AuctionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl From<entities::AuctionStatus> for AuctionStatus {
    fn from(status: entities::AuctionStatus) -> Self {
        match status {
            entities::AuctionStatus::Pending => AuctionStatus::Pending,
            entities::AuctionStatus::Active => AuctionStatus::Active,
            entities::AuctionStatus::Completed => AuctionStatus::Completed,
            entities::AuctionStatus::Cancelled => AuctionStatus::Cancelled,
            entities::AuctionStatus::Expired => AuctionStatus::Expired,
        }
    }
}

impl From<AuctionStatus> for entities::AuctionStatus {
    fn from(status: AuctionStatus) -> Self {
        match status {
            AuctionStatus::Pending => entities::AuctionStatus::Pending,
            AuctionStatus::Active => entities::AuctionStatus::Active,
            AuctionStatus::Completed => entities::AuctionStatus::Completed,
            AuctionStatus::Cancelled => entities::AuctionStatus::Cancelled,
            AuctionStatus::Expired => entities::AuctionStatus::Expired,
        }
    }
}

fn utc(datetime: PrimitiveDateTime) -> OffsetDateTime {
    datetime.assume_offset(UtcOffset::UTC)
}

fn naive(datetime: OffsetDateTime) -> PrimitiveDateTime {
    let utc = datetime.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

#[derive(Clone, Debug, FromRow)]
pub struct Auction {
    pub id:             entities::AuctionId,
    pub title:          String,
    pub description:    String,
    pub image_url:      Option<String>,
    pub starting_price: BigDecimal,
    pub current_price:  BigDecimal,
    pub reserve_price:  Option<BigDecimal>,
    pub min_increment:  BigDecimal,
    pub start_at:       PrimitiveDateTime,
    pub end_at:         PrimitiveDateTime,
    pub status:         AuctionStatus,
    pub seller_id:      UserId,
    pub category_id:    entities::CategoryId,
    pub winner_bid_id:  Option<entities::BidId>,
    pub created_at:     PrimitiveDateTime,
    pub updated_at:     PrimitiveDateTime,
}

impl Auction {
    pub fn get_entity(&self) -> entities::Auction {
        entities::Auction {
            id:             self.id,
            title:          self.title.clone(),
            description:    self.description.clone(),
            image_url:      self.image_url.clone(),
            starting_price: self.starting_price.clone(),
            current_price:  self.current_price.clone(),
            reserve_price:  self.reserve_price.clone(),
            min_increment:  self.min_increment.clone(),
            start_at:       utc(self.start_at),
            end_at:         utc(self.end_at),
            status:         self.status.into(),
            seller_id:      self.seller_id,
            category_id:    self.category_id,
            winner_bid_id:  self.winner_bid_id,
            created_at:     utc(self.created_at),
            updated_at:     utc(self.updated_at),
        }
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct Bid {
    pub id:             entities::BidId,
    pub auction_id:     entities::AuctionId,
    pub bidder_id:      UserId,
    pub amount:         BigDecimal,
    pub placed_at:      PrimitiveDateTime,
    pub is_winning:     bool,
    pub source_address: Option<String>,
    pub is_auto_bid:    bool,
}

impl Bid {
    pub fn get_entity(&self) -> entities::Bid {
        entities::Bid {
            id:             self.id,
            auction_id:     self.auction_id,
            bidder_id:      self.bidder_id,
            amount:         self.amount.clone(),
            placed_at:      utc(self.placed_at),
            is_winning:     self.is_winning,
            source_address: self.source_address.clone(),
            is_auto_bid:    self.is_auto_bid,
        }
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct Category {
    pub id:          entities::CategoryId,
    pub name:        String,
    pub description: Option<String>,
    pub created_at:  PrimitiveDateTime,
}

impl Category {
    pub fn get_entity(&self) -> entities::Category {
        entities::Category {
            id:          self.id,
            name:        self.name.clone(),
            description: self.description.clone(),
            created_at:  utc(self.created_at),
        }
    }
}

fn internal(context: &str, e: sqlx::Error) -> RestError {
    tracing::error!(error = e.to_string(), "DB: {} failed", context);
    RestError::TemporarilyUnavailable
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Everything the auction core asks of the relational store. Writes that
/// touch more than one row go through single transactions here; there are
/// no partial writes for callers to compensate.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Database: Debug + Send + Sync + 'static {
    async fn add_auction(&self, auction: &entities::Auction) -> Result<(), RestError>;
    async fn get_auction(&self, auction_id: entities::AuctionId) -> Result<Auction, RestError>;
    async fn get_auction_with_top_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<(Auction, Option<Bid>), RestError>;
    async fn activate_auction(
        &self,
        auction_id: entities::AuctionId,
        now: OffsetDateTime,
    ) -> Result<bool, RestError>;
    async fn cancel_auction(
        &self,
        auction_id: entities::AuctionId,
        now: OffsetDateTime,
    ) -> Result<bool, RestError>;
    async fn conclude_auction(
        &self,
        auction_id: entities::AuctionId,
        status: AuctionStatus,
        winner_bid_id: Option<entities::BidId>,
        now: OffsetDateTime,
    ) -> Result<bool, RestError>;
    async fn list_active_auctions(
        &self,
        now: OffsetDateTime,
        category_id: Option<entities::CategoryId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Auction>, RestError>;
    async fn list_auctions_by_seller(
        &self,
        seller_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Auction>, RestError>;
    async fn count_active_auctions(&self, now: OffsetDateTime) -> Result<i64, RestError>;
    async fn find_expired_auctions(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Auction>, RestError>;

    /// Atomically inserts the new winning bid, clears the prior winning
    /// flag, and re-prices the auction. Returns `false` without writing
    /// anything when the auction no longer matches `expected_price`,
    /// i.e. it was concurrently mutated.
    async fn add_bid_and_update_auction(
        &self,
        bid: &entities::Bid,
        prior_top_bid_id: Option<entities::BidId>,
        expected_price: &BigDecimal,
        new_price: &BigDecimal,
    ) -> Result<bool, RestError>;
    async fn get_auction_bids(
        &self,
        auction_id: entities::AuctionId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bid>, RestError>;
    async fn get_user_bids(
        &self,
        bidder_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bid>, RestError>;
    async fn count_bids(&self, auction_id: entities::AuctionId) -> Result<i64, RestError>;

    async fn add_category(&self, category: &entities::Category) -> Result<(), RestError>;
    async fn get_category(
        &self,
        category_id: entities::CategoryId,
    ) -> Result<Category, RestError>;
    async fn list_categories(&self) -> Result<Vec<Category>, RestError>;
}

// The top bid is the maximum amount; the earliest timestamp breaks ties,
// although ties are unreachable while bids go through the auction lock.
const TOP_BID_QUERY: &str =
    "SELECT * FROM bids WHERE auction_id = $1 ORDER BY amount DESC, placed_at ASC LIMIT 1";

#[async_trait]
impl Database for DB {
    async fn add_auction(&self, auction: &entities::Auction) -> Result<(), RestError> {
        sqlx::query(
            "INSERT INTO auctions (id, title, description, image_url, starting_price, \
             current_price, reserve_price, min_increment, start_at, end_at, status, seller_id, \
             category_id, winner_bid_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(auction.id)
        .bind(&auction.title)
        .bind(&auction.description)
        .bind(&auction.image_url)
        .bind(&auction.starting_price)
        .bind(&auction.current_price)
        .bind(&auction.reserve_price)
        .bind(&auction.min_increment)
        .bind(naive(auction.start_at))
        .bind(naive(auction.end_at))
        .bind(AuctionStatus::from(auction.status))
        .bind(auction.seller_id)
        .bind(auction.category_id)
        .bind(auction.winner_bid_id)
        .bind(naive(auction.created_at))
        .bind(naive(auction.updated_at))
        .execute(self)
        .await
        .map_err(|e| internal("insert auction", e))?;
        Ok(())
    }

    async fn get_auction(&self, auction_id: entities::AuctionId) -> Result<Auction, RestError> {
        sqlx::query_as("SELECT * FROM auctions WHERE id = $1")
            .bind(auction_id)
            .fetch_one(self)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => RestError::AuctionNotFound,
                _ => internal("get auction", e),
            })
    }

    async fn get_auction_with_top_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<(Auction, Option<Bid>), RestError> {
        let mut tx = self
            .begin()
            .await
            .map_err(|e| internal("begin read transaction", e))?;
        let auction: Auction = sqlx::query_as("SELECT * FROM auctions WHERE id = $1")
            .bind(auction_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => RestError::AuctionNotFound,
                _ => internal("get auction", e),
            })?;
        let top_bid: Option<Bid> = sqlx::query_as(TOP_BID_QUERY)
            .bind(auction_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| internal("get top bid", e))?;
        tx.commit()
            .await
            .map_err(|e| internal("commit read transaction", e))?;
        Ok((auction, top_bid))
    }

    async fn activate_auction(
        &self,
        auction_id: entities::AuctionId,
        now: OffsetDateTime,
    ) -> Result<bool, RestError> {
        let result = sqlx::query(
            "UPDATE auctions SET status = $1, start_at = $2, updated_at = $2 \
             WHERE id = $3 AND status = $4",
        )
        .bind(AuctionStatus::Active)
        .bind(naive(now))
        .bind(auction_id)
        .bind(AuctionStatus::Pending)
        .execute(self)
        .await
        .map_err(|e| internal("activate auction", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_auction(
        &self,
        auction_id: entities::AuctionId,
        now: OffsetDateTime,
    ) -> Result<bool, RestError> {
        // The zero-bids rule is re-stated in the guard itself.
        let result = sqlx::query(
            "UPDATE auctions SET status = $1, updated_at = $2 \
             WHERE id = $3 AND status IN ($4, $5) \
             AND NOT EXISTS (SELECT 1 FROM bids WHERE auction_id = $3)",
        )
        .bind(AuctionStatus::Cancelled)
        .bind(naive(now))
        .bind(auction_id)
        .bind(AuctionStatus::Pending)
        .bind(AuctionStatus::Active)
        .execute(self)
        .await
        .map_err(|e| internal("cancel auction", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn conclude_auction(
        &self,
        auction_id: entities::AuctionId,
        status: AuctionStatus,
        winner_bid_id: Option<entities::BidId>,
        now: OffsetDateTime,
    ) -> Result<bool, RestError> {
        let result = sqlx::query(
            "UPDATE auctions SET status = $1, winner_bid_id = $2, updated_at = $3 \
             WHERE id = $4 AND status = $5 AND end_at <= $3",
        )
        .bind(status)
        .bind(winner_bid_id)
        .bind(naive(now))
        .bind(auction_id)
        .bind(AuctionStatus::Active)
        .execute(self)
        .await
        .map_err(|e| internal("conclude auction", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_auctions(
        &self,
        now: OffsetDateTime,
        category_id: Option<entities::CategoryId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Auction>, RestError> {
        sqlx::query_as(
            "SELECT * FROM auctions WHERE status = $1 AND end_at > $2 \
             AND ($3::uuid IS NULL OR category_id = $3) \
             ORDER BY end_at ASC LIMIT $4 OFFSET $5",
        )
        .bind(AuctionStatus::Active)
        .bind(naive(now))
        .bind(category_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self)
        .await
        .map_err(|e| internal("list active auctions", e))
    }

    async fn list_auctions_by_seller(
        &self,
        seller_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Auction>, RestError> {
        sqlx::query_as(
            "SELECT * FROM auctions WHERE seller_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(seller_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self)
        .await
        .map_err(|e| internal("list auctions by seller", e))
    }

    async fn count_active_auctions(&self, now: OffsetDateTime) -> Result<i64, RestError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM auctions WHERE status = $1 AND end_at > $2")
                .bind(AuctionStatus::Active)
                .bind(naive(now))
                .fetch_one(self)
                .await
                .map_err(|e| internal("count active auctions", e))?;
        Ok(count)
    }

    async fn find_expired_auctions(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Auction>, RestError> {
        sqlx::query_as(
            "SELECT * FROM auctions WHERE status = $1 AND end_at <= $2 \
             ORDER BY end_at ASC LIMIT $3",
        )
        .bind(AuctionStatus::Active)
        .bind(naive(now))
        .bind(limit)
        .fetch_all(self)
        .await
        .map_err(|e| internal("find expired auctions", e))
    }

    async fn add_bid_and_update_auction(
        &self,
        bid: &entities::Bid,
        prior_top_bid_id: Option<entities::BidId>,
        expected_price: &BigDecimal,
        new_price: &BigDecimal,
    ) -> Result<bool, RestError> {
        let mut tx = self
            .begin()
            .await
            .map_err(|e| internal("begin bid transaction", e))?;

        // Guarded re-price first: zero rows means the auction moved under
        // us (price change or status change) and the whole write is off.
        let repriced = sqlx::query(
            "UPDATE auctions SET current_price = $1, updated_at = $2 \
             WHERE id = $3 AND status = $4 AND current_price = $5",
        )
        .bind(new_price)
        .bind(naive(bid.placed_at))
        .bind(bid.auction_id)
        .bind(AuctionStatus::Active)
        .bind(expected_price)
        .execute(&mut *tx)
        .await
        .map_err(|e| internal("update auction price", e))?;
        if repriced.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(prior_top_bid_id) = prior_top_bid_id {
            sqlx::query("UPDATE bids SET is_winning = FALSE WHERE id = $1 AND is_winning")
                .bind(prior_top_bid_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| internal("clear prior winning bid", e))?;
        }

        sqlx::query(
            "INSERT INTO bids (id, auction_id, bidder_id, amount, placed_at, is_winning, \
             source_address, is_auto_bid) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(bid.id)
        .bind(bid.auction_id)
        .bind(bid.bidder_id)
        .bind(&bid.amount)
        .bind(naive(bid.placed_at))
        .bind(bid.is_winning)
        .bind(&bid.source_address)
        .bind(bid.is_auto_bid)
        .execute(&mut *tx)
        .await
        .map_err(|e| internal("insert bid", e))?;

        tx.commit()
            .await
            .map_err(|e| internal("commit bid transaction", e))?;
        Ok(true)
    }

    async fn get_auction_bids(
        &self,
        auction_id: entities::AuctionId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bid>, RestError> {
        sqlx::query_as(
            "SELECT * FROM bids WHERE auction_id = $1 \
             ORDER BY placed_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(auction_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self)
        .await
        .map_err(|e| internal("get auction bids", e))
    }

    async fn get_user_bids(
        &self,
        bidder_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bid>, RestError> {
        sqlx::query_as(
            "SELECT * FROM bids WHERE bidder_id = $1 \
             ORDER BY placed_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(bidder_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self)
        .await
        .map_err(|e| internal("get user bids", e))
    }

    async fn count_bids(&self, auction_id: entities::AuctionId) -> Result<i64, RestError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bids WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_one(self)
            .await
            .map_err(|e| internal("count bids", e))?;
        Ok(count)
    }

    async fn add_category(&self, category: &entities::Category) -> Result<(), RestError> {
        sqlx::query(
            "INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(naive(category.created_at))
        .execute(self)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RestError::BusinessRule("A category with this name already exists".to_string())
            } else {
                internal("insert category", e)
            }
        })?;
        Ok(())
    }

    async fn get_category(
        &self,
        category_id: entities::CategoryId,
    ) -> Result<Category, RestError> {
        sqlx::query_as("SELECT * FROM categories WHERE id = $1")
            .bind(category_id)
            .fetch_one(self)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => RestError::CategoryNotFound,
                _ => internal("get category", e),
            })
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RestError> {
        sqlx::query_as("SELECT * FROM categories ORDER BY name ASC")
            .fetch_all(self)
            .await
            .map_err(|e| internal("list categories", e))
    }
}
