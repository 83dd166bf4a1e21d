use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
    },
    bigdecimal::{
        BigDecimal,
        Zero,
    },
    time::{
        Duration,
        OffsetDateTime,
    },
    uuid::Uuid,
};

/// Tolerated clock skew between the caller and the server for `start_at`.
const START_AT_SKEW_TOLERANCE: Duration = Duration::minutes(5);

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 2000;
const MAX_IMAGE_URL_LENGTH: usize = 500;

pub struct CreateAuctionInput {
    pub create: entities::AuctionCreate,
}

fn validate(create: &entities::AuctionCreate, now: OffsetDateTime) -> Result<(), RestError> {
    let mut errors = Vec::new();
    if create.title.trim().is_empty() || create.title.len() > MAX_TITLE_LENGTH {
        errors.push(format!(
            "title must be between 1 and {} characters",
            MAX_TITLE_LENGTH
        ));
    }
    if create.description.len() > MAX_DESCRIPTION_LENGTH {
        errors.push(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LENGTH
        ));
    }
    if create
        .image_url
        .as_ref()
        .is_some_and(|url| url.len() > MAX_IMAGE_URL_LENGTH)
    {
        errors.push(format!(
            "image_url must be at most {} characters",
            MAX_IMAGE_URL_LENGTH
        ));
    }
    if create.starting_price <= BigDecimal::zero() {
        errors.push("starting_price must be positive".to_string());
    }
    if create.min_increment <= BigDecimal::zero() {
        errors.push("min_increment must be positive".to_string());
    }
    if create
        .reserve_price
        .as_ref()
        .is_some_and(|price| *price <= BigDecimal::zero())
    {
        errors.push("reserve_price must be positive when given".to_string());
    }
    if create.end_at <= create.start_at {
        errors.push("end_at must be after start_at".to_string());
    }
    if create.start_at < now - START_AT_SKEW_TOLERANCE {
        errors.push("start_at must not be in the past".to_string());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RestError::Validation(errors))
    }
}

impl Service {
    /// The initial state is derived from `start_at`: auctions starting in
    /// the future are Pending until the seller activates them or the start
    /// passes, ones starting now are immediately Active.
    #[tracing::instrument(skip_all, fields(seller_id = %input.create.seller_id, auction_id), err(level = tracing::Level::TRACE))]
    pub async fn create_auction(
        &self,
        input: CreateAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        let now = OffsetDateTime::now_utc();
        let create = input.create;
        validate(&create, now)?;
        // Unknown category is a 404, not a field error.
        self.repo.get_category(create.category_id).await?;

        let status = if create.start_at > now {
            entities::AuctionStatus::Pending
        } else {
            entities::AuctionStatus::Active
        };
        let auction = entities::Auction {
            id: Uuid::new_v4(),
            title: create.title,
            description: create.description,
            image_url: create.image_url,
            current_price: create.starting_price.clone(),
            starting_price: create.starting_price,
            reserve_price: create.reserve_price,
            min_increment: create.min_increment,
            start_at: create.start_at,
            end_at: create.end_at,
            status,
            seller_id: create.seller_id,
            category_id: create.category_id,
            winner_bid_id: None,
            created_at: now,
            updated_at: now,
        };
        tracing::Span::current().record("auction_id", auction.id.to_string());
        self.repo.add_auction(&auction).await?;
        Ok(auction)
    }
}
