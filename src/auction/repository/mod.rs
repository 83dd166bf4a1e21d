use {
    crate::kernel::db::DB,
    std::sync::Arc,
};

mod activate_auction;
mod add_auction;
mod add_bid;
mod add_category;
mod cancel_auction;
mod conclude_auction;
mod count_bids;
mod find_expired_auctions;
mod get_auction;
mod get_auction_with_top_bid;
mod get_bids;
mod get_category;
mod list_active_auctions;
mod list_auctions_by_seller;
mod list_categories;
mod models;

pub use models::*;

#[derive(Debug)]
pub struct Repository {
    db: Arc<dyn Database>,
}

impl Repository {
    pub fn new(db: impl Database) -> Self {
        Self { db: Arc::new(db) }
    }
}

impl From<DB> for Repository {
    fn from(db: DB) -> Self {
        Self::new(db)
    }
}
