use {
    super::{
        entities,
        repository::Repository,
    },
    crate::{
        api::{
            ws::UpdateEvent,
            RestError,
        },
        kernel::db::DB,
        lock::{
            AuctionLocker,
            LockGuard,
            DEFAULT_HOLD_TTL,
            DEFAULT_WAIT_BUDGET,
        },
    },
    std::sync::Arc,
    tokio::sync::broadcast,
};

pub mod activate_auction;
pub mod cancel_auction;
pub mod categories;
pub mod conclude_auctions;
pub mod create_auction;
pub mod get_auction;
pub mod get_bids;
pub mod list_auctions;
pub mod place_bid;
pub mod verification;
pub mod workers;

pub struct ServiceInner {
    repo:         Arc<Repository>,
    locker:       Arc<dyn AuctionLocker>,
    event_sender: broadcast::Sender<UpdateEvent>,
}

#[derive(Clone)]
pub struct Service(Arc<ServiceInner>);
impl std::ops::Deref for Service {
    type Target = ServiceInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Service {
    pub fn new(
        db: DB,
        locker: Arc<dyn AuctionLocker>,
        event_sender: broadcast::Sender<UpdateEvent>,
    ) -> Self {
        Self(Arc::new(ServiceInner {
            repo: Arc::new(Repository::from(db)),
            locker,
            event_sender,
        }))
    }
}

impl ServiceInner {
    /// Serializes every state-changing operation on one auction. A timeout
    /// surfaces as a retryable "server busy" rather than unbounded waiting.
    pub(super) async fn lock_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<LockGuard, RestError> {
        match self
            .locker
            .acquire(auction_id, DEFAULT_WAIT_BUDGET, DEFAULT_HOLD_TTL)
            .await
        {
            Ok(Some(token)) => Ok(LockGuard::new(
                self.locker.clone(),
                auction_id,
                token,
            )),
            Ok(None) => Err(RestError::ServerBusy),
            Err(e) => {
                tracing::error!(
                    auction_id = auction_id.to_string(),
                    error = ?e,
                    "Lock backend unavailable"
                );
                Err(RestError::TemporarilyUnavailable)
            }
        }
    }

    /// Best-effort push. The durable record is the bid history; a fabric
    /// hiccup is logged and never fails the operation that raised it.
    pub(super) fn emit(&self, event: UpdateEvent) {
        if let Err(e) = self.event_sender.send(event) {
            tracing::debug!(error = %e, "No live subscribers for event");
        }
    }
}

#[cfg(test)]
pub mod tests {
    use {
        super::{
            Service,
            ServiceInner,
        },
        crate::{
            api::ws::UpdateEvent,
            auction::repository::{
                Database,
                Repository,
            },
            lock::{
                AuctionLocker,
                MemoryLocker,
            },
        },
        std::sync::Arc,
        tokio::sync::broadcast,
    };

    impl Service {
        pub fn new_with_mocks(
            db: impl Database,
            locker: impl AuctionLocker,
        ) -> (Self, broadcast::Receiver<UpdateEvent>) {
            let (event_sender, event_receiver) = broadcast::channel(16);
            let service = Self(Arc::new(ServiceInner {
                repo: Arc::new(Repository::new(db)),
                locker: Arc::new(locker),
                event_sender,
            }));
            (service, event_receiver)
        }

        pub fn new_with_mock_db(
            db: impl Database,
        ) -> (Self, broadcast::Receiver<UpdateEvent>) {
            Self::new_with_mocks(db, MemoryLocker::new())
        }
    }
}
