use {
    crate::{
        api::{
            bid::BidResponse,
            parse_money,
            ServerState,
        },
        auction::{
            entities::{
                AuctionId,
                AuctionStatus,
            },
            service::{
                get_auction::GetAuctionInput,
                place_bid::PlaceBidInput,
            },
        },
        kernel::entities::UserId,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
    },
    anyhow::{
        anyhow,
        Result,
    },
    axum::{
        extract::{
            ws::{
                Message,
                WebSocket,
            },
            Query,
            State,
            WebSocketUpgrade,
        },
        http::{
            header,
            HeaderMap,
        },
        response::IntoResponse,
    },
    bigdecimal::BigDecimal,
    futures::{
        stream::{
            SplitSink,
            SplitStream,
        },
        SinkExt,
        StreamExt,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        collections::HashSet,
        sync::{
            atomic::{
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    time::OffsetDateTime,
    tokio::sync::broadcast,
};

const PING_INTERVAL_DURATION: Duration = Duration::from_secs(30);

pub type SubscriberId = usize;

/// Shared fan-out state: one broadcast channel every subscriber filters
/// for itself. The stored receiver keeps the channel open when no client
/// is connected; the counters are advisory gauges.
pub struct WsState {
    pub subscriber_counter: AtomicUsize,
    pub connection_count:   AtomicUsize,
    pub broadcast_sender:   broadcast::Sender<UpdateEvent>,
    pub broadcast_receiver: broadcast::Receiver<UpdateEvent>,
}

// Event payloads, named and shaped as clients see them.

#[derive(Serialize, Clone, Debug)]
pub struct NewBidEvent {
    pub auction_id:        AuctionId,
    pub bid:               BidResponse,
    pub new_current_price: BigDecimal,
    pub total_bids:        i64,
    pub time_remaining:    i64,
}

#[derive(Serialize, Clone, Debug)]
pub struct OutbidEvent {
    pub auction_id:       AuctionId,
    pub auction_title:    String,
    pub your_bid:         BigDecimal,
    pub new_highest_bid:  BigDecimal,
    pub minimum_next_bid: BigDecimal,
}

#[derive(Serialize, Clone, Debug)]
pub struct AuctionStatusEvent {
    pub auction_id: AuctionId,
    pub status:     AuctionStatus,
    pub message:    String,
    pub winner_bid: Option<BidResponse>,
}

#[derive(Serialize, Clone, Debug)]
pub struct TimerSyncEvent {
    pub auction_id:     AuctionId,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at:         OffsetDateTime,
    pub time_remaining: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub server_time:    OffsetDateTime,
}

#[derive(Serialize, Clone, Debug)]
pub struct LiveStatsEvent {
    pub active_auctions: i64,
    pub connected_users: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp:       OffsetDateTime,
}

/// Internal fan-out envelope: the event plus how it is addressed. Room
/// events carry their auction id in the payload; `Outbid` is targeted at
/// every live connection of one user; stats go to everyone.
#[derive(Clone, Debug)]
pub enum UpdateEvent {
    NewBid(NewBidEvent),
    Outbid { user_id: UserId, event: OutbidEvent },
    AuctionStatusChanged(AuctionStatusEvent),
    AuctionEnded(AuctionStatusEvent),
    TimerSync(TimerSyncEvent),
    LiveStatsUpdated(LiveStatsEvent),
}

/// What actually goes over the wire for a server-pushed update.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type")]
pub enum ServerUpdateMessage {
    NewBid(NewBidEvent),
    Outbid(OutbidEvent),
    AuctionStatusChanged(AuctionStatusEvent),
    AuctionEnded(AuctionStatusEvent),
    TimerSync(TimerSyncEvent),
    LiveStatsUpdated(LiveStatsEvent),
}

#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "method", content = "params")]
enum ClientMessage {
    JoinAuction { auction_id: AuctionId },
    LeaveAuction { auction_id: AuctionId },
    RequestTimerSync { auction_id: AuctionId },
    PlaceBid { auction_id: AuctionId, amount: String },
}

#[derive(Deserialize, Clone, Debug)]
struct ClientRequest {
    id:  String,
    #[serde(flatten)]
    msg: ClientMessage,
}

#[derive(Serialize, Clone, Debug)]
#[serde(untagged)]
enum APIResponse {
    PlaceBid(BidResponse),
}

#[derive(Serialize, Clone, Debug)]
#[serde(tag = "status", content = "result")]
enum ServerResultMessage {
    #[serde(rename = "success")]
    Success(Option<APIResponse>),
    #[serde(rename = "error")]
    Err(String),
}

/// Result for a specific client request, echoing its id. The id is only
/// absent when the request itself could not be parsed.
#[derive(Serialize, Clone, Debug)]
struct ServerResultResponse {
    id:     Option<String>,
    #[serde(flatten)]
    result: ServerResultMessage,
}

#[derive(Deserialize, Clone, Debug)]
pub struct WsQuery {
    /// Handshake-time authentication for transports that cannot attach
    /// per-message headers.
    pub access_token: Option<String>,
}

pub async fn ws_route_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string());
    let user_id = bearer
        .or(query.access_token)
        .and_then(|token| state.token_issuer.verify(&token))
        .map(|claims| claims.sub);
    ws.on_upgrade(move |socket| websocket_handler(socket, state, user_id))
}

async fn websocket_handler(stream: WebSocket, state: Arc<ServerState>, user_id: Option<UserId>) {
    let ws_state = &state.ws;
    let id = ws_state.subscriber_counter.fetch_add(1, Ordering::SeqCst);
    ws_state.connection_count.fetch_add(1, Ordering::SeqCst);
    publish_live_stats(&state).await;

    let (sender, receiver) = stream.split();
    let event_receiver = ws_state.broadcast_sender.subscribe();
    let mut subscriber = Subscriber::new(id, state.clone(), user_id, receiver, sender, event_receiver);
    subscriber.run().await;

    state.ws.connection_count.fetch_sub(1, Ordering::SeqCst);
    publish_live_stats(&state).await;
}

/// Connection/auction counts pushed to every client whenever a connection
/// comes or goes. Both numbers are advisory.
pub async fn publish_live_stats(state: &Arc<ServerState>) {
    match state.auction_service.count_active_auctions().await {
        Ok(active_auctions) => {
            let event = LiveStatsEvent {
                active_auctions,
                connected_users: state.ws.connection_count.load(Ordering::SeqCst),
                timestamp: OffsetDateTime::now_utc(),
            };
            let _ = state
                .ws
                .broadcast_sender
                .send(UpdateEvent::LiveStatsUpdated(event));
        }
        Err(e) => {
            tracing::warn!(error = ?e, "Failed to compute live stats");
        }
    }
}

/// Decides whether one subscriber should see one event: room events go to
/// joined clients, outbids to the targeted user's connections, stats to
/// everyone.
fn is_relevant(
    joined_auctions: &HashSet<AuctionId>,
    user_id: Option<UserId>,
    event: &UpdateEvent,
) -> bool {
    match event {
        UpdateEvent::NewBid(e) => joined_auctions.contains(&e.auction_id),
        UpdateEvent::Outbid { user_id: target, .. } => user_id == Some(*target),
        UpdateEvent::AuctionStatusChanged(e) => joined_auctions.contains(&e.auction_id),
        UpdateEvent::AuctionEnded(e) => joined_auctions.contains(&e.auction_id),
        UpdateEvent::TimerSync(e) => joined_auctions.contains(&e.auction_id),
        UpdateEvent::LiveStatsUpdated(_) => true,
    }
}

fn to_server_message(event: UpdateEvent) -> ServerUpdateMessage {
    match event {
        UpdateEvent::NewBid(e) => ServerUpdateMessage::NewBid(e),
        UpdateEvent::Outbid { event, .. } => ServerUpdateMessage::Outbid(event),
        UpdateEvent::AuctionStatusChanged(e) => ServerUpdateMessage::AuctionStatusChanged(e),
        UpdateEvent::AuctionEnded(e) => ServerUpdateMessage::AuctionEnded(e),
        UpdateEvent::TimerSync(e) => ServerUpdateMessage::TimerSync(e),
        UpdateEvent::LiveStatsUpdated(e) => ServerUpdateMessage::LiveStatsUpdated(e),
    }
}

/// Subscriber is an actor handling a single websocket connection: it
/// filters the shared event stream down to what this client joined and
/// serves the client-invoked methods.
pub struct Subscriber {
    id:                  SubscriberId,
    closed:              bool,
    state:               Arc<ServerState>,
    user_id:             Option<UserId>,
    joined_auctions:     HashSet<AuctionId>,
    receiver:            SplitStream<WebSocket>,
    sender:              SplitSink<WebSocket, Message>,
    event_receiver:      broadcast::Receiver<UpdateEvent>,
    ping_interval:       tokio::time::Interval,
    exit_check_interval: tokio::time::Interval,
    responded_to_ping:   bool,
}

impl Subscriber {
    pub fn new(
        id: SubscriberId,
        state: Arc<ServerState>,
        user_id: Option<UserId>,
        receiver: SplitStream<WebSocket>,
        sender: SplitSink<WebSocket, Message>,
        event_receiver: broadcast::Receiver<UpdateEvent>,
    ) -> Self {
        Self {
            id,
            closed: false,
            state,
            user_id,
            joined_auctions: HashSet::new(),
            receiver,
            sender,
            event_receiver,
            ping_interval: tokio::time::interval(PING_INTERVAL_DURATION),
            exit_check_interval: tokio::time::interval(EXIT_CHECK_INTERVAL),
            // Start true so the connection is not closed before the first ping.
            responded_to_ping: true,
        }
    }

    #[tracing::instrument(skip(self), fields(subscriber = self.id))]
    pub async fn run(&mut self) {
        while !self.closed {
            if let Err(e) = self.handle_next().await {
                tracing::debug!(subscriber = self.id, error = ?e, "Subscriber closing");
                break;
            }
        }
    }

    async fn handle_next(&mut self) -> Result<()> {
        tokio::select! {
            update = self.event_receiver.recv() => {
                match update {
                    Ok(event) => self.handle_update(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed pushes are reconcilable over HTTP; keep going.
                        tracing::warn!(
                            subscriber = self.id,
                            skipped,
                            "Subscriber lagged behind the event stream"
                        );
                        Ok(())
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        Err(anyhow!("Event stream closed"))
                    }
                }
            },
            maybe_message_or_err = self.receiver.next() => {
                self.handle_client_message(
                    maybe_message_or_err.ok_or(anyhow!("Client channel is closed"))??
                ).await
            },
            _ = self.ping_interval.tick() => {
                if !self.responded_to_ping {
                    return Err(anyhow!("Subscriber did not respond to ping"));
                }
                self.responded_to_ping = false;
                self.sender.send(Message::Ping(vec![])).await?;
                Ok(())
            },
            _ = self.exit_check_interval.tick() => {
                if SHOULD_EXIT.load(Ordering::Acquire) {
                    self.sender.close().await?;
                    self.closed = true;
                    return Err(anyhow!("Application is shutting down"));
                }
                Ok(())
            }
        }
    }

    async fn handle_update(&mut self, event: UpdateEvent) -> Result<()> {
        if !is_relevant(&self.joined_auctions, self.user_id, &event) {
            return Ok(());
        }
        let message = serde_json::to_string(&to_server_message(event))?;
        self.sender.send(message.into()).await?;
        Ok(())
    }

    async fn respond(&mut self, id: Option<String>, result: ServerResultMessage) -> Result<()> {
        let response = ServerResultResponse { id, result };
        self.sender
            .send(serde_json::to_string(&response)?.into())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, message), fields(subscriber = self.id))]
    async fn handle_client_message(&mut self, message: Message) -> Result<()> {
        let request = match message {
            Message::Close(_) => {
                // Send our close frame so the client sees a clean shutdown
                // instead of an abnormal closure.
                self.sender.close().await?;
                self.closed = true;
                return Ok(());
            }
            Message::Text(text) => serde_json::from_str::<ClientRequest>(&text),
            Message::Binary(data) => serde_json::from_slice::<ClientRequest>(&data),
            Message::Ping(_) => {
                // Axum responds with Pong automatically.
                return Ok(());
            }
            Message::Pong(_) => {
                self.responded_to_ping = true;
                return Ok(());
            }
        };

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                return self
                    .respond(None, ServerResultMessage::Err(e.to_string()))
                    .await;
            }
        };

        match request.msg.clone() {
            ClientMessage::JoinAuction { auction_id } => {
                // Re-joining is a no-op.
                self.joined_auctions.insert(auction_id);
                self.respond(Some(request.id), ServerResultMessage::Success(None))
                    .await
            }
            ClientMessage::LeaveAuction { auction_id } => {
                self.joined_auctions.remove(&auction_id);
                self.respond(Some(request.id), ServerResultMessage::Success(None))
                    .await
            }
            ClientMessage::RequestTimerSync { auction_id } => {
                let result = self.handle_timer_sync(auction_id).await;
                self.respond(Some(request.id), result).await
            }
            ClientMessage::PlaceBid { auction_id, amount } => {
                let result = self.handle_place_bid(auction_id, amount).await;
                self.respond(Some(request.id), result).await
            }
        }
    }

    /// Authoritative countdown for one room, against the server clock.
    async fn handle_timer_sync(&mut self, auction_id: AuctionId) -> ServerResultMessage {
        match self
            .state
            .auction_service
            .get_auction(GetAuctionInput { auction_id })
            .await
        {
            Ok((auction, _)) => {
                let now = OffsetDateTime::now_utc();
                let _ = self
                    .state
                    .ws
                    .broadcast_sender
                    .send(UpdateEvent::TimerSync(TimerSyncEvent {
                        auction_id,
                        end_at: auction.end_at,
                        time_remaining: auction.time_remaining(now),
                        server_time: now,
                    }));
                ServerResultMessage::Success(None)
            }
            Err(e) => ServerResultMessage::Err(e.message()),
        }
    }

    /// The same admission pipeline as the HTTP surface, minus the proxy
    /// header: ws connections carry no per-request source address.
    async fn handle_place_bid(
        &mut self,
        auction_id: AuctionId,
        amount: String,
    ) -> ServerResultMessage {
        let Some(bidder_id) = self.user_id else {
            return ServerResultMessage::Err(
                "Authentication required to place bids".to_string(),
            );
        };
        let amount = match parse_money("amount", &amount) {
            Ok(amount) => amount,
            Err(e) => return ServerResultMessage::Err(e.message()),
        };
        match self
            .state
            .auction_service
            .place_bid(PlaceBidInput {
                auction_id,
                bidder_id,
                amount,
                source_address: None,
            })
            .await
        {
            Ok(placed) => ServerResultMessage::Success(Some(APIResponse::PlaceBid(
                BidResponse::from(&placed.bid),
            ))),
            Err(e) => ServerResultMessage::Err(e.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::str::FromStr,
        uuid::Uuid,
    };

    fn new_bid_event(auction_id: AuctionId) -> UpdateEvent {
        let bid = crate::auction::entities::Bid {
            id:             Uuid::new_v4(),
            auction_id,
            bidder_id:      Uuid::new_v4(),
            amount:         BigDecimal::from_str("105.00").unwrap(),
            placed_at:      OffsetDateTime::now_utc(),
            is_winning:     true,
            source_address: None,
            is_auto_bid:    false,
        };
        UpdateEvent::NewBid(NewBidEvent {
            auction_id,
            bid: BidResponse::from(&bid),
            new_current_price: BigDecimal::from_str("105.00").unwrap(),
            total_bids: 2,
            time_remaining: 1200,
        })
    }

    #[test]
    fn room_events_reach_only_joined_subscribers() {
        let auction_id = Uuid::new_v4();
        let mut joined = HashSet::new();
        assert!(!is_relevant(&joined, None, &new_bid_event(auction_id)));

        joined.insert(auction_id);
        assert!(is_relevant(&joined, None, &new_bid_event(auction_id)));
        assert!(!is_relevant(&joined, None, &new_bid_event(Uuid::new_v4())));
    }

    #[test]
    fn outbid_reaches_only_the_targeted_user() {
        let target = Uuid::new_v4();
        let event = UpdateEvent::Outbid {
            user_id: target,
            event:   OutbidEvent {
                auction_id:       Uuid::new_v4(),
                auction_title:    "Sample".to_string(),
                your_bid:         BigDecimal::from_str("100.00").unwrap(),
                new_highest_bid:  BigDecimal::from_str("105.00").unwrap(),
                minimum_next_bid: BigDecimal::from_str("110.00").unwrap(),
            },
        };
        let joined = HashSet::new();
        assert!(is_relevant(&joined, Some(target), &event));
        assert!(!is_relevant(&joined, Some(Uuid::new_v4()), &event));
        assert!(!is_relevant(&joined, None, &event));
    }

    #[test]
    fn live_stats_reach_everyone() {
        let event = UpdateEvent::LiveStatsUpdated(LiveStatsEvent {
            active_auctions: 4,
            connected_users: 17,
            timestamp:       OffsetDateTime::now_utc(),
        });
        assert!(is_relevant(&HashSet::new(), None, &event));
    }

    #[test]
    fn server_messages_carry_the_published_event_names() {
        let auction_id = Uuid::new_v4();
        let message = to_server_message(new_bid_event(auction_id));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "NewBid");
        assert_eq!(json["auction_id"], auction_id.to_string());
        assert!(json["bid"].is_object());
        assert_eq!(json["total_bids"], 2);

        let outbid = to_server_message(UpdateEvent::Outbid {
            user_id: Uuid::new_v4(),
            event:   OutbidEvent {
                auction_id,
                auction_title: "Sample".to_string(),
                your_bid: BigDecimal::from_str("100.00").unwrap(),
                new_highest_bid: BigDecimal::from_str("105.00").unwrap(),
                minimum_next_bid: BigDecimal::from_str("110.00").unwrap(),
            },
        });
        let json = serde_json::to_value(&outbid).unwrap();
        assert_eq!(json["type"], "Outbid");
        assert_eq!(json["your_bid"], "100.00");
        assert_eq!(json["minimum_next_bid"], "110.00");
    }

    #[test]
    fn client_requests_parse_signalr_style_methods() {
        let request: ClientRequest = serde_json::from_str(
            r#"{"id":"1","method":"JoinAuction","params":{"auction_id":"f47ac10b-58cc-4372-a567-0e02b2c3d479"}}"#,
        )
        .unwrap();
        assert!(matches!(request.msg, ClientMessage::JoinAuction { .. }));

        let request: ClientRequest = serde_json::from_str(
            r#"{"id":"2","method":"PlaceBid","params":{"auction_id":"f47ac10b-58cc-4372-a567-0e02b2c3d479","amount":"105.00"}}"#,
        )
        .unwrap();
        assert!(matches!(request.msg, ClientMessage::PlaceBid { .. }));
    }
}
