//! # Trending Feed
//!
//! Background refresh of the trending topics.
//!
//! - Every `refresh` interval, or right after a new verification is recorded, read the latest
//!   `window` records and rank every group. Readers cut the ranking to their own limit
//! - The result is published as a snapshot on a watch channel, readers never wait on the store
//! - A failed read keeps the previous snapshot
//! - The task stops once every handle is dropped
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use ledger::{ContentStore, TrendingTopic, compute_trending};
use serde::Serialize;
use tokio::{
    sync::{Notify, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingSnapshot {
    pub topics: Vec<TrendingTopic>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TrendingFeed {
    receiver: watch::Receiver<Arc<TrendingSnapshot>>,
    nudge: Arc<Notify>,
}

impl TrendingFeed {
    pub fn spawn(
        store: Arc<dyn ContentStore>,
        window: usize,
        refresh: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = watch::channel(Arc::new(TrendingSnapshot::default()));
        let nudge = Arc::new(Notify::new());

        let handle = tokio::spawn(refresh_loop(store, sender, nudge.clone(), window, refresh));

        (Self { receiver, nudge }, handle)
    }

    pub fn latest(&self) -> Arc<TrendingSnapshot> {
        self.receiver.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TrendingSnapshot>> {
        self.receiver.clone()
    }

    /// Ask for a refresh without waiting for the next tick.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }
}

async fn refresh_loop(
    store: Arc<dyn ContentStore>,
    sender: watch::Sender<Arc<TrendingSnapshot>>,
    nudge: Arc<Notify>,
    window: usize,
    refresh: Duration,
) {
    let mut ticker = interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = nudge.notified() => {},
            _ = sender.closed() => break,
        }

        match store.recent_verifications(window).await {
            Ok(records) => {
                let topics = compute_trending(&records, usize::MAX);
                debug!("Ranked {} topics from {} records", topics.len(), records.len());

                let snapshot = TrendingSnapshot {
                    topics,
                    refreshed_at: Some(Utc::now()),
                };
                if sender.send(Arc::new(snapshot)).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Trending refresh failed, keeping previous snapshot: {e}"),
        }
    }

    info!("Trending feed stopped");
}
