use std::sync::Arc;

use anyhow::Result;
use ledger::{ContentStore, VoteLedger};
use tracing::info;

use super::{config::Config, database::init_redis, feed::TrendingFeed, oracle::HttpOracle};
use crate::oracle::TruthfulnessOracle;

pub struct State {
    pub config: Config,
    pub store: Arc<dyn ContentStore>,
    pub ledger: VoteLedger,
    pub oracle: Arc<dyn TruthfulnessOracle>,
    pub trending: TrendingFeed,
}

impl State {
    pub async fn new() -> Result<Arc<Self>> {
        let config = Config::load()?;

        let store: Arc<dyn ContentStore> =
            Arc::new(init_redis(&config.redis_url, config.vote_retries).await?);
        info!("Connected to Redis at {}", config.redis_url);

        let oracle = HttpOracle::new(
            config.oracle_url.clone(),
            config.oracle_model.clone(),
            config.oracle_key.clone(),
        )?
        .with_reader(config.reader_url.clone(), config.reader_key.clone());

        Ok(Self::with_parts(config, store, Arc::new(oracle)))
    }

    /// Wires a state around any store and oracle. Spawns the trending feed.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn ContentStore>,
        oracle: Arc<dyn TruthfulnessOracle>,
    ) -> Arc<Self> {
        let (trending, _handle) = TrendingFeed::spawn(
            store.clone(),
            config.trending_window,
            config.trending_refresh,
        );

        Arc::new(Self {
            ledger: VoteLedger::new(store.clone()),
            config,
            store,
            oracle,
            trending,
        })
    }
}
