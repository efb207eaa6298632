pub mod keys;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub engine_user_states: sled::Tree,
    pub engine_bandit_models: sled::Tree,
    pub engine_algorithm_states: sled::Tree,
    pub engine_decision_traces: sled::Tree,
    pub algorithm_metrics_daily: sled::Tree,
    pub delayed_reward_queue: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("corrupt record: entity={entity}, key={key}: {message}")]
    Corrupt {
        entity: String,
        key: String,
        message: String,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let engine_user_states = db.open_tree(trees::ENGINE_USER_STATES)?;
        let engine_bandit_models = db.open_tree(trees::ENGINE_BANDIT_MODELS)?;
        let engine_algorithm_states = db.open_tree(trees::ENGINE_ALGORITHM_STATES)?;
        let engine_decision_traces = db.open_tree(trees::ENGINE_DECISION_TRACES)?;
        let algorithm_metrics_daily = db.open_tree(trees::ALGORITHM_METRICS_DAILY)?;
        let delayed_reward_queue = db.open_tree(trees::DELAYED_REWARD_QUEUE)?;

        Ok(Self {
            db,
            engine_user_states,
            engine_bandit_models,
            engine_algorithm_states,
            engine_decision_traces,
            algorithm_metrics_daily,
            delayed_reward_queue,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
