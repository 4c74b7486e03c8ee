//! Ad catalog
//!
//! Stores advertisements and picks one for a new session. Selection is
//! uniform among eligible ads and needs no user state.

use rand::seq::SliceRandom;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use lib_storage::{BatchOp, Guard, StorageBackend, StorageError};
use lib_types::{AdId, Clock, Reward};

use super::types::{clamp_required_seconds, is_well_formed_content, Advertisement};
use crate::store::{ad_key, decode, encode, AD_PREFIX, AD_SEQ_KEY};

const MAX_TITLE_LEN: usize = 128;
const MAX_CATALOG_ATTEMPTS: u32 = 16;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid advertisement: {0}")]
    InvalidAd(String),

    #[error("Advertisement not found: {0}")]
    NotFound(AdId),

    #[error("Too many concurrent catalog updates")]
    Contention,

    #[error("Record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Input for a new catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAd {
    pub title: String,
    pub content_reference: String,
    /// Clamped on insert; `None` means the default duration
    pub required_seconds: Option<u32>,
    pub reward: Reward,
    pub is_active: bool,
    pub expires_at: Option<u64>,
}

impl NewAd {
    pub fn validate(&self) -> Result<(), CatalogError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CatalogError::InvalidAd("title is empty".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(CatalogError::InvalidAd(format!(
                "title is longer than {MAX_TITLE_LEN} characters"
            )));
        }
        if !is_well_formed_content(&self.content_reference) {
            return Err(CatalogError::InvalidAd(format!(
                "content reference is not a playable URL or media handle: {}",
                self.content_reference
            )));
        }
        if self.reward.is_zero() {
            return Err(CatalogError::InvalidAd("reward is zero".to_string()));
        }
        Ok(())
    }
}

pub struct AdCatalog<B: StorageBackend> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B: StorageBackend> Clone for AdCatalog<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<B: StorageBackend> AdCatalog<B> {
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Validate and insert an ad under the next id
    pub async fn create(&self, new_ad: NewAd) -> Result<Advertisement, CatalogError> {
        new_ad.validate()?;

        for _ in 0..MAX_CATALOG_ATTEMPTS {
            let seq_raw = self.backend.get(AD_SEQ_KEY).await?;
            let last: u64 = match &seq_raw {
                Some(bytes) => decode(bytes)?,
                None => 0,
            };
            let id = AdId(last + 1);
            let ad = Advertisement {
                id,
                title: new_ad.title.trim().to_string(),
                content_reference: new_ad.content_reference.trim().to_string(),
                required_seconds: clamp_required_seconds(new_ad.required_seconds),
                reward: new_ad.reward,
                is_active: new_ad.is_active,
                expires_at: new_ad.expires_at,
                created_at: self.clock.now_secs(),
            };

            let key = ad_key(id);
            let result = self
                .backend
                .write_batch_guarded(
                    &[Guard::new(AD_SEQ_KEY.to_vec(), seq_raw), Guard::absent(key.clone())],
                    &[
                        BatchOp::put(AD_SEQ_KEY.to_vec(), encode(&id.0)?),
                        BatchOp::put(key, encode(&ad)?),
                    ],
                )
                .await;

            match result {
                Ok(()) => {
                    info!(ad = %id, title = %ad.title, seconds = ad.required_seconds, "advertisement created");
                    return Ok(ad);
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(CatalogError::Contention)
    }

    pub async fn get(&self, id: AdId) -> Result<Option<Advertisement>, CatalogError> {
        match self.backend.get(&ad_key(id)).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<Advertisement>, CatalogError> {
        self.backend
            .scan_prefix(AD_PREFIX.as_bytes(), Some(usize::MAX))
            .await?
            .iter()
            .map(|(_, bytes)| decode(bytes).map_err(CatalogError::from))
            .collect()
    }

    /// Apply `f` to a stored ad with a conditional write
    pub async fn update<F>(&self, id: AdId, mut f: F) -> Result<Advertisement, CatalogError>
    where
        F: FnMut(&mut Advertisement) + Send,
    {
        let key = ad_key(id);
        for _ in 0..MAX_CATALOG_ATTEMPTS {
            let raw = self.backend.get(&key).await?.ok_or(CatalogError::NotFound(id))?;
            let mut ad: Advertisement = decode(&raw)?;
            f(&mut ad);
            match self
                .backend
                .compare_and_swap(&key, Some(&raw), Some(&encode(&ad)?))
                .await
            {
                Ok(()) => return Ok(ad),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(CatalogError::Contention)
    }

    pub async fn set_active(&self, id: AdId, active: bool) -> Result<Advertisement, CatalogError> {
        let ad = self.update(id, |ad| ad.is_active = active).await?;
        info!(ad = %id, active, "advertisement activation changed");
        Ok(ad)
    }

    /// Returns false if the ad did not exist
    pub async fn remove(&self, id: AdId) -> Result<bool, CatalogError> {
        let key = ad_key(id);
        let existed = self.backend.contains(&key).await?;
        self.backend.delete(&key).await?;
        if existed {
            info!(ad = %id, "advertisement removed");
        }
        Ok(existed)
    }

    /// Uniform-random choice among ads eligible right now
    pub async fn pick_eligible_ad(&self) -> Result<Option<Advertisement>, CatalogError> {
        let now = self.clock.now_secs();
        let eligible: Vec<Advertisement> = self
            .list()
            .await?
            .into_iter()
            .filter(|ad| ad.is_eligible(now))
            .collect();

        let picked = eligible.choose(&mut rand::thread_rng()).cloned();
        debug!(eligible = eligible.len(), picked = ?picked.as_ref().map(|ad| ad.id), "picked ad");
        Ok(picked)
    }

    /// Insert `seeds` if the catalog is empty. Returns how many were added.
    pub async fn seed(&self, seeds: &[NewAd]) -> Result<usize, CatalogError> {
        if !self.list().await?.is_empty() {
            return Ok(0);
        }
        for seed in seeds {
            self.create(seed.clone()).await?;
        }
        Ok(seeds.len())
    }
}
