//! Per-user pending admin prompts
//!
//! Multi-step admin input (`/newad`) is an explicit state machine persisted
//! under `pending:{user}`, so a restart or another worker picks up the same
//! step.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use lib_storage::{StorageBackend, StorageError};
use lib_types::{Amount, Reward, UserId};

use crate::ads::{types::is_well_formed_content, NewAd};
use crate::store::{decode, encode, pending_key};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingAction {
    #[default]
    None,
    AwaitingAdTitle,
    AwaitingAdContent {
        title: String,
    },
    AwaitingAdSeconds {
        title: String,
        content_reference: String,
    },
    AwaitingAdReward {
        title: String,
        content_reference: String,
        required_seconds: u32,
    },
}

/// Result of feeding one line of input to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptStep {
    Next(PendingAction),
    Complete(NewAd),
}

impl PendingAction {
    pub fn is_none(&self) -> bool {
        matches!(self, PendingAction::None)
    }

    /// What to ask the admin for in this state
    pub fn prompt(&self) -> &'static str {
        match self {
            PendingAction::None => "",
            PendingAction::AwaitingAdTitle => "Send the ad title.",
            PendingAction::AwaitingAdContent { .. } => "Send the video URL (mp4/webm) or Telegram media id.",
            PendingAction::AwaitingAdSeconds { .. } => "How many seconds must it be watched? (10-600, empty for 15)",
            PendingAction::AwaitingAdReward { .. } => "Send the reward as `<TL> [ELMAS]`, e.g. `0.25 5`.",
        }
    }

    /// Consume one line of admin input. Invalid input leaves the state as is.
    pub fn advance(&self, input: &str) -> Result<PromptStep, PromptError> {
        let input = input.trim();
        match self {
            PendingAction::None => Err(PromptError::InvalidInput("nothing is pending".to_string())),
            PendingAction::AwaitingAdTitle => {
                if input.is_empty() {
                    return Err(PromptError::InvalidInput("the title cannot be empty".to_string()));
                }
                Ok(PromptStep::Next(PendingAction::AwaitingAdContent {
                    title: input.to_string(),
                }))
            }
            PendingAction::AwaitingAdContent { title } => {
                if !is_well_formed_content(input) {
                    return Err(PromptError::InvalidInput(format!("`{input}` is not a playable video")));
                }
                Ok(PromptStep::Next(PendingAction::AwaitingAdSeconds {
                    title: title.clone(),
                    content_reference: input.to_string(),
                }))
            }
            PendingAction::AwaitingAdSeconds {
                title,
                content_reference,
            } => {
                let required_seconds = if input.is_empty() || input == "-" {
                    crate::ads::DEFAULT_REQUIRED_SECONDS
                } else {
                    input
                        .parse::<u32>()
                        .map_err(|_| PromptError::InvalidInput(format!("`{input}` is not a number of seconds")))?
                };
                Ok(PromptStep::Next(PendingAction::AwaitingAdReward {
                    title: title.clone(),
                    content_reference: content_reference.clone(),
                    required_seconds,
                }))
            }
            PendingAction::AwaitingAdReward {
                title,
                content_reference,
                required_seconds,
            } => Ok(PromptStep::Complete(NewAd {
                title: title.clone(),
                content_reference: content_reference.clone(),
                required_seconds: Some(*required_seconds),
                reward: parse_reward(input)?,
                is_active: true,
                expires_at: None,
            })),
        }
    }
}

/// `<TL> [ELMAS]`
fn parse_reward(input: &str) -> Result<Reward, PromptError> {
    let mut parts = input.split_whitespace();
    let parse = |part: Option<&str>| -> Result<Amount, PromptError> {
        match part {
            Some(raw) => raw
                .replace(',', ".")
                .parse()
                .map_err(|e| PromptError::InvalidInput(format!("`{raw}`: {e}"))),
            None => Ok(Amount::ZERO),
        }
    };
    let currency = parse(parts.next())?;
    let token = parse(parts.next())?;
    if parts.next().is_some() {
        return Err(PromptError::InvalidInput("expected at most two amounts".to_string()));
    }
    let reward = Reward::new(currency, token);
    if reward.is_zero() {
        return Err(PromptError::InvalidInput("the reward cannot be zero".to_string()));
    }
    Ok(reward)
}

pub struct PendingStore<B: StorageBackend> {
    backend: Arc<B>,
}

impl<B: StorageBackend> Clone for PendingStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: StorageBackend> PendingStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, user_id: UserId) -> Result<PendingAction, PromptError> {
        match self.backend.get(&pending_key(user_id)).await? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(PendingAction::None),
        }
    }

    /// Storing `None` clears the entry
    pub async fn set(&self, user_id: UserId, action: &PendingAction) -> Result<(), PromptError> {
        let key = pending_key(user_id);
        if action.is_none() {
            self.backend.delete(&key).await?;
        } else {
            self.backend.put(&key, &encode(action)?).await?;
        }
        Ok(())
    }

    pub async fn clear(&self, user_id: UserId) -> Result<(), PromptError> {
        self.set(user_id, &PendingAction::None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_storage::MemoryBackend;

    fn next(step: PromptStep) -> PendingAction {
        match step {
            PromptStep::Next(action) => action,
            other => panic!("expected next step, got {other:?}"),
        }
    }

    #[test]
    fn test_full_prompt_flow() {
        let state = next(PendingAction::AwaitingAdTitle.advance("Spring sale").unwrap());
        let state = next(state.advance("https://cdn.example.com/sale.mp4").unwrap());
        let state = next(state.advance("20").unwrap());
        let PromptStep::Complete(ad) = state.advance("0,25 5").unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(ad.title, "Spring sale");
        assert_eq!(ad.required_seconds, Some(20));
        assert_eq!(ad.reward, Reward::new("0.25".parse().unwrap(), "5".parse().unwrap()));
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        assert!(PendingAction::AwaitingAdTitle.advance("  ").is_err());
        let content = PendingAction::AwaitingAdContent {
            title: "t".to_string(),
        };
        assert!(content.advance("https://example.com/page.html").is_err());
        let reward = PendingAction::AwaitingAdReward {
            title: "t".to_string(),
            content_reference: "https://cdn.example.com/a.mp4".to_string(),
            required_seconds: 15,
        };
        assert!(reward.advance("0").is_err());
        assert!(reward.advance("1 2 3").is_err());
        assert!(reward.advance("abc").is_err());
    }

    #[test]
    fn test_empty_seconds_uses_default() {
        let seconds = PendingAction::AwaitingAdSeconds {
            title: "t".to_string(),
            content_reference: "https://cdn.example.com/a.mp4".to_string(),
        };
        assert!(matches!(
            next(seconds.advance("").unwrap()),
            PendingAction::AwaitingAdReward { required_seconds: 15, .. }
        ));
    }

    #[tokio::test]
    async fn test_store_roundtrip_and_clear() {
        let store = PendingStore::new(Arc::new(MemoryBackend::new()));
        assert_eq!(store.get(UserId(1)).await.unwrap(), PendingAction::None);

        let state = PendingAction::AwaitingAdContent {
            title: "t".to_string(),
        };
        store.set(UserId(1), &state).await.unwrap();
        assert_eq!(store.get(UserId(1)).await.unwrap(), state);

        store.clear(UserId(1)).await.unwrap();
        assert_eq!(store.get(UserId(1)).await.unwrap(), PendingAction::None);
    }
}
