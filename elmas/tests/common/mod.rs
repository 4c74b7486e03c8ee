//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use elmas::ads::{AdOffer, AdSessionManager, NewAd, RequestOutcome, SessionConfig};
use lib_identity::{sign_web_app_init_data, InitDataVerifier};
use lib_storage::{MemoryBackend, StorageBackend};
use lib_types::{AdId, Amount, ManualClock, Reward, UserId};

pub const BOT_TOKEN: &str = "123456:TEST-TOKEN";

/// 2023-11-14 22:13:20 UTC
pub const T0: u64 = 1_700_000_000;

pub fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

pub fn reward(tl: &str, elmas: &str) -> Reward {
    Reward::new(amt(tl), amt(elmas))
}

pub fn new_ad(title: &str, seconds: u32, reward: Reward) -> NewAd {
    NewAd {
        title: title.to_string(),
        content_reference: format!("https://cdn.example.com/{}.mp4", title.to_lowercase()),
        required_seconds: Some(seconds),
        reward,
        is_active: true,
        expires_at: None,
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        watch_base_url: "https://elmas.example.com".to_string(),
        ..Default::default()
    }
}

pub fn manager_on<B: StorageBackend>(
    backend: Arc<B>,
    clock: Arc<ManualClock>,
    config: SessionConfig,
) -> AdSessionManager<B> {
    AdSessionManager::new(
        backend,
        clock,
        Arc::new(InitDataVerifier::new(BOT_TOKEN, Some(86_400))),
        config,
    )
}

/// In-memory manager with a single 15 s ad paying `reward`
pub async fn manager_with_ad(
    reward: Reward,
    config: SessionConfig,
) -> (Arc<AdSessionManager<MemoryBackend>>, Arc<ManualClock>, AdId) {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager_on(Arc::new(MemoryBackend::new()), clock.clone(), config);
    let ad = manager.catalog().create(new_ad("Spot", 15, reward)).await.unwrap();
    (Arc::new(manager), clock, ad.id)
}

pub async fn request_offer<B: StorageBackend>(manager: &AdSessionManager<B>, user: UserId) -> AdOffer {
    match manager.request_ad(user).await.unwrap() {
        RequestOutcome::Created(offer) => offer,
        other => panic!("expected an offer, got {other:?}"),
    }
}

/// Mini App init data for `user_id`, signed at `now`
pub fn init_data_for(user_id: i64, now: u64) -> String {
    let user = format!(r#"{{"id":{user_id},"first_name":"Test","username":"user{user_id}"}}"#);
    let auth_date = now.to_string();
    sign_web_app_init_data(BOT_TOKEN, &[("auth_date", &auth_date), ("user", &user)])
}
