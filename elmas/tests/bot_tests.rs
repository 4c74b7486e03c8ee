//! Bot dispatcher conversations

mod common;

use std::sync::Arc;

use common::*;
use elmas::ads::AdSessionManager;
use elmas::bot::{BotDispatcher, BotReply, BotUpdate, Button};
use lib_storage::MemoryBackend;
use lib_types::{Amount, ManualClock, Reward, UserId};

const ADMIN: UserId = UserId(9000);
const ALICE: UserId = UserId(1001);
const REFERRER: UserId = UserId(2001);

async fn dispatcher() -> (BotDispatcher<MemoryBackend>, Arc<AdSessionManager<MemoryBackend>>, Arc<ManualClock>) {
    let (manager, clock, _) = manager_with_ad(reward("1", "20"), session_config()).await;
    let dispatcher = BotDispatcher::new(manager.clone(), vec![ADMIN], "ElmasBot", amt("0.0001"));
    (dispatcher, manager, clock)
}

async fn say(dispatcher: &BotDispatcher<MemoryBackend>, user_id: UserId, text: &str) -> BotReply {
    dispatcher
        .handle(BotUpdate::Message {
            user_id,
            text: text.to_string(),
        })
        .await
}

async fn tap(dispatcher: &BotDispatcher<MemoryBackend>, user_id: UserId, data: &str) -> BotReply {
    dispatcher
        .handle(BotUpdate::Callback {
            user_id,
            data: data.to_string(),
        })
        .await
}

fn callback_data(reply: &BotReply, label: &str) -> String {
    reply
        .buttons
        .iter()
        .find_map(|button| match button {
            Button::Callback { label: l, data } if l.contains(label) => Some(data.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no `{label}` button in {reply:?}"))
}

#[tokio::test]
async fn test_start_with_referral_link() {
    let (dispatcher, manager, _) = dispatcher().await;

    say(&dispatcher, REFERRER, "/start").await;
    let reply = say(&dispatcher, ALICE, &format!("/start {}", REFERRER)).await;
    assert!(reply.text.contains("invite"));
    assert!(reply.show_menu);
    assert_eq!(
        manager.ledger().find(ALICE).await.unwrap().unwrap().referred_by,
        Some(REFERRER)
    );

    // A second link never replaces the first referrer
    say(&dispatcher, UserId(3001), "/start").await;
    let reply = say(&dispatcher, ALICE, "/start 3001").await;
    assert!(!reply.text.contains("invite"));
    assert_eq!(
        manager.ledger().find(ALICE).await.unwrap().unwrap().referred_by,
        Some(REFERRER)
    );

    let reply = say(&dispatcher, REFERRER, "/referral").await;
    assert!(reply.text.contains("ELMAS2001"));
    assert!(reply.text.contains("https://t.me/ElmasBot?start=2001"));
    assert!(reply.text.contains("10%"));
}

#[tokio::test]
async fn test_watch_start_and_claim_by_callback() {
    let (dispatcher, manager, clock) = dispatcher().await;
    say(&dispatcher, REFERRER, "/start").await;
    say(&dispatcher, ALICE, "/start 2001").await;

    let offer = say(&dispatcher, ALICE, "📺 Watch ad").await;
    assert_eq!(offer.buttons.len(), 3);
    assert!(matches!(&offer.buttons[0], Button::WebApp { url, .. } if url.contains("/webapp/watch.html?sid=")));
    let start = callback_data(&offer, "Start");
    let claim = callback_data(&offer, "Claim");

    let reply = tap(&dispatcher, ALICE, &start).await;
    assert!(reply.text.contains("15 seconds left"));

    // Someone else replaying the callback gets nothing
    let reply = tap(&dispatcher, REFERRER, &claim).await;
    assert!(reply.text.contains("belongs to someone else"));

    clock.advance(5);
    let reply = tap(&dispatcher, ALICE, &claim).await;
    assert!(reply.text.contains("10 more seconds"));
    assert_eq!(callback_data(&reply, "Claim"), claim);

    clock.advance(10);
    let reply = tap(&dispatcher, ALICE, &claim).await;
    assert!(reply.text.contains("You earned"), "{}", reply.text);
    assert!(reply.show_menu);

    let reply = tap(&dispatcher, ALICE, &claim).await;
    assert!(reply.text.contains("already paid"));

    let alice = manager.get_balances(ALICE).await.unwrap();
    assert_eq!(alice.spendable_balance, amt("1"));
    assert_eq!(alice.reward_token_balance, amt("20"));
    let referrer = manager.get_balances(REFERRER).await.unwrap();
    assert_eq!(referrer.spendable_balance, amt("0.1"));
    assert_eq!(referrer.reward_token_balance, amt("2"));

    let wallet = say(&dispatcher, ALICE, "/wallet").await;
    assert!(wallet.text.contains("TL: 1.00"));
    assert!(wallet.text.contains("ELMAS: 20"));
}

#[tokio::test]
async fn test_convert_tokens() {
    let (dispatcher, manager, _) = dispatcher().await;
    manager
        .ledger()
        .credit(ALICE, Reward::new(Amount::ZERO, amt("500")))
        .await
        .unwrap();

    let reply = say(&dispatcher, ALICE, "/convert 100").await;
    assert!(reply.text.contains("Converted 100 ELMAS"), "{}", reply.text);
    let balances = manager.get_balances(ALICE).await.unwrap();
    assert_eq!(balances.reward_token_balance, amt("400"));
    assert_eq!(balances.spendable_balance, amt("0.01"));

    let reply = say(&dispatcher, ALICE, "/convert 1000").await;
    assert!(reply.text.contains("Not enough ELMAS"));
    assert_eq!(manager.get_balances(ALICE).await.unwrap(), balances);

    let reply = say(&dispatcher, ALICE, "/convert").await;
    assert!(reply.text.starts_with("Usage"));
}

#[tokio::test]
async fn test_admin_creates_ad_by_prompt() {
    let (dispatcher, manager, _) = dispatcher().await;

    let reply = say(&dispatcher, ALICE, "/newad").await;
    assert!(reply.text.contains("admins only"));

    let reply = say(&dispatcher, ADMIN, "/newad").await;
    assert!(reply.text.contains("title"));
    say(&dispatcher, ADMIN, "Summer sale").await;

    let reply = say(&dispatcher, ADMIN, "not a video").await;
    assert!(reply.text.contains("not a playable video"));

    say(&dispatcher, ADMIN, "https://cdn.example.com/summer.mp4").await;
    say(&dispatcher, ADMIN, "20").await;
    let reply = say(&dispatcher, ADMIN, "0,50 10").await;
    assert!(reply.text.contains("Summer sale"), "{}", reply.text);
    assert!(reply.text.contains("20 s"));

    let ads = manager.catalog().list().await.unwrap();
    assert_eq!(ads.len(), 2);
    let summer = ads.iter().find(|ad| ad.title == "Summer sale").unwrap();
    assert_eq!(summer.reward, reward("0.5", "10"));
    assert_eq!(summer.required_seconds, 20);

    // Prompt is finished; plain text just shows the menu again
    let reply = say(&dispatcher, ADMIN, "hello").await;
    assert_eq!(reply.text, "Menu:");

    let reply = say(&dispatcher, ADMIN, "/admin").await;
    assert!(reply.text.contains("Ads: 2"));
}

#[tokio::test]
async fn test_cancel_discards_prompt() {
    let (dispatcher, manager, _) = dispatcher().await;

    say(&dispatcher, ADMIN, "/newad").await;
    say(&dispatcher, ADMIN, "Draft").await;
    say(&dispatcher, ADMIN, "/cancel").await;
    say(&dispatcher, ADMIN, "https://cdn.example.com/draft.mp4").await;

    assert_eq!(manager.catalog().list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_callback() {
    let (dispatcher, _, _) = dispatcher().await;
    let reply = tap(&dispatcher, ALICE, "c!!zz").await;
    assert_eq!(reply.text, "Unknown action.");
}
