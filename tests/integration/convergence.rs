use super::{blog_pair, call, ok, ALICE, BOB};
use dhtcell::entry::Entry;
use dhtcell::error::ApiError;
use dhtcell::poll::{ConvergenceError, PollConfig};
use dhtcell::types::Address;
use serde_json::json;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn test_post_replicates_to_peer() {
    let container = blog_pair();
    let address = Address::from(
        ok(call(
            &container,
            ALICE,
            "create_post",
            json!({ "content": "gossip me", "in_reply_to": "" }),
        ))
        .as_str()
        .unwrap(),
    );

    let entry = container
        .wait_for_entry(BOB, &address, &PollConfig::default())
        .await
        .unwrap();
    assert!(matches!(entry, Entry::App(ref t, _) if t == "post"));

    let alice = Address::from(ok(call(&container, ALICE, "whoami", json!({}))).as_str().unwrap());
    let links = container
        .wait_for_links(BOB, &alice, "authored_posts", 1, &PollConfig::default())
        .await
        .unwrap();
    assert_eq!(links, vec![address.clone()]);

    let by_agent = ok(call(&container, BOB, "posts_by_agent", json!({ "agent": alice })));
    assert_eq!(by_agent, json!([address]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_replicates_to_peer() {
    let container = blog_pair();
    let address = Address::from(
        ok(call(&container, ALICE, "create_post", json!({ "content": "temporary" })))
            .as_str()
            .unwrap(),
    );
    container
        .wait_for_entry(BOB, &address, &PollConfig::default())
        .await
        .unwrap();

    ok(call(&container, ALICE, "delete_post", json!({ "post_address": address })));
    let bob = container.instance(BOB).unwrap().clone();
    dhtcell::poll::wait_for(&PollConfig::default(), || {
        bob.get_entry(&address).ok().flatten().is_none().then_some(())
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_reports_timeout() {
    let container = blog_pair();
    let never = Address::from("QmNotAPostThatExistsAnywhereInThisStore00000");
    let config = PollConfig::default().with_timeout(Duration::from_millis(50));
    let result = container.wait_for_entry(BOB, &never, &config).await;
    assert!(matches!(
        result,
        Err(ApiError::Convergence(ConvergenceError::TimedOut { .. }))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stopped_peer_catches_up_after_restart() {
    let container = blog_pair();
    container.stop_instance(BOB).unwrap();

    let address = Address::from(
        ok(call(&container, ALICE, "create_post", json!({ "content": "while you were out" })))
            .as_str()
            .unwrap(),
    );
    let short = PollConfig::default().with_timeout(Duration::from_millis(100));
    assert!(container.wait_for_entry(BOB, &address, &short).await.is_err());

    container.start_instance(BOB).unwrap();
    let entry = container
        .wait_for_entry(BOB, &address, &PollConfig::default())
        .await
        .unwrap();
    assert_eq!(entry.address(), address);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_replicates_after_original() {
    let container = blog_pair();
    let original = Address::from(
        ok(call(&container, ALICE, "create_post", json!({ "content": "v1" })))
            .as_str()
            .unwrap(),
    );
    ok(call(
        &container,
        ALICE,
        "update_post",
        json!({ "post_address": original, "new_content": "v2" }),
    ));
    let posts = ok(call(&container, ALICE, "my_posts", json!({})));
    let updated = Address::from(posts[0].as_str().unwrap());

    container
        .wait_for_entry(BOB, &updated, &PollConfig::default())
        .await
        .unwrap();
    let bob = container.instance(BOB).unwrap();
    assert_eq!(bob.get_entry(&original).unwrap(), None);

    let alice = container.instance(ALICE).unwrap().agent_address();
    let links = container
        .wait_for_links(BOB, &alice, "authored_posts", 1, &PollConfig::default())
        .await
        .unwrap();
    assert_eq!(links, vec![updated]);
}
