use super::{blog_pair, call, err_kind, ok, ALICE, BOB};
use dhtcell::container::{make_config, Container};
use dhtcell::entry::address::ADDRESS_LEN;
use dhtcell::error::ErrorKind;
use serde_json::{json, Value};

fn create(container: &Container, instance: &str, content: &str) -> String {
    let value = ok(call(
        container,
        instance,
        "create_post",
        json!({ "content": content, "in_reply_to": "", "timestamp": "2024-01-01T00:00:00Z" }),
    ));
    value.as_str().unwrap().to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_post_returns_deterministic_address() {
    let container = blog_pair();
    let first = create(&container, ALICE, "hello");
    assert_eq!(first.len(), ADDRESS_LEN);

    // Same content and timestamp hash to the same entry on another instance
    let second = create(&container, BOB, "hello");
    assert_eq!(first, second);
    assert_ne!(first, create(&container, ALICE, "hello again"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_too_long_content_is_rejected() {
    let container = blog_pair();
    let result = call(
        &container,
        ALICE,
        "create_post",
        json!({ "content": "x".repeat(281), "in_reply_to": "" }),
    );
    assert!(!result.is_ok());
    assert_eq!(
        err_kind(result),
        ErrorKind::ValidationFailed("Content too long".to_string())
    );
    assert_eq!(ok(call(&container, ALICE, "my_posts", json!({}))), json!([]));

    let exactly_max = call(
        &container,
        ALICE,
        "create_post",
        json!({ "content": "x".repeat(280), "in_reply_to": "" }),
    );
    assert!(exactly_max.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reply_to_missing_post_fails_atomically() {
    let container = blog_pair();
    let result = call(
        &container,
        ALICE,
        "create_post",
        json!({ "content": "orphan reply", "in_reply_to": "QmNotAPostThatExistsAnywhereInThisStore00000" }),
    );
    assert_eq!(
        err_kind(result),
        ErrorKind::ErrorGeneric("Base for link not found".to_string())
    );
    // Neither the post nor its author link was written
    assert_eq!(ok(call(&container, ALICE, "my_posts", json!({}))), json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_post_returns_envelope() {
    let container = blog_pair();
    let address = create(&container, ALICE, "round trip");
    let value = ok(call(&container, ALICE, "get_post", json!({ "post_address": address })));
    assert_eq!(
        value,
        json!({ "App": ["post", r#"{"content":"round trip","date_created":"2024-01-01T00:00:00Z"}"#] })
    );

    let missing = ok(call(
        &container,
        ALICE,
        "get_post",
        json!({ "post_address": "QmNotAPostThatExistsAnywhereInThisStore00000" }),
    ));
    assert_eq!(missing, Value::Null);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_post() {
    let container = blog_pair();
    let address = create(&container, ALICE, "short lived");
    let deleted = ok(call(&container, ALICE, "delete_post", json!({ "post_address": address })));
    assert_eq!(deleted, Value::Null);
    assert_eq!(
        ok(call(&container, ALICE, "get_post", json!({ "post_address": address }))),
        Value::Null
    );
    assert_eq!(ok(call(&container, ALICE, "my_posts", json!({}))), json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_post_retires_old_address() {
    let container = blog_pair();
    let address = create(&container, ALICE, "first draft");
    let updated = ok(call(
        &container,
        ALICE,
        "update_post",
        json!({ "post_address": address, "new_content": "final draft" }),
    ));
    assert_eq!(updated, Value::Null);
    assert_eq!(
        ok(call(&container, ALICE, "get_post", json!({ "post_address": address }))),
        Value::Null
    );

    // The author link follows the update and keeps the original timestamp
    let posts = ok(call(&container, ALICE, "my_posts", json!({})));
    let posts = posts.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_ne!(posts[0].as_str().unwrap(), address);
    let value = ok(call(&container, ALICE, "get_post", json!({ "post_address": posts[0] })));
    assert_eq!(
        value,
        json!({ "App": ["post", r#"{"content":"final draft","date_created":"2024-01-01T00:00:00Z"}"#] })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recreate_after_delete() {
    let container = blog_pair();
    let address = create(&container, ALICE, "second chance");
    ok(call(&container, ALICE, "delete_post", json!({ "post_address": address })));

    assert_eq!(create(&container, ALICE, "second chance"), address);
    assert_eq!(
        ok(call(&container, ALICE, "get_post", json!({ "post_address": address }))),
        json!({ "App": ["post", r#"{"content":"second chance","date_created":"2024-01-01T00:00:00Z"}"#] })
    );
    assert_eq!(ok(call(&container, ALICE, "my_posts", json!({}))), json!([address]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_back_to_original_content() {
    let container = blog_pair();
    let original = create(&container, ALICE, "v1");
    ok(call(
        &container,
        ALICE,
        "update_post",
        json!({ "post_address": original, "new_content": "v2" }),
    ));
    let edited = ok(call(&container, ALICE, "my_posts", json!({})))[0].clone();
    ok(call(
        &container,
        ALICE,
        "update_post",
        json!({ "post_address": edited, "new_content": "v1" }),
    ));

    let posts = ok(call(&container, ALICE, "my_posts", json!({})));
    assert_eq!(posts, json!([original]));
    assert_eq!(
        ok(call(&container, ALICE, "get_post", json!({ "post_address": original }))),
        json!({ "App": ["post", r#"{"content":"v1","date_created":"2024-01-01T00:00:00Z"}"#] })
    );
    assert_eq!(
        ok(call(&container, ALICE, "get_post", json!({ "post_address": edited }))),
        Value::Null
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_replies_follow_edited_parent() {
    let container = blog_pair();
    let parent = create(&container, ALICE, "parent");
    let reply = ok(call(
        &container,
        ALICE,
        "create_post",
        json!({ "content": "child", "in_reply_to": parent }),
    ));
    ok(call(
        &container,
        ALICE,
        "update_post",
        json!({ "post_address": parent, "new_content": "parent, edited" }),
    ));
    let edited = ok(call(&container, ALICE, "my_posts", json!({})))[0].clone();
    assert_ne!(edited, json!(parent));

    assert_eq!(
        ok(call(&container, ALICE, "get_replies", json!({ "post_address": edited }))),
        json!([reply])
    );
    assert_eq!(
        ok(call(&container, ALICE, "get_replies", json!({ "post_address": parent }))),
        json!([])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_my_posts_in_creation_order() {
    let container = blog_pair();
    let created: Vec<String> = ["one", "two", "three"]
        .iter()
        .map(|content| create(&container, ALICE, content))
        .collect();
    let posts = ok(call(&container, ALICE, "my_posts", json!({})));
    assert_eq!(posts, json!(created));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_replies_are_linked() {
    let container = blog_pair();
    let parent = create(&container, ALICE, "parent");
    let reply = ok(call(
        &container,
        ALICE,
        "create_post",
        json!({ "content": "child", "in_reply_to": parent }),
    ));
    let replies = ok(call(&container, ALICE, "get_replies", json!({ "post_address": parent })));
    assert_eq!(replies, json!([reply]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_capability_restricts_functions() {
    let container = blog_pair();
    let denied = container
        .call(ALICE, "blog", "read", "create_post", json!({ "content": "nope" }))
        .unwrap();
    assert_eq!(err_kind(denied), ErrorKind::CapabilityCheckFailed);

    let allowed = container
        .call(ALICE, "blog", "read", "my_posts", json!({}))
        .unwrap();
    assert!(allowed.is_ok());

    let missing_zome = container
        .call(ALICE, "chat", "main", "my_posts", json!({}))
        .unwrap();
    assert!(matches!(err_kind(missing_zome), ErrorKind::ZomeNotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_agents_have_distinct_identities() {
    let container = blog_pair();
    let alice = ok(call(&container, ALICE, "whoami", json!({})));
    let bob = ok(call(&container, BOB, "whoami", json!({})));
    assert_ne!(alice, bob);
    assert_eq!(alice.as_str().unwrap().len(), ADDRESS_LEN);

    let env = ok(call(&container, ALICE, "show_env", json!({})));
    assert_eq!(env["instance_id"], json!(ALICE));
    assert_eq!(env["agent_address"], alice);
    assert_eq!(env["dna_name"], json!("blog"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_uuid_separates_networks() {
    let mut config = make_config(&[("alice", "blog")]);
    config.dnas[0].uuid = Some("test-run-1".to_string());
    let isolated = Container::from_config(config).unwrap();
    let shared = Container::from_config(make_config(&[("alice", "blog")])).unwrap();
    assert_ne!(
        isolated.instance(ALICE).unwrap().dna_address(),
        shared.instance(ALICE).unwrap().dna_address()
    );
}
