use super::{call, ok, ALICE};
use dhtcell::container::config::InstanceStorage;
use dhtcell::container::{make_config, Container};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread")]
async fn test_file_storage_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = make_config(&[("alice", "blog")]);
    config.instances[0].storage = InstanceStorage::File {
        path: Some(temp_dir.path().join("alice")),
    };

    let (parent, reply) = {
        let container = Container::from_config(config.clone()).unwrap();
        container.start_all_instances().unwrap();
        let parent = ok(call(&container, ALICE, "create_post", json!({ "content": "kept" })));
        let reply = ok(call(
            &container,
            ALICE,
            "create_post",
            json!({ "content": "also kept", "in_reply_to": parent }),
        ));
        container.stop();
        (parent, reply)
    };

    let container = Container::from_config(config).unwrap();
    container.start_all_instances().unwrap();
    assert_eq!(
        ok(call(&container, ALICE, "my_posts", json!({}))),
        json!([parent, reply])
    );
    assert_eq!(
        ok(call(&container, ALICE, "get_replies", json!({ "post_address": parent }))),
        json!([reply])
    );
    let post = ok(call(&container, ALICE, "get_post", json!({ "post_address": parent })));
    assert_eq!(post["App"][0], json!("post"));
}
