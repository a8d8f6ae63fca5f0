//! Integration tests for the dhtcell container, blog application and replication

mod blog_contract;
mod convergence;
mod persistence;

use dhtcell::container::{make_config, Container, ZomeCallResult};
use dhtcell::error::ErrorKind;
use serde_json::Value;

pub const ALICE: &str = "alice::blog";
pub const BOB: &str = "bob::blog";

/// Container with alice and bob running the blog, both started
pub fn blog_pair() -> Container {
    let container = Container::from_config(make_config(&[("alice", "blog"), ("bob", "blog")])).unwrap();
    container.start_all_instances().unwrap();
    container
}

pub fn call(container: &Container, instance: &str, function: &str, params: Value) -> ZomeCallResult {
    container
        .call(instance, "blog", "main", function, params)
        .unwrap()
}

/// Unwrap a successful call
pub fn ok(result: ZomeCallResult) -> Value {
    match result {
        ZomeCallResult::Ok(value) => value,
        ZomeCallResult::Err(err) => panic!("call failed: {:?}", err),
    }
}

/// Kind of a failed call
pub fn err_kind(result: ZomeCallResult) -> ErrorKind {
    result.core_error().expect("call should fail").kind
}
