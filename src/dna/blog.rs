//! Built-in blog application
//!
//! One zome, `blog`, with a single app entry type `post`. Posts are linked
//! from their author's agent entry (`authored_posts`) and from the post they
//! reply to (`comments`).

use super::{Capability, Dna, EntryTypeDef, LinkDef, Zome};
use crate::entry::Entry;
use crate::error::CoreError;
use crate::instance::ZomeApi;
use crate::types::Address;
use crate::validation::ValidationRule;
use serde::Deserialize;
use serde_json::{json, Value};

pub const APP_NAME: &str = "blog";
pub const ZOME_NAME: &str = "blog";
pub const POST: &str = "post";
pub const AUTHORED_POSTS: &str = "authored_posts";
pub const COMMENTS: &str = "comments";
pub const MAX_POST_LENGTH: usize = 280;

/// Blog DNA
pub fn dna() -> Dna {
    Dna::new(APP_NAME).with_zome(zome())
}

fn zome() -> Zome {
    Zome::new(ZOME_NAME)
        .with_entry_type(
            EntryTypeDef::new(POST)
                .with_description("A short blog post")
                .with_rule(ValidationRule::required("content"))
                .with_rule(ValidationRule::max_length(
                    "content",
                    MAX_POST_LENGTH,
                    "Content too long",
                ))
                .linked_from(LinkDef::new("%agent_id", AUTHORED_POSTS))
                .links_to(LinkDef::new(POST, COMMENTS)),
        )
        .with_capability(
            "main",
            Capability::new(&[
                "create_post",
                "get_post",
                "update_post",
                "delete_post",
                "posts_by_agent",
                "my_posts",
                "get_replies",
                "whoami",
                "show_env",
            ]),
        )
        .with_capability(
            "read",
            Capability::new(&[
                "get_post",
                "posts_by_agent",
                "my_posts",
                "get_replies",
                "whoami",
                "show_env",
            ]),
        )
        .with_function("create_post", create_post)
        .with_function("get_post", get_post)
        .with_function("update_post", update_post)
        .with_function("delete_post", delete_post)
        .with_function("posts_by_agent", posts_by_agent)
        .with_function("my_posts", my_posts)
        .with_function("get_replies", get_replies)
        .with_function("whoami", whoami)
        .with_function("show_env", show_env)
}

#[derive(Debug, Deserialize)]
struct CreatePost {
    content: String,
    #[serde(default)]
    in_reply_to: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostAddress {
    post_address: Address,
}

#[derive(Debug, Deserialize)]
struct UpdatePost {
    post_address: Address,
    new_content: String,
}

#[derive(Debug, Deserialize)]
struct ByAgent {
    agent: Address,
}

fn post_entry(content: &str, date_created: &str) -> Entry {
    Entry::app(
        POST,
        json!({ "content": content, "date_created": date_created }),
    )
}

fn addresses(list: Vec<Address>) -> Value {
    Value::Array(
        list.into_iter()
            .map(|a| Value::String(a.as_str().to_string()))
            .collect(),
    )
}

/// Commit a post together with its author link and, if replying, the
/// comment link. All three are validated before any is written.
fn create_post(api: &ZomeApi<'_>, params: Value) -> Result<Value, CoreError> {
    let params: CreatePost = serde_json::from_value(params)?;
    let post = post_entry(
        &params.content,
        params.timestamp.as_deref().unwrap_or("now"),
    );
    let post_address = post.address();

    let mut batch = vec![
        post,
        api.link_entry(&api.agent_address(), &post_address, AUTHORED_POSTS),
    ];
    if let Some(parent) = params.in_reply_to.filter(|p| !p.is_empty()) {
        batch.push(api.link_entry(&Address::from(parent), &post_address, COMMENTS));
    }
    api.commit_batch(batch)?;
    Ok(Value::String(post_address.as_str().to_string()))
}

fn get_post(api: &ZomeApi<'_>, params: Value) -> Result<Value, CoreError> {
    let params: PostAddress = serde_json::from_value(params)?;
    match api.get_entry(&params.post_address)? {
        Some(entry) => entry.to_envelope(),
        None => Ok(Value::Null),
    }
}

fn update_post(api: &ZomeApi<'_>, params: Value) -> Result<Value, CoreError> {
    let params: UpdatePost = serde_json::from_value(params)?;
    let old = api
        .get_entry(&params.post_address)?
        .ok_or_else(|| CoreError::generic("Entry to update not found"))?;
    let date_created = old
        .app_value()
        .and_then(|v| v.get("date_created"))
        .and_then(Value::as_str)
        .unwrap_or("now")
        .to_string();
    api.update_entry(&params.post_address, post_entry(&params.new_content, &date_created))?;
    Ok(Value::Null)
}

fn delete_post(api: &ZomeApi<'_>, params: Value) -> Result<Value, CoreError> {
    let params: PostAddress = serde_json::from_value(params)?;
    api.remove_entry(&params.post_address)?;
    Ok(Value::Null)
}

fn posts_by_agent(api: &ZomeApi<'_>, params: Value) -> Result<Value, CoreError> {
    let params: ByAgent = serde_json::from_value(params)?;
    Ok(addresses(api.get_links(&params.agent, AUTHORED_POSTS)))
}

fn my_posts(api: &ZomeApi<'_>, _params: Value) -> Result<Value, CoreError> {
    Ok(addresses(api.get_links(&api.agent_address(), AUTHORED_POSTS)))
}

fn get_replies(api: &ZomeApi<'_>, params: Value) -> Result<Value, CoreError> {
    let params: PostAddress = serde_json::from_value(params)?;
    Ok(addresses(api.get_links(&params.post_address, COMMENTS)))
}

fn whoami(api: &ZomeApi<'_>, _params: Value) -> Result<Value, CoreError> {
    Ok(Value::String(api.agent_address().as_str().to_string()))
}

fn show_env(api: &ZomeApi<'_>, _params: Value) -> Result<Value, CoreError> {
    Ok(json!({
        "dna_name": api.dna().name,
        "dna_address": api.dna_address().as_str(),
        "agent_id": api.agent(),
        "agent_address": api.agent_address().as_str(),
        "instance_id": api.instance_id(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_entry_shape() {
        let entry = post_entry("hi", "now");
        assert_eq!(
            entry.app_value(),
            Some(&json!({ "content": "hi", "date_created": "now" }))
        );
    }

    #[test]
    fn test_read_capability_excludes_writes() {
        let zome = zome();
        let read = zome.capability("read").unwrap();
        assert!(!read.grants("create_post"));
        assert!(read.grants("get_post"));
        assert!(zome.capability("main").unwrap().grants("create_post"));
    }

    #[test]
    fn test_every_granted_function_exists() {
        let zome = zome();
        for name in ["main", "read"] {
            for function in &zome.capability(name).unwrap().functions {
                assert!(zome.function(function).is_some(), "{}", function);
            }
        }
    }
}
