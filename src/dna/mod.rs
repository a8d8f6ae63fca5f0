//! Application packages (DNA)
//!
//! A DNA groups zomes. Each zome declares its entry types (with validation
//! rules and link definitions), its capabilities, and the native functions
//! callable through those capabilities. All instances of the same DNA share
//! one DNA address and replicate with each other.

pub mod blog;

use crate::entry::address;
use crate::error::CoreError;
use crate::instance::ZomeApi;
use crate::types::DnaAddress;
use crate::validation::ValidationRule;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Native zome function
pub type ZomeFn = Arc<dyn Fn(&ZomeApi<'_>, Value) -> Result<Value, CoreError> + Send + Sync>;

/// One end of a permitted link: the entry type at the other end and the tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDef {
    pub entry_type: String,
    pub tag: String,
}

impl LinkDef {
    pub fn new(entry_type: &str, tag: &str) -> Self {
        Self {
            entry_type: entry_type.to_string(),
            tag: tag.to_string(),
        }
    }
}

/// Application entry type definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryTypeDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
    /// Links from entries of this type to other types
    #[serde(default)]
    pub links_to: Vec<LinkDef>,
    /// Links from other types to entries of this type
    #[serde(default)]
    pub linked_from: Vec<LinkDef>,
}

impl EntryTypeDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            rules: Vec::new(),
            links_to: Vec::new(),
            linked_from: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn links_to(mut self, def: LinkDef) -> Self {
        self.links_to.push(def);
        self
    }

    pub fn linked_from(mut self, def: LinkDef) -> Self {
        self.linked_from.push(def);
        self
    }
}

/// Named grant of callable functions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub functions: Vec<String>,
}

impl Capability {
    pub fn new(functions: &[&str]) -> Self {
        Self {
            functions: functions.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn grants(&self, function: &str) -> bool {
        self.functions.iter().any(|f| f == function)
    }
}

/// Zome: a module of application logic
#[derive(Clone)]
pub struct Zome {
    pub name: String,
    entry_types: BTreeMap<String, EntryTypeDef>,
    capabilities: BTreeMap<String, Capability>,
    functions: BTreeMap<String, ZomeFn>,
}

impl Zome {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entry_types: BTreeMap::new(),
            capabilities: BTreeMap::new(),
            functions: BTreeMap::new(),
        }
    }

    pub fn with_entry_type(mut self, def: EntryTypeDef) -> Self {
        self.entry_types.insert(def.name.clone(), def);
        self
    }

    pub fn with_capability(mut self, name: &str, capability: Capability) -> Self {
        self.capabilities.insert(name.to_string(), capability);
        self
    }

    pub fn with_function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&ZomeApi<'_>, Value) -> Result<Value, CoreError> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
        self
    }

    pub fn entry_type(&self, name: &str) -> Option<&EntryTypeDef> {
        self.entry_types.get(name)
    }

    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&ZomeFn> {
        self.functions.get(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &String> {
        self.functions.keys()
    }
}

impl fmt::Debug for Zome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zome")
            .field("name", &self.name)
            .field("entry_types", &self.entry_types)
            .field("capabilities", &self.capabilities)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Serializable description of a DNA, hashed to produce its address
#[derive(Debug, Serialize)]
struct DnaSummary<'a> {
    name: &'a str,
    uuid: &'a str,
    zomes: BTreeMap<&'a str, ZomeSummary<'a>>,
}

#[derive(Debug, Serialize)]
struct ZomeSummary<'a> {
    entry_types: &'a BTreeMap<String, EntryTypeDef>,
    capabilities: &'a BTreeMap<String, Capability>,
    functions: Vec<&'a str>,
}

/// Application package
#[derive(Debug, Clone)]
pub struct Dna {
    pub name: String,
    /// Distinguishes otherwise identical packages into separate networks
    pub uuid: String,
    zomes: BTreeMap<String, Zome>,
}

impl Dna {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uuid: String::new(),
            zomes: BTreeMap::new(),
        }
    }

    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = uuid.to_string();
        self
    }

    pub fn with_zome(mut self, zome: Zome) -> Self {
        self.zomes.insert(zome.name.clone(), zome);
        self
    }

    pub fn zome(&self, name: &str) -> Option<&Zome> {
        self.zomes.get(name)
    }

    pub fn zomes(&self) -> impl Iterator<Item = &Zome> {
        self.zomes.values()
    }

    /// Entry type definition by name, searched across zomes
    pub fn entry_def(&self, entry_type: &str) -> Option<&EntryTypeDef> {
        self.zomes.values().find_map(|z| z.entry_type(entry_type))
    }

    /// True if a link `base_type -[tag]-> target_type` is declared on either end
    pub fn link_allowed(&self, base_type: &str, tag: &str, target_type: &str) -> bool {
        let declared_on_base = self
            .entry_def(base_type)
            .map(|def| {
                def.links_to
                    .iter()
                    .any(|l| l.tag == tag && l.entry_type == target_type)
            })
            .unwrap_or(false);
        let declared_on_target = self
            .entry_def(target_type)
            .map(|def| {
                def.linked_from
                    .iter()
                    .any(|l| l.tag == tag && l.entry_type == base_type)
            })
            .unwrap_or(false);
        declared_on_base || declared_on_target
    }

    /// Content address of the package definition
    pub fn address(&self) -> DnaAddress {
        let summary = DnaSummary {
            name: &self.name,
            uuid: &self.uuid,
            zomes: self
                .zomes
                .iter()
                .map(|(name, zome)| {
                    (
                        name.as_str(),
                        ZomeSummary {
                            entry_types: &zome.entry_types,
                            capabilities: &zome.capabilities,
                            functions: zome.functions.keys().map(String::as_str).collect(),
                        },
                    )
                })
                .collect(),
        };
        // Summaries hold only strings and string-keyed maps
        address::address_of(&summary)
            .unwrap_or_else(|_| address::address_of_bytes(self.name.as_bytes()))
    }
}

/// Built-in application packages, by name
pub fn builtin(app: &str) -> Option<Dna> {
    match app {
        blog::APP_NAME => Some(blog::dna()),
        _ => None,
    }
}

/// Application packages a container can instantiate, by app name
#[derive(Debug, Clone, Default)]
pub struct DnaRegistry {
    apps: BTreeMap<String, Dna>,
}

impl DnaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in package
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for app in [blog::APP_NAME] {
            if let Some(dna) = builtin(app) {
                registry.register(app, dna);
            }
        }
        registry
    }

    pub fn register(&mut self, app: &str, dna: Dna) {
        self.apps.insert(app.to_string(), dna);
    }

    pub fn get(&self, app: &str) -> Option<&Dna> {
        self.apps.get(app)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.apps.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dna_address_is_stable_and_uuid_sensitive() {
        let a = blog::dna();
        let b = blog::dna();
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), blog::dna().with_uuid("other").address());
    }

    #[test]
    fn test_link_allowed_either_end() {
        let dna = blog::dna();
        assert!(dna.link_allowed("%agent_id", "authored_posts", "post"));
        assert!(dna.link_allowed("post", "comments", "post"));
        assert!(!dna.link_allowed("post", "authored_posts", "post"));
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(builtin("blog").is_some());
        assert!(builtin("nope").is_none());
        let mut registry = DnaRegistry::builtin();
        assert!(registry.get("blog").is_some());
        registry.register("notes", Dna::new("notes"));
        assert_eq!(registry.names().count(), 2);
    }

    #[test]
    fn test_capability_grants() {
        let cap = Capability::new(&["a", "b"]);
        assert!(cap.grants("a"));
        assert!(!cap.grants("c"));
    }
}
