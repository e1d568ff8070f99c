//! Shared state for test steps
//!
//! Two scopes live behind one reader/writer lock:
//! - **scenario**: values produced by one scenario's steps (namespace, names
//!   discovered while polling, responses). The test runner calls
//!   [`Store::begin_scenario`] at every scenario boundary.
//! - **suite**: process-lifetime singletons such as the CLI handle.
//!
//! Construct one [`Store`] at process start, share it as `Arc<Store>`, and call
//! [`Store::teardown`] at process end.
//!
//! # Example
//!
//! ```
//! use pipelines_e2e::store::{Scope, Store, Value};
//!
//! let store = Store::new();
//! store.put(Scope::Scenario, "namespace", Value::Text("ns-123".to_string()));
//!
//! assert_eq!(store.namespace(), "ns-123");
//! assert_eq!(store.get_as::<String>(Scope::Scenario, "namespace"), Some("ns-123".to_string()));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::clients::{Clients, ResourceNames};
use crate::oc::Oc;

/// HTTP response kept for later assertions
pub type HttpResponse = http::Response<Vec<u8>>;

/// Scenario key for the test namespace
pub const NAMESPACE: &str = "namespace";
/// Scenario key for the operator's target namespace
pub const TARGET_NAMESPACE: &str = "targetNamespace";
/// Scenario key for the client handle
pub const CLIENTS: &str = "clients";
/// Scenario key for operator CR names
pub const CR_NAMES: &str = "crnames";
/// Scenario key for the last HTTP response
pub const RESPONSE: &str = "response";
/// Scenario key for the last request payload
pub const PAYLOAD: &str = "payload";
/// Suite key for the CLI handle
pub const CLI: &str = "cli";

/// Lifetime of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Current scenario only
    Scenario,
    /// Whole process
    Suite,
}

/// The closed set of values the store holds
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    List(Vec<String>),
    Payload(Vec<u8>),
    Clients(Arc<Clients>),
    Response(Arc<HttpResponse>),
    ResourceNames(ResourceNames),
    Cli(Oc),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Payload(_) => "payload",
            Self::Clients(_) => "clients",
            Self::Response(_) => "response",
            Self::ResourceNames(_) => "resource names",
            Self::Cli(_) => "cli",
        }
    }
}

/// Checked conversion out of a stored [`Value`]
pub trait FromValue: Sized {
    /// `None` when the value holds another variant
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => Some(items.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Payload(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }
}

impl FromValue for Arc<Clients> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Clients(c) => Some(Arc::clone(c)),
            _ => None,
        }
    }
}

impl FromValue for Arc<HttpResponse> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Response(r) => Some(Arc::clone(r)),
            _ => None,
        }
    }
}

impl FromValue for ResourceNames {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::ResourceNames(names) => Some(names.clone()),
            _ => None,
        }
    }
}

impl FromValue for Oc {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Cli(oc) => Some(oc.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Scopes {
    scenario: HashMap<String, Value>,
    suite: HashMap<String, Value>,
}

impl Scopes {
    fn map(&self, scope: Scope) -> &HashMap<String, Value> {
        match scope {
            Scope::Scenario => &self.scenario,
            Scope::Suite => &self.suite,
        }
    }

    fn map_mut(&mut self, scope: Scope) -> &mut HashMap<String, Value> {
        match scope {
            Scope::Scenario => &mut self.scenario,
            Scope::Suite => &mut self.suite,
        }
    }
}

/// Thread-safe store for scenario and suite state
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<Scopes>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous value under `key`
    pub fn put(&self, scope: Scope, key: impl Into<String>, value: Value) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.map_mut(scope).insert(key.into(), value);
    }

    /// Fetch a copy of the value under `key`
    pub fn get(&self, scope: Scope, key: &str) -> Option<Value> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.map(scope).get(key).cloned()
    }

    /// Fetch and downcast; `None` if absent or of another type
    pub fn get_as<T: FromValue>(&self, scope: Scope, key: &str) -> Option<T> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.map(scope).get(key).and_then(T::from_value)
    }

    /// Remove a value, returning it
    pub fn remove(&self, scope: Scope, key: &str) -> Option<Value> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.map_mut(scope).remove(key)
    }

    /// Start a fresh scenario scope; suite values are kept
    pub fn begin_scenario(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.scenario = HashMap::new();
    }

    /// Drop everything at process end
    pub fn teardown(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.scenario.clear();
        guard.suite.clear();
    }

    // -- scenario accessors ------------------------------------------------

    /// Test namespace, empty if unset
    pub fn namespace(&self) -> String {
        self.get_as(Scope::Scenario, NAMESPACE).unwrap_or_default()
    }

    /// Operator target namespace, empty if unset
    pub fn target_namespace(&self) -> String {
        self.get_as(Scope::Scenario, TARGET_NAMESPACE)
            .unwrap_or_default()
    }

    /// Client handle for this scenario
    pub fn clients(&self) -> Option<Arc<Clients>> {
        self.get_as(Scope::Scenario, CLIENTS)
    }

    /// Operator CR names, empty if unset
    pub fn cr_names(&self) -> ResourceNames {
        self.get_as(Scope::Scenario, CR_NAMES).unwrap_or_default()
    }

    /// Last HTTP response
    pub fn http_response(&self) -> Option<Arc<HttpResponse>> {
        self.get_as(Scope::Scenario, RESPONSE)
    }

    /// Last request payload
    pub fn payload(&self) -> Option<Vec<u8>> {
        self.get_as(Scope::Scenario, PAYLOAD)
    }

    /// String stored under `key`, empty if unset
    pub fn scenario_data(&self, key: &str) -> String {
        self.get_as(Scope::Scenario, key).unwrap_or_default()
    }

    /// String list stored under `key`, empty if unset
    pub fn scenario_data_slice(&self, key: &str) -> Vec<String> {
        self.get_as(Scope::Scenario, key).unwrap_or_default()
    }

    /// Store a string for this scenario
    pub fn put_scenario_data(&self, key: impl Into<String>, value: impl Into<String>) {
        self.put(Scope::Scenario, key, Value::Text(value.into()));
    }

    /// Store a string list for this scenario
    pub fn put_scenario_data_slice(&self, key: impl Into<String>, value: Vec<String>) {
        self.put(Scope::Scenario, key, Value::List(value));
    }

    // -- suite accessors ---------------------------------------------------

    /// Store a value for the whole suite
    pub fn put_suite_data(&self, key: impl Into<String>, value: Value) {
        self.put(Scope::Suite, key, value);
    }

    /// Suite value under `key`
    pub fn suite_data(&self, key: &str) -> Option<Value> {
        self.get(Scope::Suite, key)
    }

    /// CLI handle registered at suite start
    ///
    /// # Panics
    ///
    /// Panics if no CLI handle was stored under [`CLI`] in suite scope. The
    /// suite setup must register it before any scenario runs.
    pub fn cli(&self) -> Oc {
        match self.get(Scope::Suite, CLI) {
            Some(Value::Cli(oc)) => oc,
            Some(other) => panic!(
                "store: suite value '{CLI}' has type {}, expected cli",
                other.type_name()
            ),
            None => panic!("store: suite value '{CLI}' not set; suite setup did not run"),
        }
    }
}
