//! Builds the script engine a component runs in.
//!
//! The engine starts raw (no file resolver, no packages beyond the standard
//! one) and only gains the allow-listed bindings: `ui`, `Link`, the hooks and
//! the six API namespaces.

use rhai::packages::{Package, StandardPackage};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Module, FLOAT, INT};
use serde_json::{Number, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::hooks::{register_hooks, HookState};
use super::node::{link_module, ui_module, UiNode};
use crate::api::{ApiTransport, Endpoint, Namespace, Verb, NAMESPACES};
use crate::config::DEFAULT_MAX_OPERATIONS;

/// Resource ceilings for one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_levels: 48,
            max_expr_depth: 96,
            max_string_size: 256 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

impl Limits {
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }
}

pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i as INT)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f as FLOAT)
            } else {
                Dynamic::UNIT
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from(items.iter().map(json_to_dynamic).collect::<Array>()),
        Value::Object(map) => Dynamic::from(
            map.iter()
                .map(|(k, v)| (k.as_str().into(), json_to_dynamic(v)))
                .collect::<Map>(),
        ),
    }
}

pub fn dynamic_to_json(value: &Dynamic) -> Value {
    let value = value.clone().flatten();
    if value.is_unit() {
        Value::Null
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        Value::Number(i.into())
    } else if let Ok(f) = value.as_float() {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    } else if value.is_string() {
        Value::String(value.to_string())
    } else if value.is_array() {
        Value::Array(value.cast::<Array>().iter().map(dynamic_to_json).collect())
    } else if value.is_map() {
        Value::Object(
            value
                .cast::<Map>()
                .iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                .collect(),
        )
    } else {
        Value::String(value.to_string())
    }
}

/// Run one endpoint and wrap the payload as `#{ data: ... }`.
fn call_endpoint(
    transport: &dyn ApiTransport,
    namespace: &str,
    endpoint: &Endpoint,
    args: &[Dynamic],
) -> Result<Dynamic, Box<EvalAltResult>> {
    let values: Vec<Value> = args.iter().map(dynamic_to_json).collect();
    let request = endpoint
        .request(&values)
        .map_err(|e| format!("{}::{}: {}", namespace, endpoint.name, e))?;
    let data = transport
        .send(&request)
        .map_err(|e| format!("{}::{}: {}", namespace, endpoint.name, e))?;

    let mut response = Map::new();
    response.insert("data".into(), json_to_dynamic(&data));
    Ok(Dynamic::from(response))
}

fn api_module(namespace: &'static Namespace, transport: Arc<dyn ApiTransport>) -> Module {
    let mut module = Module::new();
    let ns = namespace.name;

    for endpoint in namespace.endpoints {
        let t = transport.clone();
        match endpoint.verb {
            Verb::List => {
                let t2 = t.clone();
                module.set_native_fn(endpoint.name, move || call_endpoint(&*t, ns, endpoint, &[]));
                module.set_native_fn(endpoint.name, move |params: Dynamic| {
                    call_endpoint(&*t2, ns, endpoint, &[params])
                });
            }
            Verb::Fetch => {
                module.set_native_fn(endpoint.name, move || call_endpoint(&*t, ns, endpoint, &[]));
            }
            Verb::Get | Verb::Delete | Verb::Create => {
                module.set_native_fn(endpoint.name, move |arg: Dynamic| {
                    call_endpoint(&*t, ns, endpoint, &[arg])
                });
            }
            Verb::Update => {
                module.set_native_fn(endpoint.name, move |id: Dynamic, data: Dynamic| {
                    call_endpoint(&*t, ns, endpoint, &[id, data])
                });
            }
        }
    }
    module
}

pub fn build_engine(
    limits: Limits,
    hooks: Arc<Mutex<HookState>>,
    transport: Arc<dyn ApiTransport>,
) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(StandardPackage::new().as_shared_module());

    engine
        .set_max_operations(limits.max_operations)
        .set_max_call_levels(limits.max_call_levels)
        .set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth / 2)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size)
        .set_max_map_size(limits.max_map_size);

    engine.disable_symbol("eval");

    engine.on_print(|text| info!(target: "component", "{}", text));
    engine.on_debug(|text, source, pos| {
        debug!(target: "component", source = source.unwrap_or(""), %pos, "{}", text)
    });

    engine.register_type_with_name::<UiNode>("UiNode");
    register_hooks(&mut engine, hooks.clone());
    engine.register_static_module("ui", ui_module(hooks).into());
    engine.register_static_module("Link", link_module().into());

    for namespace in NAMESPACES {
        engine.register_static_module(namespace.name, api_module(namespace, transport.clone()).into());
    }

    engine
}
