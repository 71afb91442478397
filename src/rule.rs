//! Named predicate registry and the built-in CEL rule kind
//!
//! Rules are stored as tagged payloads (`kind` + `version` + config) and
//! evaluated through a registry of [`RuleEvaluator`] implementations. The
//! crate ships one kind, `"cel"`, which compiles a CEL expression and checks
//! it against `user`, `item` and `params` variables. Hosts register further
//! kinds with [`RuleRegistry::register`].

use crate::error::{RbacError, Result};
use crate::types::{CheckParams, Item, RulePayload};
use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::{Context, Program};
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// A named, reusable boolean predicate.
///
/// `evaluate` returns an error only for malformed payloads or evaluation
/// faults; the access check engine treats any error as a veto.
pub trait RuleEvaluator: Send + Sync {
    /// Evaluate the predicate for one user against one item.
    fn evaluate(
        &self,
        payload: &RulePayload,
        user_id: &str,
        item: &Item,
        params: &CheckParams,
    ) -> Result<bool>;

    /// Validate a payload ahead of persistence. Default accepts anything.
    fn validate(&self, _payload: &RulePayload) -> Result<()> {
        Ok(())
    }
}

/// Registry mapping rule payload kinds to evaluators
pub struct RuleRegistry {
    evaluators: DashMap<String, Arc<dyn RuleEvaluator>>,
}

impl RuleRegistry {
    /// Create a registry with the built-in `"cel"` kind registered
    pub fn new() -> Self {
        let registry = Self {
            evaluators: DashMap::new(),
        };
        registry.register("cel", Arc::new(CelRule::new()));
        registry
    }

    /// Register (or replace) an evaluator for a payload kind
    pub fn register(&self, kind: impl Into<String>, evaluator: Arc<dyn RuleEvaluator>) {
        self.evaluators.insert(kind.into(), evaluator);
    }

    /// Evaluate a payload, dispatching on its kind.
    ///
    /// An unknown kind is an error; the caller decides whether that vetoes
    /// the check or aborts the mutation.
    pub fn evaluate(
        &self,
        payload: &RulePayload,
        user_id: &str,
        item: &Item,
        params: &CheckParams,
    ) -> Result<bool> {
        let evaluator = self
            .evaluators
            .get(&payload.kind)
            .ok_or_else(|| RbacError::Validation(format!("Unknown rule kind: {}", payload.kind)))?;
        evaluator.evaluate(payload, user_id, item, params)
    }

    /// Validate a payload ahead of persistence (used by rule CRUD)
    pub fn validate(&self, payload: &RulePayload) -> Result<()> {
        let evaluator = self
            .evaluators
            .get(&payload.kind)
            .ok_or_else(|| RbacError::Validation(format!("Unknown rule kind: {}", payload.kind)))?;
        evaluator.validate(payload)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in CEL rule kind with compiled program caching.
///
/// Config shape: `{ "expression": "<cel>" }`. The expression sees three
/// variables:
/// - `user` - the user id string
/// - `item` - name, kind, description and data of the gated item
/// - `params` - the check params, including the injected `user` entry
pub struct CelRule {
    /// Compiled program cache, keyed by expression text
    programs: DashMap<String, Arc<Program>>,
}

impl CelRule {
    pub fn new() -> Self {
        Self {
            programs: DashMap::new(),
        }
    }

    fn expression<'a>(payload: &'a RulePayload) -> Result<&'a str> {
        payload
            .config
            .get("expression")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                RbacError::Validation("CEL rule payload is missing 'expression'".to_string())
            })
    }

    fn compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(program) = self.programs.get(expr) {
            return Ok(program.clone());
        }

        let program = Program::compile(expr)
            .map_err(|e| RbacError::Validation(format!("CEL compilation failed: {:?}", e)))?;
        let program = Arc::new(program);
        self.programs.insert(expr.to_string(), program.clone());
        Ok(program)
    }
}

impl Default for CelRule {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator for CelRule {
    fn evaluate(
        &self,
        payload: &RulePayload,
        user_id: &str,
        item: &Item,
        params: &CheckParams,
    ) -> Result<bool> {
        let program = self.compile(Self::expression(payload)?)?;

        let mut context = Context::default();
        let _ = context.add_variable("user", CelValue::String(user_id.to_string().into()));
        let _ = context.add_variable("item", json_to_cel(&item_variable(item)));
        let _ = context.add_variable("params", json_to_cel(&params_variable(params)));

        let result = program
            .execute(&context)
            .map_err(|e| RbacError::Validation(format!("CEL evaluation failed: {:?}", e)))?;

        match result {
            CelValue::Bool(b) => Ok(b),
            other => Err(RbacError::Validation(format!(
                "CEL rule did not return a boolean: {:?}",
                other
            ))),
        }
    }

    fn validate(&self, payload: &RulePayload) -> Result<()> {
        self.compile(Self::expression(payload)?).map(|_| ())
    }
}

// Thread safety: CelRule is Send + Sync because DashMap is thread-safe
unsafe impl Send for CelRule {}
unsafe impl Sync for CelRule {}

fn item_variable(item: &Item) -> JsonValue {
    serde_json::json!({
        "name": item.name,
        "kind": item.kind,
        "description": item.description,
        "data": item.data,
    })
}

fn params_variable(params: &CheckParams) -> JsonValue {
    JsonValue::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Convert serde_json::Value to cel_interpreter::Value
fn json_to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(b) => CelValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        JsonValue::String(s) => CelValue::String(s.clone().into()),
        JsonValue::Array(arr) => {
            let cel_vec: Vec<CelValue> = arr.iter().map(json_to_cel).collect();
            CelValue::List(cel_vec.into())
        }
        JsonValue::Object(obj) => {
            use cel_interpreter::objects::{Key, Map};

            let mut map_data: HashMap<Key, CelValue> = HashMap::new();
            for (k, v) in obj.iter() {
                map_data.insert(Key::from(k.clone()), json_to_cel(v));
            }
            CelValue::Map(Map {
                map: Arc::new(map_data),
            })
        }
    }
}
