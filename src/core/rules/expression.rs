use crate::core::rules::error::RuleError;
use rhai::packages::{Package, StandardPackage};
use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use serde_json::{Map as JsonMap, Number, Value};

/// Query engine over event snapshots, using a locked-down Rhai configuration.
///
/// Every top-level key of the snapshot object becomes a variable in scope, so
/// `issue.title` or `variables.author` read straight from the snapshot.
pub struct QueryEngine {
    engine: Engine,
}

impl Default for QueryEngine {
    fn default() -> Self {
        let mut engine = Engine::new_raw();
        engine.register_global_module(StandardPackage::new().as_shared_module());
        engine.set_max_operations(50_000);
        engine.set_max_call_levels(32);
        engine.set_max_expr_depths(64, 64);
        engine.set_max_string_size(1 << 20);
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});
        QueryEngine { engine }
    }
}

impl QueryEngine {
    pub fn compile(&self, expr: &str) -> Result<AST, RuleError> {
        self.engine
            .compile_expression(expr)
            .map_err(|err| RuleError::Query(format!("compile error in '{}': {}", expr, err)))
    }

    /// Evaluate `expr` with the snapshot's top-level fields bound as variables.
    pub fn evaluate(&self, expr: &str, snapshot: &Value) -> Result<Value, RuleError> {
        let mut scope = Scope::new();
        if let Value::Object(fields) = snapshot {
            for (name, value) in fields {
                scope.push_dynamic(name.as_str(), to_dynamic(value));
            }
        }
        let result = self
            .engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, expr)
            .map_err(|err| RuleError::Query(format!("'{}': {}", expr, err)))?;
        Ok(from_dynamic(result))
    }
}

/// Truthiness used by `expr` checks.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::from(0_i64)
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            let arr: Array = items.iter().map(to_dynamic).collect();
            Dynamic::from_array(arr)
        }
        Value::Object(map) => {
            let mut rhai_map = Map::new();
            for (key, value) in map {
                rhai_map.insert(key.into(), to_dynamic(value));
            }
            Dynamic::from_map(rhai_map)
        }
    }
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Some(b) = value.clone().try_cast::<bool>() {
        return Value::Bool(b);
    }
    if let Some(i) = value.clone().try_cast::<i64>() {
        return Value::Number(Number::from(i));
    }
    if let Some(f) = value.clone().try_cast::<f64>() {
        if let Some(num) = Number::from_f64(f) {
            return Value::Number(num);
        }
    }
    if let Some(s) = value.clone().try_cast::<String>() {
        return Value::String(s);
    }
    if let Some(arr) = value.clone().try_cast::<Array>() {
        return Value::Array(arr.into_iter().map(from_dynamic).collect());
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        let mut json_map = JsonMap::new();
        for (key, value) in map {
            json_map.insert(key.into(), from_dynamic(value));
        }
        return Value::Object(json_map);
    }
    Value::String(value.to_string())
}
