// Dispatch table for string-identified operations.
// Resolves "method#argument" tokens to handlers registered by each service.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::api::Service;
use crate::error::{CampusPayError, Result};

/// Separator between the operation name and its embedded argument.
pub const TOKEN_SEPARATOR: char = '#';

/// A registered operation taking JSON arguments.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Parsed form of a dispatch token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchToken<'a> {
    pub method: &'a str,
    pub argument: Option<&'a str>,
}

/// Split a token on its first separator.
pub fn parse_token(token: &str) -> DispatchToken<'_> {
    match token.split_once(TOKEN_SEPARATOR) {
        Some((method, argument)) => DispatchToken {
            method,
            argument: Some(argument),
        },
        None => DispatchToken {
            method: token,
            argument: None,
        },
    }
}

/// Operation bound to its handler and optional embedded argument.
#[derive(Clone)]
pub struct BoundCall {
    method: String,
    argument: Option<String>,
    handler: Handler,
}

impl BoundCall {
    /// Invoke with the embedded argument (if any) placed before `args`.
    pub fn call(&self, mut args: Vec<Value>) -> BoxFuture<'static, Result<Value>> {
        if let Some(argument) = &self.argument {
            args.insert(0, Value::String(argument.clone()));
        }
        (self.handler)(args)
    }
}

impl std::fmt::Debug for BoundCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundCall")
            .field("method", &self.method)
            .field("argument", &self.argument)
            .finish()
    }
}

/// Operations of one service, keyed by name.
#[derive(Clone)]
pub struct DispatchTable {
    service: String,
    handlers: HashMap<String, Handler>,
}

impl DispatchTable {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Register an operation. Names containing the separator are reserved for tokens.
    pub fn register<F, Fut>(&mut self, name: &str, operation: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        debug_assert!(!name.contains(TOKEN_SEPARATOR));
        let handler: Handler = Arc::new(move |args| operation(args).boxed());
        if self.handlers.insert(name.to_string(), handler).is_some() {
            warn!(service = %self.service, operation = name, "operation registered twice");
        }
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a token, failing with `Lookup` when the operation is unknown.
    pub fn resolve(&self, token: &str) -> Result<BoundCall> {
        let parsed = parse_token(token);
        let handler = self
            .handlers
            .get(parsed.method)
            .ok_or_else(|| CampusPayError::Lookup {
                service: self.service.clone(),
                method: parsed.method.to_string(),
            })?;

        Ok(BoundCall {
            method: parsed.method.to_string(),
            argument: parsed.argument.map(str::to_string),
            handler: Arc::clone(handler),
        })
    }

    pub async fn invoke(&self, token: &str, args: Vec<Value>) -> Result<Value> {
        self.resolve(token)?.call(args).await
    }
}

/// Dispatch tables of every registered service, keyed by service type.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    tables: BTreeMap<String, DispatchTable>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service's operations under its `TYPE`.
    pub fn register<S: Service>(&mut self, service: Arc<S>) {
        let table = service.operations();
        self.insert(table);
    }

    pub fn insert(&mut self, table: DispatchTable) {
        if self.tables.contains_key(table.service()) {
            warn!(service = table.service(), "service registered twice, replacing");
        }
        self.tables.insert(table.service().to_string(), table);
    }

    pub fn table(&self, service: &str) -> Result<&DispatchTable> {
        self.tables
            .get(service)
            .ok_or_else(|| CampusPayError::UnknownService(service.to_string()))
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn resolve(&self, service: &str, token: &str) -> Result<BoundCall> {
        self.table(service)?.resolve(token)
    }

    pub async fn invoke(&self, service: &str, token: &str, args: Vec<Value>) -> Result<Value> {
        self.resolve(service, token)?.call(args).await
    }
}

/// String argument at `index`. Numbers and booleans are accepted in text form.
pub fn arg_string(args: &[Value], index: usize, method: &str) -> Result<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(invalid_argument(
            method,
            format!("argument {index} is not a string: {other}"),
        )),
        None => Err(invalid_argument(method, format!("missing argument {index}"))),
    }
}

/// Boolean argument at `index`. Accepts `true`/`false` in text form.
pub fn arg_bool(args: &[Value], index: usize, method: &str) -> Result<bool> {
    match args.get(index) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => s.parse().map_err(|_| {
            invalid_argument(method, format!("argument {index} is not a boolean: {s}"))
        }),
        Some(other) => Err(invalid_argument(
            method,
            format!("argument {index} is not a boolean: {other}"),
        )),
        None => Err(invalid_argument(method, format!("missing argument {index}"))),
    }
}

/// Serialize an operation result into a dispatch payload.
pub fn to_payload<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn invalid_argument(method: &str, message: String) -> CampusPayError {
    CampusPayError::InvalidArgument {
        method: method.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recording_table(calls: Arc<Mutex<Vec<Vec<Value>>>>) -> DispatchTable {
        let mut table = DispatchTable::new("test");
        table.register("getUser", move |args| {
            let calls = Arc::clone(&calls);
            async move {
                let id = arg_string(&args, 0, "getUser")?;
                calls.lock().unwrap().push(args);
                Ok(json!({ "id": id }))
            }
        });
        table
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(
            parse_token("getUser#42"),
            DispatchToken {
                method: "getUser",
                argument: Some("42")
            }
        );
        assert_eq!(parse_token("getUser").argument, None);
        // Only the first separator splits.
        assert_eq!(parse_token("a#b#c").argument, Some("b#c"));
        assert_eq!(parse_token("a#").argument, Some(""));
    }

    #[tokio::test]
    async fn test_embedded_and_explicit_argument_are_equivalent() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let table = recording_table(Arc::clone(&calls));

        let embedded = table.invoke("getUser#42", vec![]).await.unwrap();
        let explicit = table.invoke("getUser", vec![json!(42)]).await.unwrap();

        assert_eq!(embedded, json!({"id": "42"}));
        assert_eq!(explicit, json!({"id": "42"}));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_embedded_argument_comes_first() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let table = recording_table(Arc::clone(&calls));

        table.invoke("getUser#7", vec![json!("extra")]).await.unwrap();

        assert_eq!(calls.lock().unwrap()[0], vec![json!("7"), json!("extra")]);
    }

    #[test]
    fn test_unknown_method_fails_at_resolution() {
        let table = recording_table(Arc::new(Mutex::new(Vec::new())));

        let err = table.resolve("getRepo#1").unwrap_err();

        match err {
            CampusPayError::Lookup { service, method } => {
                assert_eq!(service, "test");
                assert_eq!(method, "getRepo");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_registry_unknown_service() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.resolve("wallet", "getHistory"),
            Err(CampusPayError::UnknownService(_))
        ));
    }

    #[test]
    fn test_registry_lists_services_and_names() {
        let mut registry = ServiceRegistry::new();
        registry.insert(recording_table(Arc::new(Mutex::new(Vec::new()))));

        assert_eq!(registry.services().collect::<Vec<_>>(), vec!["test"]);
        assert_eq!(registry.table("test").unwrap().names(), vec!["getUser"]);
    }

    #[test]
    fn test_argument_helpers() {
        let args = vec![json!("true"), json!(false), json!(3), json!([1])];
        assert!(arg_bool(&args, 0, "m").unwrap());
        assert!(!arg_bool(&args, 1, "m").unwrap());
        assert!(arg_bool(&args, 2, "m").is_err());
        assert_eq!(arg_string(&args, 2, "m").unwrap(), "3");
        assert!(arg_string(&args, 3, "m").is_err());
        assert!(arg_string(&args, 9, "m").is_err());
    }
}
