//! Template evaluation for rule bodies and store config expansion.
//!
//! Built on `tera`, the same templating crate the `blockscout-ens` reader
//! uses to generate parameterised SQL; here the "generated text" is a query
//! body or a store config value instead of SQL.

use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tera::{Context, Function, Tera};

/// Rule-authored `get "<domain>:<class>:<query>"` recursion is bounded so a
/// misbehaving rule set can't loop forever; the class graph itself is
/// naturally bounded by de-duplication, but template recursion is not.
pub const DEFAULT_MAX_GET_RECURSION: usize = 8;

thread_local! {
    static GET_DEPTH: RefCell<usize> = const { RefCell::new(0) };
}

/// A sub-query executor installed by [`crate::engine::Engine`] once it is
/// frozen, so the built-in `get` template function can re-enter the engine.
/// Returns the template contexts (`Object::template_context()`) of every
/// result object, in result order.
pub type GetHandler = Arc<dyn Fn(&str) -> Result<Vec<Json>, String> + Send + Sync>;

/// Wraps a `tera::Tera` instance with the standard function library plus
/// whatever per-domain/per-store functions have been registered.
pub struct TemplateEngine {
    tera: RwLock<Tera>,
    get_handler: Arc<RwLock<Option<GetHandler>>>,
    max_get_recursion: usize,
}

impl TemplateEngine {
    pub fn new() -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        register_standard_library(&mut tera);
        let get_handler = Arc::new(RwLock::new(None));
        tera.register_function("get", Box::new(GetFunction(Arc::clone(&get_handler))) as Box<dyn Function>);
        Ok(TemplateEngine {
            tera: RwLock::new(tera),
            get_handler,
            max_get_recursion: DEFAULT_MAX_GET_RECURSION,
        })
    }

    #[cfg(test)]
    pub fn with_max_get_recursion(mut self, max: usize) -> Self {
        self.max_get_recursion = max;
        self
    }

    /// Installs the engine's sub-query executor. Must be called before any
    /// rule template that uses `get` is rendered; store-config expansion
    /// never uses `get` (it runs before the engine is frozen) so it is fine
    /// for this to be unset at that point.
    pub fn install_get_handler(&self, handler: GetHandler) {
        let max = self.max_get_recursion;
        let wrapped: GetHandler = Arc::new(move |query_string: &str| {
            let depth = GET_DEPTH.with(|d| {
                let mut d = d.borrow_mut();
                *d += 1;
                *d
            });
            let result = if depth > max {
                Err(format!(
                    "get recursion depth {depth} exceeds limit {max} (query: {query_string})"
                ))
            } else {
                handler(query_string)
            };
            GET_DEPTH.with(|d| *d.borrow_mut() -= 1);
            result
        });
        *self.get_handler.write().expect("lock poisoned") = Some(wrapped);
    }

    /// Registers functions contributed by a domain or store's
    /// `TemplateFuncs()` capability. Collisions resolve last-writer-wins; a
    /// collision is logged as a warning rather than rejected, since a domain
    /// reloading its own functions during tests is legitimate.
    pub fn register_domain_funcs(&self, funcs: HashMap<String, Box<dyn Function>>) {
        let mut tera = self.tera.write().expect("lock poisoned");
        for (name, f) in funcs {
            tracing::debug!(function = name.as_str(), "registering template function");
            tera.register_function(&name, f);
        }
    }

    pub fn register_function(&self, name: &str, f: Box<dyn Function>) {
        self.tera.write().expect("lock poisoned").register_function(name, f);
    }

    /// Renders `template_str` against an empty context, with the engine's
    /// full function table available. Used for store-config expansion
    /// and for rules whose body doesn't need the start object.
    pub fn render_str(&self, template_str: &str) -> Result<String, tera::Error> {
        self.render_str_with_context(template_str, &Context::new())
    }

    /// Renders `template_str` against `context` (typically the start
    /// object's `template_context()`), with the engine's full function table
    /// available.
    pub fn render_str_with_context(&self, template_str: &str, context: &Context) -> Result<String, tera::Error> {
        // `Tera::render_str` requires `&mut self` because it compiles the
        // template into its internal cache; we take the write lock for the
        // duration of a single render rather than holding a long-lived mutable
        // borrow, matching the read-mostly/write-rarely shape of the cache.
        self.tera
            .write()
            .expect("lock poisoned")
            .render_str(template_str, context)
    }
}

struct GetFunction(Arc<RwLock<Option<GetHandler>>>);

impl Function for GetFunction {
    fn call(&self, args: &HashMap<String, Json>) -> tera::Result<Json> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| tera::Error::msg("get() requires a `query` argument"))?;

        let handler = self.0.read().expect("lock poisoned").clone();
        let handler = handler.ok_or_else(|| tera::Error::msg("get() called before engine was frozen"))?;
        let results = handler(query).map_err(tera::Error::msg)?;
        Ok(Json::Array(results))
    }

    fn is_safe(&self) -> bool {
        false
    }
}

fn register_standard_library(tera: &mut Tera) {
    tera.register_function("default", Box::new(default_fn) as Box<dyn Function>);
    tera.register_function("urlEncode", Box::new(url_encode_fn) as Box<dyn Function>);
    tera.register_function("regexReplace", Box::new(regex_replace_fn) as Box<dyn Function>);
    tera.register_function("upper", Box::new(upper_fn) as Box<dyn Function>);
    tera.register_function("lower", Box::new(lower_fn) as Box<dyn Function>);
    tera.register_function("trim", Box::new(trim_fn) as Box<dyn Function>);
    tera.register_function("list", Box::new(list_fn) as Box<dyn Function>);
    tera.register_function("dict", Box::new(dict_fn) as Box<dyn Function>);
    tera.register_function("dateAdd", Box::new(date_add_fn) as Box<dyn Function>);
}

fn string_arg(args: &HashMap<String, Json>, name: &str) -> tera::Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| tera::Error::msg(format!("{name}() requires a string argument `{name}`")))
}

fn default_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    let value = args.get("value").cloned().unwrap_or(Json::Null);
    let fallback = args.get("fallback").cloned().unwrap_or(Json::Null);
    let is_empty = matches!(&value, Json::Null)
        || matches!(&value, Json::String(s) if s.is_empty());
    Ok(if is_empty { fallback } else { value })
}

fn url_encode_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    let s = string_arg(args, "s")?;
    Ok(Json::String(
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>(),
    ))
}

fn regex_replace_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    let s = string_arg(args, "s")?;
    let pattern = string_arg(args, "pattern")?;
    let replacement = string_arg(args, "replacement")?;
    let re = regex::Regex::new(&pattern).map_err(|e| tera::Error::msg(e.to_string()))?;
    Ok(Json::String(re.replace_all(&s, replacement.as_str()).into_owned()))
}

fn upper_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    Ok(Json::String(string_arg(args, "s")?.to_uppercase()))
}

fn lower_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    Ok(Json::String(string_arg(args, "s")?.to_lowercase()))
}

fn trim_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    Ok(Json::String(string_arg(args, "s")?.trim().to_string()))
}

fn list_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    let mut items: Vec<(String, Json)> = args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Json::Array(items.into_iter().map(|(_, v)| v).collect()))
}

fn dict_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    Ok(Json::Object(args.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
}

fn date_add_fn(args: &HashMap<String, Json>) -> tera::Result<Json> {
    use chrono::{Duration, Utc};
    let base = match args.get("base").and_then(|v| v.as_str()) {
        Some(s) => chrono::DateTime::parse_from_rfc3339(s)
            .map_err(|e| tera::Error::msg(e.to_string()))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let seconds = args
        .get("seconds")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| tera::Error::msg("dateAdd() requires an integer `seconds` argument"))?;
    Ok(Json::String((base + Duration::seconds(seconds)).to_rfc3339()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_falls_back_on_empty_string() {
        let engine = TemplateEngine::new().unwrap();
        let out = engine.render_str(r#"{{ default(value="", fallback="fallback") }}"#).unwrap();
        assert_eq!(out, "fallback");
    }

    #[test]
    fn default_keeps_nonempty_value() {
        let engine = TemplateEngine::new().unwrap();
        let out = engine.render_str(r#"{{ default(value="present", fallback="fallback") }}"#).unwrap();
        assert_eq!(out, "present");
    }

    #[test]
    fn url_encode_escapes_reserved_characters() {
        let engine = TemplateEngine::new().unwrap();
        let out = engine.render_str(r#"{{ urlEncode(s="a b/c") }}"#).unwrap();
        assert_eq!(out, "a+b%2Fc");
    }

    #[test]
    fn get_handler_enforces_recursion_cap() {
        let engine = Arc::new(TemplateEngine::new().unwrap().with_max_get_recursion(2));
        let engine_for_handler = Arc::clone(&engine);
        let handler: GetHandler = Arc::new(move |_query| {
            // Recurses into itself via the same template engine.
            engine_for_handler
                .render_str(r#"{{ get(query="mock:a:x") }}"#)
                .map(|_| vec![])
                .map_err(|e| e.to_string())
        });
        engine.install_get_handler(handler);
        let result = engine.render_str(r#"{{ get(query="mock:a:x") }}"#);
        assert!(result.is_err(), "expected recursion cap to trip, got {result:?}");
    }

    #[test]
    fn regex_replace_substitutes_matches() {
        let engine = TemplateEngine::new().unwrap();
        let out = engine
            .render_str(r#"{{ regexReplace(s="hello world", pattern="o", replacement="0") }}"#)
            .unwrap();
        assert_eq!(out, "hell0 w0rld");
    }
}
