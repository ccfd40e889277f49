use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use rpds::Queue;
use uuid::Uuid;

use crate::error::ReaderError;
use crate::instant;
use crate::value::{Value, ValueKind};

/// A tag handler receives the single form read after the tag and produces the
/// tagged value.
pub type TagHandler = Arc<dyn Fn(Value) -> Result<Value, ReaderError> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<String, TagHandler>>> =
    Lazy::new(|| RwLock::new(builtin_tag_handlers()));

pub fn builtin_tag_handlers() -> HashMap<String, TagHandler> {
    let mut map = HashMap::new();
    map.insert("inst".to_string(), inst_tag_handler());
    map.insert("uuid".to_string(), uuid_tag_handler());
    map.insert("queue".to_string(), queue_tag_handler());
    map
}

pub fn inst_tag_handler() -> TagHandler {
    Arc::new(|value: Value| -> Result<Value, ReaderError> {
        match &value.kind {
            ValueKind::String(text) => Ok(Value::instant(instant::parse_timestamp(text)?)),
            _ => Err(ReaderError::semantic(format!(
                "#inst expects a string, got {}",
                value.type_name()
            ))),
        }
    })
}

pub fn uuid_tag_handler() -> TagHandler {
    Arc::new(|value: Value| -> Result<Value, ReaderError> {
        match &value.kind {
            ValueKind::String(text) => {
                let parsed = Uuid::parse_str(text).map_err(|err| {
                    ReaderError::semantic(format!("Invalid uuid \"{}\": {}", text, err))
                })?;
                Ok(Value::uuid(parsed))
            }
            _ => Err(ReaderError::semantic(format!(
                "#uuid expects a string, got {}",
                value.type_name()
            ))),
        }
    })
}

pub fn queue_tag_handler() -> TagHandler {
    Arc::new(|value: Value| -> Result<Value, ReaderError> {
        match &value.kind {
            ValueKind::Vector(items) => {
                let queue = items
                    .iter()
                    .cloned()
                    .fold(Queue::new(), |queue, item| queue.enqueue(item));
                Ok(Value::queue(queue))
            }
            _ => Err(ReaderError::semantic(format!(
                "#queue expects a vector, got {}",
                value.type_name()
            ))),
        }
    })
}

/// Register a handler, returning the one it replaced.
pub fn register(tag: impl Into<String>, handler: TagHandler) -> Option<TagHandler> {
    REGISTRY.write().unwrap().insert(tag.into(), handler)
}

/// Remove a handler, returning it when present.
pub fn deregister(tag: &str) -> Option<TagHandler> {
    REGISTRY.write().unwrap().remove(tag)
}

pub fn lookup(tag: &str) -> Option<TagHandler> {
    REGISTRY.read().unwrap().get(tag).cloned()
}

pub fn registered_tags() -> Vec<String> {
    let mut tags: Vec<String> = REGISTRY.read().unwrap().keys().cloned().collect();
    tags.sort();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        assert!(lookup("inst").is_some());
        assert!(lookup("uuid").is_some());
        assert!(lookup("queue").is_some());
        assert!(lookup("absent").is_none());
    }

    #[test]
    fn register_returns_previous_handler() {
        let handler: TagHandler = Arc::new(|value| Ok(value));
        assert!(register("tags-test/first", handler.clone()).is_none());
        assert!(register("tags-test/first", handler).is_some());
        assert!(deregister("tags-test/first").is_some());
        assert!(deregister("tags-test/first").is_none());
    }

    #[test]
    fn inst_handler_rejects_non_strings() {
        let err = inst_tag_handler()(Value::int(3)).unwrap_err();
        assert!(err.to_string().contains("expects a string"));
    }

    #[test]
    fn queue_handler_preserves_order() {
        let value = queue_tag_handler()(Value::vector(vec![
            Value::int(1),
            Value::int(2),
            Value::int(3),
        ]))
        .unwrap();
        match &value.kind {
            ValueKind::Queue(queue) => {
                let items: Vec<&Value> = queue.iter().collect();
                assert_eq!(items, vec![&Value::int(1), &Value::int(2), &Value::int(3)]);
            }
            other => panic!("expected queue, got {:?}", other),
        }
    }
}
