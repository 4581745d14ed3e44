//! Size-adaptive document decoding.
//!
//! Documents are parsed into a `serde_json::Value` while every node and string
//! is charged to an arena sized from the input length. Running out of arena
//! is not a parse error: the arena doubles and the parse is retried, up to a
//! hard cap so hostile input cannot grow it without bound.

use std::cell::Cell;
use std::fmt;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::DecodeError;

/// Bytes charged for every value node.
pub const NODE_COST: usize = 16;

const MIN_ARENA: usize = 64;
const ARENA_EXHAUSTED: &str = "arena exhausted";

#[derive(Debug, Clone)]
pub struct ResilientDecoder {
    max_arena: usize,
}

impl ResilientDecoder {
    pub fn new(max_arena: usize) -> Self {
        Self {
            max_arena: max_arena.max(MIN_ARENA),
        }
    }

    pub fn max_arena(&self) -> usize {
        self.max_arena
    }

    /// Parse `input` and hand the tree to `consumer`. The tree is dropped as
    /// soon as the consumer returns.
    pub fn decode<R>(
        &self,
        input: &str,
        consumer: impl FnOnce(&Value) -> R,
    ) -> Result<R, DecodeError> {
        let mut capacity = initial_arena(input.len()).min(self.max_arena);
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            let arena = Arena::new(capacity);

            match parse_in(input, &arena) {
                Ok(tree) => {
                    debug!(
                        input = input.len(),
                        arena = capacity,
                        used = arena.used.get(),
                        attempts,
                        "decoded document"
                    );
                    return Ok(consumer(&tree));
                }
                Err(_) if arena.exhausted.get() => {
                    if capacity >= self.max_arena {
                        return Err(DecodeError::ArenaLimit {
                            limit: self.max_arena,
                            attempts,
                        });
                    }
                    capacity = capacity.saturating_mul(2).min(self.max_arena);
                    debug!(input = input.len(), next = capacity, "arena exhausted, growing");
                }
                Err(err) => return Err(DecodeError::Syntax(err)),
            }
        }
    }
}

fn initial_arena(input_len: usize) -> usize {
    (input_len.saturating_mul(5) / 2).max(MIN_ARENA)
}

/// Arena bytes a parsed tree occupies under the decoder's accounting.
pub fn arena_cost(value: &Value) -> usize {
    match value {
        Value::String(s) => NODE_COST + s.len() + 1,
        Value::Array(items) => NODE_COST + items.iter().map(arena_cost).sum::<usize>(),
        Value::Object(map) => {
            NODE_COST
                + map
                    .iter()
                    .map(|(key, value)| key.len() + 1 + arena_cost(value))
                    .sum::<usize>()
        }
        _ => NODE_COST,
    }
}

fn parse_in(input: &str, arena: &Arena) -> Result<Value, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_str(input);
    let value = ArenaValue(arena).deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

struct Arena {
    capacity: usize,
    used: Cell<usize>,
    exhausted: Cell<bool>,
}

impl Arena {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: Cell::new(0),
            exhausted: Cell::new(false),
        }
    }

    fn charge<E: de::Error>(&self, bytes: usize) -> Result<(), E> {
        let used = self.used.get().saturating_add(bytes);
        if used > self.capacity {
            self.exhausted.set(true);
            return Err(E::custom(ARENA_EXHAUSTED));
        }
        self.used.set(used);
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct ArenaValue<'a>(&'a Arena);

impl<'de> DeserializeSeed<'de> for ArenaValue<'_> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ArenaValue<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        self.0.charge(NODE_COST)?;
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        self.0.charge(NODE_COST)?;
        Ok(Value::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        self.0.charge(NODE_COST)?;
        Ok(Value::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        self.0.charge(NODE_COST)?;
        Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        self.0.charge(NODE_COST + v.len() + 1)?;
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        self.0.charge(NODE_COST + v.len() + 1)?;
        Ok(Value::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        self.0.charge(NODE_COST)?;
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        self.visit_unit()
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        self.deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        self.0.charge(NODE_COST)?;
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(self)? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        self.0.charge(NODE_COST)?;
        let mut out = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            self.0.charge(key.len() + 1)?;
            let value = map.next_value_seed(self)?;
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }
}
