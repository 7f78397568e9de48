//! Provides a dynamic value type abstraction.
//!
//! This module gives access to a dynamically typed value which is used by
//! the template engine during execution.
//!
//! For the most part the existence of the value type can be ignored as
//! the engine will perform the necessary conversions for you.  Values can be
//! created with [`Value::from_serialize`] from anything that implements
//! [`Serialize`], or through the various `From` implementations:
//!
//! ```
//! # use minidtl::value::Value;
//! let value = Value::from(42);
//! let items = Value::from(vec![Value::from("a"), Value::from("b")]);
//! ```
//!
//! # Lookups
//!
//! A dotted path like `user.groups.0.name` is resolved one segment at a time.
//! For every segment the following strategies are tried in order and the first
//! one that produces a value wins:
//!
//! 1. map key lookup
//! 2. sequence index lookup if the segment is an integer
//! 3. property lookup (`size`, `keys`, `upper`, or [`Object::get_property`])
//! 4. zero argument method call ([`Object::call_method`])
//!
//! If every strategy fails the result is undefined.  Undefined values print
//! as empty strings and are falsy.
//!
//! # Safe strings
//!
//! Strings carry a marker that tells the output step whether they are
//! pre-escaped (safe), need escaping regardless of the autoescape setting, or
//! follow the autoescape setting.  Filters like `safe` and `escape` change
//! that marker.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};

use crate::template::{CompiledTemplate, Template};
use crate::value::serialize::transform;

pub use crate::value::object::Object;

mod object;
pub(crate) mod ops;
mod serialize;

// We use in-band signalling to roundtrip some internal values.  This is
// not ideal but unfortunately there is no better system in serde today.
const VALUE_HANDLE_MARKER: &str = "\x01__minidtl_ValueHandle";

/// The map type used by values and context frames.  Keys keep insertion order.
pub type ValueMap = indexmap::IndexMap<String, Value>;

thread_local! {
    static INTERNAL_SERIALIZATION: Cell<bool> = const { Cell::new(false) };

    // This should be an AtomicU64 but sadly 32bit targets do not necessarily have
    // AtomicU64 available.
    static LAST_VALUE_HANDLE: Cell<u32> = const { Cell::new(0) };
    static VALUE_HANDLES: RefCell<BTreeMap<u32, Value>> = RefCell::new(BTreeMap::new());
}

/// Function that returns true when serialization for [`Value`] is taking place.
///
/// The engine creates [`Value`] objects from all values passed to it by going
/// through the regular serde serialization trait.  This can be used to tune
/// a [`Serialize`] implementation for templates.
pub fn serializing_for_value() -> bool {
    INTERNAL_SERIALIZATION.with(|flag| flag.get())
}

/// Describes the kind of value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is undefined
    Undefined,
    /// The value is the none singleton (`()`)
    None,
    /// The value is a [`bool`]
    Bool,
    /// The value is a number of a supported type.
    Number,
    /// The value is a string.
    String,
    /// The value is a sequence.
    Seq,
    /// The value is a key/value mapping.
    Map,
    /// The value is a custom [`Object`].
    Object,
    /// The value is a compiled template.
    Template,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Undefined => "undefined",
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
            ValueKind::Object => "object",
            ValueKind::Template => "template",
        })
    }
}

/// The escaping state carried by a string value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StringType {
    /// Escaped if autoescaping is enabled.
    Normal,
    /// Never escaped.
    Safe,
    /// Always escaped, even with autoescaping disabled.
    Escape,
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    Undefined,
    None,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>, StringType),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    Object(Arc<dyn Object>),
    Template(Arc<CompiledTemplate>),
    /// The `block` variable inside a block body.  Its only attribute is `super`.
    Block(Arc<str>),
}

impl fmt::Debug for ValueRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRepr::Undefined => f.write_str("undefined"),
            ValueRepr::None => f.write_str("none"),
            ValueRepr::Bool(val) => fmt::Debug::fmt(val, f),
            ValueRepr::I64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::F64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::String(val, _) => fmt::Debug::fmt(val, f),
            ValueRepr::Seq(val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Map(val) => f.debug_map().entries(val.iter()).finish(),
            ValueRepr::Object(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Template(val) => write!(f, "<template {:?}>", val.name()),
            ValueRepr::Block(name) => write!(f, "<block {name:?}>"),
        }
    }
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl Default for Value {
    fn default() -> Value {
        Value::UNDEFINED
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::equals(self, other)
    }
}

/// Formats the value the way it is written into template output (without
/// escaping).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None | ValueRepr::Block(_) => Ok(()),
            ValueRepr::Bool(val) => write!(f, "{val}"),
            ValueRepr::I64(val) => write!(f, "{val}"),
            ValueRepr::F64(val) => ops::fmt_float(val, f),
            ValueRepr::String(ref val, _) => f.write_str(val),
            ValueRepr::Seq(ref items) => fmt_seq(items, f),
            ValueRepr::Map(ref map) => {
                f.write_str("{")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "u'{key}': ")?;
                    fmt_item(value, f)?;
                }
                f.write_str("}")
            }
            ValueRepr::Object(ref obj) => obj.render(f),
            ValueRepr::Template(ref tmpl) => f.write_str(tmpl.name()),
        }
    }
}

fn fmt_item(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.0 {
        ValueRepr::String(ref s, _) => write!(f, "u'{s}'"),
        ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::Seq(_) | ValueRepr::Map(_) => {
            fmt::Display::fmt(value, f)
        }
        _ => Ok(()),
    }
}

fn fmt_seq(items: &[Value], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("[")?;
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        fmt_item(item, f)?;
    }
    f.write_str("]")
}

impl Value {
    /// The undefined value.
    ///
    /// This constant exists because the undefined type does not exist in Rust
    /// and this is the only way to construct it.
    pub const UNDEFINED: Value = Value(ValueRepr::Undefined);

    /// Creates a value from something that can be serialized.
    ///
    /// This is the method the engine uses whenever a serializable object is
    /// passed to one of the APIs that internally want to create a value, for
    /// instance [`Template::render`](crate::Template::render).
    ///
    /// ```
    /// # use minidtl::value::Value;
    /// let val = Value::from_serialize(&vec![1, 2, 3]);
    /// assert_eq!(val.len(), Some(3));
    /// ```
    pub fn from_serialize<T: Serialize>(value: T) -> Value {
        let _serialization_guard = mark_internal_serialization();
        transform(value)
    }

    /// Creates a value from a safe string.
    ///
    /// A safe string is one that will bypass auto escaping.
    pub fn from_safe_string(value: String) -> Value {
        Value(ValueRepr::String(Arc::from(value), StringType::Safe))
    }

    /// Creates a string value that is escaped on output even when auto
    /// escaping is disabled.
    pub(crate) fn from_escaped_string(value: String) -> Value {
        Value(ValueRepr::String(Arc::from(value), StringType::Escape))
    }

    /// Creates a map value.
    pub fn from_map(map: ValueMap) -> Value {
        Value(ValueRepr::Map(Arc::new(map)))
    }

    /// Creates a value from a custom object.
    pub fn from_object<T: Object + 'static>(value: T) -> Value {
        Value(ValueRepr::Object(Arc::new(value)))
    }

    /// Wraps a template so that it can be passed as `extends` target.
    ///
    /// ```
    /// # use minidtl::{context, Environment, Value};
    /// let env = Environment::new();
    /// let parent = env.new_template("[{% block a %}p{% endblock %}]", "parent");
    /// let child = env.new_template("{% extends base %}{% block a %}c{% endblock %}", "child");
    /// let rv = child.render(context!{ base => Value::from_template(&parent) }).unwrap();
    /// assert_eq!(rv, "[c]");
    /// ```
    pub fn from_template(template: &Template<'_>) -> Value {
        match template.compiled() {
            Some(compiled) => Value(ValueRepr::Template(compiled.clone())),
            None => Value::UNDEFINED,
        }
    }

    pub(crate) fn block_ref(name: &str) -> Value {
        Value(ValueRepr::Block(Arc::from(name)))
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Undefined => ValueKind::Undefined,
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(..) => ValueKind::String,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Map(_) => ValueKind::Map,
            ValueRepr::Object(_) | ValueRepr::Block(_) => ValueKind::Object,
            ValueRepr::Template(_) => ValueKind::Template,
        }
    }

    /// Is this value undefined?
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined)
    }

    /// Is this value none?
    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    /// Is this value a string?
    pub fn is_string(&self) -> bool {
        matches!(self.0, ValueRepr::String(..))
    }

    /// Is this value a number?
    pub fn is_number(&self) -> bool {
        matches!(self.0, ValueRepr::I64(_) | ValueRepr::F64(_))
    }

    /// Returns `true` if this value is a string marked as safe.
    pub fn is_safe(&self) -> bool {
        matches!(self.0, ValueRepr::String(_, StringType::Safe))
    }

    /// Returns `true` if this string must be escaped no matter the
    /// autoescape setting.
    pub(crate) fn needs_escape(&self) -> bool {
        matches!(self.0, ValueRepr::String(_, StringType::Escape))
    }

    /// Returns the truthiness of the value.
    ///
    /// Undefined, none, `false`, numbers that are not positive, empty
    /// sequences, maps and strings are false.  Everything else is true.
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::I64(val) => val > 0,
            ValueRepr::F64(val) => val > 0.0,
            ValueRepr::String(ref s, _) => !s.is_empty(),
            ValueRepr::Seq(ref items) => !items.is_empty(),
            ValueRepr::Map(ref map) => !map.is_empty(),
            ValueRepr::Object(ref obj) => obj.is_true(),
            ValueRepr::Template(_) | ValueRepr::Block(_) => true,
        }
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref s, _) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it's an integer or a float without
    /// fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val),
            ValueRepr::F64(val) if val.fract() == 0.0 => Some(val as i64),
            _ => None,
        }
    }

    /// Returns the value as `f64` if it's a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val as f64),
            ValueRepr::F64(val) => Some(val),
            _ => None,
        }
    }

    /// Returns the items if the value is a sequence.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self.0 {
            ValueRepr::Seq(ref items) => Some(&items[..]),
            _ => None,
        }
    }

    /// Returns the map if the value is a map.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref map) => Some(map),
            _ => None,
        }
    }

    /// Returns the custom object if the value is one.
    pub fn as_object(&self) -> Option<&dyn Object> {
        match self.0 {
            ValueRepr::Object(ref obj) => Some(&**obj),
            _ => None,
        }
    }

    pub(crate) fn as_template(&self) -> Option<&Arc<CompiledTemplate>> {
        match self.0 {
            ValueRepr::Template(ref tmpl) => Some(tmpl),
            _ => None,
        }
    }

    pub(crate) fn as_block_ref(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::Block(ref name) => Some(name),
            _ => None,
        }
    }

    /// Returns the length of sequences, maps and strings (in characters).
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref s, _) => Some(s.chars().count()),
            ValueRepr::Seq(ref items) => Some(items.len()),
            ValueRepr::Map(ref map) => Some(map.len()),
            _ => None,
        }
    }

    /// Converts the value into a list of items for iteration.
    ///
    /// Sequences yield their items, maps yield `[key, value]` pairs, strings
    /// yield their characters.  Everything else is not iterable.
    pub fn try_iter(&self) -> Option<Vec<Value>> {
        match self.0 {
            ValueRepr::Seq(ref items) => Some(items.to_vec()),
            ValueRepr::Map(ref map) => Some(
                map.iter()
                    .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
                    .collect(),
            ),
            ValueRepr::String(ref s, _) => {
                Some(s.chars().map(|c| Value::from(c.to_string())).collect())
            }
            _ => None,
        }
    }

    /// Returns the string representation as written into the output.
    pub fn to_output_string(&self) -> String {
        match self.0 {
            ValueRepr::String(ref s, _) => s.to_string(),
            _ => self.to_string(),
        }
    }

    /// Looks up an attribute following the lookup strategies described in the
    /// module documentation.  Returns undefined if nothing matched.
    pub fn get_attr(&self, name: &str) -> Value {
        self.lookup_key(name)
            .or_else(|| self.lookup_index(name))
            .or_else(|| self.lookup_property(name))
            .or_else(|| self.call_method(name))
            .unwrap_or(Value::UNDEFINED)
    }

    fn lookup_key(&self, name: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Map(ref map) => map.get(name).cloned(),
            _ => None,
        }
    }

    fn lookup_index(&self, name: &str) -> Option<Value> {
        let idx: i64 = some!(name.parse().ok());
        match self.0 {
            ValueRepr::Seq(ref items) => {
                let idx = some!(ops::normalize_index(idx, items.len()));
                items.get(idx).cloned()
            }
            _ => None,
        }
    }

    fn lookup_property(&self, name: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Seq(ref items) => match name {
                "size" | "count" => Some(Value::from(items.len())),
                _ => None,
            },
            ValueRepr::Map(ref map) => match name {
                "size" | "count" => Some(Value::from(map.len())),
                "items" => Some(Value::from(
                    map.iter()
                        .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
                        .collect::<Vec<_>>(),
                )),
                "keys" => Some(Value::from(
                    map.keys()
                        .map(|k| Value::from(k.as_str()))
                        .collect::<Vec<_>>(),
                )),
                "values" => Some(Value::from(map.values().cloned().collect::<Vec<_>>())),
                _ => None,
            },
            ValueRepr::String(ref s, ty) => ops::string_property(s, ty, name),
            ValueRepr::Object(ref obj) => obj.get_property(name),
            _ => None,
        }
    }

    fn call_method(&self, name: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Object(ref obj) => obj.call_method(name),
            _ => None,
        }
    }

    /// Returns the same string with a different escaping marker.  Non string
    /// values are converted to strings first.
    pub(crate) fn with_string_type(&self, ty: StringType) -> Value {
        match self.0 {
            ValueRepr::String(ref s, _) => Value(ValueRepr::String(s.clone(), ty)),
            _ => Value(ValueRepr::String(Arc::from(self.to_string()), ty)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // enable round tripping of values
        if serializing_for_value() {
            let handle = LAST_VALUE_HANDLE.with(|x| {
                // wrapping is fine, handles only live for the duration of
                // one serialization call.
                let rv = x.get().wrapping_add(1);
                x.set(rv);
                rv
            });
            VALUE_HANDLES.with(|handles| handles.borrow_mut().insert(handle, self.clone()));
            return serializer.serialize_unit_variant(
                VALUE_HANDLE_MARKER,
                handle,
                VALUE_HANDLE_MARKER,
            );
        }

        match self.0 {
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::I64(i) => serializer.serialize_i64(i),
            ValueRepr::F64(f) => serializer.serialize_f64(f),
            ValueRepr::None | ValueRepr::Undefined | ValueRepr::Block(_) => {
                serializer.serialize_unit()
            }
            ValueRepr::String(ref s, _) => serializer.serialize_str(s),
            ValueRepr::Seq(ref items) => items.serialize(serializer),
            ValueRepr::Map(ref map) => {
                use serde::ser::SerializeMap;
                let mut m = ok!(serializer.serialize_map(Some(map.len())));
                for (key, value) in map.iter() {
                    ok!(m.serialize_entry(key, value));
                }
                m.end()
            }
            ValueRepr::Object(_) => serializer.serialize_str(&self.to_string()),
            ValueRepr::Template(ref tmpl) => serializer.serialize_str(tmpl.name()),
        }
    }
}

fn mark_internal_serialization() -> impl Drop {
    let old = INTERNAL_SERIALIZATION.with(|flag| {
        let old = flag.get();
        flag.set(true);
        old
    });
    crate::utils::OnDrop::new(move || {
        if !old {
            INTERNAL_SERIALIZATION.with(|flag| flag.set(false));
        }
    })
}

pub(crate) fn take_value_handle(handle: u32) -> Option<Value> {
    VALUE_HANDLES.with(|handles| handles.borrow_mut().remove(&handle))
}

macro_rules! value_from {
    ($src:ty, $dst:ident) => {
        impl From<$src> for Value {
            #[inline(always)]
            fn from(val: $src) -> Self {
                Value(ValueRepr::$dst(val as _))
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(i8, I64);
value_from!(i16, I64);
value_from!(i32, I64);
value_from!(i64, I64);
value_from!(u8, I64);
value_from!(u16, I64);
value_from!(u32, I64);
value_from!(f32, F64);
value_from!(f64, F64);

impl From<u64> for Value {
    fn from(val: u64) -> Self {
        match i64::try_from(val) {
            Ok(val) => Value(ValueRepr::I64(val)),
            Err(_) => Value(ValueRepr::F64(val as f64)),
        }
    }
}

impl From<usize> for Value {
    fn from(val: usize) -> Self {
        Value::from(val as u64)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value(ValueRepr::None)
    }
}

impl<'a> From<&'a str> for Value {
    fn from(val: &'a str) -> Self {
        Value(ValueRepr::String(Arc::from(val), StringType::Normal))
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value(ValueRepr::String(Arc::from(val), StringType::Normal))
    }
}

impl From<Arc<str>> for Value {
    fn from(val: Arc<str>) -> Self {
        Value(ValueRepr::String(val, StringType::Normal))
    }
}

impl From<Vec<Value>> for Value {
    fn from(val: Vec<Value>) -> Self {
        Value(ValueRepr::Seq(Arc::new(val)))
    }
}

impl From<ValueMap> for Value {
    fn from(val: ValueMap) -> Self {
        Value::from_map(val)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value(ValueRepr::None),
        }
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::from(iter.into_iter().collect::<Vec<_>>())
    }
}
