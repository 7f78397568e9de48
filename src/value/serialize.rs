use std::fmt;
use std::sync::Arc;

use serde::{ser, Serialize, Serializer};

use crate::value::{
    take_value_handle, StringType, Value, ValueMap, ValueRepr, VALUE_HANDLE_MARKER,
};

/// Transforms a serializable value to a value object.
///
/// This neither fails nor panics.  Values whose serialization fails become
/// undefined.
pub fn transform<T: Serialize>(value: T) -> Value {
    match value.serialize(ValueSerializer) {
        Ok(rv) => rv,
        Err(err) => {
            tracing::debug!(error = %err, "value could not be serialized");
            Value::UNDEFINED
        }
    }
}

#[derive(Debug)]
pub struct InvalidValue(Arc<str>);

impl std::error::Error for InvalidValue {}

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl ser::Error for InvalidValue {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        InvalidValue(Arc::from(msg.to_string()))
    }
}

fn key_string(key: Value) -> Result<String, InvalidValue> {
    match key.0 {
        ValueRepr::String(ref s, _) => Ok(s.to_string()),
        ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::Bool(_) => Ok(key.to_string()),
        _ => Err(ser::Error::custom("map keys must be strings or numbers")),
    }
}

pub struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = InvalidValue;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, InvalidValue> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::F64(v as f64)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::F64(v)))
    }

    fn serialize_char(self, v: char) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::String(
            Arc::from(v.to_string()),
            StringType::Normal,
        )))
    }

    fn serialize_str(self, value: &str) -> Result<Value, InvalidValue> {
        Ok(Value::from(value))
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<Value, InvalidValue> {
        Ok(Value::from(String::from_utf8_lossy(value).into_owned()))
    }

    fn serialize_none(self) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, InvalidValue> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, InvalidValue> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, InvalidValue> {
        if name == VALUE_HANDLE_MARKER && variant == VALUE_HANDLE_MARKER {
            take_value_handle(variant_index)
                .ok_or_else(|| ser::Error::custom("value handle not in registry"))
        } else {
            Ok(Value::from(variant))
        }
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, InvalidValue> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, InvalidValue> {
        let mut map = ValueMap::new();
        map.insert(variant.to_string(), ok!(value.serialize(self)));
        Ok(Value::from_map(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeSeq, InvalidValue> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(crate::utils::untrusted_size_hint(len.unwrap_or(0))),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeSeq, InvalidValue> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeSeq, InvalidValue> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant, InvalidValue> {
        Ok(SerializeTupleVariant {
            name: variant,
            fields: Vec::with_capacity(crate::utils::untrusted_size_hint(len)),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<SerializeMap, InvalidValue> {
        Ok(SerializeMap {
            entries: ValueMap::with_capacity(crate::utils::untrusted_size_hint(len.unwrap_or(0))),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeStruct, InvalidValue> {
        Ok(SerializeStruct {
            fields: ValueMap::with_capacity(crate::utils::untrusted_size_hint(len)),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeStructVariant, InvalidValue> {
        Ok(SerializeStructVariant {
            variant,
            map: ValueMap::with_capacity(crate::utils::untrusted_size_hint(len)),
        })
    }
}

pub struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), InvalidValue> {
        self.elements.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        Ok(Value::from(self.elements))
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), InvalidValue> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, InvalidValue> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), InvalidValue> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, InvalidValue> {
        ser::SerializeSeq::end(self)
    }
}

pub struct SerializeTupleVariant {
    name: &'static str,
    fields: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), InvalidValue> {
        self.fields.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        let mut map = ValueMap::new();
        map.insert(self.name.to_string(), Value::from(self.fields));
        Ok(Value::from_map(map))
    }
}

pub struct SerializeMap {
    entries: ValueMap,
    key: Option<String>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), InvalidValue> {
        self.key = Some(ok!(key_string(ok!(key.serialize(ValueSerializer)))));
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), InvalidValue> {
        let key = ok!(self
            .key
            .take()
            .ok_or_else(|| ser::Error::custom("serialize_value called before serialize_key")));
        self.entries.insert(key, ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        Ok(Value::from_map(self.entries))
    }
}

pub struct SerializeStruct {
    fields: ValueMap,
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), InvalidValue> {
        self.fields
            .insert(key.to_string(), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        Ok(Value::from_map(self.fields))
    }
}

pub struct SerializeStructVariant {
    variant: &'static str,
    map: ValueMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = InvalidValue;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), InvalidValue> {
        self.map
            .insert(key.to_string(), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, InvalidValue> {
        let mut rv = ValueMap::new();
        rv.insert(self.variant.to_string(), Value::from_map(self.map));
        Ok(Value::from_map(rv))
    }
}
