use std::fmt;

use crate::value::Value;

/// A utility trait that represents a dynamic object.
///
/// The engine uses the [`Value`] type to represent values that the engine
/// knows about.  Most of these values are primitives such as integers, strings
/// or maps.  However it is also possible to expose custom types without
/// undergoing a serialization step.  For this to work a type needs to
/// implement the [`Object`] trait and be wrapped in a value with
/// [`Value::from_object`](crate::value::Value::from_object).
///
/// Dotted lookups on an object first ask [`get_property`](Self::get_property)
/// and then [`call_method`](Self::call_method) with the segment name.
///
/// ```
/// # use minidtl::value::{Object, Value};
/// #[derive(Debug)]
/// struct Point(i64, i64);
///
/// impl Object for Point {
///     fn get_property(&self, name: &str) -> Option<Value> {
///         match name {
///             "x" => Some(Value::from(self.0)),
///             "y" => Some(Value::from(self.1)),
///             _ => None,
///         }
///     }
/// }
///
/// let point = Value::from_object(Point(1, 2));
/// assert_eq!(point.get_attr("y"), Value::from(2));
/// ```
pub trait Object: fmt::Debug + Send + Sync {
    /// Looks up a property by name.
    fn get_property(&self, name: &str) -> Option<Value> {
        let _name = name;
        None
    }

    /// Invokes a method that takes no arguments.
    fn call_method(&self, name: &str) -> Option<Value> {
        let _name = name;
        None
    }

    /// Returns the truthiness of the object.
    fn is_true(&self) -> bool {
        true
    }

    /// Formats the object for template output.
    ///
    /// The default implementation uses the debug representation.
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
