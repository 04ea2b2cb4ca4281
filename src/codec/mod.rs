//! Boundary value codec.
//!
//! Values that cross between the supervisor and the worker are restricted to
//! four shapes: undefined, null, errors, and scalars. Everything else is
//! rejected at the call site rather than approximated.
//!
//! ```
//! use ferry::codec::{deserialize_value, serialize_value, TaskError, Value};
//!
//! let wire = serialize_value(&Value::from(TaskError::new("compile failed"))).unwrap();
//! let back = deserialize_value(&wire);
//! assert_eq!(back.as_error().unwrap().message, "compile failed");
//! ```

mod error;
mod serialized;
mod value;

pub use error::{CodecError, CodecResult};
pub use serialized::{deserialize_value, serialize_value, Primitive, SerializedValue};
pub use value::{FileLocation, TaskError, Value};
