//! dynjs - a tagged-value, reference-counted ECMAScript object runtime
//!
//! dynjs implements the value and object layer of a small JavaScript
//! engine for embedded targets. There is no parser or interpreter; hosts
//! drive the [`Runtime`] directly.
//!
//! # Features
//! - Tagged dynamic values with a packed 64-bit storage form
//! - ES5 object model: property descriptors, prototypes, regular arrays
//! - Reference counting with a pluggable cycle collector
//! - Two fixed-size arenas with segregated free lists
//! - for-in iteration that tolerates deletion
//!
//! # Example
//! ```
//! use dynjs::{DynValue, Runtime, RuntimeConfig};
//!
//! let mut rt = Runtime::new(RuntimeConfig::embedded()).unwrap();
//! let obj = rt.new_object().unwrap();
//! let key = rt.key("answer").unwrap();
//! rt.put(obj, key, DynValue::Int32(42), true).unwrap();
//! assert_eq!(rt.get(obj, key).unwrap(), DynValue::Int32(42));
//! rt.release(obj);
//! assert!(rt.leak_check().is_ok());
//! ```

// Core modules
pub mod config;
pub mod context;
pub mod error;
pub mod value;

// Memory management
pub mod gc;

// Runtime support
pub mod runtime;

// Utilities
pub mod util;

// Re-export main types
pub use config::{GcPolicyKind, RuntimeConfig};
pub use context::Runtime;
pub use error::{ErrorKind, JsResult, LeakError, RuntimeError};
pub use gc::{GcRef, GcStats, MemoryStats};
pub use runtime::{PropKey, PropertyDescriptor, StrRef};
pub use value::{DynValue, RawValue};
