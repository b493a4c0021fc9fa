//! Object runtime
//!
//! This module contains the value-level machinery built on the heap:
//! - Strings and the atom table
//! - Objects, property lists and the internal methods
//! - Regular arrays and their demotion to generic storage
//! - Type conversions and numeric operators
//! - Environment frames and native functions
//! - for-in iterators
//! - Lazily created builtin objects

pub mod array;
pub mod conversion;
pub mod env;
pub mod function;
pub mod intrinsics;
pub mod iterator;
pub mod number;
pub mod object;
pub mod ops;
pub mod property;
pub mod string;

pub use array::{ElementStore, MAX_FAST_ARRAY_LENGTH, MAX_LENGTH_PROPERTY_SIZE};
pub use conversion::PreferredType;
pub use env::EnvFrame;
pub use function::{BoundFunction, FunctionKind, FunctionRecord, MAX_ARGS, NativeFn};
pub use intrinsics::return_this;
pub use iterator::DynIterator;
pub use number::BinaryOp;
pub use object::{BuiltinObjectId, DynObject, ObjectClass, ObjectPayload, Prototype, StorageMode};
pub use property::{Attr, DynProp, PropKey, PropertyDescriptor, PropertyList};
pub use string::{BuiltinString, DynString, DynStringBuilder, StrRef, StrView};
