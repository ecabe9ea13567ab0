//! Types Module - column metadata, typed values and the cell caster

pub mod caster;
pub mod column;
pub mod value;

pub use caster::{NullSentinels, TypeCaster};
pub use column::{type_family_name, ColumnDescriptor, TypeFamily};
pub use value::{TypedRow, Value};
