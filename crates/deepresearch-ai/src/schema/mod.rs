//! Schema descriptors, the fallback schema compiler and JSON helpers

pub mod compiler;
pub mod json;
pub mod types;

pub use compiler::{COMPILED_TAG, CompiledSchema, SchemaCompiler, SchemaTransform};
pub use json::{JSON_CHUNK_SIZE, iter_json_chunks, soft_json_parse};
pub use types::{DISCRIMINATOR_FIELD, FieldSchema, RecordSchema, SchemaType};
