//! Asset documents and the flat graphs they parse into.

pub mod factory;
pub mod ids;
pub mod metadata;
mod model;
pub mod parser;
pub mod serializer;

pub use factory::NodeFactory;
pub use model::*;
pub use parser::{DocumentParser, GENERIC_PREFIX, parse_document};
pub use serializer::{DocumentSerializer, serialize_document};
