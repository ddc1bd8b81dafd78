//! Architecture timing models. One module per modeled core.

pub mod m4f;

pub use m4f::M4fGraph;
