//! Common utilities and data structures

pub mod writer;

pub use writer::ByteWriter;
