//! Bytecode interpreter for constexpr evaluation and test execution of a
//! bit-precise hardware description language.
//!
//! The pipeline for a text program is [`parser::assemble`], then
//! [`verify::verify`], then [`parser::Assembly::install`] into an
//! [`cache::ImportData`] and finally [`vm::interpret`] on an entry function.

pub mod ast;
pub mod bytecode;
pub mod cache;
pub mod diagnostic;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod value;
pub mod verify;
pub mod vm;

pub use vm::{ErrorKind, VmError, VmResult, interpret};
