//! Editing core for block diagrams of software components.
//!
//! Components sit in columns, expose API and COM interfaces on their left
//! and right borders, and are wired together by connections that are checked
//! for protocol compatibility. Every edit is an undoable command.
//!
//! - [`editor`] – the diagram model, command engine and interaction handling
//! - [`parser`] – XML readers for designs and component definitions, and the
//!   catalog that resolves type references
//! - [`generator`] – XML writers for the same formats
//! - [`model`] – persistence records exchanged with the document layer
//!
//! The binary `sysdiagram` loads a design against library directories and
//! prints a summary or the rebuilt document.

pub mod config;
pub mod editor;
pub mod error;
pub mod generator;
pub mod geometry;
pub mod model;
pub mod parser;

pub use config::DiagramConfig;
pub use editor::Diagram;
pub use error::{DiagramError, Notice, Severity};
