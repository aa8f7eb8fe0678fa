//! XML generator – write design documents and component definitions back out.
//!
//! This module provides:
//! - [`design_xml`] – Generate design and component XML text from the model records.

pub mod design_xml;

pub use design_xml::{generate_component_xml, generate_design_xml};
