//! Design and component definition XML parser.
//!
//! Provides [`DesignParser`] to load design documents and component
//! definitions into the records of [`crate::model`]. Sub-modules:
//!
//! - [`source`] – File I/O abstraction (filesystem vs. memory)
//! - [`helpers`] – Attribute, point, type reference and protocol parsing
//! - [`catalog`] – Definition lookup by type reference, including a
//!   directory-scanning library catalog

pub mod catalog;
pub mod helpers;
pub mod source;

pub use catalog::{Catalog, LibraryCatalog, MemoryCatalog, ScanReport};
pub use source::*;

use crate::geometry::Point;
use crate::model::*;
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use helpers::{
    attr_bool, attr_f64, attr_string, child, child_text, children, parse_optional_point,
    parse_point, parse_protocol, parse_type_ref,
};
use indexmap::IndexMap;
use roxmltree::{Document, Node};

/// Parser generic over [`ContentSource`] so it can read from the filesystem
/// ([`FsSource`]) or from memory ([`MemorySource`]).
pub struct DesignParser<S: ContentSource> {
    source: S,
}

impl<S: ContentSource> DesignParser<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Parse a `<design>` file into a [`DesignDoc`].
    pub fn parse_design_file(&mut self, path: impl AsRef<Utf8Path>) -> Result<DesignDoc> {
        let path = path.as_ref();
        let text = self.source.read_to_string(path)?;
        parse_design_from_text(&text, Some(path.as_str()))
    }

    /// Parse a `<component>` definition file.
    pub fn parse_component_file(&mut self, path: impl AsRef<Utf8Path>) -> Result<ComponentDef> {
        let path = path.as_ref();
        let text = self.source.read_to_string(path)?;
        parse_component_from_text(&text, Some(path.as_str()))
    }

    /// Parse every `*.xml` component definition directly inside `dir`.
    /// Files that fail are returned alongside their error.
    pub fn parse_component_dir(
        &mut self,
        dir: impl AsRef<Utf8Path>,
    ) -> Result<(Vec<ComponentDef>, Vec<(Utf8PathBuf, anyhow::Error)>)> {
        let mut defs = Vec::new();
        let mut failed = Vec::new();
        let paths = self.source.list_dir(dir.as_ref())?;
        for p in paths.into_iter().filter(|p| p.extension() == Some("xml")) {
            match self.parse_component_file(&p) {
                Ok(def) => defs.push(def),
                Err(e) => failed.push((p, e)),
            }
        }
        Ok((defs, failed))
    }
}

fn origin_of(origin: Option<&str>) -> &str {
    origin.unwrap_or("<memory>")
}

// ────────────────────────────────────────────────────────────────────────────
// Component definitions
// ────────────────────────────────────────────────────────────────────────────

/// Parse a component definition from XML text. `origin` names the source
/// in error messages.
pub fn parse_component_from_text(text: &str, origin: Option<&str>) -> Result<ComponentDef> {
    let origin = origin_of(origin);
    let doc = Document::parse(text).with_context(|| format!("Failed to parse XML {}", origin))?;
    let root = doc.root_element();
    if !root.has_tag_name("component") {
        return Err(anyhow!("No <component> root in {}", origin));
    }
    parse_component_node(root).with_context(|| format!("Invalid component in {}", origin))
}

fn parse_kind(node: Node) -> Result<ComponentKind> {
    match node.attribute("kind").map(str::trim) {
        None | Some("software") => Ok(ComponentKind::Software),
        Some("platform") => Ok(ComponentKind::Platform),
        Some(other) => Err(anyhow!("Unknown component kind '{}'", other)),
    }
}

fn parse_component_node(node: Node) -> Result<ComponentDef> {
    let type_ref = parse_type_ref(node);
    let mut interfaces = Vec::new();
    if let Some(list) = child(node, "interfaces") {
        for iface in children(list, "interface") {
            let name = attr_string(iface, "name");
            if name.is_empty() {
                return Err(anyhow!("Interface without a name"));
            }
            interfaces.push(InterfaceDef {
                protocol: parse_protocol(iface).with_context(|| format!("Interface {}", name))?,
                description: child_text(iface, "description"),
                default_pos: parse_optional_point(iface)?,
                name,
            });
        }
    }
    let mut properties = IndexMap::new();
    if let Some(list) = child(node, "properties") {
        for p in children(list, "property") {
            properties.insert(
                attr_string(p, "name"),
                p.text().map(|t| t.trim().to_string()).unwrap_or_default(),
            );
        }
    }
    Ok(ComponentDef {
        type_ref: type_ref.is_valid().then_some(type_ref),
        kind: parse_kind(node)?,
        description: child_text(node, "description"),
        interfaces,
        properties,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Design documents
// ────────────────────────────────────────────────────────────────────────────

/// Parse a design document from XML text.
pub fn parse_design_from_text(text: &str, origin: Option<&str>) -> Result<DesignDoc> {
    let origin = origin_of(origin);
    let doc = Document::parse(text).with_context(|| format!("Failed to parse XML {}", origin))?;
    let root = doc.root_element();
    if !root.has_tag_name("design") {
        return Err(anyhow!("No <design> root in {}", origin));
    }
    parse_design_node(root).with_context(|| format!("Invalid design in {}", origin))
}

fn parse_design_node(node: Node) -> Result<DesignDoc> {
    let mut design = DesignDoc {
        name: attr_string(node, "name"),
        ..Default::default()
    };
    if let Some(list) = child(node, "columns") {
        for col in children(list, "column") {
            design.columns.push(parse_column(col)?);
        }
    }
    if let Some(list) = child(node, "componentInstances") {
        for inst in children(list, "componentInstance") {
            let instance = parse_instance(inst)
                .with_context(|| format!("Instance '{}'", attr_string(inst, "name")))?;
            design.instances.push(instance);
        }
    }
    if let Some(list) = child(node, "interfaces") {
        for iface in children(list, "interface") {
            design.interfaces.push(TopInterfaceRecord {
                name: attr_string(iface, "name"),
                protocol: parse_protocol(iface)?,
                description: child_text(iface, "description"),
                position: parse_optional_point(iface)?.unwrap_or_default(),
            });
        }
    }
    if let Some(list) = child(node, "connections") {
        for conn in children(list, "connection") {
            let record = parse_connection(conn)
                .with_context(|| format!("Connection '{}'", attr_string(conn, "name")))?;
            design.connections.push(record);
        }
    }
    Ok(design)
}

fn parse_column(node: Node) -> Result<ColumnDesc> {
    let content = node.attribute("content").unwrap_or("components");
    let content = ColumnContent::parse(content)
        .ok_or_else(|| anyhow!("Unknown column content '{}'", content))?;
    let allowed = match node.attribute("allowedItems") {
        Some(v) => ItemKinds(
            v.trim()
                .parse::<u8>()
                .map_err(|_| anyhow!("allowedItems=\"{}\" is not a bit set", v))?,
        ),
        None => ItemKinds::NONE,
    };
    Ok(ColumnDesc {
        name: attr_string(node, "name"),
        content,
        allowed_items: allowed,
        width: attr_f64(node, "width")?.unwrap_or(259.0),
    })
}

fn parse_position_map(node: Node, tag: &str) -> Result<IndexMap<String, Point>> {
    let mut map = IndexMap::new();
    if let Some(list) = child(node, tag) {
        for p in children(list, "position") {
            map.insert(attr_string(p, "interface"), parse_point(p)?);
        }
    }
    Ok(map)
}

fn parse_instance(node: Node) -> Result<ComponentInstance> {
    let mut config_values = IndexMap::new();
    if let Some(list) = child(node, "configurableElementValues") {
        for v in children(list, "value") {
            config_values.insert(
                attr_string(v, "name"),
                v.text().map(|t| t.trim().to_string()).unwrap_or_default(),
            );
        }
    }
    let position = match child(node, "position") {
        Some(p) => Some(parse_point(p)?),
        None => None,
    };
    Ok(ComponentInstance {
        name: attr_string(node, "name"),
        display_name: attr_string(node, "displayName"),
        description: child_text(node, "description"),
        component_ref: child(node, "componentRef")
            .map(parse_type_ref)
            .filter(TypeRef::is_valid),
        position,
        config_values,
        api_positions: parse_position_map(node, "apiInterfacePositions")?,
        com_positions: parse_position_map(node, "comInterfacePositions")?,
        mapping: node.attribute("mapping").map(str::to_string),
        draft: attr_bool(node, "draft"),
        kind: parse_kind(node)?,
    })
}

fn parse_interface_ref(node: Node) -> Result<InterfaceRef> {
    let interface = attr_string(node, "interface");
    if interface.is_empty() {
        return Err(anyhow!("<{}> names no interface", node.tag_name().name()));
    }
    Ok(match node.attribute("instance") {
        Some(instance) => InterfaceRef::Instance {
            instance: instance.to_string(),
            interface,
        },
        None => InterfaceRef::TopLevel { interface },
    })
}

fn parse_connection(node: Node) -> Result<ConnectionRecord> {
    let kind = node.attribute("kind").unwrap_or("com");
    let kind =
        ConnectionKind::parse(kind).ok_or_else(|| anyhow!("Unknown connection kind '{}'", kind))?;
    let start = child(node, "start").ok_or_else(|| anyhow!("Missing <start>"))?;
    let end = child(node, "end").ok_or_else(|| anyhow!("Missing <end>"))?;
    let mut route = Vec::new();
    if let Some(r) = child(node, "route") {
        for p in children(r, "point") {
            route.push(parse_point(p)?);
        }
    }
    Ok(ConnectionRecord {
        name: attr_string(node, "name"),
        kind,
        start: parse_interface_ref(start)?,
        end: parse_interface_ref(end)?,
        route,
        off_page: attr_bool(node, "offPage"),
    })
}
