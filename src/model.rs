//! Persistence records exchanged with the document layer.
//!
//! These are plain data: a [`DesignDoc`] is what gets loaded into an
//! [`crate::editor::Diagram`] and what a diagram snapshot produces again.
//! [`ComponentDef`] is what the catalog hands out for a [`TypeRef`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geometry::Point;

// ────────────────────────────────────────────────────────────────────────────
// DesignDoc – binary serialization wrapper
// ────────────────────────────────────────────────────────────────────────────

const BINARY_MAGIC: &[u8; 9] = b"SYSDESIGN";
const BINARY_VERSION: u32 = 1;

/// A complete design: stacks, instances, top-level interfaces and connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignDoc {
    pub name: String,
    pub columns: Vec<ColumnDesc>,
    pub instances: Vec<ComponentInstance>,
    /// Interfaces of the designed component itself, shown in IO columns.
    #[serde(default)]
    pub interfaces: Vec<TopInterfaceRecord>,
    pub connections: Vec<ConnectionRecord>,
}

impl DesignDoc {
    /// Save the document to a binary file with magic bytes and versioning.
    pub fn save_to_binary<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        std::io::Write::write_all(&mut writer, BINARY_MAGIC)?;
        std::io::Write::write_all(&mut writer, &BINARY_VERSION.to_le_bytes())?;
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    /// Load a document from a binary file, checking magic bytes and version.
    pub fn load_from_binary<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        let mut magic = [0u8; 9];
        std::io::Read::read_exact(&mut reader, &mut magic)?;
        if &magic != BINARY_MAGIC {
            anyhow::bail!("Invalid magic bytes: expected 'SYSDESIGN'");
        }
        let mut version_bytes = [0u8; 4];
        std::io::Read::read_exact(&mut reader, &mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != BINARY_VERSION {
            anyhow::bail!("Unsupported version: {}", version);
        }
        let doc: DesignDoc =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(doc)
    }

    pub fn instance(&self, name: &str) -> Option<&ComponentInstance> {
        self.instances.iter().find(|i| i.name == name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Type references
// ────────────────────────────────────────────────────────────────────────────

/// Catalog identity of a component definition (`vendor:library:name:version`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub vendor: String,
    pub library: String,
    pub name: String,
    pub version: String,
}

impl TypeRef {
    pub fn new(vendor: &str, library: &str, name: &str, version: &str) -> Self {
        Self {
            vendor: vendor.to_string(),
            library: library.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// A reference is valid once every field is filled in.
    pub fn is_valid(&self) -> bool {
        !self.vendor.is_empty()
            && !self.library.is_empty()
            && !self.name.is_empty()
            && !self.version.is_empty()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.vendor, self.library, self.name, self.version
        )
    }
}

impl FromStr for TypeRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 4 {
            anyhow::bail!("Type reference '{}' is not vendor:library:name:version", s);
        }
        Ok(TypeRef::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Interface protocols
// ────────────────────────────────────────────────────────────────────────────

/// Dependency role of an API interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApiRole {
    Provider,
    Requester,
}

impl ApiRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiRole::Provider => "provider",
            ApiRole::Requester => "requester",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "provider" => Some(ApiRole::Provider),
            "requester" => Some(ApiRole::Requester),
            _ => None,
        }
    }
}

/// Transfer direction of a COM interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComDirection {
    In,
    Out,
    InOut,
}

impl ComDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ComDirection::In => "in",
            ComDirection::Out => "out",
            ComDirection::InOut => "inout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Some(ComDirection::In),
            "out" => Some(ComDirection::Out),
            "inout" => Some(ComDirection::InOut),
            _ => None,
        }
    }
}

/// Protocol family of an endpoint together with its family-specific data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Undefined,
    Api {
        /// API definition identifier; empty matches anything.
        api_type: String,
        role: ApiRole,
    },
    Com {
        /// COM definition identifier; empty matches anything.
        com_type: String,
        /// Transfer protocol identifier; empty matches anything.
        transfer_type: String,
        direction: ComDirection,
    },
}

impl Protocol {
    pub fn api(api_type: &str, role: ApiRole) -> Self {
        Protocol::Api {
            api_type: api_type.to_string(),
            role,
        }
    }

    pub fn com(com_type: &str, transfer_type: &str, direction: ComDirection) -> Self {
        Protocol::Com {
            com_type: com_type.to_string(),
            transfer_type: transfer_type.to_string(),
            direction,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Protocol::Undefined => "undefined",
            Protocol::Api { .. } => "API",
            Protocol::Com { .. } => "COM",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Component definitions (catalog side)
// ────────────────────────────────────────────────────────────────────────────

/// Whether an instance is a plain component or a container that nests others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComponentKind {
    #[default]
    Software,
    /// Hierarchical container (a platform onto which components are mapped).
    Platform,
}

/// An interface declared by a component definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub description: String,
    /// Preferred position relative to the owning item.
    #[serde(default)]
    pub default_pos: Option<Point>,
}

/// A resolved component definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentDef {
    pub type_ref: Option<TypeRef>,
    pub kind: ComponentKind,
    #[serde(default)]
    pub description: String,
    pub interfaces: Vec<InterfaceDef>,
    #[serde(default)]
    pub properties: IndexMap<String, String>,
}

impl ComponentDef {
    /// Empty stand-in used when a reference cannot be resolved or for drafts.
    pub fn placeholder(type_ref: Option<TypeRef>, kind: ComponentKind) -> Self {
        Self {
            type_ref,
            kind,
            ..Default::default()
        }
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceDef> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Columns
// ────────────────────────────────────────────────────────────────────────────

/// Content class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnContent {
    Io,
    #[default]
    Components,
    Custom,
}

impl ColumnContent {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnContent::Io => "io",
            ColumnContent::Components => "components",
            ColumnContent::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "io" => Some(ColumnContent::Io),
            "components" => Some(ColumnContent::Components),
            "custom" => Some(ColumnContent::Custom),
            _ => None,
        }
    }
}

/// Bit set of item kinds a stack accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ItemKinds(pub u8);

impl ItemKinds {
    pub const NONE: ItemKinds = ItemKinds(0);
    pub const INTERFACE: ItemKinds = ItemKinds(1);
    pub const COMPONENT: ItemKinds = ItemKinds(2);
    pub const CONTAINER: ItemKinds = ItemKinds(4);

    pub fn contains(self, other: ItemKinds) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn union(self, other: ItemKinds) -> ItemKinds {
        ItemKinds(self.0 | other.0)
    }
}

/// Persisted description of a column (stack).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub content: ColumnContent,
    /// Only honoured for [`ColumnContent::Custom`]; other content classes imply it.
    pub allowed_items: ItemKinds,
    pub width: f64,
}

impl ColumnDesc {
    pub fn new(name: &str, content: ColumnContent, width: f64) -> Self {
        Self {
            name: name.to_string(),
            content,
            allowed_items: ItemKinds::NONE,
            width,
        }
    }

    /// Allowed item kinds after applying the content class rule.
    pub fn effective_allowed_items(&self) -> ItemKinds {
        match self.content {
            ColumnContent::Io => ItemKinds::INTERFACE,
            ColumnContent::Components => ItemKinds::COMPONENT.union(ItemKinds::CONTAINER),
            ColumnContent::Custom => self.allowed_items,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Instances, interfaces, connections
// ────────────────────────────────────────────────────────────────────────────

/// A component instance placed in the design.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// `None` for draft instances which have no catalog definition yet.
    pub component_ref: Option<TypeRef>,
    /// Scene position for column items; container-local for mapped items.
    pub position: Option<Point>,
    #[serde(default)]
    pub config_values: IndexMap<String, String>,
    #[serde(default)]
    pub api_positions: IndexMap<String, Point>,
    #[serde(default)]
    pub com_positions: IndexMap<String, Point>,
    /// Name of the container instance this instance is mapped into.
    #[serde(default)]
    pub mapping: Option<String>,
    #[serde(default)]
    pub draft: bool,
    /// Kind used when the reference cannot be resolved.
    #[serde(default)]
    pub kind: ComponentKind,
}

/// One end of a persisted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceRef {
    /// Interface of a component instance.
    Instance { instance: String, interface: String },
    /// Top-level interface of the designed component.
    TopLevel { interface: String },
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceRef::Instance {
                instance,
                interface,
            } => write!(f, "{}.{}", instance, interface),
            InterfaceRef::TopLevel { interface } => write!(f, "{}", interface),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionKind {
    Api,
    #[default]
    Com,
    /// Both ends are still untyped.
    Undefined,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Api => "api",
            ConnectionKind::Com => "com",
            ConnectionKind::Undefined => "undefined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "api" => Some(ConnectionKind::Api),
            "com" => Some(ConnectionKind::Com),
            "undefined" => Some(ConnectionKind::Undefined),
            _ => None,
        }
    }
}

/// A persisted connection between two interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub name: String,
    pub kind: ConnectionKind,
    pub start: InterfaceRef,
    pub end: InterfaceRef,
    #[serde(default)]
    pub route: Vec<Point>,
    #[serde(default)]
    pub off_page: bool,
}

/// A top-level interface of the designed component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopInterfaceRecord {
    pub name: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub description: String,
    pub position: Point,
}
