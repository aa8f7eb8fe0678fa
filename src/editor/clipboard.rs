//! Copy/paste payloads.
//!
//! A copy captures plain data (names, protocols, local positions, shared
//! definitions), never ids. Pasting allocates fresh ids and produces a
//! single composite command with one nested child per pasted object.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;

use super::command::{Action, EditorCommand};
use super::diagram::{Diagram, EndpointHome, PortSpec};
use super::operations::kind_name;
use super::stack::StackItem;
use super::{ComponentId, EndpointId, StackId, unique_name};
use crate::error::DiagramError;
use crate::geometry::Point;
use crate::model::{ColumnDesc, ComponentDef, ComponentKind, ItemKinds, Protocol, TypeRef};

#[derive(Debug, Clone, PartialEq)]
pub struct CopiedPort {
    pub name: String,
    pub description: String,
    pub protocol: Protocol,
    /// Local to the owner (ports) or to the stack (interfaces).
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CopiedComponent {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub definition: Arc<ComponentDef>,
    pub type_ref: Option<TypeRef>,
    pub kind: ComponentKind,
    pub draft: bool,
    pub placeholder: bool,
    pub config_values: IndexMap<String, String>,
    pub ports: Vec<CopiedPort>,
    /// Nested items of a container.
    pub children: Vec<CopiedComponent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CopiedColumn {
    pub desc: ColumnDesc,
    pub components: Vec<CopiedComponent>,
    pub interfaces: Vec<CopiedPort>,
}

/// Clipboard contents, one variant per kind of copied object.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyPayload {
    Ports(Vec<CopiedPort>),
    Components(Vec<CopiedComponent>),
    Columns(Vec<CopiedColumn>),
}

impl CopyPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            CopyPayload::Ports(v) => v.is_empty(),
            CopyPayload::Components(v) => v.is_empty(),
            CopyPayload::Columns(v) => v.is_empty(),
        }
    }
}

/// Where a payload is pasted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PasteTarget {
    /// Ports go onto a component.
    Component(ComponentId),
    /// Components (or interfaces) go into a stack, starting at local `y`.
    Stack { stack: StackId, y: Option<f64> },
    /// Columns are inserted at this column index.
    Columns { index: usize },
}

/// Names handed out during one paste, before anything is attached.
#[derive(Default)]
struct Reserved {
    components: BTreeSet<String>,
    interfaces: BTreeSet<String>,
    columns: BTreeSet<String>,
}

impl Diagram {
    fn copy_port(&self, id: EndpointId) -> Result<CopiedPort, DiagramError> {
        let ep = self.real_endpoint(id)?;
        Ok(CopiedPort {
            name: ep.name.clone(),
            description: ep.description.clone(),
            protocol: ep.protocol.clone(),
            position: ep.position,
        })
    }

    fn copy_component(&self, id: ComponentId) -> Result<CopiedComponent, DiagramError> {
        let item = self.component(id)?;
        let ports = item
            .all_ports()
            .map(|p| self.copy_port(p))
            .collect::<Result<Vec<_>, _>>()?;
        let children = self
            .children_of(id)
            .into_iter()
            .map(|c| self.copy_component(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CopiedComponent {
            name: item.name.clone(),
            display_name: item.display_name.clone(),
            description: item.description.clone(),
            definition: item.definition.clone(),
            type_ref: item.type_ref.clone(),
            kind: item.kind,
            draft: item.draft,
            placeholder: item.placeholder,
            config_values: item.config_values.clone(),
            ports,
            children,
        })
    }

    pub fn copy_ports(&self, ids: &[EndpointId]) -> Result<CopyPayload, DiagramError> {
        let ports = ids
            .iter()
            .map(|id| self.copy_port(*id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CopyPayload::Ports(ports))
    }

    pub fn copy_components(&self, ids: &[ComponentId]) -> Result<CopyPayload, DiagramError> {
        let items = ids
            .iter()
            .map(|id| self.copy_component(*id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CopyPayload::Components(items))
    }

    pub fn copy_columns(&self, ids: &[StackId]) -> Result<CopyPayload, DiagramError> {
        let mut columns = Vec::new();
        for id in ids {
            let stack = self.stack(*id)?;
            let mut components = Vec::new();
            let mut interfaces = Vec::new();
            for item in &stack.items {
                match item {
                    StackItem::Component(c) => components.push(self.copy_component(*c)?),
                    StackItem::Interface(e) => interfaces.push(self.copy_port(*e)?),
                }
            }
            columns.push(CopiedColumn {
                desc: stack.describe(),
                components,
                interfaces,
            });
        }
        Ok(CopyPayload::Columns(columns))
    }

    /// Copy whatever is selected.
    pub fn copy_selection(&self) -> Option<CopyPayload> {
        use super::selection::Selection;
        match self.selection {
            Selection::Component(c) => self.copy_components(&[c]).ok(),
            Selection::Endpoint(e) => self.copy_ports(&[e]).ok(),
            Selection::Stack(s) if self.columns.contains(&s) => self.copy_columns(&[s]).ok(),
            _ => None,
        }
    }

    fn paste_component_command(
        &mut self,
        copied: &CopiedComponent,
        stack: StackId,
        index: usize,
        y: f64,
        reserved: &mut Reserved,
    ) -> Result<(EditorCommand, ComponentId), DiagramError> {
        let name = unique_name(&copied.name, |n| {
            reserved.components.contains(n) || self.find_component(n).is_some()
        });
        reserved.components.insert(name.clone());
        let specs: Vec<PortSpec> = copied
            .ports
            .iter()
            .map(|p| PortSpec {
                name: p.name.clone(),
                protocol: p.protocol.clone(),
                description: p.description.clone(),
                position: Some(p.position),
            })
            .collect();
        let mut built = self.build_component(
            copied.definition.clone(),
            &name,
            stack,
            index,
            Point::new(0.0, y),
            &specs,
        );
        built.item.display_name = copied.display_name.clone();
        built.item.description = copied.description.clone();
        built.item.type_ref = copied.type_ref.clone();
        built.item.draft = copied.draft;
        built.item.placeholder = copied.placeholder;
        built.item.config_values = copied.config_values.clone();
        let id = built.id();
        let inner = built.item.child_stack;

        let mut cmd = EditorCommand::composite(format!("Paste {}", name));
        cmd.push(EditorCommand::leaf(
            format!("Add {}", name),
            Action::AttachComponent {
                id,
                stash: Some(Box::new(built)),
            },
        ));
        if let Some(inner) = inner {
            for (i, child) in copied.children.iter().enumerate() {
                let (child_cmd, _) = self.paste_component_command(child, inner, i, 0.0, reserved)?;
                cmd.push(child_cmd);
            }
        }
        Ok((cmd, id))
    }

    fn paste_interface_command(
        &mut self,
        copied: &CopiedPort,
        stack: StackId,
        y: f64,
        index: Option<usize>,
        reserved: &mut Reserved,
    ) -> Result<EditorCommand, DiagramError> {
        let name = unique_name(&copied.name, |n| {
            reserved.interfaces.contains(n) || self.find_interface(n).is_some()
        });
        reserved.interfaces.insert(name.clone());
        let mut detached = self.build_interface(stack, &name, copied.protocol.clone(), y);
        detached.endpoint.description = copied.description.clone();
        if let Some(index) = index {
            detached.home = EndpointHome::Interface { stack, index };
        }
        let id = detached.endpoint.id;
        Ok(EditorCommand::leaf(
            format!("Paste {}", name),
            Action::AttachEndpoint {
                id,
                stash: Some(Box::new(detached)),
            },
        ))
    }

    /// Paste `payload` at `target` as one undoable step.
    pub fn paste(&mut self, payload: &CopyPayload, target: PasteTarget) -> Result<(), DiagramError> {
        if payload.is_empty() {
            return Err(DiagramError::EmptyClipboard);
        }
        let mut reserved = Reserved::default();
        let mut cmd = EditorCommand::composite("Paste");
        match (payload, target) {
            (CopyPayload::Ports(ports), PasteTarget::Component(owner)) => {
                let mut taken: BTreeSet<String> = BTreeSet::new();
                for port in ports {
                    let name = unique_name(&port.name, |n| {
                        taken.contains(n) || self.find_port(owner, n).is_some()
                    });
                    taken.insert(name.clone());
                    let item = self.component(owner)?;
                    let side = super::Side::from_local_x(port.position.x);
                    let local = Point::new(port.position.x, self.next_port_y(item, side).max(port.position.y));
                    let mut detached = self.build_port(owner, &name, port.protocol.clone(), local)?;
                    detached.endpoint.description = port.description.clone();
                    let id = detached.endpoint.id;
                    cmd.push(EditorCommand::leaf(
                        format!("Paste {}", name),
                        Action::AttachEndpoint {
                            id,
                            stash: Some(Box::new(detached)),
                        },
                    ));
                }
            }
            (CopyPayload::Ports(ports), PasteTarget::Stack { stack, y }) => {
                self.check_accepts(stack, ItemKinds::INTERFACE)?;
                let mut y = y.unwrap_or_else(|| self.stack(stack).map(|s| s.height).unwrap_or(0.0));
                for port in ports {
                    cmd.push(self.paste_interface_command(port, stack, y, None, &mut reserved)?);
                    y += self.config.interface_height + self.config.io_spacing;
                }
            }
            (CopyPayload::Components(items), PasteTarget::Stack { stack, y }) => {
                let mut index = match y {
                    Some(y) => self.insertion_index_in(stack, y, None),
                    None => self.stack(stack)?.items.len(),
                };
                for copied in items {
                    let kind = match copied.kind {
                        ComponentKind::Platform => ItemKinds::CONTAINER,
                        ComponentKind::Software => ItemKinds::COMPONENT,
                    };
                    self.check_accepts(stack, kind)?;
                    let (child, _) =
                        self.paste_component_command(copied, stack, index, y.unwrap_or(0.0), &mut reserved)?;
                    cmd.push(child);
                    index += 1;
                }
            }
            (CopyPayload::Columns(columns), PasteTarget::Columns { index }) => {
                let mut index = index.min(self.columns.len());
                for copied in columns {
                    let mut desc = copied.desc.clone();
                    desc.name = unique_name(&desc.name, |n| {
                        reserved.columns.contains(n) || self.find_column(n).is_some()
                    });
                    reserved.columns.insert(desc.name.clone());
                    let detached = self.build_column(&desc, index);
                    let id = detached.stack.id;
                    let mut column_cmd = EditorCommand::composite(format!("Paste column {}", desc.name));
                    column_cmd.push(EditorCommand::leaf(
                        format!("Add column {}", desc.name),
                        Action::AttachStack {
                            id,
                            stash: Some(Box::new(detached)),
                        },
                    ));
                    for (i, item) in copied.components.iter().enumerate() {
                        let (child, _) = self.paste_component_command(item, id, i, 0.0, &mut reserved)?;
                        column_cmd.push(child);
                    }
                    let offset = copied.components.len();
                    for (i, interface) in copied.interfaces.iter().enumerate() {
                        column_cmd.push(self.paste_interface_command(
                            interface,
                            id,
                            interface.position.y,
                            Some(offset + i),
                            &mut reserved,
                        )?);
                    }
                    cmd.push(column_cmd);
                    index += 1;
                }
            }
            (payload, _) => {
                let kind = match payload {
                    CopyPayload::Ports(_) => ItemKinds::INTERFACE,
                    CopyPayload::Components(_) => ItemKinds::COMPONENT,
                    CopyPayload::Columns(_) => ItemKinds::NONE,
                };
                return Err(DiagramError::ItemNotAllowed {
                    stack: "paste target".to_string(),
                    kind: kind_name(kind).to_string(),
                });
            }
        }
        self.apply(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagramConfig;
    use crate::model::{ApiRole, ColumnContent, InterfaceDef};

    fn diagram() -> Diagram {
        Diagram::with_columns(
            DiagramConfig::default(),
            &[
                ColumnDesc::new("SW", ColumnContent::Components, 259.0),
                ColumnDesc::new("Out", ColumnContent::Io, 119.0),
            ],
        )
    }

    fn platform() -> Arc<ComponentDef> {
        Arc::new(ComponentDef {
            type_ref: Some(TypeRef::new("acme", "hw", "Board", "1.0")),
            kind: ComponentKind::Platform,
            interfaces: vec![InterfaceDef {
                name: "bus".into(),
                protocol: Protocol::api("io", ApiRole::Provider),
                description: String::new(),
                default_pos: None,
            }],
            ..Default::default()
        })
    }

    #[test]
    fn paste_of_container_nests_per_instance_commands() {
        let mut d = diagram();
        let sw = d.columns()[0];
        let board = d.add_component(sw, platform(), None).unwrap();
        let inner = d.component(board).unwrap().child_stack.unwrap();
        d.add_draft_component(inner, ComponentKind::Software, None).unwrap();

        let payload = d.copy_components(&[board]).unwrap();
        d.paste(&payload, PasteTarget::Stack { stack: sw, y: None }).unwrap();

        let last = d.history().last().unwrap();
        assert_eq!(last.depth(), 4);
        assert_eq!(last.leaf_count(), 2);
        assert!(d.find_component("Board_0_1").is_some());
        assert!(d.find_component("draft_0_1").is_some());

        d.undo().unwrap();
        assert!(d.find_component("Board_0_1").is_none());
        assert_eq!(d.components().count(), 2);
    }

    #[test]
    fn ports_cannot_be_pasted_into_component_columns() {
        let mut d = diagram();
        let sw = d.columns()[0];
        let payload = CopyPayload::Ports(vec![CopiedPort {
            name: "p".into(),
            description: String::new(),
            protocol: Protocol::Undefined,
            position: Point::new(-80.0, 32.0),
        }]);
        assert!(matches!(
            d.paste(&payload, PasteTarget::Stack { stack: sw, y: None }),
            Err(DiagramError::ItemNotAllowed { .. })
        ));
        assert!(!d.can_undo());
    }

    #[test]
    fn empty_payload_is_refused() {
        let mut d = diagram();
        assert_eq!(
            d.paste(&CopyPayload::Components(vec![]), PasteTarget::Columns { index: 0 }),
            Err(DiagramError::EmptyClipboard)
        );
    }
}
