//! Hydration of a [`Diagram`] from a [`DesignDoc`] and the reverse snapshot.
//!
//! Loading never fails. Anything the document gets wrong is repaired as far
//! as possible and reported through the diagram's notices:
//!
//! - an instance whose type reference the catalog cannot resolve becomes a
//!   placeholder item that keeps its name, position and connections,
//! - a connection naming an interface the item does not have gets a
//!   same-named Undefined endpoint synthesized for it,
//! - connections that break the compatibility or exclusivity rules are
//!   dropped.
//!
//! The history of a freshly loaded diagram is empty.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::connection::Connection;
use super::diagram::{Diagram, PortSpec};
use super::endpoint::{EndpointKind, Side};
use super::stack::{StackItem, StackOwner};
use super::{ComponentId, EndpointId, StackId};
use crate::config::DiagramConfig;
use crate::error::Notice;
use crate::geometry::Point;
use crate::model::{
    ColumnContent, ColumnDesc, ComponentDef, ComponentInstance, ComponentKind, ConnectionKind,
    ConnectionRecord, DesignDoc, InterfaceRef, ItemKinds, Protocol, TopInterfaceRecord,
};
use crate::parser::Catalog;

/// Columns used when a document does not describe any.
pub fn default_columns(config: &DiagramConfig) -> Vec<ColumnDesc> {
    vec![
        ColumnDesc::new("Low-level", ColumnContent::Components, config.component_column_width),
        ColumnDesc::new("Middle-level", ColumnContent::Components, config.component_column_width),
        ColumnDesc::new("High-level", ColumnContent::Components, config.component_column_width),
        ColumnDesc::new("Out", ColumnContent::Io, config.io_column_width),
    ]
}

fn item_kind(kind: ComponentKind) -> ItemKinds {
    match kind {
        ComponentKind::Platform => ItemKinds::CONTAINER,
        ComponentKind::Software => ItemKinds::COMPONENT,
    }
}

/// Position recorded for interface `name` in an instance's position maps.
fn recorded_position(instance: &ComponentInstance, name: &str) -> Option<Point> {
    instance
        .api_positions
        .get(name)
        .or_else(|| instance.com_positions.get(name))
        .copied()
}

impl Diagram {
    /// Build a diagram from `doc`, resolving instance types through `catalog`.
    pub fn load(doc: &DesignDoc, catalog: &dyn Catalog, config: DiagramConfig) -> Diagram {
        let columns = if doc.columns.is_empty() {
            default_columns(&config)
        } else {
            doc.columns.clone()
        };
        let mut d = Diagram::with_columns(config, &columns);
        d.name = doc.name.clone();

        let mut by_name: BTreeMap<String, ComponentId> = BTreeMap::new();
        d.load_instances(doc, catalog, &mut by_name);
        for record in &doc.interfaces {
            d.load_interface(record);
        }
        d.layout_hints.clear();
        d.relayout();

        let resolved: Vec<(&ConnectionRecord, EndpointId, EndpointId)> = doc
            .connections
            .iter()
            .filter_map(|record| {
                let a = d.resolve_end(doc, &record.start, &by_name)?;
                let b = d.resolve_end(doc, &record.end, &by_name)?;
                Some((record, a, b))
            })
            .collect();
        // Synthesized endpoints change port layout, so settle before routing.
        d.layout_hints.clear();
        d.relayout();
        for (record, a, b) in resolved {
            d.load_connection(record, a, b);
        }
        d.relayout();
        d.history.clear();

        log::info!(
            name = d.name.as_str(),
            components = d.components.len(),
            connections = d.connections.len(),
            notices = d.notices.len();
            "design loaded"
        );
        d
    }

    fn load_instances(
        &mut self,
        doc: &DesignDoc,
        catalog: &dyn Catalog,
        by_name: &mut BTreeMap<String, ComponentId>,
    ) {
        let (mapped, unmapped): (Vec<&ComponentInstance>, Vec<&ComponentInstance>) =
            doc.instances.iter().partition(|i| i.mapping.is_some());

        // Column items go first so that containers exist for mapped items.
        let mut placed: Vec<(StackId, f64, &ComponentInstance, Arc<ComponentDef>, bool)> =
            Vec::new();
        for instance in unmapped {
            let (definition, placeholder) = self.resolve_definition(instance, catalog);
            match self.column_for(instance, definition.kind) {
                Some(stack) => {
                    let y = instance.position.map(|p| p.y).unwrap_or(f64::MAX);
                    placed.push((stack, y, instance, definition, placeholder));
                }
                None => self.notify(Notice::warning(format!(
                    "no column accepts '{}'; it was skipped",
                    instance.name
                ))),
            }
        }
        placed.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (stack, _, instance, definition, placeholder) in placed {
            let y = instance.position.map(|p| p.y).unwrap_or(0.0);
            self.load_instance(instance, definition, placeholder, stack, y, by_name);
        }

        let mut nested: Vec<(StackId, f64, &ComponentInstance, Arc<ComponentDef>, bool)> =
            Vec::new();
        for instance in mapped {
            let (definition, placeholder) = self.resolve_definition(instance, catalog);
            let container = instance
                .mapping
                .as_ref()
                .and_then(|m| by_name.get(m))
                .and_then(|c| self.components.get(c))
                .and_then(|c| c.child_stack);
            let stack = match container {
                Some(inner) if definition.kind == ComponentKind::Software => Some(inner),
                _ => {
                    self.notify(Notice::warning(format!(
                        "'{}' cannot be mapped into '{}'; placed in a column instead",
                        instance.name,
                        instance.mapping.as_deref().unwrap_or_default()
                    )));
                    self.column_for(instance, definition.kind)
                }
            };
            match stack {
                Some(stack) => {
                    let y = instance.position.map(|p| p.y).unwrap_or(f64::MAX);
                    nested.push((stack, y, instance, definition, placeholder));
                }
                None => self.notify(Notice::warning(format!(
                    "no column accepts '{}'; it was skipped",
                    instance.name
                ))),
            }
        }
        nested.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (stack, _, instance, definition, placeholder) in nested {
            let y = instance.position.map(|p| p.y).unwrap_or(0.0);
            self.load_instance(instance, definition, placeholder, stack, y, by_name);
        }
    }

    /// The catalog definition of `instance`, or a placeholder and `true`.
    fn resolve_definition(
        &mut self,
        instance: &ComponentInstance,
        catalog: &dyn Catalog,
    ) -> (Arc<ComponentDef>, bool) {
        let reference = match (&instance.component_ref, instance.draft) {
            (Some(r), false) => r,
            _ => return (Arc::new(ComponentDef::placeholder(None, instance.kind)), false),
        };
        match catalog.resolve(reference) {
            Some(def) => (def, false),
            None => {
                self.notify(Notice::warning(format!(
                    "'{}' of instance '{}' was not found; using a placeholder",
                    reference, instance.name
                )));
                (
                    Arc::new(ComponentDef::placeholder(Some(reference.clone()), instance.kind)),
                    true,
                )
            }
        }
    }

    /// Column under the instance's x that accepts it, else the first that does.
    fn column_for(&self, instance: &ComponentInstance, kind: ComponentKind) -> Option<StackId> {
        let kind = item_kind(kind);
        let accepting: Vec<&super::ItemStack> = self
            .columns
            .iter()
            .filter_map(|c| self.stacks.get(c))
            .filter(|s| s.accepts(kind))
            .collect();
        instance
            .position
            .and_then(|p| accepting.iter().find(|s| s.contains_x(p.x)))
            .or_else(|| accepting.first())
            .map(|s| s.id)
    }

    fn load_instance(
        &mut self,
        instance: &ComponentInstance,
        definition: Arc<ComponentDef>,
        placeholder: bool,
        stack: StackId,
        y: f64,
        by_name: &mut BTreeMap<String, ComponentId>,
    ) {
        let name = if instance.name.is_empty() || by_name.contains_key(&instance.name) {
            let base = definition
                .type_ref
                .as_ref()
                .map(|r| r.name.as_str())
                .unwrap_or("instance");
            let name = self.unique_instance_name(base);
            self.notify(Notice::warning(format!(
                "instance name '{}' is empty or taken; renamed to '{}'",
                instance.name, name
            )));
            name
        } else {
            instance.name.clone()
        };
        let ports = if definition.interfaces.is_empty() {
            // Drafts and placeholders: recreate what the position maps know.
            instance
                .api_positions
                .iter()
                .chain(instance.com_positions.iter())
                .map(|(port, pos)| PortSpec::new(port, Protocol::Undefined, Some(*pos)))
                .collect()
        } else {
            PortSpec::from_definition(&definition, |def| recorded_position(instance, &def.name))
        };
        let index = self.stacks.get(&stack).map(|s| s.items.len()).unwrap_or(0);
        let origin_y = match self.stacks.get(&stack).map(|s| s.owner) {
            Some(StackOwner::Layout) => self.stack_origin(stack).y,
            _ => 0.0,
        };
        let mut built = self.build_component(
            definition,
            &name,
            stack,
            index,
            Point::new(0.0, y - origin_y),
            &ports,
        );
        built.item.display_name = instance.display_name.clone();
        if !instance.description.is_empty() {
            built.item.description = instance.description.clone();
        }
        built.item.config_values = instance.config_values.clone();
        built.item.draft = instance.draft || instance.component_ref.is_none();
        built.item.placeholder = placeholder;
        if built.item.type_ref.is_none() {
            built.item.type_ref = instance.component_ref.clone();
        }
        let id = built.id();
        match self.attach_component(built) {
            Ok(()) => {
                by_name.insert(instance.name.clone(), id);
            }
            Err(e) => self.notify(Notice::error(format!(
                "could not place '{}': {}",
                instance.name, e
            ))),
        }
    }

    fn load_interface(&mut self, record: &TopInterfaceRecord) {
        if self.find_interface(&record.name).is_some() {
            self.notify(Notice::warning(format!(
                "duplicate top-level interface '{}' was skipped",
                record.name
            )));
            return;
        }
        let accepting: Vec<&super::ItemStack> = self
            .columns
            .iter()
            .filter_map(|c| self.stacks.get(c))
            .filter(|s| s.accepts(ItemKinds::INTERFACE))
            .collect();
        let stack = accepting
            .iter()
            .find(|s| s.contains_x(record.position.x))
            .or_else(|| accepting.first())
            .map(|s| s.id);
        let Some(stack) = stack else {
            self.notify(Notice::warning(format!(
                "no IO column for interface '{}'; it was skipped",
                record.name
            )));
            return;
        };
        let y = record.position.y - self.stack_origin(stack).y;
        let mut detached = self.build_interface(stack, &record.name, record.protocol.clone(), y);
        detached.endpoint.description = record.description.clone();
        if let Err(e) = self.attach_endpoint(detached) {
            self.notify(Notice::error(format!(
                "could not place interface '{}': {}",
                record.name, e
            )));
        }
    }

    /// Endpoint for one end of a persisted connection, synthesizing a
    /// temporary Undefined endpoint when the name is unknown.
    fn resolve_end(
        &mut self,
        doc: &DesignDoc,
        end: &InterfaceRef,
        by_name: &BTreeMap<String, ComponentId>,
    ) -> Option<EndpointId> {
        match end {
            InterfaceRef::Instance {
                instance,
                interface,
            } => {
                let Some(owner) = by_name.get(instance).copied() else {
                    self.notify(Notice::warning(format!(
                        "connection end '{}' names an unknown instance",
                        end
                    )));
                    return None;
                };
                if let Some(port) = self.find_port(owner, interface) {
                    return Some(port);
                }
                let recorded = doc
                    .instance(instance)
                    .and_then(|i| recorded_position(i, interface));
                let item = self.components.get(&owner)?;
                let local = recorded.unwrap_or_else(|| {
                    Point::new(item.border_x(Side::Left), self.next_port_y(item, Side::Left))
                });
                let mut detached = self
                    .build_port(owner, interface, Protocol::Undefined, local)
                    .ok()?;
                detached.endpoint.temporary = true;
                let id = detached.endpoint.id;
                self.attach_endpoint(detached).ok()?;
                self.notify(Notice::warning(format!(
                    "'{}' has no interface '{}'; an undefined one was added",
                    instance, interface
                )));
                Some(id)
            }
            InterfaceRef::TopLevel { interface } => {
                if let Some(ep) = self.find_interface(interface) {
                    return Some(ep);
                }
                let stack = self
                    .columns
                    .iter()
                    .filter_map(|c| self.stacks.get(c))
                    .find(|s| s.accepts(ItemKinds::INTERFACE))
                    .map(|s| s.id);
                let Some(stack) = stack else {
                    self.notify(Notice::warning(format!(
                        "no IO column for missing interface '{}'",
                        interface
                    )));
                    return None;
                };
                let y = self.stacks.get(&stack).map(|s| s.height).unwrap_or(0.0);
                let mut detached =
                    self.build_interface(stack, interface, Protocol::Undefined, y);
                detached.endpoint.temporary = true;
                let id = detached.endpoint.id;
                self.attach_endpoint(detached).ok()?;
                self.notify(Notice::warning(format!(
                    "top-level interface '{}' is missing; an undefined one was added",
                    interface
                )));
                Some(id)
            }
        }
    }

    fn load_connection(&mut self, record: &ConnectionRecord, a: EndpointId, b: EndpointId) {
        if !self.can_connect(a, b) {
            self.notify(Notice::warning(format!(
                "connection '{}' joins incompatible interfaces; it was dropped",
                record.name
            )));
            return;
        }
        if [a, b]
            .iter()
            .any(|e| self.is_exclusive(*e) && self.connection_count(*e) > 0)
        {
            self.notify(Notice::warning(format!(
                "connection '{}' exceeds an exclusive interface; it was dropped",
                record.name
            )));
            return;
        }
        let (end_a, end_b) = if record.off_page {
            match (self.proxy_of(a), self.proxy_of(b)) {
                (Some(pa), Some(pb)) => (pa, pb),
                _ => (a, b),
            }
        } else {
            (a, b)
        };
        let name = if record.name.is_empty() || self.find_connection(&record.name).is_some() {
            let (Ok(ra), Ok(rb)) = (self.real_endpoint(a), self.real_endpoint(b)) else {
                return;
            };
            let base = format!(
                "{}_to_{}",
                self.end_label(ra, &ra.name),
                self.end_label(rb, &rb.name)
            );
            self.unique_connection_name(&base)
        } else {
            record.name.clone()
        };
        let conn = Connection {
            id: self.ids.connection(),
            name,
            description: String::new(),
            a: end_a,
            b: end_b,
            route: record.route.clone(),
            off_page: end_a != a,
            anchors: None,
        };
        let id = conn.id;
        if let Err(e) = self.attach_connection(conn) {
            self.notify(Notice::error(format!(
                "could not attach connection '{}': {}",
                record.name, e
            )));
            return;
        }
        // Persisted waypoints stay until an end moves.
        if !record.route.is_empty() {
            if let (Some(pa), Some(pb)) = (self.endpoint_scene_pos(end_a), self.endpoint_scene_pos(end_b)) {
                if let Some(c) = self.connections.get_mut(&id) {
                    c.anchors = Some((pa, pb));
                }
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Snapshot
    // ────────────────────────────────────────────────────────────────────────

    /// Rebuild the persisted document from the live diagram.
    pub fn to_document(&self) -> DesignDoc {
        let mut doc = DesignDoc {
            name: self.name.clone(),
            ..Default::default()
        };
        for column in &self.columns {
            let Some(stack) = self.stacks.get(column) else {
                continue;
            };
            doc.columns.push(stack.describe());
            for item in &stack.items {
                match item {
                    StackItem::Component(c) => self.snapshot_component(*c, &mut doc.instances),
                    StackItem::Interface(e) => {
                        let (Some(ep), Some(position)) =
                            (self.endpoints.get(e), self.endpoint_scene_pos(*e))
                        else {
                            continue;
                        };
                        doc.interfaces.push(TopInterfaceRecord {
                            name: ep.name.clone(),
                            protocol: ep.protocol.clone(),
                            description: ep.description.clone(),
                            position,
                        });
                    }
                }
            }
        }
        for conn in self.connections.values() {
            if let Some(record) = self.snapshot_connection(conn) {
                doc.connections.push(record);
            }
        }
        doc
    }

    fn snapshot_component(&self, id: ComponentId, out: &mut Vec<ComponentInstance>) {
        let Some(item) = self.components.get(&id) else {
            return;
        };
        let mapping = match self.stacks.get(&item.parent).map(|s| s.owner) {
            Some(StackOwner::Component(owner)) => self.components.get(&owner).map(|c| c.name.clone()),
            _ => None,
        };
        let position = if mapping.is_some() {
            item.position
        } else {
            self.component_scene_pos(id)
        };
        let mut api_positions = IndexMap::new();
        let mut com_positions = IndexMap::new();
        for port in item.all_ports() {
            let Some(ep) = self.endpoints.get(&port) else {
                continue;
            };
            match ep.protocol {
                Protocol::Api { .. } => api_positions.insert(ep.name.clone(), ep.position),
                _ => com_positions.insert(ep.name.clone(), ep.position),
            };
        }
        out.push(ComponentInstance {
            name: item.name.clone(),
            display_name: item.display_name.clone(),
            description: item.description.clone(),
            component_ref: if item.draft { None } else { item.type_ref.clone() },
            position: Some(position),
            config_values: item.config_values.clone(),
            api_positions,
            com_positions,
            mapping,
            draft: item.draft,
            kind: item.kind,
        });
        for child in self.children_of(id) {
            self.snapshot_component(child, out);
        }
    }

    fn interface_ref(&self, id: EndpointId) -> Option<InterfaceRef> {
        let ep = self.real_endpoint(id).ok()?;
        match ep.kind {
            EndpointKind::ComponentPort { owner } => Some(InterfaceRef::Instance {
                instance: self.components.get(&owner)?.name.clone(),
                interface: ep.name.clone(),
            }),
            EndpointKind::TopLevelInterface => Some(InterfaceRef::TopLevel {
                interface: ep.name.clone(),
            }),
            EndpointKind::OffPageProxy { .. } => None,
        }
    }

    fn snapshot_connection(&self, conn: &Connection) -> Option<ConnectionRecord> {
        let kind = match (self.protocol_of(conn.a)?, self.protocol_of(conn.b)?) {
            (Protocol::Api { .. }, _) | (_, Protocol::Api { .. }) => ConnectionKind::Api,
            (Protocol::Com { .. }, _) | (_, Protocol::Com { .. }) => ConnectionKind::Com,
            _ => ConnectionKind::Undefined,
        };
        Some(ConnectionRecord {
            name: conn.name.clone(),
            kind,
            start: self.interface_ref(conn.a)?,
            end: self.interface_ref(conn.b)?,
            route: conn.route.clone(),
            off_page: conn.off_page,
        })
    }
}
