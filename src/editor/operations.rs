//! Editing operations for block diagrams.
//!
//! Every public operation here builds one root [`EditorCommand`] and hands it
//! to [`Diagram::apply`]. Builders only read the diagram (and allocate ids),
//! so every check that can refuse an edit runs before anything mutates.
//!
//! # Composite recipes
//!
//! - Delete component: one `DetachConnection` child per touching connection
//!   (nested children of a container first), then the own `DetachComponent`.
//! - Delete column: refused while a container inside still holds children;
//!   otherwise component and interface deletes, then `DetachStack`.
//! - Replace component: a `DetachConnection` for every connection that would
//!   become a loop, an incompatible pair or a second connection on an
//!   exclusive port; per matching port a `MovePort` to the old port's place
//!   and an `ExchangeConnections`; then the delete-old branch, then a
//!   `MoveItem` of the new item into the old item's slot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::command::{
    Action, EditorCommand, InferredType, PortPlacement, Placement, TextField, TextTarget,
};
use super::connection::Connection;
use super::diagram::{Diagram, PortSpec};
use super::endpoint::{Endpoint, Side, TypeState, is_exclusive, protocols_compatible};
use super::stack::StackItem;
use super::{ComponentId, ConnectionId, EndpointId, StackId, unique_name};
use crate::error::{DiagramError, Notice};
use crate::geometry::Point;
use crate::model::{ColumnDesc, ComponentDef, ComponentKind, ItemKinds, Protocol};

/// What takes the place of a replaced component.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// An item already in the diagram.
    Existing(ComponentId),
    /// A new item built from a resolved definition.
    Definition(Arc<ComponentDef>),
}

pub(crate) fn kind_name(kind: ItemKinds) -> &'static str {
    if kind == ItemKinds::INTERFACE {
        "interface"
    } else if kind == ItemKinds::CONTAINER {
        "container"
    } else {
        "component"
    }
}

/// Base for instance names derived from a definition.
pub(crate) fn instance_base(definition: &ComponentDef) -> String {
    definition
        .type_ref
        .as_ref()
        .map(|r| r.name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "component".to_string())
}

impl Diagram {
    // ────────────────────────────────────────────────────────────────────────
    // Queries used by the builders
    // ────────────────────────────────────────────────────────────────────────

    pub(crate) fn check_accepts(&self, stack: StackId, kind: ItemKinds) -> Result<(), DiagramError> {
        let s = self.stack(stack)?;
        if s.accepts(kind) {
            Ok(())
        } else {
            Err(DiagramError::ItemNotAllowed {
                stack: s.name.clone(),
                kind: kind_name(kind).to_string(),
            })
        }
    }

    /// Current placement of a stack item.
    pub fn placement_of(&self, item: StackItem) -> Result<Placement, DiagramError> {
        let stack = self.stack_of(item).ok_or_else(|| match item {
            StackItem::Component(c) => DiagramError::UnknownComponent(c),
            StackItem::Interface(e) => DiagramError::UnknownEndpoint(e),
        })?;
        let index = self.stack(stack)?.index_of(item).unwrap_or(0);
        let position = match item {
            StackItem::Component(c) => self.component(c)?.position,
            StackItem::Interface(e) => self.endpoint(e)?.position,
        };
        Ok(Placement {
            stack,
            index,
            position,
        })
    }

    /// Current placement of a port on its owner.
    pub fn port_placement(&self, port: EndpointId) -> Result<PortPlacement, DiagramError> {
        let ep = self.endpoint(port)?;
        let owner = ep
            .owner()
            .ok_or_else(|| DiagramError::Inconsistent(format!("{} is not a port", port)))?;
        let (side, index) = self
            .component(owner)?
            .port_slot(port)
            .ok_or_else(|| DiagramError::Inconsistent(format!("{} has no slot", port)))?;
        Ok(PortPlacement {
            side,
            index,
            position: ep.position,
        })
    }

    fn editable_endpoint(&self, id: EndpointId) -> Result<&Endpoint, DiagramError> {
        let ep = self.endpoint(id)?;
        if ep.is_proxy() {
            return Err(DiagramError::ProxyEndpoint(ep.name.clone()));
        }
        Ok(ep)
    }

    fn text_of(&self, target: TextTarget, field: TextField) -> Result<String, DiagramError> {
        Ok(match (target, field) {
            (TextTarget::Component(id), TextField::Name) => self.component(id)?.name.clone(),
            (TextTarget::Component(id), TextField::DisplayName) => {
                self.component(id)?.display_name.clone()
            }
            (TextTarget::Component(id), TextField::Description) => {
                self.component(id)?.description.clone()
            }
            (TextTarget::Endpoint(id), TextField::Description) => {
                self.editable_endpoint(id)?.description.clone()
            }
            (TextTarget::Endpoint(id), _) => self.editable_endpoint(id)?.name.clone(),
            (TextTarget::Connection(id), TextField::Description) => {
                self.connection(id)?.description.clone()
            }
            (TextTarget::Connection(id), _) => self.connection(id)?.name.clone(),
            (TextTarget::Stack(id), _) => self.stack(id)?.name.clone(),
        })
    }

    /// `<instance>_<interface>` for a port, `<interface>` for a top-level
    /// interface.
    pub(crate) fn end_label(&self, ep: &Endpoint, name: &str) -> String {
        match ep.owner().and_then(|o| self.components.get(&o)) {
            Some(owner) => format!("{}_{}", owner.name, name),
            None => name.to_string(),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Components
    // ────────────────────────────────────────────────────────────────────────

    fn add_component_command(
        &mut self,
        stack: StackId,
        definition: Arc<ComponentDef>,
        name: &str,
        y: Option<f64>,
        draft: bool,
    ) -> Result<(EditorCommand, ComponentId), DiagramError> {
        let kind = match definition.kind {
            ComponentKind::Platform => ItemKinds::CONTAINER,
            ComponentKind::Software => ItemKinds::COMPONENT,
        };
        self.check_accepts(stack, kind)?;
        let index = match y {
            Some(y) => self.insertion_index_in(stack, y, None),
            None => self.stack(stack)?.items.len(),
        };
        let ports = PortSpec::from_definition(&definition, |_| None);
        let position = Point::new(0.0, y.unwrap_or(0.0));
        let mut built = self.build_component(definition, name, stack, index, position, &ports);
        built.item.draft = draft;
        let id = built.id();
        let cmd = EditorCommand::leaf(
            format!("Add {}", name),
            Action::AttachComponent {
                id,
                stash: Some(Box::new(built)),
            },
        );
        Ok((cmd, id))
    }

    /// Instantiate `definition` in `stack`. With `y` the item is inserted at
    /// the matching slot, otherwise appended.
    pub fn add_component(
        &mut self,
        stack: StackId,
        definition: Arc<ComponentDef>,
        y: Option<f64>,
    ) -> Result<ComponentId, DiagramError> {
        let name = self.unique_instance_name(&instance_base(&definition));
        let (cmd, id) = self.add_component_command(stack, definition, &name, y, false)?;
        self.apply(cmd)?;
        Ok(id)
    }

    /// Add a draft item without a catalog definition.
    pub fn add_draft_component(
        &mut self,
        stack: StackId,
        kind: ComponentKind,
        y: Option<f64>,
    ) -> Result<ComponentId, DiagramError> {
        let name = self.unique_instance_name("draft");
        let definition = Arc::new(ComponentDef::placeholder(None, kind));
        let (cmd, id) = self.add_component_command(stack, definition, &name, y, true)?;
        self.apply(cmd)?;
        Ok(id)
    }

    pub(crate) fn delete_component_command(
        &self,
        id: ComponentId,
        seen: &mut BTreeSet<ConnectionId>,
    ) -> Result<EditorCommand, DiagramError> {
        let item = self.component(id)?;
        let mut cmd = EditorCommand::composite(format!("Delete {}", item.name))
            .with_action(Action::DetachComponent { id, stash: None });
        for child in self.children_of(id) {
            cmd.push(self.delete_component_command(child, seen)?);
        }
        for conn in self.connections_of_component(id) {
            if seen.insert(conn) {
                cmd.push(self.disconnect_command(conn)?);
            }
        }
        Ok(cmd)
    }

    /// Delete a component item, its connections and (for a container) its
    /// nested items.
    pub fn delete_component(&mut self, id: ComponentId) -> Result<(), DiagramError> {
        let cmd = self.delete_component_command(id, &mut BTreeSet::new())?;
        self.apply(cmd)
    }

    fn move_item_command(
        &self,
        item: StackItem,
        stack: StackId,
        index: usize,
        position: Point,
    ) -> Result<EditorCommand, DiagramError> {
        let from = self.placement_of(item)?;
        let kind = match item {
            StackItem::Component(c) => self.component(c)?.item_kind(),
            StackItem::Interface(_) => ItemKinds::INTERFACE,
        };
        self.check_accepts(stack, kind)?;
        if let StackItem::Component(c) = item {
            if self.component(c)?.child_stack == Some(stack) {
                return Err(DiagramError::ItemNotAllowed {
                    stack: self.stack(stack)?.name.clone(),
                    kind: "its own container".to_string(),
                });
            }
        }
        let to = Placement {
            stack,
            index,
            position,
        };
        Ok(EditorCommand::leaf(
            "Move item",
            Action::MoveItem { item, from, to },
        ))
    }

    /// Move a component to slot `index` of `stack` (possibly another stack).
    pub fn move_component(
        &mut self,
        id: ComponentId,
        stack: StackId,
        index: usize,
    ) -> Result<(), DiagramError> {
        let position = self.component(id)?.position;
        let cmd = self.move_item_command(StackItem::Component(id), stack, index, position)?;
        self.apply(cmd)
    }

    /// Move a top-level interface to local height `y` of `stack`.
    pub fn move_interface(
        &mut self,
        id: EndpointId,
        stack: StackId,
        y: f64,
    ) -> Result<(), DiagramError> {
        let item = StackItem::Interface(id);
        let index = self.insertion_index_in(stack, y, Some(item));
        let cmd = self.move_item_command(item, stack, index, Point::new(0.0, y))?;
        self.apply(cmd)
    }

    pub(crate) fn replace_command(
        &mut self,
        old: ComponentId,
        with: Replacement,
        keep_old: bool,
    ) -> Result<(EditorCommand, ComponentId), DiagramError> {
        struct NewPort {
            id: EndpointId,
            name: String,
            family: &'static str,
            protocol: Protocol,
            placement: PortPlacement,
        }

        let old_item = self.component(old)?.clone();
        let old_place = self.placement_of(StackItem::Component(old))?;
        let mut cmd = EditorCommand::composite(format!("Replace {}", old_item.name));

        let (new_id, new_ports, new_from) = match with {
            Replacement::Existing(id) => {
                let item = self.component(id)?;
                if id == old || Some(item.parent) == old_item.child_stack {
                    return Err(DiagramError::ItemNotAllowed {
                        stack: self.stack(old_place.stack)?.name.clone(),
                        kind: "replaced item or its child".to_string(),
                    });
                }
                self.check_accepts(old_place.stack, item.item_kind())?;
                let mut ports = Vec::new();
                for p in item.all_ports() {
                    let ep = self.endpoint(p)?;
                    ports.push(NewPort {
                        id: p,
                        name: ep.name.clone(),
                        family: ep.protocol.family(),
                        protocol: ep.protocol.clone(),
                        placement: self.port_placement(p)?,
                    });
                }
                (id, ports, self.placement_of(StackItem::Component(id))?)
            }
            Replacement::Definition(definition) => {
                let kind = match definition.kind {
                    ComponentKind::Platform => ItemKinds::CONTAINER,
                    ComponentKind::Software => ItemKinds::COMPONENT,
                };
                self.check_accepts(old_place.stack, kind)?;
                let name = if keep_old {
                    self.unique_instance_name(&instance_base(&definition))
                } else {
                    old_item.name.clone()
                };
                let specs = PortSpec::from_definition(&definition, |_| None);
                let built = self.build_component(
                    definition,
                    &name,
                    old_place.stack,
                    old_place.index,
                    old_place.position,
                    &specs,
                );
                let mut ports = Vec::new();
                for side in [Side::Left, Side::Right] {
                    for (index, p) in built.item.ports(side).iter().enumerate() {
                        if let Some(ep) = built.ports.iter().find(|e| e.id == *p) {
                            ports.push(NewPort {
                                id: *p,
                                name: ep.name.clone(),
                                family: ep.protocol.family(),
                                protocol: ep.protocol.clone(),
                                placement: PortPlacement {
                                    side,
                                    index,
                                    position: ep.position,
                                },
                            });
                        }
                    }
                }
                let id = built.id();
                cmd.push(EditorCommand::leaf(
                    format!("Add {}", name),
                    Action::AttachComponent {
                        id,
                        stash: Some(Box::new(built)),
                    },
                ));
                (id, ports, old_place)
            }
        };

        let mut used = BTreeSet::new();
        let mut matches: Vec<(EndpointId, usize)> = Vec::new();
        let mut stays = BTreeSet::new();
        for p in old_item.all_ports() {
            let ep = self.endpoint(p)?;
            let matched = new_ports.iter().position(|q| {
                !used.contains(&q.id) && q.name == ep.name && q.family == ep.protocol.family()
            });
            match matched {
                Some(i) => {
                    used.insert(new_ports[i].id);
                    matches.push((p, i));
                }
                None => stays.extend(self.connections_of(p)),
            }
        }

        // Decide per moved connection whether its re-pointed ends are still
        // a legal pair; the rest are deleted before anything moves.
        let target = |e: EndpointId| -> Option<usize> {
            matches.iter().find(|(p, _)| *p == e).map(|(_, i)| *i)
        };
        let mut moved_conns = BTreeSet::new();
        let mut dropped = BTreeSet::new();
        let mut incoming: BTreeMap<EndpointId, usize> = BTreeMap::new();
        for (p, _) in &matches {
            for c in self.connections_of(*p) {
                if !moved_conns.insert(c) {
                    continue;
                }
                let conn = self.connection(c)?;
                let mut ends = Vec::with_capacity(2);
                for end in [conn.a, conn.b] {
                    let real = self.real_endpoint(end)?;
                    ends.push(match target(real.id) {
                        Some(i) => (new_ports[i].id, new_ports[i].protocol.clone(), true),
                        None => (real.id, real.protocol.clone(), false),
                    });
                }
                let (a, b) = (&ends[0], &ends[1]);
                let legal = a.0 != b.0
                    && protocols_compatible(&a.1, &b.1)
                    && ends.iter().filter(|e| e.2).all(|(id, protocol, _)| {
                        !is_exclusive(protocol)
                            || self.connection_count(*id) + incoming.get(id).copied().unwrap_or(0)
                                == 0
                    });
                if legal {
                    for (id, _, _) in ends.iter().filter(|e| e.2) {
                        *incoming.entry(*id).or_default() += 1;
                    }
                } else {
                    dropped.insert(c);
                    cmd.push(self.disconnect_command(c)?);
                }
            }
        }

        for (p, i) in &matches {
            let q = &new_ports[*i];
            cmd.push(EditorCommand::leaf(
                format!("Move {}", q.name),
                Action::MovePort {
                    id: q.id,
                    from: q.placement,
                    to: self.port_placement(*p)?,
                },
            ));
            cmd.push(EditorCommand::leaf(
                format!("Exchange connections of {}", q.name),
                Action::ExchangeConnections {
                    from: *p,
                    to: q.id,
                    moved: Vec::new(),
                },
            ));
        }

        if !keep_old {
            for child in self.children_of(old) {
                stays.extend(self.connections_of_component(child));
            }
            let mut seen: BTreeSet<ConnectionId> =
                moved_conns.difference(&stays).copied().collect();
            seen.extend(dropped.iter().copied());
            cmd.push(self.delete_component_command(old, &mut seen)?);
        }

        let mut index = old_place.index;
        if new_from.stack == old_place.stack && new_from.index < old_place.index {
            index -= 1;
        }
        cmd.push(EditorCommand::leaf(
            "Move replacement",
            Action::MoveItem {
                item: StackItem::Component(new_id),
                from: new_from,
                to: Placement {
                    stack: old_place.stack,
                    index,
                    position: old_place.position,
                },
            },
        ));
        if !dropped.is_empty() {
            self.notify(Notice::warning(format!(
                "{} connection(s) of {} could not move to the replacement and were removed",
                dropped.len(),
                old_item.name
            )));
        }
        Ok((cmd, new_id))
    }

    /// Put another component in the place of `old`, moving over every
    /// connection of a port that the replacement has too (same name and
    /// protocol family). A moved connection that would join a port to
    /// itself, pair incompatible protocols or overload an exclusive port is
    /// deleted instead, with a warning. Unless `keep_old` is set, `old` is
    /// deleted.
    pub fn replace_component(
        &mut self,
        old: ComponentId,
        with: Replacement,
        keep_old: bool,
    ) -> Result<ComponentId, DiagramError> {
        let (cmd, id) = self.replace_command(old, with, keep_old)?;
        self.apply(cmd)?;
        Ok(id)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Ports and top-level interfaces
    // ────────────────────────────────────────────────────────────────────────

    /// Add a port to `owner`. Without a position the port is appended on
    /// the side its protocol suggests; without a name it is called
    /// `interface`, `interface_1`, ….
    pub fn add_port(
        &mut self,
        owner: ComponentId,
        protocol: Protocol,
        local: Option<Point>,
        name: Option<&str>,
    ) -> Result<EndpointId, DiagramError> {
        let item = self.component(owner)?;
        let local = match local {
            Some(p) => p,
            None => {
                let side = if item.left_ports.len() <= item.right_ports.len() {
                    Side::Left
                } else {
                    Side::Right
                };
                Point::new(item.border_x(side), self.next_port_y(item, side))
            }
        };
        let name = self.unique_endpoint_name(Some(owner), name.unwrap_or("interface"), None);
        let detached = self.build_port(owner, &name, protocol, local)?;
        let id = detached.endpoint.id;
        self.apply(EditorCommand::leaf(
            format!("Add port {}", name),
            Action::AttachEndpoint {
                id,
                stash: Some(Box::new(detached)),
            },
        ))?;
        Ok(id)
    }

    /// Add a top-level interface item to an IO column.
    pub fn add_interface(
        &mut self,
        stack: StackId,
        protocol: Protocol,
        y: Option<f64>,
        name: Option<&str>,
    ) -> Result<EndpointId, DiagramError> {
        self.check_accepts(stack, ItemKinds::INTERFACE)?;
        let s = self.stack(stack)?;
        let y = match y {
            Some(y) => y,
            None => s
                .interfaces()
                .filter_map(|e| self.endpoints.get(&e))
                .map(|e| e.position.y + self.config.interface_height + self.config.io_spacing)
                .fold(self.stack_top_margin(s), f64::max),
        };
        let name = self.unique_endpoint_name(None, name.unwrap_or("interface"), None);
        let detached = self.build_interface(stack, &name, protocol, y);
        let id = detached.endpoint.id;
        self.apply(EditorCommand::leaf(
            format!("Add interface {}", name),
            Action::AttachEndpoint {
                id,
                stash: Some(Box::new(detached)),
            },
        ))?;
        Ok(id)
    }

    pub(crate) fn delete_endpoint_command(
        &self,
        id: EndpointId,
        seen: &mut BTreeSet<ConnectionId>,
    ) -> Result<EditorCommand, DiagramError> {
        let ep = self.editable_endpoint(id)?;
        let mut cmd = EditorCommand::composite(format!("Delete {}", ep.name))
            .with_action(Action::DetachEndpoint { id, stash: None });
        for conn in self.connections_of(id) {
            if seen.insert(conn) {
                cmd.push(self.disconnect_command(conn)?);
            }
        }
        Ok(cmd)
    }

    /// Delete a port or top-level interface together with its connections.
    pub fn delete_endpoint(&mut self, id: EndpointId) -> Result<(), DiagramError> {
        let cmd = self.delete_endpoint_command(id, &mut BTreeSet::new())?;
        self.apply(cmd)
    }

    /// Move a port to local position `local`; crossing the centre line
    /// switches sides.
    pub fn move_port_to(&mut self, port: EndpointId, local: Point) -> Result<(), DiagramError> {
        let from = self.port_placement(port)?;
        let owner = self.owner_of(port).ok_or(DiagramError::UnknownEndpoint(port))?;
        let item = self.component(owner)?;
        let side = Side::from_local_x(local.x);
        let index = item
            .ports(side)
            .iter()
            .filter(|p| **p != port)
            .position(|p| self.endpoints.get(p).is_some_and(|e| e.position.y > local.y))
            .unwrap_or_else(|| item.ports(side).iter().filter(|p| **p != port).count());
        let to = PortPlacement {
            side,
            index,
            position: Point::new(item.border_x(side), local.y),
        };
        self.apply(EditorCommand::leaf(
            "Move port",
            Action::MovePort { id: port, from, to },
        ))
    }

    /// Change the protocol of an endpoint. All its connections, including
    /// those of its proxy, are removed first.
    pub fn retype(&mut self, id: EndpointId, protocol: Protocol) -> Result<(), DiagramError> {
        let ep = self.editable_endpoint(id)?;
        let from = TypeState::of(ep);
        let to = TypeState {
            name: ep.name.clone(),
            type_locked: protocol != Protocol::Undefined,
            protocol,
        };
        let mut cmd = EditorCommand::composite(format!("Retype {}", ep.name))
            .with_action(Action::Retype { id, from, to });
        for conn in self.connections_of(id) {
            cmd.push(self.disconnect_command(conn)?);
        }
        self.apply(cmd)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Connections
    // ────────────────────────────────────────────────────────────────────────

    /// Type an undefined end takes over from a typed peer.
    fn inferred_type(&self, ep: &Endpoint, peer: &Endpoint) -> Option<InferredType> {
        if ep.protocol != Protocol::Undefined || peer.protocol == Protocol::Undefined {
            return None;
        }
        let name = self.unique_endpoint_name(ep.owner(), &peer.name, Some(ep.id));
        Some(InferredType {
            endpoint: ep.id,
            before: TypeState::of(ep),
            after: TypeState {
                name,
                protocol: peer.protocol.clone(),
                type_locked: true,
            },
        })
    }

    fn check_capacity(&self, ep: &Endpoint, effective: &Protocol) -> Result<(), DiagramError> {
        if is_exclusive(effective) && self.connection_count(ep.id) > 0 {
            return Err(DiagramError::Saturated(ep.name.clone()));
        }
        Ok(())
    }

    /// Validate and build the command that joins `a` and `b`. Proxies are
    /// resolved to their real endpoints; with `off_page` the connection is
    /// attached to both proxies instead.
    pub(crate) fn connect_command(
        &mut self,
        a: EndpointId,
        b: EndpointId,
        off_page: bool,
    ) -> Result<(EditorCommand, ConnectionId), DiagramError> {
        let ra = self.real_endpoint(a)?.clone();
        let rb = self.real_endpoint(b)?.clone();
        if !self.can_connect(a, b) {
            return Err(DiagramError::Incompatible(ra.name.clone(), rb.name.clone()));
        }
        let inferred: Vec<InferredType> = [
            self.inferred_type(&ra, &rb),
            self.inferred_type(&rb, &ra),
        ]
        .into_iter()
        .flatten()
        .collect();
        let effective = |ep: &Endpoint| {
            inferred
                .iter()
                .find(|i| i.endpoint == ep.id)
                .map(|i| i.after.clone())
                .unwrap_or_else(|| TypeState::of(ep))
        };
        let (ta, tb) = (effective(&ra), effective(&rb));
        self.check_capacity(&ra, &ta.protocol)?;
        self.check_capacity(&rb, &tb.protocol)?;

        let (end_a, end_b) = if off_page {
            match (ra.proxy, rb.proxy) {
                (Some(pa), Some(pb)) => (pa, pb),
                _ => return Err(DiagramError::ProxyEndpoint(ra.name.clone())),
            }
        } else {
            (ra.id, rb.id)
        };
        let base = format!(
            "{}_to_{}",
            self.end_label(&ra, &ta.name),
            self.end_label(&rb, &tb.name)
        );
        let name = self.unique_connection_name(&base);
        let id = self.ids.connection();
        let conn = Connection {
            id,
            name: name.clone(),
            description: String::new(),
            a: end_a,
            b: end_b,
            route: Vec::new(),
            off_page,
            anchors: None,
        };
        let cmd = EditorCommand::leaf(
            format!("Connect {}", name),
            Action::AttachConnection {
                id,
                stash: Some(Box::new(conn)),
                inferred,
            },
        );
        Ok((cmd, id))
    }

    /// Join two endpoints. An undefined end takes over the peer's protocol
    /// and name.
    pub fn connect(&mut self, a: EndpointId, b: EndpointId) -> Result<ConnectionId, DiagramError> {
        let (cmd, id) = self.connect_command(a, b, false)?;
        self.apply(cmd)?;
        Ok(id)
    }

    /// Join two endpoints through their off-page proxies.
    pub fn connect_off_page(
        &mut self,
        a: EndpointId,
        b: EndpointId,
    ) -> Result<ConnectionId, DiagramError> {
        let (cmd, id) = self.connect_command(a, b, true)?;
        self.apply(cmd)?;
        Ok(id)
    }

    pub(crate) fn disconnect_command(&self, id: ConnectionId) -> Result<EditorCommand, DiagramError> {
        let conn = self.connection(id)?;
        Ok(EditorCommand::leaf(
            format!("Delete connection {}", conn.name),
            Action::DetachConnection { id, stash: None },
        ))
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Result<(), DiagramError> {
        let cmd = self.disconnect_command(id)?;
        self.apply(cmd)
    }

    /// Swap a connection between its real endpoints and their proxies.
    pub fn toggle_off_page(&mut self, id: ConnectionId) -> Result<(), DiagramError> {
        let conn = self.connection(id)?;
        let label = if conn.off_page {
            format!("Show {} on page", conn.name)
        } else {
            format!("Move {} off page", conn.name)
        };
        self.apply(EditorCommand::leaf(label, Action::ToggleOffPage { id }))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Names and descriptions
    // ────────────────────────────────────────────────────────────────────────

    /// Change a name or description as one undoable step.
    pub fn edit_text(
        &mut self,
        target: TextTarget,
        field: TextField,
        value: &str,
    ) -> Result<(), DiagramError> {
        let from = self.text_of(target, field)?;
        if from == value {
            return Ok(());
        }
        self.apply(EditorCommand::leaf(
            "Edit text",
            Action::SetText {
                target,
                field,
                from,
                to: value.to_string(),
            },
        ))
    }

    pub fn rename_component(&mut self, id: ComponentId, name: &str) -> Result<(), DiagramError> {
        self.edit_text(TextTarget::Component(id), TextField::Name, name)
    }

    pub fn rename_endpoint(&mut self, id: EndpointId, name: &str) -> Result<(), DiagramError> {
        self.edit_text(TextTarget::Endpoint(id), TextField::Name, name)
    }

    pub fn rename_connection(&mut self, id: ConnectionId, name: &str) -> Result<(), DiagramError> {
        self.edit_text(TextTarget::Connection(id), TextField::Name, name)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Columns
    // ────────────────────────────────────────────────────────────────────────

    /// Insert a column at `index` (appended when `None`). The name is made
    /// unique among the columns.
    pub fn add_column(
        &mut self,
        desc: &ColumnDesc,
        index: Option<usize>,
    ) -> Result<StackId, DiagramError> {
        let mut desc = desc.clone();
        desc.name = unique_name(&desc.name, |n| self.find_column(n).is_some());
        let index = index.unwrap_or(self.columns.len()).min(self.columns.len());
        let detached = self.build_column(&desc, index);
        let id = detached.stack.id;
        self.apply(EditorCommand::leaf(
            format!("Add column {}", desc.name),
            Action::AttachStack {
                id,
                stash: Some(Box::new(detached)),
            },
        ))?;
        Ok(id)
    }

    pub(crate) fn delete_column_command(&self, id: StackId) -> Result<EditorCommand, DiagramError> {
        let stack = self.stack(id)?;
        if !stack.is_column() {
            return Err(DiagramError::UnknownStack(id));
        }
        let nested: Vec<String> = stack
            .components()
            .filter(|c| !self.children_of(*c).is_empty())
            .filter_map(|c| self.components.get(&c))
            .map(|c| c.name.clone())
            .collect();
        if !nested.is_empty() {
            return Err(DiagramError::StackHasNestedItems {
                stack: stack.name.clone(),
                containers: nested,
            });
        }
        let mut seen = BTreeSet::new();
        let mut cmd = EditorCommand::composite(format!("Delete column {}", stack.name))
            .with_action(Action::DetachStack { id, stash: None });
        for item in &stack.items {
            match item {
                StackItem::Component(c) => {
                    cmd.push(self.delete_component_command(*c, &mut seen)?)
                }
                StackItem::Interface(e) => cmd.push(self.delete_endpoint_command(*e, &mut seen)?),
            }
        }
        Ok(cmd)
    }

    /// Delete a column with everything in it. Refused while a container in
    /// the column still holds nested items.
    pub fn delete_column(&mut self, id: StackId) -> Result<(), DiagramError> {
        let cmd = match self.delete_column_command(id) {
            Ok(cmd) => cmd,
            Err(e) => {
                if matches!(e, DiagramError::StackHasNestedItems { .. }) {
                    self.notify(Notice::warning(e.to_string()));
                }
                return Err(e);
            }
        };
        self.apply(cmd)
    }

    pub fn move_column(&mut self, id: StackId, to: usize) -> Result<(), DiagramError> {
        let from = self
            .columns
            .iter()
            .position(|c| *c == id)
            .ok_or(DiagramError::UnknownStack(id))?;
        let to = to.min(self.columns.len().saturating_sub(1));
        if from == to {
            return Ok(());
        }
        self.apply(EditorCommand::leaf(
            "Move column",
            Action::MoveStack { id, from, to },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagramConfig;
    use crate::editor::EndpointKind;
    use crate::model::{ApiRole, ColumnContent, ComDirection, InterfaceDef, TypeRef};

    fn definition(name: &str, ports: &[(&str, Protocol)]) -> Arc<ComponentDef> {
        Arc::new(ComponentDef {
            type_ref: Some(TypeRef::new("acme", "sw", name, "1.0")),
            interfaces: ports
                .iter()
                .map(|(n, p)| InterfaceDef {
                    name: n.to_string(),
                    protocol: p.clone(),
                    description: String::new(),
                    default_pos: None,
                })
                .collect(),
            ..Default::default()
        })
    }

    fn diagram() -> Diagram {
        Diagram::with_columns(
            DiagramConfig::default(),
            &[
                ColumnDesc::new("SW", ColumnContent::Components, 259.0),
                ColumnDesc::new("Out", ColumnContent::Io, 119.0),
            ],
        )
    }

    fn bus() -> Protocol {
        Protocol::com("can", "frame", ComDirection::InOut)
    }

    #[test]
    fn delete_component_with_connections_has_one_leaf_per_connection_plus_detach() {
        let mut d = diagram();
        let sw = d.columns()[0];
        let a = d.add_component(sw, definition("A", &[("x", Protocol::api("s", ApiRole::Requester)), ("y", bus())]), None).unwrap();
        let b = d.add_component(sw, definition("B", &[("x", Protocol::api("s", ApiRole::Requester)), ("y", bus())]), None).unwrap();
        let (ax, ay) = (d.find_port(a, "x").unwrap(), d.find_port(a, "y").unwrap());
        let (bx, by) = (d.find_port(b, "x").unwrap(), d.find_port(b, "y").unwrap());
        d.connect(ax, bx).unwrap();
        d.connect(ay, by).unwrap();

        let cmd = d.delete_component_command(a, &mut BTreeSet::new()).unwrap();
        assert_eq!(cmd.leaf_count(), 3);
    }

    #[test]
    fn retype_severs_connections() {
        let mut d = diagram();
        let sw = d.columns()[0];
        let a = d.add_component(sw, definition("A", &[("y", bus())]), None).unwrap();
        let b = d.add_component(sw, definition("B", &[("y", bus())]), None).unwrap();
        let (ay, by) = (d.find_port(a, "y").unwrap(), d.find_port(b, "y").unwrap());
        d.connect(ay, by).unwrap();
        d.retype(ay, Protocol::api("s", ApiRole::Provider)).unwrap();
        assert_eq!(d.connections().count(), 0);
        assert!(d.endpoint(ay).unwrap().type_locked);
        d.undo().unwrap();
        assert_eq!(d.connections().count(), 1);
        assert_eq!(d.endpoint(ay).unwrap().protocol, bus());
    }

    #[test]
    fn default_connection_names_are_unique() {
        let mut d = diagram();
        let sw = d.columns()[0];
        let req = Protocol::api("s", ApiRole::Requester);
        let a = d.add_component(sw, definition("A", &[("x", req.clone())]), None).unwrap();
        let b = d.add_component(sw, definition("B", &[("x", req.clone())]), None).unwrap();
        let (ax, bx) = (d.find_port(a, "x").unwrap(), d.find_port(b, "x").unwrap());
        let c1 = d.connect(ax, bx).unwrap();
        let c2 = d.connect(ax, bx).unwrap();
        assert_eq!(d.connection(c1).unwrap().name, "A_0_x_to_B_0_x");
        assert_eq!(d.connection(c2).unwrap().name, "A_0_x_to_B_0_x_1");
    }

    #[test]
    fn interfaces_only_go_to_io_columns() {
        let mut d = diagram();
        let (sw, out) = (d.columns()[0], d.columns()[1]);
        assert!(matches!(
            d.add_interface(sw, bus(), None, None),
            Err(DiagramError::ItemNotAllowed { .. })
        ));
        let i = d.add_interface(out, bus(), None, None).unwrap();
        assert_eq!(d.endpoint(i).unwrap().name, "interface");
        assert_eq!(d.endpoint(i).unwrap().kind, EndpointKind::TopLevelInterface);
    }

    #[test]
    fn move_column_is_undoable() {
        let mut d = diagram();
        let (sw, out) = (d.columns()[0], d.columns()[1]);
        d.move_column(out, 0).unwrap();
        assert_eq!(d.columns(), &[out, sw]);
        assert_eq!(d.stack(out).unwrap().left, 0.0);
        d.undo().unwrap();
        assert_eq!(d.columns(), &[sw, out]);
        assert_eq!(d.stack(sw).unwrap().left, 0.0);
    }

    #[test]
    fn port_crossing_the_centre_switches_side() {
        let mut d = diagram();
        let sw = d.columns()[0];
        let req = Protocol::api("s", ApiRole::Requester);
        let a = d.add_component(sw, definition("A", &[("x", req.clone()), ("z", req)]), None).unwrap();
        let (x, z) = (d.find_port(a, "x").unwrap(), d.find_port(a, "z").unwrap());
        assert_eq!(d.component(a).unwrap().ports(Side::Left), &vec![x, z]);

        d.move_port_to(x, Point::new(30.0, 40.0)).unwrap();
        let item = d.component(a).unwrap();
        assert_eq!(item.ports(Side::Left), &vec![z]);
        assert_eq!(item.ports(Side::Right), &vec![x]);
        assert_eq!(d.endpoint(x).unwrap().position.x, item.border_x(Side::Right));

        d.undo().unwrap();
        let item = d.component(a).unwrap();
        assert_eq!(item.ports(Side::Left), &vec![x, z]);
        assert!(item.ports(Side::Right).is_empty());
    }
}
