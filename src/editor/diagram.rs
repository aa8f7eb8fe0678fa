//! The diagram aggregate.
//!
//! A [`Diagram`] owns all entities in id-keyed arenas and offers three kinds
//! of functions:
//!
//! - queries (lookups, scene geometry, capability checks such as
//!   [`Diagram::can_connect`]),
//! - raw structural operations used only by [`Action`](super::Action)
//!   execution; they never run layout and never touch the history,
//! - [`Diagram::apply`], [`Diagram::undo`] and [`Diagram::redo`], the only
//!   way edits become part of the history.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::command::{
    ComponentGeometry, EditorCommand, EditorHistory, EndpointGeometry, Geometry, LayoutDelta,
    PortPlacement, Placement, RouteGeometry, StackGeometry, TextField, TextTarget,
};
use super::component::ComponentItem;
use super::connection::{Connection, fix_overlap, off_page_stub, orthogonal_route};
use super::endpoint::{Endpoint, EndpointKind, Side, TypeState, is_exclusive, protocols_compatible};
use super::interaction::InteractionState;
use super::layout::{Slot, collision_place, collision_settle, stack_compact, stacked_height};
use super::selection::{DiagramObserver, Selection};
use super::stack::{ItemStack, LayoutKind, StackItem, StackOwner};
use super::{ComponentId, ConnectionId, EndpointId, IdAllocator, StackId, unique_name};
use crate::config::DiagramConfig;
use crate::error::{DiagramError, Notice, Severity};
use crate::geometry::{Point, Rect, Vector};
use crate::model::{ApiRole, ColumnDesc, ComDirection, ComponentDef, ComponentKind, InterfaceDef, Protocol};

// ────────────────────────────────────────────────────────────────────────────
// Detached entities (stashes held by actions)
// ────────────────────────────────────────────────────────────────────────────

/// A component item removed from the diagram together with everything it
/// owns, ready to be put back at the same stack index.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedComponent {
    pub(crate) item: ComponentItem,
    pub(crate) index: usize,
    /// Ports and their proxies.
    pub(crate) ports: Vec<Endpoint>,
    pub(crate) child_stack: Option<ItemStack>,
}

impl DetachedComponent {
    pub fn id(&self) -> ComponentId {
        self.item.id
    }
}

/// Where a detached endpoint goes back to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndpointHome {
    Port {
        owner: ComponentId,
        side: Side,
        index: usize,
    },
    Interface {
        stack: StackId,
        index: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetachedEndpoint {
    pub(crate) endpoint: Endpoint,
    pub(crate) proxy: Option<Endpoint>,
    pub(crate) home: EndpointHome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetachedStack {
    pub(crate) stack: ItemStack,
    pub(crate) index: usize,
}

/// Queued by raw operations so the next layout pass can place the item
/// by collision avoidance around its new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LayoutHint {
    Port(EndpointId),
    Interface(EndpointId),
}

/// Port to create on a new component item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PortSpec {
    pub name: String,
    pub protocol: Protocol,
    pub description: String,
    /// Local position; `None` appends the port.
    pub position: Option<Point>,
}

impl PortSpec {
    pub(crate) fn new(name: &str, protocol: Protocol, position: Option<Point>) -> Self {
        Self {
            name: name.to_string(),
            protocol,
            description: String::new(),
            position,
        }
    }

    /// One spec per interface of `definition`, positioned by `position_of`
    /// or else by the interface's default position.
    pub(crate) fn from_definition(
        definition: &ComponentDef,
        position_of: impl Fn(&InterfaceDef) -> Option<Point>,
    ) -> Vec<PortSpec> {
        definition
            .interfaces
            .iter()
            .map(|def| PortSpec {
                name: def.name.clone(),
                protocol: def.protocol.clone(),
                description: def.description.clone(),
                position: position_of(def).or(def.default_pos),
            })
            .collect()
    }
}

/// Comparable snapshot of everything observable through the public API.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramState {
    pub name: String,
    pub columns: Vec<StackId>,
    pub stacks: BTreeMap<StackId, ItemStack>,
    pub components: BTreeMap<ComponentId, ComponentItem>,
    pub endpoints: BTreeMap<EndpointId, Endpoint>,
    pub connections: BTreeMap<ConnectionId, Connection>,
}

// ────────────────────────────────────────────────────────────────────────────
// Diagram
// ────────────────────────────────────────────────────────────────────────────

pub struct Diagram {
    pub(crate) config: DiagramConfig,
    pub(crate) name: String,
    pub(crate) columns: Vec<StackId>,
    pub(crate) stacks: BTreeMap<StackId, ItemStack>,
    pub(crate) components: BTreeMap<ComponentId, ComponentItem>,
    pub(crate) endpoints: BTreeMap<EndpointId, Endpoint>,
    pub(crate) connections: BTreeMap<ConnectionId, Connection>,
    pub(crate) ids: IdAllocator,
    pub(crate) history: EditorHistory,
    pub(crate) notices: Vec<Notice>,
    pub(crate) protected: bool,
    pub(crate) selection: Selection,
    pub(crate) observers: Vec<Box<dyn DiagramObserver>>,
    pub(crate) interaction: InteractionState,
    pub(crate) layout_hints: Vec<LayoutHint>,
}

impl Diagram {
    /// An empty diagram without columns.
    pub fn new(config: DiagramConfig) -> Self {
        let history = EditorHistory::new(config.history_limit);
        Self {
            config,
            name: String::new(),
            columns: Vec::new(),
            stacks: BTreeMap::new(),
            components: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            connections: BTreeMap::new(),
            ids: IdAllocator::default(),
            history,
            notices: Vec::new(),
            protected: false,
            selection: Selection::None,
            observers: Vec::new(),
            interaction: InteractionState::default(),
            layout_hints: Vec::new(),
        }
    }

    /// An empty diagram with the given columns.
    pub fn with_columns(config: DiagramConfig, columns: &[ColumnDesc]) -> Self {
        let mut diagram = Diagram::new(config);
        for desc in columns {
            let id = diagram.ids.stack();
            diagram.stacks.insert(id, ItemStack::column(id, desc));
            diagram.columns.push(id);
        }
        diagram.relayout();
        diagram
    }

    pub fn config(&self) -> &DiagramConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn history(&self) -> &EditorHistory {
        &self.history
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// A protected diagram refuses every mutating operation.
    pub fn set_protected(&mut self, protected: bool) {
        self.protected = protected;
        if protected {
            self.cancel_gesture();
        }
    }

    pub fn state(&self) -> DiagramState {
        DiagramState {
            name: self.name.clone(),
            columns: self.columns.clone(),
            stacks: self.stacks.clone(),
            components: self.components.clone(),
            endpoints: self.endpoints.clone(),
            connections: self.connections.clone(),
        }
    }

    // ── notices ────────────────────────────────────────────────────────────

    /// Queue a caller-visible notice and log it.
    pub(crate) fn notify(&mut self, notice: Notice) {
        match notice.severity {
            Severity::Info => log::info!(message = notice.message.as_str(); "diagram notice"),
            Severity::Warning => log::warn!(message = notice.message.as_str(); "diagram notice"),
            Severity::Error => log::error!(message = notice.message.as_str(); "diagram notice"),
        }
        for observer in self.observers.iter_mut() {
            observer.notice(&notice);
        }
        self.notices.push(notice);
    }

    /// Drain all queued notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    // ── lookups ────────────────────────────────────────────────────────────

    pub fn columns(&self) -> &[StackId] {
        &self.columns
    }

    pub fn stack(&self, id: StackId) -> Result<&ItemStack, DiagramError> {
        self.stacks.get(&id).ok_or(DiagramError::UnknownStack(id))
    }

    pub(crate) fn stack_mut(&mut self, id: StackId) -> Result<&mut ItemStack, DiagramError> {
        self.stacks.get_mut(&id).ok_or(DiagramError::UnknownStack(id))
    }

    pub fn component(&self, id: ComponentId) -> Result<&ComponentItem, DiagramError> {
        self.components
            .get(&id)
            .ok_or(DiagramError::UnknownComponent(id))
    }

    pub(crate) fn component_mut(
        &mut self,
        id: ComponentId,
    ) -> Result<&mut ComponentItem, DiagramError> {
        self.components
            .get_mut(&id)
            .ok_or(DiagramError::UnknownComponent(id))
    }

    pub fn endpoint(&self, id: EndpointId) -> Result<&Endpoint, DiagramError> {
        self.endpoints
            .get(&id)
            .ok_or(DiagramError::UnknownEndpoint(id))
    }

    pub(crate) fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut Endpoint, DiagramError> {
        self.endpoints
            .get_mut(&id)
            .ok_or(DiagramError::UnknownEndpoint(id))
    }

    pub fn connection(&self, id: ConnectionId) -> Result<&Connection, DiagramError> {
        self.connections
            .get(&id)
            .ok_or(DiagramError::UnknownConnection(id))
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentItem> {
        self.components.values()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn stacks(&self) -> impl Iterator<Item = &ItemStack> {
        self.stacks.values()
    }

    pub fn find_component(&self, name: &str) -> Option<ComponentId> {
        self.components
            .values()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    pub fn find_port(&self, component: ComponentId, name: &str) -> Option<EndpointId> {
        let item = self.components.get(&component)?;
        item.all_ports()
            .find(|p| self.endpoints.get(p).is_some_and(|e| e.name == name))
    }

    pub fn find_interface(&self, name: &str) -> Option<EndpointId> {
        self.endpoints
            .values()
            .find(|e| e.kind == EndpointKind::TopLevelInterface && e.name == name)
            .map(|e| e.id)
    }

    pub fn find_column(&self, name: &str) -> Option<StackId> {
        self.columns
            .iter()
            .copied()
            .find(|id| self.stacks.get(id).is_some_and(|s| s.name == name))
    }

    pub fn find_connection(&self, name: &str) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    /// Stack that lists `ep` as a top-level interface item.
    pub fn interface_stack(&self, ep: EndpointId) -> Option<StackId> {
        self.stacks
            .values()
            .find(|s| s.items.contains(&StackItem::Interface(ep)))
            .map(|s| s.id)
    }

    /// Stack that currently holds `item`.
    pub fn stack_of(&self, item: StackItem) -> Option<StackId> {
        match item {
            StackItem::Component(c) => self.components.get(&c).map(|c| c.parent),
            StackItem::Interface(e) => self.interface_stack(e),
        }
    }

    /// Proxy of a real endpoint.
    pub fn proxy_of(&self, ep: EndpointId) -> Option<EndpointId> {
        self.endpoints.get(&ep).and_then(|e| e.proxy)
    }

    /// All connections touching `ep` or its proxy.
    pub fn connections_of(&self, ep: EndpointId) -> BTreeSet<ConnectionId> {
        let mut out = BTreeSet::new();
        if let Some(e) = self.endpoints.get(&ep) {
            out.extend(e.connections.iter().copied());
            if let Some(p) = e.proxy.and_then(|p| self.endpoints.get(&p)) {
                out.extend(p.connections.iter().copied());
            }
        }
        out
    }

    /// All connections touching any port of `component`.
    pub fn connections_of_component(&self, component: ComponentId) -> BTreeSet<ConnectionId> {
        let mut out = BTreeSet::new();
        if let Some(item) = self.components.get(&component) {
            for port in item.all_ports() {
                out.extend(self.connections_of(port));
            }
        }
        out
    }

    /// Components nested in a container, in stack order.
    pub fn children_of(&self, container: ComponentId) -> Vec<ComponentId> {
        self.components
            .get(&container)
            .and_then(|c| c.child_stack)
            .and_then(|s| self.stacks.get(&s))
            .map(|s| s.components().collect())
            .unwrap_or_default()
    }

    // ── capabilities ───────────────────────────────────────────────────────

    /// The real endpoint behind `id` (itself unless `id` is a proxy).
    pub fn real_endpoint(&self, id: EndpointId) -> Result<&Endpoint, DiagramError> {
        let ep = self.endpoint(id)?;
        match ep.kind {
            EndpointKind::OffPageProxy { real } => self.endpoint(real),
            _ => Ok(ep),
        }
    }

    pub fn protocol_of(&self, id: EndpointId) -> Option<&Protocol> {
        self.real_endpoint(id).ok().map(|e| &e.protocol)
    }

    pub fn owner_of(&self, id: EndpointId) -> Option<ComponentId> {
        self.real_endpoint(id).ok().and_then(|e| e.owner())
    }

    /// Connections of the real endpoint and its proxy together.
    pub fn connection_count(&self, id: EndpointId) -> usize {
        self.real_endpoint(id)
            .map(|e| self.connections_of(e.id).len())
            .unwrap_or(0)
    }

    pub fn is_exclusive(&self, id: EndpointId) -> bool {
        self.protocol_of(id).is_some_and(is_exclusive)
    }

    /// Whether `a` and `b` may be joined, ignoring existing connection
    /// counts. Symmetric.
    pub fn can_connect(&self, a: EndpointId, b: EndpointId) -> bool {
        if a == b {
            return false;
        }
        let (Ok(ra), Ok(rb)) = (self.real_endpoint(a), self.real_endpoint(b)) else {
            return false;
        };
        if ra.id == rb.id {
            return false;
        }
        protocols_compatible(&ra.protocol, &rb.protocol)
    }

    /// Whether `id` is currently drawn. Proxies show only while they carry
    /// connections or while a draw gesture needs them.
    pub fn is_visible(&self, id: EndpointId) -> bool {
        match self.endpoints.get(&id) {
            Some(ep) if ep.is_proxy() => {
                !ep.connections.is_empty() || self.interaction.shows_proxy(id)
            }
            Some(_) => true,
            None => false,
        }
    }

    // ── scene geometry ─────────────────────────────────────────────────────

    /// Scene point that item positions in `stack` are relative to.
    pub fn stack_origin(&self, stack: StackId) -> Point {
        match self.stacks.get(&stack) {
            Some(s) => match s.owner {
                StackOwner::Layout => Point::new(s.left + s.width / 2.0, 0.0),
                StackOwner::Component(owner) => self.component_scene_pos(owner),
            },
            None => Point::default(),
        }
    }

    /// Scene position of a component's top-centre.
    pub fn component_scene_pos(&self, id: ComponentId) -> Point {
        match self.components.get(&id) {
            Some(c) => self.stack_origin(c.parent) + c.position,
            None => Point::default(),
        }
    }

    pub fn component_rect(&self, id: ComponentId) -> Option<Rect> {
        let item = self.components.get(&id)?;
        Some(item.rect_at(self.component_scene_pos(id)))
    }

    pub fn endpoint_scene_pos(&self, id: EndpointId) -> Option<Point> {
        let ep = self.endpoints.get(&id)?;
        match ep.kind {
            EndpointKind::ComponentPort { owner } => {
                Some(self.component_scene_pos(owner) + ep.position)
            }
            EndpointKind::TopLevelInterface => {
                let stack = self.interface_stack(id)?;
                Some(self.stack_origin(stack) + ep.position)
            }
            EndpointKind::OffPageProxy { real } => {
                let real_ep = self.endpoints.get(&real)?;
                let p = self.endpoint_scene_pos(real)?;
                Some(p.offset(real_ep.direction, self.config.offpage_offset))
            }
        }
    }

    pub fn endpoint_direction(&self, id: EndpointId) -> Vector {
        self.endpoints
            .get(&id)
            .map(|e| e.direction)
            .unwrap_or(Vector::RIGHT)
    }

    fn item_height(&self, item: StackItem) -> f64 {
        match item {
            StackItem::Component(c) => self.components.get(&c).map(|c| c.height).unwrap_or(0.0),
            StackItem::Interface(_) => self.config.interface_height,
        }
    }

    fn item_position(&self, item: StackItem) -> Point {
        match item {
            StackItem::Component(c) => self
                .components
                .get(&c)
                .map(|c| c.position)
                .unwrap_or_default(),
            StackItem::Interface(e) => self
                .endpoints
                .get(&e)
                .map(|e| e.position)
                .unwrap_or_default(),
        }
    }

    fn set_item_position(&mut self, item: StackItem, position: Point) {
        match item {
            StackItem::Component(c) => {
                if let Some(c) = self.components.get_mut(&c) {
                    c.position = position;
                }
            }
            StackItem::Interface(e) => {
                if let Some(e) = self.endpoints.get_mut(&e) {
                    e.position = position;
                }
            }
        }
    }

    pub(crate) fn stack_top_margin(&self, stack: &ItemStack) -> f64 {
        if stack.is_column() {
            self.config.stack_top_margin
        } else {
            self.config.port_min_y
        }
    }

    pub(crate) fn stack_spacing(&self, stack: &ItemStack) -> f64 {
        match stack.layout {
            LayoutKind::Stacked => self.config.stack_spacing,
            LayoutKind::Collision => self.config.io_spacing,
        }
    }

    /// Index at which an item with local top `y` would be inserted.
    pub(crate) fn insertion_index_in(&self, stack: StackId, y: f64, skip: Option<StackItem>) -> usize {
        let Some(s) = self.stacks.get(&stack) else {
            return 0;
        };
        s.items
            .iter()
            .filter(|i| Some(**i) != skip)
            .position(|i| self.item_position(*i).y > y)
            .unwrap_or_else(|| s.items.iter().filter(|i| Some(**i) != skip).count())
    }

    /// Local y for the next port appended on `side` of `component`.
    pub(crate) fn next_port_y(&self, component: &ComponentItem, side: Side) -> f64 {
        component
            .ports(side)
            .iter()
            .filter_map(|p| self.endpoints.get(p))
            .map(|p| p.position.y + self.config.port_height + self.config.port_spacing)
            .fold(self.config.port_min_y, f64::max)
    }

    // ── builders (allocate ids, nothing is attached yet) ───────────────────

    fn make_endpoint_pair(
        &mut self,
        kind: EndpointKind,
        name: &str,
        protocol: Protocol,
    ) -> (Endpoint, Endpoint) {
        let mut ep = Endpoint::new(self.ids.endpoint(), kind, name, protocol);
        let proxy = Endpoint::new_proxy(self.ids.endpoint(), &ep);
        ep.proxy = Some(proxy.id);
        (ep, proxy)
    }

    fn default_side(&self, protocol: &Protocol, left: usize, right: usize) -> Side {
        match protocol {
            Protocol::Api {
                role: ApiRole::Requester,
                ..
            }
            | Protocol::Com {
                direction: ComDirection::In,
                ..
            } => Side::Left,
            Protocol::Api {
                role: ApiRole::Provider,
                ..
            }
            | Protocol::Com {
                direction: ComDirection::Out,
                ..
            } => Side::Right,
            _ if left <= right => Side::Left,
            _ => Side::Right,
        }
    }

    /// Build a component item with the given ports. Ports without a position
    /// are appended on the side their role suggests.
    pub(crate) fn build_component(
        &mut self,
        definition: Arc<ComponentDef>,
        name: &str,
        stack: StackId,
        index: usize,
        position: Point,
        ports: &[PortSpec],
    ) -> DetachedComponent {
        let id = self.ids.component();
        let kind = definition.kind;
        let width = match kind {
            ComponentKind::Platform => self.config.component_width + 4.0 * self.config.grid_size,
            ComponentKind::Software => self.config.component_width,
        };
        let child_stack = match kind {
            ComponentKind::Platform => {
                let sid = self.ids.stack();
                Some(ItemStack::container_interior(
                    sid,
                    id,
                    width - 2.0 * self.config.grid_size,
                ))
            }
            ComponentKind::Software => None,
        };
        let mut item = ComponentItem {
            id,
            name: name.to_string(),
            display_name: String::new(),
            description: definition.description.clone(),
            definition: definition.clone(),
            type_ref: definition.type_ref.clone(),
            kind,
            draft: false,
            placeholder: false,
            config_values: Default::default(),
            position,
            parent: stack,
            left_ports: Vec::new(),
            right_ports: Vec::new(),
            child_stack: child_stack.as_ref().map(|s| s.id),
            width,
            height: self.config.component_min_height,
        };
        let mut endpoints = Vec::new();
        let mut next_y = [self.config.port_min_y, self.config.port_min_y];
        for spec in ports {
            let (mut ep, proxy) = self.make_endpoint_pair(
                EndpointKind::ComponentPort { owner: id },
                &spec.name,
                spec.protocol.clone(),
            );
            ep.description = spec.description.clone();
            let side = match spec.position {
                Some(p) => Side::from_local_x(p.x),
                None => self.default_side(
                    &spec.protocol,
                    item.left_ports.len(),
                    item.right_ports.len(),
                ),
            };
            let slot = match side {
                Side::Left => 0,
                Side::Right => 1,
            };
            let y = spec.position.map(|p| p.y).unwrap_or(next_y[slot]);
            next_y[slot] =
                next_y[slot].max(y + self.config.port_height + self.config.port_spacing);
            ep.position = Point::new(item.border_x(side), y);
            ep.direction = side.direction();
            item.ports_mut(side).push(ep.id);
            endpoints.push(ep);
            endpoints.push(proxy);
        }
        DetachedComponent {
            item,
            index,
            ports: endpoints,
            child_stack,
        }
    }

    /// Build a port on an attached component at local position `local`.
    pub(crate) fn build_port(
        &mut self,
        owner: ComponentId,
        name: &str,
        protocol: Protocol,
        local: Point,
    ) -> Result<DetachedEndpoint, DiagramError> {
        let item = self.component(owner)?;
        let side = Side::from_local_x(local.x);
        let border = item.border_x(side);
        let index = item
            .ports(side)
            .iter()
            .position(|p| self.endpoints.get(p).is_some_and(|e| e.position.y > local.y))
            .unwrap_or(item.ports(side).len());
        let (mut ep, proxy) =
            self.make_endpoint_pair(EndpointKind::ComponentPort { owner }, name, protocol);
        ep.position = Point::new(border, local.y);
        ep.direction = side.direction();
        Ok(DetachedEndpoint {
            endpoint: ep,
            proxy: Some(proxy),
            home: EndpointHome::Port { owner, side, index },
        })
    }

    /// Build a top-level interface item for `stack` with local top `y`.
    /// The stack itself may still be detached.
    pub(crate) fn build_interface(
        &mut self,
        stack: StackId,
        name: &str,
        protocol: Protocol,
        y: f64,
    ) -> DetachedEndpoint {
        let index = self.insertion_index_in(stack, y, None);
        let (mut ep, proxy) =
            self.make_endpoint_pair(EndpointKind::TopLevelInterface, name, protocol);
        ep.position = Point::new(0.0, y);
        DetachedEndpoint {
            endpoint: ep,
            proxy: Some(proxy),
            home: EndpointHome::Interface { stack, index },
        }
    }

    pub(crate) fn build_column(&mut self, desc: &ColumnDesc, index: usize) -> DetachedStack {
        let id = self.ids.stack();
        DetachedStack {
            stack: ItemStack::column(id, desc),
            index,
        }
    }

    /// Unique instance name `<base>_<n>` with the lowest free `n`.
    pub fn unique_instance_name(&self, base: &str) -> String {
        let base = if base.is_empty() { "instance" } else { base };
        let mut n = 0;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.find_component(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Unique name for a new endpoint of `owner` (or among top-level
    /// interfaces when `owner` is `None`), ignoring `except`.
    pub fn unique_endpoint_name(
        &self,
        owner: Option<ComponentId>,
        base: &str,
        except: Option<EndpointId>,
    ) -> String {
        let siblings: Vec<&Endpoint> = match owner {
            Some(c) => self
                .components
                .get(&c)
                .map(|item| {
                    item.all_ports()
                        .filter_map(|p| self.endpoints.get(&p))
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .endpoints
                .values()
                .filter(|e| e.kind == EndpointKind::TopLevelInterface)
                .collect(),
        };
        unique_name(base, |n| {
            siblings
                .iter()
                .any(|e| Some(e.id) != except && e.name == n)
        })
    }

    pub fn unique_connection_name(&self, base: &str) -> String {
        unique_name(base, |n| self.connections.values().any(|c| c.name == n))
    }

    // ── raw structural operations ──────────────────────────────────────────

    pub(crate) fn detach_component(
        &mut self,
        id: ComponentId,
    ) -> Result<DetachedComponent, DiagramError> {
        let item = self.component(id)?;
        if let Some(port) = item.all_ports().find(|p| self.connection_count(*p) > 0) {
            return Err(DiagramError::Inconsistent(format!(
                "{} still has connections on {}",
                item.name, port
            )));
        }
        if let Some(inner) = item.child_stack.and_then(|s| self.stacks.get(&s)) {
            if !inner.items.is_empty() {
                return Err(DiagramError::Inconsistent(format!(
                    "{} still holds nested items",
                    item.name
                )));
            }
        }
        let parent = item.parent;
        let index = self
            .stack(parent)?
            .index_of(StackItem::Component(id))
            .ok_or_else(|| {
                DiagramError::Inconsistent(format!("{} is not listed in its stack", id))
            })?;

        let item = self
            .components
            .remove(&id)
            .ok_or(DiagramError::UnknownComponent(id))?;
        self.stack_mut(parent)?.items.remove(index);
        let mut ports = Vec::new();
        for port in item.all_ports() {
            if let Some(ep) = self.endpoints.remove(&port) {
                let proxy = ep.proxy.and_then(|p| self.endpoints.remove(&p));
                ports.push(ep);
                ports.extend(proxy);
            }
        }
        let child_stack = item.child_stack.and_then(|s| self.stacks.remove(&s));
        self.forget_selection_if_stale();
        Ok(DetachedComponent {
            item,
            index,
            ports,
            child_stack,
        })
    }

    pub(crate) fn attach_component(&mut self, d: DetachedComponent) -> Result<(), DiagramError> {
        let id = d.item.id;
        let parent = d.item.parent;
        self.stack(parent)?;
        if self.components.contains_key(&id) {
            return Err(DiagramError::Inconsistent(format!("{} already attached", id)));
        }
        for ep in d.ports {
            self.endpoints.insert(ep.id, ep);
        }
        if let Some(inner) = d.child_stack {
            self.stacks.insert(inner.id, inner);
        }
        self.stack_mut(parent)?
            .insert(d.index, StackItem::Component(id));
        self.components.insert(id, d.item);
        Ok(())
    }

    pub(crate) fn move_item(&mut self, item: StackItem, to: Placement) -> Result<(), DiagramError> {
        self.stack(to.stack)?;
        if let StackItem::Component(c) = item {
            if self.component(c)?.child_stack == Some(to.stack) {
                return Err(DiagramError::Inconsistent(format!(
                    "{} cannot be moved into itself",
                    c
                )));
            }
        }
        let from = self.stack_of(item).ok_or_else(|| {
            DiagramError::Inconsistent(format!("{:?} is not in any stack", item))
        })?;
        self.stack_mut(from)?.remove(item);
        self.stack_mut(to.stack)?.insert(to.index, item);
        self.set_item_position(item, to.position);
        match item {
            StackItem::Component(c) => self.component_mut(c)?.parent = to.stack,
            StackItem::Interface(e) => self.layout_hints.push(LayoutHint::Interface(e)),
        }
        Ok(())
    }

    pub(crate) fn detach_endpoint(
        &mut self,
        id: EndpointId,
    ) -> Result<DetachedEndpoint, DiagramError> {
        let ep = self.endpoint(id)?;
        if ep.is_proxy() {
            return Err(DiagramError::ProxyEndpoint(ep.name.clone()));
        }
        if self.connection_count(id) > 0 {
            return Err(DiagramError::Inconsistent(format!(
                "{} still has connections",
                ep.name
            )));
        }
        let kind = ep.kind;
        let home = match kind {
            EndpointKind::ComponentPort { owner } => {
                let (side, index) = self
                    .component_mut(owner)?
                    .detach_port(id)
                    .ok_or_else(|| DiagramError::Inconsistent(format!("{} has no slot", id)))?;
                EndpointHome::Port { owner, side, index }
            }
            _ => {
                let stack = self.interface_stack(id).ok_or_else(|| {
                    DiagramError::Inconsistent(format!("{} is not in any stack", id))
                })?;
                let index = self
                    .stack_mut(stack)?
                    .remove(StackItem::Interface(id))
                    .unwrap_or(0);
                EndpointHome::Interface { stack, index }
            }
        };
        let endpoint = self
            .endpoints
            .remove(&id)
            .ok_or(DiagramError::UnknownEndpoint(id))?;
        let proxy = endpoint.proxy.and_then(|p| self.endpoints.remove(&p));
        self.forget_selection_if_stale();
        Ok(DetachedEndpoint {
            endpoint,
            proxy,
            home,
        })
    }

    pub(crate) fn attach_endpoint(&mut self, d: DetachedEndpoint) -> Result<(), DiagramError> {
        let id = d.endpoint.id;
        match d.home {
            EndpointHome::Port { owner, side, index } => {
                let ports = self.component_mut(owner)?.ports_mut(side);
                ports.insert(index.min(ports.len()), id);
                self.layout_hints.push(LayoutHint::Port(id));
            }
            EndpointHome::Interface { stack, index } => {
                self.stack_mut(stack)?
                    .insert(index, StackItem::Interface(id));
                self.layout_hints.push(LayoutHint::Interface(id));
            }
        }
        if let Some(proxy) = d.proxy {
            self.endpoints.insert(proxy.id, proxy);
        }
        self.endpoints.insert(id, d.endpoint);
        Ok(())
    }

    pub(crate) fn move_port(&mut self, id: EndpointId, to: PortPlacement) -> Result<(), DiagramError> {
        let owner = self
            .endpoint(id)?
            .owner()
            .ok_or_else(|| DiagramError::Inconsistent(format!("{} is not a port", id)))?;
        let item = self.component_mut(owner)?;
        item.detach_port(id);
        let ports = item.ports_mut(to.side);
        ports.insert(to.index.min(ports.len()), id);
        let ep = self.endpoint_mut(id)?;
        ep.position = to.position;
        ep.direction = to.side.direction();
        self.layout_hints.push(LayoutHint::Port(id));
        Ok(())
    }

    pub(crate) fn attach_connection(&mut self, conn: Connection) -> Result<(), DiagramError> {
        self.endpoint(conn.a)?;
        self.endpoint(conn.b)?;
        let id = conn.id;
        for end in [conn.a, conn.b] {
            self.endpoint_mut(end)?.connections.insert(id);
        }
        self.connections.insert(id, conn);
        Ok(())
    }

    pub(crate) fn detach_connection(&mut self, id: ConnectionId) -> Result<Connection, DiagramError> {
        let conn = self
            .connections
            .remove(&id)
            .ok_or(DiagramError::UnknownConnection(id))?;
        for end in [conn.a, conn.b] {
            if let Some(ep) = self.endpoints.get_mut(&end) {
                ep.connections.remove(&id);
            }
        }
        if self.selection == Selection::Connection(id) {
            self.forget_selection();
        }
        Ok(conn)
    }

    pub(crate) fn set_type_state(&mut self, id: EndpointId, state: &TypeState) -> Result<(), DiagramError> {
        let ep = self.endpoint_mut(id)?;
        state.apply_to(ep);
        let proxy = ep.proxy;
        if let Some(p) = proxy.and_then(|p| self.endpoints.get_mut(&p)) {
            p.name = state.name.clone();
        }
        Ok(())
    }

    pub(crate) fn set_text(
        &mut self,
        target: TextTarget,
        field: TextField,
        value: &str,
    ) -> Result<(), DiagramError> {
        let value = value.to_string();
        match (target, field) {
            (TextTarget::Component(id), TextField::Name) => self.component_mut(id)?.name = value,
            (TextTarget::Component(id), TextField::DisplayName) => {
                self.component_mut(id)?.display_name = value
            }
            (TextTarget::Component(id), TextField::Description) => {
                self.component_mut(id)?.description = value
            }
            (TextTarget::Endpoint(id), TextField::Description) => {
                self.endpoint_mut(id)?.description = value
            }
            (TextTarget::Endpoint(id), _) => {
                let ep = self.endpoint_mut(id)?;
                ep.name = value.clone();
                let proxy = ep.proxy;
                if let Some(p) = proxy.and_then(|p| self.endpoints.get_mut(&p)) {
                    p.name = value;
                }
            }
            (TextTarget::Connection(id), TextField::Description) => {
                self.connections
                    .get_mut(&id)
                    .ok_or(DiagramError::UnknownConnection(id))?
                    .description = value
            }
            (TextTarget::Connection(id), _) => {
                self.connections
                    .get_mut(&id)
                    .ok_or(DiagramError::UnknownConnection(id))?
                    .name = value
            }
            (TextTarget::Stack(id), _) => self.stack_mut(id)?.name = value,
        }
        Ok(())
    }

    fn repoint(&mut self, conn: ConnectionId, from: EndpointId, to: EndpointId) -> Result<(), DiagramError> {
        self.endpoint(to)?;
        let c = self
            .connections
            .get_mut(&conn)
            .ok_or(DiagramError::UnknownConnection(conn))?;
        if !c.repoint(from, to) {
            return Err(DiagramError::Inconsistent(format!(
                "{} does not touch {}",
                conn, from
            )));
        }
        if let Some(ep) = self.endpoints.get_mut(&from) {
            ep.connections.remove(&conn);
        }
        self.endpoint_mut(to)?.connections.insert(conn);
        Ok(())
    }

    pub(crate) fn exchange_connections(
        &mut self,
        from: EndpointId,
        to: EndpointId,
    ) -> Result<Vec<(ConnectionId, bool)>, DiagramError> {
        let from_ep = self.endpoint(from)?.clone();
        let to_proxy = self.endpoint(to)?.proxy;
        let mut moved = Vec::new();
        for c in from_ep.connections.iter().copied() {
            self.repoint(c, from, to)?;
            moved.push((c, false));
        }
        if let (Some(fp), Some(tp)) = (from_ep.proxy, to_proxy) {
            let proxied: Vec<ConnectionId> =
                self.endpoint(fp)?.connections.iter().copied().collect();
            for c in proxied {
                self.repoint(c, fp, tp)?;
                moved.push((c, true));
            }
        }
        Ok(moved)
    }

    pub(crate) fn restore_exchanged(
        &mut self,
        from: EndpointId,
        to: EndpointId,
        moved: &[(ConnectionId, bool)],
    ) -> Result<(), DiagramError> {
        for (c, via_proxy) in moved.iter().rev() {
            if *via_proxy {
                let (fp, tp) = (self.proxy_of(from), self.proxy_of(to));
                let (Some(fp), Some(tp)) = (fp, tp) else {
                    return Err(DiagramError::Inconsistent(format!("{} lost its proxy", from)));
                };
                self.repoint(*c, tp, fp)?;
            } else {
                self.repoint(*c, to, from)?;
            }
        }
        Ok(())
    }

    /// Swap both ends of a connection between real endpoints and proxies.
    pub(crate) fn toggle_off_page_raw(&mut self, id: ConnectionId) -> Result<(), DiagramError> {
        let conn = self.connection(id)?.clone();
        let (a, b) = if conn.off_page {
            (self.real_endpoint(conn.a)?.id, self.real_endpoint(conn.b)?.id)
        } else {
            let pa = self.endpoint(conn.a)?.proxy;
            let pb = self.endpoint(conn.b)?.proxy;
            match (pa, pb) {
                (Some(pa), Some(pb)) => (pa, pb),
                _ => return Err(DiagramError::ProxyEndpoint(conn.name.clone())),
            }
        };
        self.repoint(id, conn.a, a)?;
        self.repoint(id, conn.b, b)?;
        if let Some(c) = self.connections.get_mut(&id) {
            c.off_page = !conn.off_page;
        }
        Ok(())
    }

    pub(crate) fn detach_stack(&mut self, id: StackId) -> Result<DetachedStack, DiagramError> {
        let stack = self.stack(id)?;
        if !stack.items.is_empty() {
            return Err(DiagramError::Inconsistent(format!(
                "stack '{}' is not empty",
                stack.name
            )));
        }
        let index = self
            .columns
            .iter()
            .position(|c| *c == id)
            .ok_or_else(|| DiagramError::Inconsistent(format!("{} is not a column", id)))?;
        self.columns.remove(index);
        let stack = self.stacks.remove(&id).ok_or(DiagramError::UnknownStack(id))?;
        if self.selection == Selection::Stack(id) {
            self.forget_selection();
        }
        Ok(DetachedStack { stack, index })
    }

    pub(crate) fn attach_stack(&mut self, d: DetachedStack) -> Result<(), DiagramError> {
        let id = d.stack.id;
        if self.stacks.contains_key(&id) {
            return Err(DiagramError::Inconsistent(format!("{} already attached", id)));
        }
        self.columns.insert(d.index.min(self.columns.len()), id);
        self.stacks.insert(id, d.stack);
        Ok(())
    }

    pub(crate) fn move_stack(&mut self, id: StackId, to: usize) -> Result<(), DiagramError> {
        let index = self
            .columns
            .iter()
            .position(|c| *c == id)
            .ok_or(DiagramError::UnknownStack(id))?;
        self.columns.remove(index);
        self.columns.insert(to.min(self.columns.len()), id);
        Ok(())
    }

    // ── layout ─────────────────────────────────────────────────────────────

    /// Normalise all geometry: ports, item heights, stacks, column offsets
    /// and routes. Idempotent on an already laid-out diagram.
    pub(crate) fn relayout(&mut self) {
        let hints = std::mem::take(&mut self.layout_hints);
        let (containers, plain): (Vec<ComponentId>, Vec<ComponentId>) = self
            .components
            .values()
            .map(|c| c.id)
            .partition(|id| self.components.get(id).is_some_and(|c| c.is_container()));
        for id in plain {
            self.layout_ports(id, &hints);
        }
        for id in containers {
            if let Some(inner) = self.components.get(&id).and_then(|c| c.child_stack) {
                self.layout_stack(inner, &hints);
            }
            self.layout_ports(id, &hints);
        }
        let mut x = 0.0;
        let columns = self.columns.clone();
        for id in &columns {
            if let Some(s) = self.stacks.get_mut(id) {
                s.left = x;
                x += s.width;
            }
            self.layout_stack(*id, &hints);
        }
        let middle = x / 2.0;
        for id in &columns {
            let Some(stack) = self.stacks.get(id) else {
                continue;
            };
            let direction = if stack.left + stack.width / 2.0 < middle {
                Vector::RIGHT
            } else {
                Vector::LEFT
            };
            let interfaces: Vec<EndpointId> = stack.interfaces().collect();
            for e in interfaces {
                if let Some(ep) = self.endpoints.get_mut(&e) {
                    ep.direction = direction;
                }
            }
        }
        self.refresh_routes();
    }

    /// Collision layout of both port sides, then the item height.
    fn layout_ports(&mut self, id: ComponentId, hints: &[LayoutHint]) {
        let Some(item) = self.components.get(&id) else {
            return;
        };
        let min_y = self.config.port_min_y;
        let spacing = self.config.port_spacing;
        let height = self.config.port_height;
        let mut lowest = 0.0_f64;
        let mut orders = Vec::new();
        for side in [Side::Left, Side::Right] {
            let mut slots: Vec<Slot<EndpointId>> = item
                .ports(side)
                .iter()
                .filter_map(|p| self.endpoints.get(p))
                .map(|p| Slot::new(p.id, p.position.y, height))
                .collect();
            let hinted = slots
                .iter()
                .position(|s| hints.contains(&LayoutHint::Port(s.key)));
            let moved = hinted.map(|i| slots.remove(i));
            slots.sort_by(|a, b| a.top.total_cmp(&b.top));
            match moved {
                Some(m) => {
                    collision_place(&mut slots, m, min_y, spacing);
                }
                None => collision_settle(&mut slots, min_y, spacing),
            }
            if let Some(last) = slots.last() {
                lowest = lowest.max(last.bottom());
            }
            orders.push((side, item.border_x(side), slots));
        }
        let inner_height = item
            .child_stack
            .and_then(|s| self.stacks.get(&s))
            .map(|s| s.height)
            .unwrap_or(0.0);
        let grid = self.config.grid_size;
        let mut item_height = self.config.component_min_height.max(inner_height);
        if lowest > 0.0 {
            item_height = item_height.max(lowest + 2.0 * grid);
        }
        for (side, border, slots) in orders {
            for slot in &slots {
                if let Some(ep) = self.endpoints.get_mut(&slot.key) {
                    ep.position = Point::new(border, slot.top);
                    ep.direction = side.direction();
                }
            }
            if let Some(item) = self.components.get_mut(&id) {
                *item.ports_mut(side) = slots.iter().map(|s| s.key).collect();
            }
        }
        if let Some(item) = self.components.get_mut(&id) {
            item.height = (item_height / grid).ceil() * grid;
        }
    }

    fn layout_stack(&mut self, id: StackId, hints: &[LayoutHint]) {
        let Some(stack) = self.stacks.get(&id) else {
            return;
        };
        let top = self.stack_top_margin(stack);
        let spacing = self.stack_spacing(stack);
        let bottom_margin = self.config.stack_bottom_margin;
        let mut slots: Vec<Slot<StackItem>> = stack
            .items
            .iter()
            .map(|i| Slot::new(*i, self.item_position(*i).y, self.item_height(*i)))
            .collect();
        let height = match stack.layout {
            LayoutKind::Stacked => {
                stack_compact(&mut slots, top, spacing);
                stacked_height(slots.iter().map(|s| s.height), top, bottom_margin, spacing)
            }
            LayoutKind::Collision => {
                let hinted = slots.iter().position(|s| match s.key {
                    StackItem::Interface(e) => hints.contains(&LayoutHint::Interface(e)),
                    StackItem::Component(_) => false,
                });
                let moved = hinted.map(|i| slots.remove(i));
                slots.sort_by(|a, b| a.top.total_cmp(&b.top));
                match moved {
                    Some(m) => {
                        collision_place(&mut slots, m, top, spacing);
                    }
                    None => collision_settle(&mut slots, top, spacing),
                }
                slots.last().map(|s| s.bottom()).unwrap_or(top) + bottom_margin
            }
        };
        for slot in &slots {
            self.set_item_position(slot.key, Point::new(0.0, slot.top));
        }
        if let Some(stack) = self.stacks.get_mut(&id) {
            stack.items = slots.iter().map(|s| s.key).collect();
            stack.height = height;
        }
    }

    /// Re-derive the route of every connection whose ends moved away from
    /// the anchors its route was computed for.
    pub(crate) fn refresh_routes(&mut self) {
        let grid = self.config.grid_size;
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            let Some(conn) = self.connections.get(&id) else {
                continue;
            };
            let (Some(pa), Some(pb)) = (
                self.endpoint_scene_pos(conn.a),
                self.endpoint_scene_pos(conn.b),
            ) else {
                continue;
            };
            if conn.anchors == Some((pa, pb)) && !conn.route.is_empty() {
                continue;
            }
            let route = if conn.off_page {
                off_page_stub(pa, grid)
            } else {
                let mut route = orthogonal_route(
                    pa,
                    self.endpoint_direction(conn.a),
                    pb,
                    self.endpoint_direction(conn.b),
                    2.0 * grid,
                    grid,
                );
                let others: Vec<&[Point]> = self
                    .connections
                    .values()
                    .filter(|c| c.id != id && !c.off_page)
                    .map(|c| c.route.as_slice())
                    .collect();
                fix_overlap(&mut route, others.iter().copied(), grid);
                route
            };
            if let Some(conn) = self.connections.get_mut(&id) {
                conn.route = route;
                conn.anchors = Some((pa, pb));
            }
        }
    }

    pub(crate) fn geometry(&self) -> Geometry {
        let mut g = Geometry::default();
        for c in self.components.values() {
            g.components.insert(
                c.id,
                ComponentGeometry {
                    position: c.position,
                    width: c.width,
                    height: c.height,
                    left_ports: c.left_ports.clone(),
                    right_ports: c.right_ports.clone(),
                },
            );
        }
        for e in self.endpoints.values() {
            g.endpoints.insert(
                e.id,
                EndpointGeometry {
                    position: e.position,
                    direction: e.direction,
                },
            );
        }
        for s in self.stacks.values() {
            g.stacks.insert(
                s.id,
                StackGeometry {
                    left: s.left,
                    height: s.height,
                    items: s.items.clone(),
                },
            );
        }
        for c in self.connections.values() {
            g.routes.insert(
                c.id,
                RouteGeometry {
                    route: c.route.clone(),
                    anchors: c.anchors,
                },
            );
        }
        g
    }

    /// Put recorded geometry back onto the entities that still exist.
    /// Orderings are only restored when they list the same members.
    pub(crate) fn restore_geometry(&mut self, g: &Geometry) {
        fn same_members<T: Ord + Clone>(a: &[T], b: &[T]) -> bool {
            let mut a = a.to_vec();
            let mut b = b.to_vec();
            a.sort();
            b.sort();
            a == b
        }
        for (id, cg) in &g.components {
            if let Some(c) = self.components.get_mut(id) {
                c.position = cg.position;
                c.width = cg.width;
                c.height = cg.height;
                if same_members(&c.left_ports, &cg.left_ports)
                    && same_members(&c.right_ports, &cg.right_ports)
                {
                    c.left_ports = cg.left_ports.clone();
                    c.right_ports = cg.right_ports.clone();
                }
            }
        }
        for (id, eg) in &g.endpoints {
            if let Some(e) = self.endpoints.get_mut(id) {
                e.position = eg.position;
                e.direction = eg.direction;
            }
        }
        for (id, sg) in &g.stacks {
            if let Some(s) = self.stacks.get_mut(id) {
                s.left = sg.left;
                s.height = sg.height;
                if same_members(&s.items, &sg.items) {
                    s.items = sg.items.clone();
                }
            }
        }
        for (id, rg) in &g.routes {
            if let Some(c) = self.connections.get_mut(id) {
                c.route = rg.route.clone();
                c.anchors = rg.anchors;
            }
        }
    }

    // ── history ────────────────────────────────────────────────────────────

    /// Execute `cmd`, lay out the result and record it in the history.
    pub fn apply(&mut self, mut cmd: EditorCommand) -> Result<(), DiagramError> {
        if self.protected {
            return Err(DiagramError::Protected);
        }
        if cmd.is_empty() {
            return Ok(());
        }
        self.layout_hints.clear();
        let before = self.geometry();
        if let Err(e) = cmd.execute(self) {
            self.layout_hints.clear();
            log::warn!(command = cmd.label.as_str(), err:err = e; "command refused");
            return Err(e);
        }
        self.finish(cmd, &before);
        Ok(())
    }

    /// Record a command whose effect was already produced live by a drag
    /// gesture. `before` is the geometry captured when the gesture started.
    pub(crate) fn record_applied(&mut self, cmd: EditorCommand, before: &Geometry) {
        self.finish(cmd, before);
    }

    fn finish(&mut self, mut cmd: EditorCommand, before: &Geometry) {
        self.relayout();
        let after = self.geometry();
        cmd.set_layout(LayoutDelta::between(before, &after));
        log::debug!(
            command = cmd.label.as_str(),
            actions = cmd.leaf_count();
            "command recorded"
        );
        self.history.push(cmd);
        self.content_changed();
    }

    /// Revert the most recent command. Returns false when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> Result<bool, DiagramError> {
        if self.protected {
            return Err(DiagramError::Protected);
        }
        self.cancel_gesture();
        let Some(mut cmd) = self.history.pop_undo() else {
            return Ok(false);
        };
        let result = cmd.revert(self);
        self.layout_hints.clear();
        if let Err(e) = result {
            log::error!(command = cmd.label.as_str(), err:err = e; "undo failed, command kept");
            self.history.push_undone(cmd);
            return Err(e);
        }
        log::debug!(command = cmd.label.as_str(); "undo");
        self.history.push_redo(cmd);
        self.forget_selection_if_stale();
        self.content_changed();
        Ok(true)
    }

    /// Re-apply the most recently undone command.
    pub fn redo(&mut self) -> Result<bool, DiagramError> {
        if self.protected {
            return Err(DiagramError::Protected);
        }
        self.cancel_gesture();
        let Some(mut cmd) = self.history.pop_redo() else {
            return Ok(false);
        };
        let result = cmd.reapply(self);
        self.layout_hints.clear();
        if let Err(e) = result {
            log::error!(command = cmd.label.as_str(), err:err = e; "redo failed, command kept");
            self.history.push_redo(cmd);
            return Err(e);
        }
        log::debug!(command = cmd.label.as_str(); "redo");
        self.history.push_undone(cmd);
        self.forget_selection_if_stale();
        self.content_changed();
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::command::Action;
    use crate::model::{ColumnContent, TypeRef};

    fn def(name: &str, interfaces: Vec<InterfaceDef>) -> Arc<ComponentDef> {
        Arc::new(ComponentDef {
            type_ref: Some(TypeRef::new("acme", "sw", name, "1.0")),
            interfaces,
            ..Default::default()
        })
    }

    fn iface(name: &str, protocol: Protocol) -> InterfaceDef {
        InterfaceDef {
            name: name.to_string(),
            protocol,
            description: String::new(),
            default_pos: None,
        }
    }

    #[test]
    fn build_component_places_ports_by_role() {
        let mut d = Diagram::with_columns(
            DiagramConfig::default(),
            &[ColumnDesc::new("SW", ColumnContent::Components, 259.0)],
        );
        let stack = d.columns()[0];
        let definition = def(
            "Codec",
            vec![
                iface("req", Protocol::api("a", ApiRole::Requester)),
                iface("prov", Protocol::api("a", ApiRole::Provider)),
                iface("prov2", Protocol::api("b", ApiRole::Provider)),
            ],
        );
        let ports = PortSpec::from_definition(&definition, |_| None);
        let built = d.build_component(definition, "codec_0", stack, 0, Point::default(), &ports);
        assert_eq!(built.item.left_ports.len(), 1);
        assert_eq!(built.item.right_ports.len(), 2);
        // real + proxy for each interface
        assert_eq!(built.ports.len(), 6);
        let id = built.id();
        d.attach_component(built).unwrap();
        d.relayout();
        let item = d.component(id).unwrap();
        let ys: Vec<f64> = item
            .right_ports
            .iter()
            .map(|p| d.endpoint(*p).unwrap().position.y)
            .collect();
        assert_eq!(ys, vec![32.0, 48.0]);
        assert_eq!(d.endpoint(item.right_ports[0]).unwrap().position.x, 80.0);
        assert_eq!(d.component_scene_pos(id), Point::new(129.5, 80.0));
    }

    #[test]
    fn unique_instance_names_count_from_zero() {
        let mut d = Diagram::with_columns(
            DiagramConfig::default(),
            &[ColumnDesc::new("SW", ColumnContent::Components, 259.0)],
        );
        let stack = d.columns()[0];
        assert_eq!(d.unique_instance_name("Codec"), "Codec_0");
        let built = d.build_component(def("Codec", vec![]), "Codec_0", stack, 0, Point::default(), &[]);
        d.attach_component(built).unwrap();
        assert_eq!(d.unique_instance_name("Codec"), "Codec_1");
    }

    #[test]
    fn failed_undo_keeps_command_and_state() {
        let mut d = Diagram::with_columns(
            DiagramConfig::default(),
            &[ColumnDesc::new("SW", ColumnContent::Components, 259.0)],
        );
        let stack = d.columns()[0];
        let a = d.add_component(stack, def("A", vec![]), None).unwrap();
        let b = d.add_component(stack, def("B", vec![]), None).unwrap();
        let rename = |id: ComponentId, from: &str, to: &str| {
            EditorCommand::leaf(
                "Rename",
                Action::SetText {
                    target: TextTarget::Component(id),
                    field: TextField::Name,
                    from: from.to_string(),
                    to: to.to_string(),
                },
            )
        };
        let mut cmd = EditorCommand::composite("Rename both");
        cmd.push(rename(a, "A_0", "first"));
        cmd.push(rename(b, "B_0", "second"));
        d.apply(cmd).unwrap();
        let undo_len = d.history().undo_len();

        // B is reverted first, then A fails and B is put back.
        let removed = d.components.remove(&a).unwrap();
        assert!(d.undo().is_err());
        assert_eq!(d.component(b).unwrap().name, "second");
        assert_eq!(d.history().undo_len(), undo_len);

        d.components.insert(a, removed);
        assert!(d.undo().unwrap());
        assert_eq!(d.component(a).unwrap().name, "A_0");
        assert_eq!(d.component(b).unwrap().name, "B_0");
        assert!(d.can_redo());
    }
}
