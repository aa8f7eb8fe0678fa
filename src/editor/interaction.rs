//! Mode-driven interpretation of pointer and keyboard events.
//!
//! A gesture spans several events (press, any number of motions, release)
//! and keeps its transient state in [`InteractionState`]. Nothing reaches the
//! history until a gesture completes; a cancelled gesture leaves no entry.
//!
//! Connection drawing follows `Idle -> Drawing -> Committed | Discarded`:
//!
//! - press on a visible endpoint (Connect mode) starts a draw and computes
//!   the set of compatible endpoints once,
//! - motion snaps the free end onto an allowed endpoint within the snap
//!   radius,
//! - release or a second press over a snapped endpoint commits; anywhere
//!   else it discards, except for a release close to the press point which
//!   keeps drawing for click-click connections.
//!
//! Holding Shift when the draw starts makes it an off-page draw: both ends
//! attach to proxies and the start is reused for further draws until Shift
//! is released.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::command::{Action, EditorCommand, Geometry, Placement, PortPlacement};
use super::diagram::Diagram;
use super::endpoint::{EndpointKind, Side};
use super::operations::Replacement;
use super::selection::Selection;
use super::stack::StackItem;
use super::{ComponentId, ConnectionId, EndpointId, StackId};
use crate::error::{DiagramError, Notice};
use crate::geometry::Point;
use crate::model::{ComponentDef, ComponentKind, ItemKinds, Protocol, TypeRef};
use crate::parser::Catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Select,
    /// Draw connections between endpoints.
    Connect,
    /// Place draft components and undefined ports.
    Draft,
    /// Place top-level interfaces in IO columns.
    Interface,
    /// Click connections to move them off page and back.
    ToggleOffPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        alt: false,
        ctrl: false,
    };
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        alt: false,
        ctrl: false,
    };
    pub const ALT: Modifiers = Modifiers {
        shift: false,
        alt: true,
        ctrl: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Shift,
    Alt,
    Escape,
}

/// What can be dropped onto the diagram.
#[derive(Debug, Clone, PartialEq)]
pub enum DropPayload {
    /// A catalog reference, resolved on drop.
    Component(TypeRef),
    /// An empty draft item.
    Draft(ComponentKind),
}

/// The provisional connection of a draw gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDraft {
    /// Real endpoint the draw started from.
    pub start: EndpointId,
    /// Endpoints compatible with `start`, ignoring connection counts.
    pub allowed: BTreeSet<EndpointId>,
    /// Allowed endpoint the free end is snapped to.
    pub hover: Option<EndpointId>,
    pub free_end: Point,
    pub off_page: bool,
    pub(crate) pressed_at: Point,
    pub(crate) shown_proxies: Vec<EndpointId>,
}

#[derive(Debug, Clone)]
pub(crate) struct ItemDrag {
    item: StackItem,
    from: Placement,
    before: Geometry,
    /// Pointer minus the item's scene position at press time.
    grab: Point,
    pressed_at: Point,
    moved: bool,
    /// Alt-drag: replace the component released upon.
    replace: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PortDrag {
    port: EndpointId,
    owner: ComponentId,
    from: PortPlacement,
    before: Geometry,
    pressed_at: Point,
    moved: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) enum Gesture {
    #[default]
    Idle,
    Drawing(ConnectionDraft),
    DraggingItem(ItemDrag),
    DraggingPort(PortDrag),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InteractionState {
    pub(crate) mode: Mode,
    pub(crate) gesture: Gesture,
}

impl InteractionState {
    /// Whether a proxy must be drawn for the current gesture.
    pub(crate) fn shows_proxy(&self, id: EndpointId) -> bool {
        match &self.gesture {
            Gesture::Drawing(draft) => draft.shown_proxies.contains(&id),
            _ => false,
        }
    }
}

impl Diagram {
    // ────────────────────────────────────────────────────────────────────────
    // Mode and state queries
    // ────────────────────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.interaction.mode
    }

    /// Switch mode; any gesture in progress is cancelled.
    pub fn set_mode(&mut self, mode: Mode) {
        self.cancel_gesture();
        if self.interaction.mode != mode {
            log::debug!(mode:? = mode; "mode changed");
            self.interaction.mode = mode;
        }
    }

    /// The provisional connection, while drawing.
    pub fn connection_draft(&self) -> Option<&ConnectionDraft> {
        match &self.interaction.gesture {
            Gesture::Drawing(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(
            self.interaction.gesture,
            Gesture::DraggingItem(_) | Gesture::DraggingPort(_)
        )
    }

    // ────────────────────────────────────────────────────────────────────────
    // Hit testing
    // ────────────────────────────────────────────────────────────────────────

    /// Nearest visible endpoint within the snap radius.
    pub fn endpoint_at(&self, p: Point) -> Option<EndpointId> {
        let radius = self.config.snap_radius;
        self.endpoints
            .values()
            .filter(|e| self.is_visible(e.id))
            .filter_map(|e| self.endpoint_scene_pos(e.id).map(|q| (e.id, q.distance(p))))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Topmost component under `p`; nested items win over their container.
    pub fn component_at(&self, p: Point) -> Option<ComponentId> {
        let hits: Vec<&super::ComponentItem> = self
            .components
            .values()
            .filter(|c| self.component_rect(c.id).is_some_and(|r| r.contains(p)))
            .collect();
        hits.iter()
            .find(|c| !c.is_container())
            .or_else(|| hits.first())
            .map(|c| c.id)
    }

    pub fn connection_at(&self, p: Point) -> Option<ConnectionId> {
        let tolerance = self.config.grid_size / 2.0;
        self.connections
            .values()
            .map(|c| (c.id, super::connection::distance_to_route(&c.route, p)))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn column_at(&self, x: f64) -> Option<StackId> {
        self.columns
            .iter()
            .copied()
            .find(|id| self.stacks.get(id).is_some_and(|s| s.contains_x(x)))
    }

    fn report<T>(&mut self, result: Result<T, DiagramError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(DiagramError::Protected) => None,
            Err(e) => {
                self.notify(Notice::warning(e.to_string()));
                None
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Events
    // ────────────────────────────────────────────────────────────────────────

    pub fn press(&mut self, at: Point, button: MouseButton, modifiers: Modifiers) {
        if button != MouseButton::Primary {
            self.set_mode(Mode::Select);
            return;
        }
        match std::mem::take(&mut self.interaction.gesture) {
            Gesture::Drawing(draft) => {
                let draft = self.update_draft(draft, at);
                if draft.hover.is_some() {
                    self.commit_draft(draft, at);
                } else {
                    log::debug!(start = draft.start.0; "connection draw discarded");
                }
                return;
            }
            Gesture::Idle => {}
            other => {
                self.interaction.gesture = other;
                return;
            }
        }
        match self.interaction.mode {
            Mode::Select => self.press_select(at, modifiers),
            Mode::Connect => {
                if let Some(ep) = self.endpoint_at(at) {
                    self.begin_draw(ep, modifiers.shift, at);
                }
            }
            Mode::Draft => self.press_draft(at),
            Mode::Interface => self.press_interface(at),
            Mode::ToggleOffPage => {
                if let Some(conn) = self.connection_at(at) {
                    let result = self.toggle_off_page(conn);
                    self.report(result);
                }
            }
        }
    }

    pub fn motion(&mut self, at: Point) {
        let gesture = std::mem::take(&mut self.interaction.gesture);
        self.interaction.gesture = match gesture {
            Gesture::Drawing(draft) => Gesture::Drawing(self.update_draft(draft, at)),
            Gesture::DraggingItem(drag) => Gesture::DraggingItem(self.drag_item(drag, at)),
            Gesture::DraggingPort(drag) => Gesture::DraggingPort(self.drag_port(drag, at)),
            Gesture::Idle => Gesture::Idle,
        };
    }

    pub fn release(&mut self, at: Point, modifiers: Modifiers) {
        match std::mem::take(&mut self.interaction.gesture) {
            Gesture::Drawing(draft) => {
                let draft = self.update_draft(draft, at);
                if draft.hover.is_some() {
                    self.commit_draft(draft, at);
                } else if at.distance(draft.pressed_at) > self.config.snap_radius {
                    log::debug!(start = draft.start.0; "connection draw discarded");
                } else {
                    self.interaction.gesture = Gesture::Drawing(draft);
                }
            }
            Gesture::DraggingItem(drag) => self.finish_item_drag(drag, at, modifiers),
            Gesture::DraggingPort(drag) => self.finish_port_drag(drag),
            Gesture::Idle => {}
        }
    }

    pub fn key_release(&mut self, key: Key) {
        let ends_draw = match (&self.interaction.gesture, key) {
            (Gesture::Drawing(draft), Key::Shift) => draft.off_page,
            (_, Key::Escape) => true,
            _ => false,
        };
        if ends_draw {
            self.cancel_gesture();
        }
    }

    /// Abort the gesture in progress. Live changes of a drag are undone.
    pub fn cancel_gesture(&mut self) {
        match std::mem::take(&mut self.interaction.gesture) {
            Gesture::Idle => {}
            Gesture::Drawing(draft) => {
                log::debug!(start = draft.start.0; "connection draw cancelled");
            }
            Gesture::DraggingItem(drag) => {
                if drag.moved {
                    if let Err(e) = self.move_item(drag.item, drag.from) {
                        log::error!(err:err = e; "could not revert item drag");
                    }
                    self.restore_geometry(&drag.before);
                }
            }
            Gesture::DraggingPort(drag) => {
                if drag.moved {
                    if let Err(e) = self.move_port(drag.port, drag.from) {
                        log::error!(err:err = e; "could not revert port drag");
                    }
                    self.restore_geometry(&drag.before);
                }
            }
        }
        self.layout_hints.clear();
    }

    // ────────────────────────────────────────────────────────────────────────
    // Select mode
    // ────────────────────────────────────────────────────────────────────────

    fn press_select(&mut self, at: Point, modifiers: Modifiers) {
        if let Some(ep) = self.endpoint_at(at) {
            let Ok(real) = self.real_endpoint(ep) else {
                return;
            };
            let (real_id, kind) = (real.id, real.kind);
            self.set_selection(Selection::Endpoint(real_id));
            if self.protected || ep != real_id {
                return;
            }
            match kind {
                EndpointKind::ComponentPort { owner } => self.begin_port_drag(ep, owner, at),
                EndpointKind::TopLevelInterface => {
                    self.begin_item_drag(StackItem::Interface(ep), at, false)
                }
                EndpointKind::OffPageProxy { .. } => {}
            }
            return;
        }
        if let Some(c) = self.component_at(at) {
            self.set_selection(Selection::Component(c));
            if !self.protected {
                self.begin_item_drag(StackItem::Component(c), at, modifiers.alt);
            }
            return;
        }
        if let Some(conn) = self.connection_at(at) {
            self.set_selection(Selection::Connection(conn));
            return;
        }
        match self.column_at(at.x) {
            Some(stack) => self.set_selection(Selection::Stack(stack)),
            None => self.set_selection(Selection::None),
        }
    }

    fn scene_pos_of(&self, item: StackItem) -> Option<Point> {
        match item {
            StackItem::Component(c) => Some(self.component_scene_pos(c)),
            StackItem::Interface(e) => self.endpoint_scene_pos(e),
        }
    }

    fn begin_item_drag(&mut self, item: StackItem, at: Point, replace: bool) {
        let (Ok(from), Some(scene)) = (self.placement_of(item), self.scene_pos_of(item)) else {
            return;
        };
        self.interaction.gesture = Gesture::DraggingItem(ItemDrag {
            item,
            from,
            before: self.geometry(),
            grab: at - scene,
            pressed_at: at,
            moved: false,
            replace,
        });
    }

    /// Stack the dragged item should live in when its top-centre is at
    /// `scene_top`.
    fn drag_target(&self, item: StackItem, scene_top: Point) -> Option<StackId> {
        let kind = match item {
            StackItem::Component(c) => {
                let dragged = self.components.get(&c)?;
                if dragged.item_kind() == ItemKinds::COMPONENT {
                    let rect = dragged.rect_at(scene_top);
                    let container = self.components.values().find(|k| {
                        k.id != c
                            && k.is_container()
                            && self.component_rect(k.id).is_some_and(|r| {
                                r.contains(Point::new(scene_top.x, r.top))
                                    && r.vertical_overlap(&rect) >= self.config.container_drop_overlap
                            })
                    });
                    if let Some(inner) = container.and_then(|k| k.child_stack) {
                        return Some(inner);
                    }
                }
                dragged.item_kind()
            }
            StackItem::Interface(_) => ItemKinds::INTERFACE,
        };
        self.column_at(scene_top.x)
            .filter(|s| self.stacks.get(s).is_some_and(|s| s.accepts(kind)))
            .or_else(|| self.stack_of(item))
    }

    fn drag_item(&mut self, mut drag: ItemDrag, at: Point) -> ItemDrag {
        if !drag.moved && at.distance(drag.pressed_at) < self.config.snap_radius {
            return drag;
        }
        drag.moved = true;
        if drag.replace {
            return drag;
        }
        let scene_top = at - drag.grab;
        let Some(target) = self.drag_target(drag.item, scene_top) else {
            return drag;
        };
        let local = scene_top - self.stack_origin(target);
        let index = self.insertion_index_in(target, local.y, Some(drag.item));
        let placement = Placement {
            stack: target,
            index,
            position: Point::new(0.0, local.y),
        };
        match self.move_item(drag.item, placement) {
            Ok(()) => self.relayout(),
            Err(e) => log::debug!(err:err = e; "drag target refused"),
        }
        drag
    }

    fn finish_item_drag(&mut self, drag: ItemDrag, at: Point, modifiers: Modifiers) {
        if !drag.moved {
            return;
        }
        if drag.replace && modifiers.alt {
            let StackItem::Component(dragged) = drag.item else {
                return;
            };
            let target = self
                .components
                .values()
                .filter(|c| c.id != dragged)
                .find(|c| self.component_rect(c.id).is_some_and(|r| r.contains(at)))
                .map(|c| c.id);
            if let Some(target) = target {
                let result = self.replace_component(target, Replacement::Existing(dragged), false);
                self.report(result);
            }
            return;
        }
        if drag.replace {
            return;
        }
        self.relayout();
        let Ok(to) = self.placement_of(drag.item) else {
            return;
        };
        if to == drag.from {
            return;
        }
        let cmd = EditorCommand::leaf(
            "Move item",
            Action::MoveItem {
                item: drag.item,
                from: drag.from,
                to,
            },
        );
        self.record_applied(cmd, &drag.before);
    }

    fn begin_port_drag(&mut self, port: EndpointId, owner: ComponentId, at: Point) {
        let Ok(from) = self.port_placement(port) else {
            return;
        };
        self.interaction.gesture = Gesture::DraggingPort(PortDrag {
            port,
            owner,
            from,
            before: self.geometry(),
            pressed_at: at,
            moved: false,
        });
    }

    fn drag_port(&mut self, mut drag: PortDrag, at: Point) -> PortDrag {
        if !drag.moved && at.distance(drag.pressed_at) < self.config.snap_radius {
            return drag;
        }
        drag.moved = true;
        let Ok(item) = self.component(drag.owner) else {
            return drag;
        };
        let local = at - self.component_scene_pos(drag.owner);
        let side = Side::from_local_x(local.x);
        let index = item
            .ports(side)
            .iter()
            .filter(|p| **p != drag.port)
            .position(|p| self.endpoints.get(p).is_some_and(|e| e.position.y > local.y))
            .unwrap_or_else(|| item.ports(side).iter().filter(|p| **p != drag.port).count());
        let to = PortPlacement {
            side,
            index,
            position: Point::new(item.border_x(side), local.y),
        };
        match self.move_port(drag.port, to) {
            Ok(()) => self.relayout(),
            Err(e) => log::debug!(err:err = e; "port drag refused"),
        }
        drag
    }

    fn finish_port_drag(&mut self, drag: PortDrag) {
        if !drag.moved {
            return;
        }
        self.relayout();
        let Ok(to) = self.port_placement(drag.port) else {
            return;
        };
        if to == drag.from {
            return;
        }
        let cmd = EditorCommand::leaf(
            "Move port",
            Action::MovePort {
                id: drag.port,
                from: drag.from,
                to,
            },
        );
        self.record_applied(cmd, &drag.before);
    }

    // ────────────────────────────────────────────────────────────────────────
    // Connect mode
    // ────────────────────────────────────────────────────────────────────────

    fn begin_draw(&mut self, ep: EndpointId, off_page: bool, at: Point) {
        if self.protected {
            return;
        }
        let Ok(real) = self.real_endpoint(ep) else {
            return;
        };
        let (start, name, proxy) = (real.id, real.name.clone(), real.proxy);
        if self.is_exclusive(start) && self.connection_count(start) > 0 {
            self.notify(Notice::info(format!(
                "'{}' already has its only allowed connection",
                name
            )));
            return;
        }
        let allowed: BTreeSet<EndpointId> = self
            .endpoints
            .values()
            .filter(|e| !e.is_proxy() && self.can_connect(start, e.id))
            .map(|e| e.id)
            .collect();
        log::debug!(start = start.0, allowed = allowed.len(), off_page = off_page; "connection draw started");
        let shown_proxies = if off_page { proxy.into_iter().collect() } else { Vec::new() };
        self.interaction.gesture = Gesture::Drawing(ConnectionDraft {
            start,
            allowed,
            hover: None,
            free_end: at,
            off_page,
            pressed_at: at,
            shown_proxies,
        });
    }

    /// Snap the free end of `draft` to the nearest allowed endpoint around
    /// `at`, or let it follow the pointer.
    fn update_draft(&self, mut draft: ConnectionDraft, at: Point) -> ConnectionDraft {
        let radius = self.config.snap_radius;
        draft.hover = draft
            .allowed
            .iter()
            .filter_map(|id| self.endpoint_scene_pos(*id).map(|p| (*id, p.distance(at))))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id);
        draft.free_end = match (draft.off_page, draft.hover) {
            (false, Some(id)) => self.endpoint_scene_pos(id).unwrap_or(at),
            _ => at,
        };
        if draft.off_page {
            draft.shown_proxies = [Some(draft.start), draft.hover]
                .into_iter()
                .flatten()
                .filter_map(|id| self.proxy_of(id))
                .collect();
        }
        draft
    }

    fn commit_draft(&mut self, draft: ConnectionDraft, at: Point) {
        let Some(target) = draft.hover else {
            return;
        };
        let result = self
            .connect_command(draft.start, target, draft.off_page)
            .and_then(|(cmd, id)| self.apply(cmd).map(|()| id));
        match result {
            Ok(id) => {
                log::info!(connection = id.0, off_page = draft.off_page; "connection committed");
                let saturated = self.is_exclusive(draft.start) && self.connection_count(draft.start) > 0;
                if draft.off_page && !saturated {
                    self.interaction.gesture = Gesture::Drawing(ConnectionDraft {
                        hover: None,
                        free_end: at,
                        pressed_at: at,
                        shown_proxies: self.proxy_of(draft.start).into_iter().collect(),
                        ..draft
                    });
                }
            }
            Err(e) => {
                self.notify(Notice::warning(format!("connection rejected: {}", e)));
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Draft and interface modes
    // ────────────────────────────────────────────────────────────────────────

    fn press_draft(&mut self, at: Point) {
        if let Some(c) = self.component_at(at) {
            let Ok(item) = self.component(c) else {
                return;
            };
            let local = at - self.component_scene_pos(c);
            let in_interior = item.is_container()
                && local.x.abs() < item.width / 2.0 - 2.0 * self.config.grid_size;
            let child_stack = item.child_stack;
            let result = match child_stack {
                Some(inner) if in_interior => {
                    let y = at.y - self.stack_origin(inner).y;
                    self.add_draft_component(inner, ComponentKind::Software, Some(y))
                        .map(|_| ())
                }
                _ => self
                    .add_port(c, Protocol::Undefined, Some(local), None)
                    .map(|_| ()),
            };
            self.report(result);
            return;
        }
        if let Some(stack) = self.column_at(at.x) {
            let result = self.add_draft_component(stack, ComponentKind::Software, Some(at.y));
            self.report(result);
        }
    }

    fn press_interface(&mut self, at: Point) {
        if let Some(stack) = self.column_at(at.x) {
            let result = self.add_interface(stack, Protocol::Undefined, Some(at.y), None);
            self.report(result);
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Drop
    // ────────────────────────────────────────────────────────────────────────

    /// Drop a catalog reference or a draft at `at`. Onto a plain component
    /// the dropped item replaces it; onto a container it is nested; onto a
    /// column it is added there. Refusals are reported as notices.
    pub fn drop_payload(
        &mut self,
        payload: &DropPayload,
        at: Point,
        catalog: &dyn Catalog,
    ) -> Option<ComponentId> {
        if self.protected {
            return None;
        }
        let (definition, draft) = match payload {
            DropPayload::Component(type_ref) => match catalog.resolve(type_ref) {
                Some(def) => (def, false),
                None => {
                    self.notify(Notice::warning(format!(
                        "'{}' was not found in the catalog",
                        type_ref
                    )));
                    return None;
                }
            },
            DropPayload::Draft(kind) => (Arc::new(ComponentDef::placeholder(None, *kind)), true),
        };
        let result = self.drop_definition(definition, draft, at);
        self.report(result).flatten()
    }

    fn drop_definition(
        &mut self,
        definition: Arc<ComponentDef>,
        draft: bool,
        at: Point,
    ) -> Result<Option<ComponentId>, DiagramError> {
        if let Some(c) = self.component_at(at) {
            let item = self.component(c)?;
            if let (true, Some(inner)) = (item.is_container(), item.child_stack) {
                let y = at.y - self.stack_origin(inner).y;
                return self.instantiate(inner, definition, draft, y).map(Some);
            }
            return self
                .replace_component(c, Replacement::Definition(definition), false)
                .map(Some);
        }
        match self.column_at(at.x) {
            Some(stack) => self.instantiate(stack, definition, draft, at.y).map(Some),
            None => Ok(None),
        }
    }

    fn instantiate(
        &mut self,
        stack: StackId,
        definition: Arc<ComponentDef>,
        draft: bool,
        y: f64,
    ) -> Result<ComponentId, DiagramError> {
        if draft {
            self.add_draft_component(stack, definition.kind, Some(y))
        } else {
            self.add_component(stack, definition, Some(y))
        }
    }
}
