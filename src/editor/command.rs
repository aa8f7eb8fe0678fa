//! Reversible command tree and the undo/redo history.
//!
//! Every user gesture that changes the diagram produces one root
//! [`EditorCommand`]. A command runs its children in order and then its own
//! [`Action`]; undoing runs its own action backwards first and then the
//! children in reverse. Actions only touch structure (membership, identity,
//! types, names). Automatic layout that follows an edit is captured once, at
//! the root, as a [`LayoutDelta`] so that undo and redo restore geometry
//! exactly without re-running layout.

use std::collections::BTreeMap;

use super::diagram::{Diagram, DetachedComponent, DetachedEndpoint, DetachedStack};
use super::endpoint::{Side, TypeState};
use super::{ComponentId, Connection, ConnectionId, EndpointId, StackId, StackItem};
use crate::error::DiagramError;
use crate::geometry::{Point, Vector};

// ────────────────────────────────────────────────────────────────────────────
// Actions
// ────────────────────────────────────────────────────────────────────────────

/// Where a stack item sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub stack: StackId,
    pub index: usize,
    /// Relative to the stack origin.
    pub position: Point,
}

/// Where a port sits on its owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortPlacement {
    pub side: Side,
    pub index: usize,
    /// Relative to the owner's top-centre.
    pub position: Point,
}

/// Type change applied to an undefined end when a connection is added.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredType {
    pub endpoint: EndpointId,
    pub before: TypeState,
    pub after: TypeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTarget {
    Component(ComponentId),
    Endpoint(EndpointId),
    Connection(ConnectionId),
    Stack(StackId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Name,
    DisplayName,
    Description,
}

/// One atomic, reversible structural change.
///
/// The `Attach*`/`Detach*` pairs move an entity between the diagram and a
/// stash held by the action, so the exact entity (ids, back-references,
/// geometry) comes back on undo.
#[derive(Debug, Clone)]
pub enum Action {
    AttachComponent {
        id: ComponentId,
        stash: Option<Box<DetachedComponent>>,
    },
    DetachComponent {
        id: ComponentId,
        stash: Option<Box<DetachedComponent>>,
    },
    MoveItem {
        item: StackItem,
        from: Placement,
        to: Placement,
    },
    AttachEndpoint {
        id: EndpointId,
        stash: Option<Box<DetachedEndpoint>>,
    },
    DetachEndpoint {
        id: EndpointId,
        stash: Option<Box<DetachedEndpoint>>,
    },
    MovePort {
        id: EndpointId,
        from: PortPlacement,
        to: PortPlacement,
    },
    AttachConnection {
        id: ConnectionId,
        stash: Option<Box<Connection>>,
        inferred: Vec<InferredType>,
    },
    DetachConnection {
        id: ConnectionId,
        stash: Option<Box<Connection>>,
    },
    Retype {
        id: EndpointId,
        from: TypeState,
        to: TypeState,
    },
    SetText {
        target: TextTarget,
        field: TextField,
        from: String,
        to: String,
    },
    /// Re-point every connection of `from` (and of its proxy) to `to`.
    ExchangeConnections {
        from: EndpointId,
        to: EndpointId,
        /// Filled on execute: connection and whether it went through the proxy.
        moved: Vec<(ConnectionId, bool)>,
    },
    ToggleOffPage {
        id: ConnectionId,
    },
    AttachStack {
        id: StackId,
        stash: Option<Box<DetachedStack>>,
    },
    DetachStack {
        id: StackId,
        stash: Option<Box<DetachedStack>>,
    },
    MoveStack {
        id: StackId,
        from: usize,
        to: usize,
    },
}

fn take_stash<T>(stash: &mut Option<Box<T>>, what: &str) -> Result<T, DiagramError> {
    stash
        .take()
        .map(|b| *b)
        .ok_or_else(|| DiagramError::Inconsistent(format!("{} stash is empty", what)))
}

impl Action {
    pub(crate) fn execute(&mut self, d: &mut Diagram) -> Result<(), DiagramError> {
        match self {
            Action::AttachComponent { stash, .. } => {
                let detached = take_stash(stash, "component")?;
                d.attach_component(detached)
            }
            Action::DetachComponent { id, stash } => {
                *stash = Some(Box::new(d.detach_component(*id)?));
                Ok(())
            }
            Action::MoveItem { item, to, .. } => d.move_item(*item, *to),
            Action::AttachEndpoint { stash, .. } => {
                let detached = take_stash(stash, "endpoint")?;
                d.attach_endpoint(detached)
            }
            Action::DetachEndpoint { id, stash } => {
                *stash = Some(Box::new(d.detach_endpoint(*id)?));
                Ok(())
            }
            Action::MovePort { id, to, .. } => d.move_port(*id, *to),
            Action::AttachConnection {
                stash, inferred, ..
            } => {
                let conn = take_stash(stash, "connection")?;
                for change in inferred.iter() {
                    d.set_type_state(change.endpoint, &change.after)?;
                }
                d.attach_connection(conn)
            }
            Action::DetachConnection { id, stash } => {
                *stash = Some(Box::new(d.detach_connection(*id)?));
                Ok(())
            }
            Action::Retype { id, to, .. } => d.set_type_state(*id, to),
            Action::SetText {
                target, field, to, ..
            } => d.set_text(*target, *field, to),
            Action::ExchangeConnections { from, to, moved } => {
                *moved = d.exchange_connections(*from, *to)?;
                Ok(())
            }
            Action::ToggleOffPage { id } => d.toggle_off_page_raw(*id),
            Action::AttachStack { stash, .. } => {
                let detached = take_stash(stash, "stack")?;
                d.attach_stack(detached)
            }
            Action::DetachStack { id, stash } => {
                *stash = Some(Box::new(d.detach_stack(*id)?));
                Ok(())
            }
            Action::MoveStack { id, to, .. } => d.move_stack(*id, *to),
        }
    }

    pub(crate) fn undo(&mut self, d: &mut Diagram) -> Result<(), DiagramError> {
        match self {
            Action::AttachComponent { id, stash } => {
                *stash = Some(Box::new(d.detach_component(*id)?));
                Ok(())
            }
            Action::DetachComponent { stash, .. } => {
                let detached = take_stash(stash, "component")?;
                d.attach_component(detached)
            }
            Action::MoveItem { item, from, .. } => d.move_item(*item, *from),
            Action::AttachEndpoint { id, stash } => {
                *stash = Some(Box::new(d.detach_endpoint(*id)?));
                Ok(())
            }
            Action::DetachEndpoint { stash, .. } => {
                let detached = take_stash(stash, "endpoint")?;
                d.attach_endpoint(detached)
            }
            Action::MovePort { id, from, .. } => d.move_port(*id, *from),
            Action::AttachConnection {
                id,
                stash,
                inferred,
            } => {
                *stash = Some(Box::new(d.detach_connection(*id)?));
                for change in inferred.iter().rev() {
                    d.set_type_state(change.endpoint, &change.before)?;
                }
                Ok(())
            }
            Action::DetachConnection { stash, .. } => {
                let conn = take_stash(stash, "connection")?;
                d.attach_connection(conn)
            }
            Action::Retype { id, from, .. } => d.set_type_state(*id, from),
            Action::SetText {
                target,
                field,
                from,
                ..
            } => d.set_text(*target, *field, from),
            Action::ExchangeConnections { from, to, moved } => {
                d.restore_exchanged(*from, *to, moved)
            }
            Action::ToggleOffPage { id } => d.toggle_off_page_raw(*id),
            Action::AttachStack { id, stash } => {
                *stash = Some(Box::new(d.detach_stack(*id)?));
                Ok(())
            }
            Action::DetachStack { stash, .. } => {
                let detached = take_stash(stash, "stack")?;
                d.attach_stack(detached)
            }
            Action::MoveStack { id, from, .. } => d.move_stack(*id, *from),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry bookkeeping
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ComponentGeometry {
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub left_ports: Vec<EndpointId>,
    pub right_ports: Vec<EndpointId>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EndpointGeometry {
    pub position: Point,
    pub direction: Vector,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StackGeometry {
    pub left: f64,
    pub height: f64,
    pub items: Vec<StackItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RouteGeometry {
    pub route: Vec<Point>,
    pub anchors: Option<(Point, Point)>,
}

/// Every layout-controlled value of a diagram, keyed by entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Geometry {
    pub components: BTreeMap<ComponentId, ComponentGeometry>,
    pub endpoints: BTreeMap<EndpointId, EndpointGeometry>,
    pub stacks: BTreeMap<StackId, StackGeometry>,
    pub routes: BTreeMap<ConnectionId, RouteGeometry>,
}

fn diff_map<K: Ord + Copy, V: Clone + PartialEq>(
    before: &BTreeMap<K, V>,
    after: &BTreeMap<K, V>,
    out_before: &mut BTreeMap<K, V>,
    out_after: &mut BTreeMap<K, V>,
) {
    for (k, v) in before {
        if after.get(k) != Some(v) {
            out_before.insert(*k, v.clone());
        }
    }
    for (k, v) in after {
        if before.get(k) != Some(v) {
            out_after.insert(*k, v.clone());
        }
    }
}

/// Geometry that changed while a root command ran: the old values to put
/// back on undo and the new values to put back on redo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutDelta {
    pub(crate) before: Geometry,
    pub(crate) after: Geometry,
}

impl LayoutDelta {
    pub(crate) fn between(before: &Geometry, after: &Geometry) -> Self {
        let mut delta = LayoutDelta::default();
        diff_map(
            &before.components,
            &after.components,
            &mut delta.before.components,
            &mut delta.after.components,
        );
        diff_map(
            &before.endpoints,
            &after.endpoints,
            &mut delta.before.endpoints,
            &mut delta.after.endpoints,
        );
        diff_map(
            &before.stacks,
            &after.stacks,
            &mut delta.before.stacks,
            &mut delta.after.stacks,
        );
        diff_map(
            &before.routes,
            &after.routes,
            &mut delta.before.routes,
            &mut delta.after.routes,
        );
        delta
    }

    /// Number of entities whose geometry changed.
    pub fn len(&self) -> usize {
        let g = &self.after;
        let b = &self.before;
        let keys = |a: usize, b: usize| a.max(b);
        keys(g.components.len(), b.components.len())
            + keys(g.endpoints.len(), b.endpoints.len())
            + keys(g.stacks.len(), b.stacks.len())
            + keys(g.routes.len(), b.routes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.before == Geometry::default() && self.after == Geometry::default()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Editor Command (undo/redo unit)
// ────────────────────────────────────────────────────────────────────────────

/// A node of the command tree: ordered children followed by an optional
/// own action.
#[derive(Debug, Clone)]
pub struct EditorCommand {
    pub label: String,
    action: Option<Action>,
    children: Vec<EditorCommand>,
    layout: Option<LayoutDelta>,
}

impl EditorCommand {
    /// A command with no action and no children yet.
    pub fn composite(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: None,
            children: Vec::new(),
            layout: None,
        }
    }

    /// A command consisting of a single action.
    pub fn leaf(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action: Some(action),
            children: Vec::new(),
            layout: None,
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn push(&mut self, child: EditorCommand) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[EditorCommand] {
        &self.children
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn layout(&self) -> Option<&LayoutDelta> {
        self.layout.as_ref()
    }

    pub(crate) fn set_layout(&mut self, delta: LayoutDelta) {
        self.layout = Some(delta);
    }

    /// Number of atomic actions in the whole tree.
    pub fn leaf_count(&self) -> usize {
        usize::from(self.action.is_some())
            + self.children.iter().map(|c| c.leaf_count()).sum::<usize>()
    }

    /// Depth of the tree; a single leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    /// All actions in execution order.
    pub fn actions(&self) -> Vec<&Action> {
        let mut out = Vec::new();
        self.collect_actions(&mut out);
        out
    }

    fn collect_actions<'a>(&'a self, out: &mut Vec<&'a Action>) {
        for child in &self.children {
            child.collect_actions(out);
        }
        if let Some(a) = &self.action {
            out.push(a);
        }
    }

    /// Run children in order, then the own action. On failure everything
    /// that already ran is undone again.
    pub(crate) fn execute(&mut self, d: &mut Diagram) -> Result<(), DiagramError> {
        for i in 0..self.children.len() {
            if let Err(e) = self.children[i].execute(d) {
                for done in self.children[..i].iter_mut().rev() {
                    if let Err(undo_err) = done.undo(d) {
                        log::error!(err:err = undo_err; "rollback failed");
                    }
                }
                return Err(e);
            }
        }
        if let Some(action) = self.action.as_mut() {
            if let Err(e) = action.execute(d) {
                for done in self.children.iter_mut().rev() {
                    if let Err(undo_err) = done.undo(d) {
                        log::error!(err:err = undo_err; "rollback failed");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undo the own action, then the children in reverse order. On failure
    /// everything already undone is executed again.
    pub(crate) fn undo(&mut self, d: &mut Diagram) -> Result<(), DiagramError> {
        if let Some(action) = self.action.as_mut() {
            action.undo(d)?;
        }
        for i in (0..self.children.len()).rev() {
            if let Err(e) = self.children[i].undo(d) {
                for done in self.children[i + 1..].iter_mut() {
                    if let Err(redo_err) = done.execute(d) {
                        log::error!(err:err = redo_err; "rollback failed");
                    }
                }
                if let Some(action) = self.action.as_mut() {
                    if let Err(redo_err) = action.execute(d) {
                        log::error!(err:err = redo_err; "rollback failed");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undo and restore the geometry from before the first execution. On
    /// failure the diagram keeps the state and geometry of after.
    pub(crate) fn revert(&mut self, d: &mut Diagram) -> Result<(), DiagramError> {
        let result = self.undo(d);
        if let Some(delta) = &self.layout {
            let geometry = if result.is_ok() { &delta.before } else { &delta.after };
            d.restore_geometry(geometry);
        }
        result
    }

    /// Execute again and restore the geometry the first execution produced.
    /// On failure the diagram keeps the state and geometry of before.
    pub(crate) fn reapply(&mut self, d: &mut Diagram) -> Result<(), DiagramError> {
        let result = self.execute(d);
        if let Some(delta) = &self.layout {
            let geometry = if result.is_ok() { &delta.after } else { &delta.before };
            d.restore_geometry(geometry);
        }
        result
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Editor History (undo / redo stack)
// ────────────────────────────────────────────────────────────────────────────

/// Linear undo/redo history. Pushing a new command drops the redo stack.
#[derive(Debug, Clone)]
pub struct EditorHistory {
    undo_stack: Vec<EditorCommand>,
    redo_stack: Vec<EditorCommand>,
    max_size: usize,
}

impl EditorHistory {
    /// Create a new history with the given maximum undo depth.
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
        }
    }

    /// Push a command onto the undo stack and clear the redo stack.
    pub fn push(&mut self, cmd: EditorCommand) {
        self.undo_stack.push(cmd);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
    }

    pub(crate) fn pop_undo(&mut self) -> Option<EditorCommand> {
        self.undo_stack.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<EditorCommand> {
        self.redo_stack.pop()
    }

    pub(crate) fn push_redo(&mut self, cmd: EditorCommand) {
        self.redo_stack.push(cmd);
    }

    /// Put a redone command back without touching the redo stack.
    pub(crate) fn push_undone(&mut self, cmd: EditorCommand) {
        self.undo_stack.push(cmd);
    }

    /// Returns true if there are commands to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns true if there are commands to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// The command the next undo would revert.
    pub fn last(&self) -> Option<&EditorCommand> {
        self.undo_stack.last()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
