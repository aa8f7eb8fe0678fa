//! Component items: nodes with a left and a right port list.

use indexmap::IndexMap;
use std::sync::Arc;

use super::endpoint::Side;
use super::{ComponentId, EndpointId, StackId};
use crate::geometry::{Point, Rect};
use crate::model::{ComponentDef, ComponentKind, ItemKinds, TypeRef};

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentItem {
    pub id: ComponentId,
    /// Instance name, unique within the diagram.
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Shared, read-only definition. Placeholders and drafts get an empty one.
    pub definition: Arc<ComponentDef>,
    pub type_ref: Option<TypeRef>,
    pub kind: ComponentKind,
    pub draft: bool,
    /// The type reference could not be resolved.
    pub placeholder: bool,
    pub config_values: IndexMap<String, String>,
    /// Top-centre, relative to the parent stack origin.
    pub position: Point,
    pub parent: StackId,
    pub left_ports: Vec<EndpointId>,
    pub right_ports: Vec<EndpointId>,
    /// Interior stack of a container.
    pub child_stack: Option<StackId>,
    pub width: f64,
    pub height: f64,
}

impl ComponentItem {
    pub fn is_container(&self) -> bool {
        self.kind == ComponentKind::Platform
    }

    pub fn item_kind(&self) -> ItemKinds {
        if self.is_container() {
            ItemKinds::CONTAINER
        } else {
            ItemKinds::COMPONENT
        }
    }

    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    pub fn ports(&self, side: Side) -> &Vec<EndpointId> {
        match side {
            Side::Left => &self.left_ports,
            Side::Right => &self.right_ports,
        }
    }

    pub fn ports_mut(&mut self, side: Side) -> &mut Vec<EndpointId> {
        match side {
            Side::Left => &mut self.left_ports,
            Side::Right => &mut self.right_ports,
        }
    }

    pub fn all_ports(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.left_ports.iter().chain(self.right_ports.iter()).copied()
    }

    /// Side and index of `port`, if it belongs to this item.
    pub fn port_slot(&self, port: EndpointId) -> Option<(Side, usize)> {
        if let Some(i) = self.left_ports.iter().position(|p| *p == port) {
            return Some((Side::Left, i));
        }
        self.right_ports
            .iter()
            .position(|p| *p == port)
            .map(|i| (Side::Right, i))
    }

    /// Remove `port` from whichever side holds it.
    pub fn detach_port(&mut self, port: EndpointId) -> Option<(Side, usize)> {
        let (side, index) = self.port_slot(port)?;
        self.ports_mut(side).remove(index);
        Some((side, index))
    }

    /// Local x of the border on `side`.
    pub fn border_x(&self, side: Side) -> f64 {
        match side {
            Side::Left => -self.width / 2.0,
            Side::Right => self.width / 2.0,
        }
    }

    /// Bounding box given the scene position of the top-centre.
    pub fn rect_at(&self, scene: Point) -> Rect {
        Rect::new(scene.x - self.width / 2.0, scene.y, self.width, self.height)
    }
}
