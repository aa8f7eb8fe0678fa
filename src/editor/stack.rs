//! Item stacks: the columns of the diagram and the interiors of containers.

use serde::{Deserialize, Serialize};

use super::{ComponentId, EndpointId, StackId};
use crate::model::{ColumnContent, ColumnDesc, ItemKinds};

/// Who a stack belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackOwner {
    /// A top-level column of the diagram.
    Layout,
    /// The interior of a hierarchical container item.
    Component(ComponentId),
}

/// An entry of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StackItem {
    Component(ComponentId),
    /// A top-level interface endpoint.
    Interface(EndpointId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutKind {
    /// Packed from the top margin with a fixed gap.
    Stacked,
    /// Items keep their position; neighbours shift only to avoid overlap.
    Collision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: StackId,
    pub name: String,
    pub content: ColumnContent,
    pub allowed: ItemKinds,
    pub layout: LayoutKind,
    pub owner: StackOwner,
    /// Scene x of the left edge; only meaningful for columns.
    pub left: f64,
    pub width: f64,
    pub height: f64,
    pub items: Vec<StackItem>,
}

impl ItemStack {
    pub fn column(id: StackId, desc: &ColumnDesc) -> Self {
        let layout = match desc.content {
            ColumnContent::Io => LayoutKind::Collision,
            _ => LayoutKind::Stacked,
        };
        Self {
            id,
            name: desc.name.clone(),
            content: desc.content,
            allowed: desc.effective_allowed_items(),
            layout,
            owner: StackOwner::Layout,
            left: 0.0,
            width: desc.width,
            height: 0.0,
            items: Vec::new(),
        }
    }

    /// Interior of a container: accepts plain components only.
    pub fn container_interior(id: StackId, owner: ComponentId, width: f64) -> Self {
        Self {
            id,
            name: String::new(),
            content: ColumnContent::Components,
            allowed: ItemKinds::COMPONENT,
            layout: LayoutKind::Stacked,
            owner: StackOwner::Component(owner),
            left: 0.0,
            width,
            height: 0.0,
            items: Vec::new(),
        }
    }

    pub fn is_column(&self) -> bool {
        self.owner == StackOwner::Layout
    }

    pub fn accepts(&self, kind: ItemKinds) -> bool {
        self.allowed.contains(kind)
    }

    pub fn index_of(&self, item: StackItem) -> Option<usize> {
        self.items.iter().position(|i| *i == item)
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&mut self, index: usize, item: StackItem) -> usize {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        index
    }

    pub fn remove(&mut self, item: StackItem) -> Option<usize> {
        let index = self.index_of(item)?;
        self.items.remove(index);
        Some(index)
    }

    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.items.iter().filter_map(|i| match i {
            StackItem::Component(c) => Some(*c),
            StackItem::Interface(_) => None,
        })
    }

    pub fn interfaces(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.items.iter().filter_map(|i| match i {
            StackItem::Interface(e) => Some(*e),
            StackItem::Component(_) => None,
        })
    }

    pub fn contains_x(&self, x: f64) -> bool {
        x >= self.left && x < self.left + self.width
    }

    pub fn describe(&self) -> ColumnDesc {
        ColumnDesc {
            name: self.name.clone(),
            content: self.content,
            allowed_items: self.allowed,
            width: self.width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_columns_use_collision_layout() {
        let io = ItemStack::column(StackId(1), &ColumnDesc::new("Out", ColumnContent::Io, 119.0));
        assert_eq!(io.layout, LayoutKind::Collision);
        assert!(io.accepts(ItemKinds::INTERFACE));
        assert!(!io.accepts(ItemKinds::COMPONENT));

        let sw = ItemStack::column(
            StackId(2),
            &ColumnDesc::new("SW", ColumnContent::Components, 259.0),
        );
        assert_eq!(sw.layout, LayoutKind::Stacked);
        assert!(sw.accepts(ItemKinds::CONTAINER));
    }

    #[test]
    fn insert_clamps_index() {
        let mut s = ItemStack::container_interior(StackId(1), ComponentId(2), 100.0);
        assert_eq!(s.insert(5, StackItem::Component(ComponentId(3))), 0);
        assert_eq!(s.insert(0, StackItem::Component(ComponentId(4))), 0);
        assert_eq!(s.remove(StackItem::Component(ComponentId(3))), Some(1));
        assert_eq!(s.components().collect::<Vec<_>>(), vec![ComponentId(4)]);
    }
}
