//! Diagram editing core.
//!
//! The [`Diagram`] owns every stack, component item, endpoint and connection
//! in id-keyed arenas. Mutations that should be undoable are expressed as an
//! [`EditorCommand`] tree and go through [`Diagram::apply`]; interactive
//! gestures are interpreted by the handlers in [`interaction`].
//!
//! Sub-modules:
//!
//! - [`endpoint`] – endpoints, protocol compatibility and exclusivity
//! - [`layout`] – pure stacking and collision layout helpers
//! - [`stack`] – item stacks (columns and container interiors)
//! - [`component`] – component items with left/right port lists
//! - [`connection`] – connections and orthogonal routing
//! - [`command`] – reversible command tree and undo/redo history
//! - [`diagram`] – the aggregate graph and its raw structural operations
//! - [`operations`] – command builders for every structural edit
//! - [`interaction`] – mode-driven press/move/release/drop handling
//! - [`load`] – hydration from and snapshot to a [`crate::model::DesignDoc`]
//! - [`clipboard`] – copy/paste payloads
//! - [`selection`] – current selection and observers

pub mod clipboard;
pub mod command;
pub mod component;
pub mod connection;
pub mod diagram;
pub mod endpoint;
pub mod interaction;
pub mod layout;
pub mod load;
pub mod operations;
pub mod selection;
pub mod stack;

pub use clipboard::CopyPayload;
pub use command::{Action, EditorCommand, EditorHistory, LayoutDelta};
pub use component::ComponentItem;
pub use connection::Connection;
pub use diagram::{Diagram, DiagramState};
pub use endpoint::{Endpoint, EndpointKind, Side};
pub use interaction::{ConnectionDraft, DropPayload, Key, Mode, Modifiers, MouseButton};
pub use operations::Replacement;
pub use selection::{DiagramObserver, Selection};
pub use stack::{ItemStack, LayoutKind, StackItem, StackOwner};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Identity of a component item.
    ComponentId,
    "component"
);
arena_id!(
    /// Identity of an endpoint (port, top-level interface or off-page proxy).
    EndpointId,
    "endpoint"
);
arena_id!(
    /// Identity of a connection.
    ConnectionId,
    "connection"
);
arena_id!(
    /// Identity of an item stack.
    StackId,
    "stack"
);

/// Hands out ids. Ids are never reused, even after an entity is deleted.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub(crate) fn next_raw(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    pub(crate) fn component(&mut self) -> ComponentId {
        ComponentId(self.next_raw())
    }

    pub(crate) fn endpoint(&mut self) -> EndpointId {
        EndpointId(self.next_raw())
    }

    pub(crate) fn connection(&mut self) -> ConnectionId {
        ConnectionId(self.next_raw())
    }

    pub(crate) fn stack(&mut self) -> StackId {
        StackId(self.next_raw())
    }
}

/// Return `base` if `taken` does not report it, otherwise the first
/// `base_N` (N = 1, 2, …) that is free.
pub(crate) fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_name_appends_first_free_suffix() {
        let used = ["interface", "interface_1"];
        assert_eq!(unique_name("port", |n| used.contains(&n)), "port");
        assert_eq!(unique_name("interface", |n| used.contains(&n)), "interface_2");
    }

    #[test]
    fn ids_display_with_kind_prefix() {
        assert_eq!(ComponentId(3).to_string(), "component#3");
        assert_eq!(EndpointId(7).to_string(), "endpoint#7");
    }
}
