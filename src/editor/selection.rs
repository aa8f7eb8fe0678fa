//! Selection management for the editor.
//!
//! The diagram tracks a single selected object and calls every registered
//! [`DiagramObserver`] synchronously when the selection changes, when the
//! content changes through the history, and when a notice is queued.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sysdiagram::editor::{Diagram, Selection};
//!
//! diagram.select(Selection::Component(id))?;
//! assert_eq!(diagram.selection(), Selection::Component(id));
//! ```

use super::diagram::Diagram;
use super::{ComponentId, ConnectionId, EndpointId, StackId};
use crate::error::{DiagramError, Notice};

/// The currently selected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Component(ComponentId),
    Endpoint(EndpointId),
    Connection(ConnectionId),
    Stack(StackId),
}

impl Selection {
    pub fn is_none(&self) -> bool {
        *self == Selection::None
    }
}

/// Receives diagram events. All methods default to doing nothing.
pub trait DiagramObserver {
    fn selection_changed(&mut self, _selection: Selection) {}

    /// Called after a command was applied, undone or redone.
    fn content_changed(&mut self) {}

    fn notice(&mut self, _notice: &Notice) {}
}

impl Diagram {
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Select `selection`. Fails if the object does not exist.
    pub fn select(&mut self, selection: Selection) -> Result<(), DiagramError> {
        match selection {
            Selection::None => {}
            Selection::Component(id) => {
                self.component(id)?;
            }
            Selection::Endpoint(id) => {
                self.endpoint(id)?;
            }
            Selection::Connection(id) => {
                self.connection(id)?;
            }
            Selection::Stack(id) => {
                self.stack(id)?;
            }
        }
        self.set_selection(selection);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.set_selection(Selection::None);
    }

    pub fn add_observer(&mut self, observer: Box<dyn DiagramObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn set_selection(&mut self, selection: Selection) {
        if self.selection == selection {
            return;
        }
        self.selection = selection;
        log::trace!(selection:? = selection; "selection changed");
        for observer in self.observers.iter_mut() {
            observer.selection_changed(selection);
        }
    }

    pub(crate) fn forget_selection(&mut self) {
        self.set_selection(Selection::None);
    }

    /// Drop the selection if the selected object no longer exists.
    pub(crate) fn forget_selection_if_stale(&mut self) {
        let exists = match self.selection {
            Selection::None => true,
            Selection::Component(id) => self.components.contains_key(&id),
            Selection::Endpoint(id) => self.endpoints.contains_key(&id),
            Selection::Connection(id) => self.connections.contains_key(&id),
            Selection::Stack(id) => self.stacks.contains_key(&id),
        };
        if !exists {
            self.forget_selection();
        }
    }

    pub(crate) fn content_changed(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.content_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagramConfig;
    use crate::model::{ColumnContent, ColumnDesc};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        selections: Rc<RefCell<Vec<Selection>>>,
    }

    impl DiagramObserver for Recorder {
        fn selection_changed(&mut self, selection: Selection) {
            self.selections.borrow_mut().push(selection);
        }
    }

    #[test]
    fn observers_see_selection_changes_once() {
        let mut d = Diagram::with_columns(
            DiagramConfig::default(),
            &[ColumnDesc::new("SW", ColumnContent::Components, 259.0)],
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        d.add_observer(Box::new(Recorder {
            selections: seen.clone(),
        }));
        let column = d.columns()[0];
        d.select(Selection::Stack(column)).unwrap();
        d.select(Selection::Stack(column)).unwrap();
        d.clear_selection();
        assert_eq!(
            *seen.borrow(),
            vec![Selection::Stack(column), Selection::None]
        );
    }

    #[test]
    fn selecting_missing_object_fails() {
        let mut d = Diagram::new(DiagramConfig::default());
        assert_eq!(
            d.select(Selection::Component(ComponentId(9))),
            Err(DiagramError::UnknownComponent(ComponentId(9)))
        );
        assert!(d.selection().is_none());
    }
}
