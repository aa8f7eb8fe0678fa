use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use sysdiagram::editor::{
    DiagramObserver, DropPayload, Key, Mode, Modifiers, MouseButton, Selection, StackItem,
};
use sysdiagram::geometry::Point;
use sysdiagram::model::{
    ApiRole, ColumnContent, ColumnDesc, ComDirection, ComponentDef, ComponentKind, InterfaceDef,
    Protocol, TypeRef,
};
use sysdiagram::parser::MemoryCatalog;
use sysdiagram::{Diagram, DiagramConfig, Severity};

fn definition(name: &str, ports: &[(&str, Protocol)]) -> ComponentDef {
    ComponentDef {
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
    }
}

fn bus() -> Protocol {
    Protocol::com("can", "frame", ComDirection::InOut)
}

fn requester() -> Protocol {
    Protocol::api("storage", ApiRole::Requester)
}

/// Three component columns and one IO column, one component with a port
/// named `port` of the given protocol in each component column.
fn three_nodes(protocol: Protocol) -> (Diagram, Vec<sysdiagram::editor::EndpointId>) {
    let mut d = Diagram::with_columns(
        DiagramConfig::default(),
        &[
            ColumnDesc::new("A", ColumnContent::Components, 259.0),
            ColumnDesc::new("B", ColumnContent::Components, 259.0),
            ColumnDesc::new("C", ColumnContent::Components, 259.0),
            ColumnDesc::new("Out", ColumnContent::Io, 119.0),
        ],
    );
    let def = Arc::new(definition("Node", &[("port", protocol)]));
    let mut ports = Vec::new();
    for i in 0..3 {
        let column = d.columns()[i];
        let c = d.add_component(column, def.clone(), None).unwrap();
        ports.push(d.find_port(c, "port").unwrap());
    }
    (d, ports)
}

fn at(d: &Diagram, ep: sysdiagram::editor::EndpointId) -> Point {
    d.endpoint_scene_pos(ep).unwrap()
}

#[test]
fn press_and_release_on_compatible_endpoints_commits() {
    let (mut d, ports) = three_nodes(bus());
    d.set_mode(Mode::Connect);
    let undo_len = d.history().undo_len();

    d.press(at(&d, ports[0]), MouseButton::Primary, Modifiers::NONE);
    let draft = d.connection_draft().unwrap();
    assert_eq!(draft.start, ports[0]);
    assert!(draft.allowed.contains(&ports[1]) && draft.allowed.contains(&ports[2]));

    d.motion(at(&d, ports[1]) + Point::new(3.0, 2.0));
    assert_eq!(d.connection_draft().unwrap().hover, Some(ports[1]));
    assert_eq!(d.connection_draft().unwrap().free_end, at(&d, ports[1]));

    d.release(at(&d, ports[1]), Modifiers::NONE);
    assert!(d.connection_draft().is_none());
    assert_eq!(d.connections().count(), 1);
    assert_eq!(d.history().undo_len(), undo_len + 1);
}

#[test]
fn second_connection_to_saturated_bus_is_rejected_at_commit() {
    let (mut d, ports) = three_nodes(bus());
    d.set_mode(Mode::Connect);
    d.press(at(&d, ports[0]), MouseButton::Primary, Modifiers::NONE);
    d.release(at(&d, ports[1]), Modifiers::NONE);
    assert_eq!(d.connections().count(), 1);
    let undo_len = d.history().undo_len();
    d.take_notices();

    d.press(at(&d, ports[2]), MouseButton::Primary, Modifiers::NONE);
    assert!(d.connection_draft().unwrap().allowed.contains(&ports[0]));
    d.release(at(&d, ports[0]), Modifiers::NONE);

    assert!(d.connection_draft().is_none());
    assert_eq!(d.connections().count(), 1);
    assert_eq!(d.history().undo_len(), undo_len);
    let notices = d.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, Severity::Warning);
}

#[test]
fn draw_cannot_start_from_saturated_endpoint() {
    let (mut d, ports) = three_nodes(bus());
    d.connect(ports[0], ports[1]).unwrap();
    d.set_mode(Mode::Connect);
    d.take_notices();
    d.press(at(&d, ports[0]), MouseButton::Primary, Modifiers::NONE);
    assert!(d.connection_draft().is_none());
    let notices = d.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, Severity::Info);
}

#[test]
fn click_click_connects_and_far_release_discards() {
    let (mut d, ports) = three_nodes(requester());
    d.set_mode(Mode::Connect);

    let start = at(&d, ports[0]);
    d.press(start, MouseButton::Primary, Modifiers::NONE);
    d.release(start, Modifiers::NONE);
    assert!(d.connection_draft().is_some());
    d.press(at(&d, ports[2]), MouseButton::Primary, Modifiers::NONE);
    assert!(d.connection_draft().is_none());
    assert_eq!(d.connections().count(), 1);

    d.press(start, MouseButton::Primary, Modifiers::NONE);
    d.release(start + Point::new(0.0, 200.0), Modifiers::NONE);
    assert!(d.connection_draft().is_none());
    assert_eq!(d.connections().count(), 1);
}

#[test]
fn escape_cancels_a_draw_without_history() {
    let (mut d, ports) = three_nodes(requester());
    d.set_mode(Mode::Connect);
    let undo_len = d.history().undo_len();
    d.press(at(&d, ports[0]), MouseButton::Primary, Modifiers::NONE);
    d.motion(at(&d, ports[1]));
    d.key_release(Key::Escape);
    assert!(d.connection_draft().is_none());
    d.release(at(&d, ports[1]), Modifiers::NONE);
    assert_eq!(d.connections().count(), 0);
    assert_eq!(d.history().undo_len(), undo_len);
}

#[test]
fn shift_draw_goes_off_page_and_repeats_until_shift_is_released() {
    let (mut d, ports) = three_nodes(requester());
    d.set_mode(Mode::Connect);
    d.press(at(&d, ports[0]), MouseButton::Primary, Modifiers::SHIFT);
    let proxy = d.proxy_of(ports[0]).unwrap();
    assert!(d.is_visible(proxy));

    d.release(at(&d, ports[1]), Modifiers::SHIFT);
    assert_eq!(d.connections().count(), 1);
    let conn = d.connections().next().unwrap();
    assert!(conn.off_page);
    assert_eq!(conn.a, proxy);
    assert_eq!(conn.b, d.proxy_of(ports[1]).unwrap());
    assert_eq!(d.connection_draft().unwrap().start, ports[0]);

    d.release(at(&d, ports[2]), Modifiers::SHIFT);
    assert_eq!(d.connections().count(), 2);
    assert_eq!(d.connection_count(ports[0]), 2);

    d.key_release(Key::Shift);
    assert!(d.connection_draft().is_none());
}

#[test]
fn dragging_a_component_moves_it_in_one_step() {
    let (mut d, _) = three_nodes(requester());
    let (a, b) = (d.columns()[0], d.columns()[1]);
    let comp = d.stack(a).unwrap().components().next().unwrap();
    let grab = d.component_scene_pos(comp) + Point::new(0.0, 20.0);
    let undo_len = d.history().undo_len();

    d.press(grab, MouseButton::Primary, Modifiers::NONE);
    assert_eq!(d.selection(), Selection::Component(comp));
    assert!(d.is_dragging());
    d.motion(grab + Point::new(130.0, 0.0));
    d.motion(grab + Point::new(259.0, 300.0));
    assert_eq!(d.stack_of(StackItem::Component(comp)), Some(b));
    d.release(grab + Point::new(259.0, 300.0), Modifiers::NONE);

    assert!(!d.is_dragging());
    assert_eq!(d.history().undo_len(), undo_len + 1);
    assert_eq!(d.stack(b).unwrap().items.len(), 2);
    d.undo().unwrap();
    assert_eq!(d.stack_of(StackItem::Component(comp)), Some(a));
}

#[test]
fn escape_during_drag_puts_the_item_back() {
    let (mut d, _) = three_nodes(requester());
    let a = d.columns()[0];
    let comp = d.stack(a).unwrap().components().next().unwrap();
    let state = d.state();
    let grab = d.component_scene_pos(comp) + Point::new(0.0, 20.0);

    d.press(grab, MouseButton::Primary, Modifiers::NONE);
    d.motion(grab + Point::new(259.0, 0.0));
    d.key_release(Key::Escape);
    assert!(!d.is_dragging());
    assert_eq!(d.state(), state);
    assert!(!d.can_redo());
}

#[test]
fn draft_and_interface_modes_place_items() {
    let mut d = Diagram::with_columns(
        DiagramConfig::default(),
        &[
            ColumnDesc::new("SW", ColumnContent::Components, 259.0),
            ColumnDesc::new("Out", ColumnContent::Io, 119.0),
        ],
    );
    d.set_mode(Mode::Draft);
    d.press(Point::new(129.5, 300.0), MouseButton::Primary, Modifiers::NONE);
    let draft = d.find_component("draft_0").unwrap();
    assert!(d.component(draft).unwrap().draft);

    let body = d.component_scene_pos(draft);
    d.press(body + Point::new(70.0, 40.0), MouseButton::Primary, Modifiers::NONE);
    let item = d.component(draft).unwrap();
    assert_eq!(item.right_ports.len(), 1);
    let port = d.endpoint(item.right_ports[0]).unwrap();
    assert_eq!(port.protocol, Protocol::Undefined);

    d.set_mode(Mode::Interface);
    d.press(Point::new(259.0 + 60.0, 200.0), MouseButton::Primary, Modifiers::NONE);
    let iface = d.find_interface("interface").unwrap();
    assert_eq!(d.interface_stack(iface), Some(d.columns()[1]));

    d.press(Point::new(0.0, 0.0), MouseButton::Secondary, Modifiers::NONE);
    assert_eq!(d.mode(), Mode::Select);
}

#[test]
fn dropping_catalog_items_adds_or_replaces() {
    let mut catalog = MemoryCatalog::default();
    catalog.insert(definition("Codec", &[("port", requester())]));
    let mut d = Diagram::with_columns(
        DiagramConfig::default(),
        &[ColumnDesc::new("SW", ColumnContent::Components, 259.0)],
    );
    let codec = TypeRef::new("acme", "sw", "Codec", "1.0");

    let first = d
        .drop_payload(&DropPayload::Component(codec.clone()), Point::new(129.5, 100.0), &catalog)
        .unwrap();
    assert_eq!(d.component(first).unwrap().name, "Codec_0");

    let draft = d
        .drop_payload(
            &DropPayload::Draft(ComponentKind::Software),
            Point::new(129.5, 400.0),
            &catalog,
        )
        .unwrap();
    assert!(d.component(draft).unwrap().draft);

    let target = d.component_scene_pos(draft) + Point::new(0.0, 20.0);
    let replaced = d
        .drop_payload(&DropPayload::Component(codec), target, &catalog)
        .unwrap();
    assert!(d.component(draft).is_err());
    assert!(!d.component(replaced).unwrap().draft);

    d.take_notices();
    let missing = TypeRef::new("acme", "sw", "Missing", "1.0");
    assert!(d
        .drop_payload(&DropPayload::Component(missing), Point::new(129.5, 600.0), &catalog)
        .is_none());
    assert_eq!(d.take_notices().len(), 1);
}

#[derive(Default)]
struct Recorder {
    selections: Vec<Selection>,
    changes: usize,
}

struct Shared(Rc<RefCell<Recorder>>);

impl DiagramObserver for Shared {
    fn selection_changed(&mut self, selection: Selection) {
        self.0.borrow_mut().selections.push(selection);
    }

    fn content_changed(&mut self) {
        self.0.borrow_mut().changes += 1;
    }
}

#[test]
fn observers_hear_selection_and_content_changes() {
    let (mut d, ports) = three_nodes(requester());
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    d.add_observer(Box::new(Shared(recorder.clone())));

    d.select(Selection::Endpoint(ports[0])).unwrap();
    d.connect(ports[0], ports[1]).unwrap();
    let conn = d.connections().next().unwrap().id;
    d.select(Selection::Connection(conn)).unwrap();
    d.undo().unwrap();

    let r = recorder.borrow();
    assert_eq!(
        r.selections,
        vec![
            Selection::Endpoint(ports[0]),
            Selection::Connection(conn),
            Selection::None
        ]
    );
    assert_eq!(r.changes, 2);
    assert!(d.selection().is_none());
}

#[test]
fn alt_drag_onto_a_component_replaces_it() {
    let (mut d, ports) = three_nodes(bus());
    let (a, b) = (d.columns()[0], d.columns()[1]);
    let link = d.connect(ports[0], ports[2]).unwrap();
    let old = d.find_component("Node_0").unwrap();
    let dragged = d.find_component("Node_1").unwrap();
    let undo_len = d.history().undo_len();
    let state = d.state();

    let grab = d.component_scene_pos(dragged) + Point::new(0.0, 20.0);
    let onto = d.component_scene_pos(old) + Point::new(0.0, 20.0);
    d.press(grab, MouseButton::Primary, Modifiers::ALT);
    d.motion(grab + Point::new(-60.0, 0.0));
    d.motion(onto);
    d.release(onto, Modifiers::ALT);

    assert!(!d.is_dragging());
    assert!(d.component(old).is_err());
    assert_eq!(d.stack_of(StackItem::Component(dragged)), Some(a));
    assert!(d.stack(b).unwrap().items.is_empty());
    let conn = d.connection(link).unwrap();
    assert!(conn.touches(ports[1]) && conn.touches(ports[2]));
    assert_eq!(d.history().undo_len(), undo_len + 1);

    d.undo().unwrap();
    assert!(d.connection(link).unwrap().touches(ports[0]));
    assert_eq!(d.state(), state);
}
