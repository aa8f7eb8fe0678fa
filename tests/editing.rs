use std::sync::Arc;

use sysdiagram::editor::Replacement;
use sysdiagram::geometry::Point;
use sysdiagram::model::{
    ApiRole, ColumnContent, ColumnDesc, ComDirection, ComponentDef, ComponentKind, InterfaceDef,
    Protocol, TypeRef,
};
use sysdiagram::{Diagram, DiagramConfig, DiagramError, Severity};

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

fn platform(name: &str) -> Arc<ComponentDef> {
    Arc::new(ComponentDef {
        type_ref: Some(TypeRef::new("acme", "hw", name, "1.0")),
        kind: ComponentKind::Platform,
        ..Default::default()
    })
}

fn diagram() -> Diagram {
    Diagram::with_columns(
        DiagramConfig::default(),
        &[
            ColumnDesc::new("Low", ColumnContent::Components, 259.0),
            ColumnDesc::new("High", ColumnContent::Components, 259.0),
            ColumnDesc::new("Out", ColumnContent::Io, 119.0),
        ],
    )
}

fn requester() -> Protocol {
    Protocol::api("storage", ApiRole::Requester)
}

fn provider() -> Protocol {
    Protocol::api("storage", ApiRole::Provider)
}

fn bus() -> Protocol {
    Protocol::com("can", "frame", ComDirection::InOut)
}

#[test]
fn undo_restores_state_field_for_field() {
    let mut d = diagram();
    let low = d.columns()[0];
    let a = d
        .add_component(low, definition("A", &[("x", requester()), ("y", bus())]), None)
        .unwrap();
    let b = d
        .add_component(low, definition("B", &[("x", requester()), ("y", bus())]), None)
        .unwrap();
    let (ax, ay) = (d.find_port(a, "x").unwrap(), d.find_port(a, "y").unwrap());
    let (bx, by) = (d.find_port(b, "x").unwrap(), d.find_port(b, "y").unwrap());
    d.connect(ax, bx).unwrap();
    d.connect(ay, by).unwrap();

    let before = d.state();
    d.delete_component(a).unwrap();
    assert!(d.component(a).is_err());
    assert_eq!(d.connections().count(), 0);
    d.undo().unwrap();
    assert_eq!(d.state(), before);

    d.redo().unwrap();
    assert!(d.component(a).is_err());
    d.undo().unwrap();
    assert_eq!(d.state(), before);
}

#[test]
fn delete_with_connections_records_one_leaf_per_connection_plus_detach() {
    let mut d = diagram();
    let low = d.columns()[0];
    let hub = d
        .add_component(low, definition("Hub", &[("x", requester())]), None)
        .unwrap();
    let hx = d.find_port(hub, "x").unwrap();
    let mut peers = Vec::new();
    for _ in 0..3 {
        let p = d
            .add_component(low, definition("Peer", &[("x", requester())]), None)
            .unwrap();
        let px = d.find_port(p, "x").unwrap();
        d.connect(hx, px).unwrap();
        peers.push(px);
    }
    assert_eq!(d.connection_count(hx), 3);

    d.delete_component(hub).unwrap();
    assert_eq!(d.history().last().unwrap().leaf_count(), 4);
    assert!(peers.iter().all(|p| d.connection_count(*p) == 0));

    d.undo().unwrap();
    assert_eq!(d.connection_count(hx), 3);
    for conn in d.connections() {
        assert!(conn.touches(hx));
        assert!(d.endpoint(conn.a).is_ok() && d.endpoint(conn.b).is_ok());
    }
}

#[test]
fn undefined_port_takes_peer_type_and_unique_name() {
    let mut d = diagram();
    let low = d.columns()[0];
    let store = d
        .add_component(low, definition("Store", &[("api", provider())]), None)
        .unwrap();
    let draft = d.add_draft_component(low, ComponentKind::Software, None).unwrap();
    d.add_port(draft, Protocol::Undefined, None, Some("api")).unwrap();
    let open = d.add_port(draft, Protocol::Undefined, None, None).unwrap();
    assert_eq!(d.endpoint(open).unwrap().name, "interface");

    let api = d.find_port(store, "api").unwrap();
    d.connect(open, api).unwrap();
    let ep = d.endpoint(open).unwrap();
    assert_eq!(ep.protocol, provider());
    assert!(ep.type_locked);
    assert_eq!(ep.name, "api_1");

    d.undo().unwrap();
    let ep = d.endpoint(open).unwrap();
    assert_eq!(ep.protocol, Protocol::Undefined);
    assert!(!ep.type_locked);
    assert_eq!(ep.name, "interface");
}

#[test]
fn exclusive_endpoints_accept_a_single_connection() {
    let mut d = diagram();
    let low = d.columns()[0];
    let defn = definition("Node", &[("req", requester()), ("prov", provider()), ("bus", bus())]);
    let n: Vec<_> = (0..3)
        .map(|_| d.add_component(low, defn.clone(), None).unwrap())
        .collect();
    let port = |d: &Diagram, i: usize, name: &str| d.find_port(n[i], name).unwrap();

    d.connect(port(&d, 0, "prov"), port(&d, 1, "prov")).unwrap();
    assert!(matches!(
        d.connect(port(&d, 0, "prov"), port(&d, 2, "prov")),
        Err(DiagramError::Saturated(_))
    ));

    d.connect(port(&d, 0, "bus"), port(&d, 1, "bus")).unwrap();
    assert!(matches!(
        d.connect(port(&d, 2, "bus"), port(&d, 0, "bus")),
        Err(DiagramError::Saturated(_))
    ));

    d.connect(port(&d, 0, "req"), port(&d, 1, "req")).unwrap();
    d.connect(port(&d, 0, "req"), port(&d, 2, "req")).unwrap();
    assert_eq!(d.connection_count(port(&d, 0, "req")), 2);
    assert_eq!(d.connections().count(), 4);
}

#[test]
fn incompatible_endpoints_are_refused_without_history() {
    let mut d = diagram();
    let low = d.columns()[0];
    let a = d.add_component(low, definition("A", &[("x", requester())]), None).unwrap();
    let b = d.add_component(low, definition("B", &[("y", bus())]), None).unwrap();
    let depth = d.history().undo_len();
    let result = d.connect(d.find_port(a, "x").unwrap(), d.find_port(b, "y").unwrap());
    assert!(matches!(result, Err(DiagramError::Incompatible(_, _))));
    assert_eq!(d.history().undo_len(), depth);
    assert_eq!(d.connections().count(), 0);
}

#[test]
fn toggling_off_page_and_undoing_restores_ends_and_route() {
    let mut d = diagram();
    let (low, high) = (d.columns()[0], d.columns()[1]);
    let a = d.add_component(low, definition("A", &[("y", bus())]), None).unwrap();
    let b = d.add_component(high, definition("B", &[("y", bus())]), None).unwrap();
    let (ay, by) = (d.find_port(a, "y").unwrap(), d.find_port(b, "y").unwrap());
    let conn = d.connect(ay, by).unwrap();
    let before = d.connection(conn).unwrap().clone();
    let state = d.state();

    d.toggle_off_page(conn).unwrap();
    let toggled = d.connection(conn).unwrap();
    assert!(toggled.off_page);
    assert_eq!(toggled.a, d.proxy_of(ay).unwrap());
    assert_eq!(toggled.b, d.proxy_of(by).unwrap());
    assert!(d.is_visible(toggled.a));
    assert_eq!(d.connection_count(ay), 1);

    d.undo().unwrap();
    let restored = d.connection(conn).unwrap();
    assert_eq!((restored.a, restored.b), (ay, by));
    assert_eq!(restored.route, before.route);
    assert!(!d.is_visible(d.proxy_of(ay).unwrap()));
    assert_eq!(d.state(), state);
}

#[test]
fn replace_moves_connections_to_matching_ports() {
    let mut d = diagram();
    let (low, high) = (d.columns()[0], d.columns()[1]);
    let ports = [("p1", requester()), ("p2", bus())];
    let x = d.add_component(low, definition("X", &ports), None).unwrap();
    let peer = d
        .add_component(high, definition("Peer", &[("q1", requester()), ("q2", bus())]), None)
        .unwrap();
    let (p1, p2) = (d.find_port(x, "p1").unwrap(), d.find_port(x, "p2").unwrap());
    let (q1, q2) = (d.find_port(peer, "q1").unwrap(), d.find_port(peer, "q2").unwrap());
    let c1 = d.connect(p1, q1).unwrap();
    let c2 = d.connect(p2, q2).unwrap();
    let old_positions = [
        d.endpoint_scene_pos(p1).unwrap(),
        d.endpoint_scene_pos(p2).unwrap(),
    ];
    let state = d.state();

    let y = d
        .replace_component(x, Replacement::Definition(definition("Y", &ports)), false)
        .unwrap();
    assert!(d.component(x).is_err());
    assert_eq!(d.stack_of(sysdiagram::editor::StackItem::Component(y)), Some(low));
    let (y1, y2) = (d.find_port(y, "p1").unwrap(), d.find_port(y, "p2").unwrap());
    assert!(d.connection(c1).unwrap().touches(y1));
    assert!(d.connection(c2).unwrap().touches(y2));
    assert_eq!(d.endpoint_scene_pos(y1).unwrap(), old_positions[0]);
    assert_eq!(d.endpoint_scene_pos(y2).unwrap(), old_positions[1]);
    assert_eq!(d.connections().count(), 2);

    d.undo().unwrap();
    assert!(d.component(y).is_err());
    assert!(d.connection(c1).unwrap().touches(p1));
    assert!(d.connection(c2).unwrap().touches(p2));
    assert_eq!(d.state(), state);
}

#[test]
fn replace_keeping_old_leaves_unmatched_connections() {
    let mut d = diagram();
    let low = d.columns()[0];
    let x = d
        .add_component(low, definition("X", &[("p1", requester()), ("extra", bus())]), None)
        .unwrap();
    let peer = d
        .add_component(low, definition("Peer", &[("q1", requester()), ("q2", bus())]), None)
        .unwrap();
    let c1 = d
        .connect(d.find_port(x, "p1").unwrap(), d.find_port(peer, "q1").unwrap())
        .unwrap();
    let c2 = d
        .connect(d.find_port(x, "extra").unwrap(), d.find_port(peer, "q2").unwrap())
        .unwrap();

    let y = d
        .replace_component(x, Replacement::Definition(definition("Y", &[("p1", requester())])), true)
        .unwrap();
    assert!(d.component(x).is_ok());
    assert_eq!(d.component(y).unwrap().name, "Y_0");
    assert!(d.connection(c1).unwrap().touches(d.find_port(y, "p1").unwrap()));
    assert!(d.connection(c2).unwrap().touches(d.find_port(x, "extra").unwrap()));
}

#[test]
fn retype_is_undoable_and_severs_connections() {
    let mut d = diagram();
    let low = d.columns()[0];
    let a = d.add_component(low, definition("A", &[("x", requester())]), None).unwrap();
    let b = d.add_component(low, definition("B", &[("x", requester())]), None).unwrap();
    let ax = d.find_port(a, "x").unwrap();
    d.connect(ax, d.find_port(b, "x").unwrap()).unwrap();
    let state = d.state();

    d.retype(ax, Protocol::Undefined).unwrap();
    assert_eq!(d.connection_count(ax), 0);
    assert!(!d.endpoint(ax).unwrap().type_locked);
    d.undo().unwrap();
    assert_eq!(d.state(), state);
}

#[test]
fn deleting_column_with_nested_items_is_refused() {
    let mut d = diagram();
    let low = d.columns()[0];
    let board = d.add_component(low, platform("Board"), None).unwrap();
    let inner = d.component(board).unwrap().child_stack.unwrap();
    d.add_component(inner, definition("App", &[]), None).unwrap();
    let state = d.state();
    d.take_notices();

    let result = d.delete_column(low);
    assert!(matches!(result, Err(DiagramError::StackHasNestedItems { .. })));
    assert_eq!(d.state(), state);
    assert_eq!(d.take_notices().len(), 1);
}

#[test]
fn deleting_a_container_takes_its_children_along() {
    let mut d = diagram();
    let (low, high) = (d.columns()[0], d.columns()[1]);
    let board = d.add_component(low, platform("Board"), None).unwrap();
    let inner = d.component(board).unwrap().child_stack.unwrap();
    let app = d.add_component(inner, definition("App", &[("x", requester())]), None).unwrap();
    let other = d.add_component(high, definition("Other", &[("x", requester())]), None).unwrap();
    d.connect(d.find_port(app, "x").unwrap(), d.find_port(other, "x").unwrap())
        .unwrap();
    let state = d.state();

    d.delete_component(board).unwrap();
    assert!(d.component(app).is_err());
    assert_eq!(d.connections().count(), 0);
    assert_eq!(d.history().last().unwrap().leaf_count(), 3);
    d.undo().unwrap();
    assert_eq!(d.state(), state);
}

#[test]
fn column_add_and_delete_round_trip() {
    let mut d = diagram();
    let state = d.state();
    let extra = d
        .add_column(&ColumnDesc::new("Low", ColumnContent::Components, 259.0), Some(1))
        .unwrap();
    assert_eq!(d.stack(extra).unwrap().name, "Low_1");
    assert_eq!(d.columns()[1], extra);
    let comp = d.add_component(extra, definition("A", &[]), None).unwrap();
    d.delete_column(extra).unwrap();
    assert!(d.component(comp).is_err());
    d.undo().unwrap();
    assert!(d.component(comp).is_ok());
    d.undo().unwrap();
    d.undo().unwrap();
    assert_eq!(d.state(), state);
}

#[test]
fn protected_diagram_refuses_edits() {
    let mut d = diagram();
    let low = d.columns()[0];
    d.add_component(low, definition("A", &[]), None).unwrap();
    d.set_protected(true);
    assert!(matches!(
        d.add_component(low, definition("B", &[]), None),
        Err(DiagramError::Protected)
    ));
    assert!(matches!(d.undo(), Err(DiagramError::Protected)));
    d.set_protected(false);
    assert!(d.undo().unwrap());
    assert!(!d.undo().unwrap());
}

#[test]
fn renames_are_single_undo_steps() {
    let mut d = diagram();
    let low = d.columns()[0];
    let a = d.add_component(low, definition("A", &[("x", requester())]), None).unwrap();
    let x = d.find_port(a, "x").unwrap();
    d.rename_component(a, "front").unwrap();
    d.rename_endpoint(x, "request").unwrap();
    assert_eq!(d.find_component("front"), Some(a));
    assert_eq!(d.find_port(a, "request"), Some(x));
    d.undo().unwrap();
    assert_eq!(d.endpoint(x).unwrap().name, "x");
    d.undo().unwrap();
    assert_eq!(d.component(a).unwrap().name, "A_0");
}

#[test]
fn moving_a_component_between_columns_keeps_stacks_packed() {
    let mut d = diagram();
    let (low, high) = (d.columns()[0], d.columns()[1]);
    let a = d.add_component(low, definition("A", &[]), None).unwrap();
    let b = d.add_component(low, definition("B", &[]), None).unwrap();
    d.move_component(a, high, 0).unwrap();
    let config = d.config().clone();
    assert_eq!(d.component(b).unwrap().position.y, config.stack_top_margin);
    assert_eq!(d.component(a).unwrap().position.y, config.stack_top_margin);
    assert_eq!(
        d.component_scene_pos(a),
        Point::new(259.0 + 259.0 / 2.0, config.stack_top_margin)
    );
    d.undo().unwrap();
    let a_pos = d.component(a).unwrap().position.y;
    let b_pos = d.component(b).unwrap().position.y;
    assert!(a_pos < b_pos);
}

#[test]
fn replacing_with_a_connected_peer_drops_the_connection_between_them() {
    let mut d = diagram();
    let (low, high) = (d.columns()[0], d.columns()[1]);
    let ports = [("p1", requester()), ("p2", bus())];
    let x = d.add_component(low, definition("X", &ports), None).unwrap();
    let y = d.add_component(high, definition("Y", &ports), None).unwrap();
    let peer = d.add_component(high, definition("Peer", &[("q2", bus())]), None).unwrap();
    let (xp1, xp2) = (d.find_port(x, "p1").unwrap(), d.find_port(x, "p2").unwrap());
    let (yp1, yp2) = (d.find_port(y, "p1").unwrap(), d.find_port(y, "p2").unwrap());
    let q2 = d.find_port(peer, "q2").unwrap();
    let between = d.connect(xp1, yp1).unwrap();
    let kept = d.connect(xp2, q2).unwrap();
    d.take_notices();
    let state = d.state();

    d.replace_component(x, Replacement::Existing(y), false).unwrap();
    assert!(d.component(x).is_err());
    assert!(d.connection(between).is_err());
    assert!(d.connection(kept).unwrap().touches(yp2));
    assert!(d.connections().all(|c| c.a != c.b));
    assert_eq!(d.connection_count(yp1), 0);
    let notices = d.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, Severity::Warning);

    d.undo().unwrap();
    assert!(d.connection(between).unwrap().touches(xp1));
    assert!(d.connection(kept).unwrap().touches(xp2));
    assert_eq!(d.state(), state);
}

#[test]
fn replacement_keeps_exclusive_ports_single() {
    let mut d = diagram();
    let (low, high) = (d.columns()[0], d.columns()[1]);
    let x = d.add_component(low, definition("X", &[("p2", bus())]), None).unwrap();
    let y = d.add_component(high, definition("Y", &[("p2", bus())]), None).unwrap();
    let a = d.add_component(high, definition("A", &[("q", bus())]), None).unwrap();
    let b = d.add_component(high, definition("B", &[("q", bus())]), None).unwrap();
    let (xp2, yp2) = (d.find_port(x, "p2").unwrap(), d.find_port(y, "p2").unwrap());
    let from_x = d.connect(xp2, d.find_port(a, "q").unwrap()).unwrap();
    let from_y = d.connect(yp2, d.find_port(b, "q").unwrap()).unwrap();
    d.take_notices();

    d.replace_component(x, Replacement::Existing(y), false).unwrap();
    assert_eq!(d.connection_count(yp2), 1);
    assert!(d.connection(from_y).unwrap().touches(yp2));
    assert!(d.connection(from_x).is_err());
    assert_eq!(d.take_notices().len(), 1);

    d.undo().unwrap();
    assert!(d.connection(from_x).unwrap().touches(xp2));
    assert_eq!(d.connection_count(yp2), 1);
}

#[test]
fn replacement_drops_connections_its_port_cannot_take() {
    let mut d = diagram();
    let (low, high) = (d.columns()[0], d.columns()[1]);
    let x = d.add_component(low, definition("X", &[("p2", bus())]), None).unwrap();
    let peer = d.add_component(high, definition("Peer", &[("q", bus())]), None).unwrap();
    let xp2 = d.find_port(x, "p2").unwrap();
    let conn = d.connect(xp2, d.find_port(peer, "q").unwrap()).unwrap();
    let inbound = Protocol::com("can", "frame", ComDirection::In);

    let y = d
        .replace_component(x, Replacement::Definition(definition("Y", &[("p2", inbound)])), false)
        .unwrap();
    let yp2 = d.find_port(y, "p2").unwrap();
    assert!(d.connection(conn).is_err());
    assert_eq!(d.connection_count(yp2), 0);
    assert_eq!(d.connections().count(), 0);

    d.undo().unwrap();
    assert!(d.connection(conn).unwrap().touches(xp2));
}
