use std::sync::Arc;

use proptest::prelude::*;

use sysdiagram::editor::endpoint::protocols_compatible;
use sysdiagram::editor::{ComponentId, ConnectionId, EndpointId};
use sysdiagram::model::{
    ApiRole, ColumnContent, ColumnDesc, ComDirection, ComponentDef, InterfaceDef, Protocol,
    TypeRef,
};
use sysdiagram::{Diagram, DiagramConfig, DiagramError};

#[derive(Debug, Clone)]
enum Op {
    Add { column: usize, ports: Vec<Protocol> },
    Delete(usize),
    Move { item: usize, column: usize, index: usize },
    Connect(usize, usize),
    ToggleOffPage(usize),
    Retype(usize, Protocol),
}

fn diagram() -> Diagram {
    Diagram::with_columns(
        DiagramConfig::default(),
        &[
            ColumnDesc::new("Low", ColumnContent::Components, 259.0),
            ColumnDesc::new("High", ColumnContent::Components, 259.0),
        ],
    )
}

fn component_ids(d: &Diagram) -> Vec<ComponentId> {
    d.components().map(|c| c.id).collect()
}

fn port_ids(d: &Diagram) -> Vec<EndpointId> {
    d.endpoints().filter(|e| !e.is_proxy()).map(|e| e.id).collect()
}

fn connection_ids(d: &Diagram) -> Vec<ConnectionId> {
    d.connections().map(|c| c.id).collect()
}

/// Run `op`; `Ok(false)` when it had nothing to act on.
fn run(d: &mut Diagram, op: &Op) -> Result<bool, DiagramError> {
    match op {
        Op::Add { column, ports } => {
            let stack = d.columns()[column % d.columns().len()];
            let def = ComponentDef {
                type_ref: Some(TypeRef::new("acme", "sw", "Node", "1.0")),
                interfaces: ports
                    .iter()
                    .enumerate()
                    .map(|(i, p)| InterfaceDef {
                        name: format!("p{}", i),
                        protocol: p.clone(),
                        description: String::new(),
                        default_pos: None,
                    })
                    .collect(),
                ..Default::default()
            };
            d.add_component(stack, Arc::new(def), None)?;
        }
        Op::Delete(i) => {
            let ids = component_ids(d);
            let Some(id) = ids.get(i % ids.len().max(1)) else {
                return Ok(false);
            };
            d.delete_component(*id)?;
        }
        Op::Move {
            item,
            column,
            index,
        } => {
            let ids = component_ids(d);
            let Some(id) = ids.get(item % ids.len().max(1)) else {
                return Ok(false);
            };
            let stack = d.columns()[column % d.columns().len()];
            d.move_component(*id, stack, *index)?;
        }
        Op::Connect(a, b) => {
            let ids = port_ids(d);
            if ids.is_empty() {
                return Ok(false);
            }
            d.connect(ids[a % ids.len()], ids[b % ids.len()])?;
        }
        Op::ToggleOffPage(i) => {
            let ids = connection_ids(d);
            let Some(id) = ids.get(i % ids.len().max(1)) else {
                return Ok(false);
            };
            d.toggle_off_page(*id)?;
        }
        Op::Retype(i, protocol) => {
            let ids = port_ids(d);
            if ids.is_empty() {
                return Ok(false);
            }
            d.retype(ids[i % ids.len()], protocol.clone())?;
        }
    }
    Ok(true)
}

// ===================
// Strategies
// ===================

fn protocol_strategy() -> impl Strategy<Value = Protocol> {
    prop_oneof![
        Just(Protocol::Undefined),
        (prop::sample::select(vec!["", "storage", "log"]), any::<bool>()).prop_map(
            |(api_type, provider)| {
                let role = if provider {
                    ApiRole::Provider
                } else {
                    ApiRole::Requester
                };
                Protocol::api(api_type, role)
            }
        ),
        (
            prop::sample::select(vec!["", "can"]),
            prop::sample::select(vec!["", "frame"]),
            prop::sample::select(vec![ComDirection::In, ComDirection::Out, ComDirection::InOut]),
        )
            .prop_map(|(com, transfer, direction)| Protocol::com(com, transfer, direction)),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..2, prop::collection::vec(protocol_strategy(), 0..3))
            .prop_map(|(column, ports)| Op::Add { column, ports }),
        1 => (0usize..8).prop_map(Op::Delete),
        2 => (0usize..8, 0usize..2, 0usize..4)
            .prop_map(|(item, column, index)| Op::Move { item, column, index }),
        3 => (0usize..16, 0usize..16).prop_map(|(a, b)| Op::Connect(a, b)),
        1 => (0usize..8).prop_map(Op::ToggleOffPage),
        1 => (0usize..16, protocol_strategy()).prop_map(|(i, p)| Op::Retype(i, p)),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..24)
}

// ===================
// Property Test Functions
// ===================

fn fail(e: DiagramError) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

/// Compatibility does not depend on the order of the ends, in the pure
/// check and on live endpoints.
fn check_can_connect_is_symmetric(p: Protocol, q: Protocol) -> Result<(), TestCaseError> {
    prop_assert_eq!(protocols_compatible(&p, &q), protocols_compatible(&q, &p));

    let mut d = diagram();
    let low = d.columns()[0];
    let def = ComponentDef {
        type_ref: Some(TypeRef::new("acme", "sw", "Pair", "1.0")),
        interfaces: [("p", &p), ("q", &q)]
            .into_iter()
            .map(|(name, protocol)| InterfaceDef {
                name: name.to_string(),
                protocol: protocol.clone(),
                description: String::new(),
                default_pos: None,
            })
            .collect(),
        ..Default::default()
    };
    let c = d.add_component(low, Arc::new(def), None).map_err(fail)?;
    let (a, b) = (d.find_port(c, "p").unwrap(), d.find_port(c, "q").unwrap());
    prop_assert_eq!(d.can_connect(a, b), d.can_connect(b, a));
    prop_assert_eq!(d.can_connect(a, b), protocols_compatible(&p, &q));
    prop_assert!(!d.can_connect(a, a));
    Ok(())
}

/// Every applied edit is undone exactly and redone exactly; refused edits
/// leave no trace. Undoing everything gives back the empty diagram.
fn check_undo_round_trip(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut d = diagram();
    let initial = d.state();
    for op in &ops {
        let before = d.state();
        match run(&mut d, op) {
            Ok(true) => {
                let after = d.state();
                prop_assert!(d.undo().map_err(fail)?);
                prop_assert_eq!(&d.state(), &before, "undo of {:?}", op);
                prop_assert!(d.redo().map_err(fail)?);
                prop_assert_eq!(&d.state(), &after, "redo of {:?}", op);
            }
            Ok(false) => {}
            Err(_) => prop_assert_eq!(&d.state(), &before, "refused {:?}", op),
        }
    }
    while d.undo().map_err(fail)? {}
    prop_assert_eq!(d.state(), initial);
    Ok(())
}

/// Component columns stay packed: items never overlap and the stack height
/// is the item heights plus gaps and margins.
fn check_stacking_invariant(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut d = diagram();
    let config = d.config().clone();
    for op in &ops {
        let _ = run(&mut d, op);
        for column in d.columns() {
            let stack = d.stack(*column).map_err(fail)?;
            let mut spans = Vec::new();
            for c in stack.components() {
                let item = d.component(c).map_err(fail)?;
                spans.push((item.position.y, item.height));
            }
            let mut expected_top = config.stack_top_margin;
            for (top, height) in &spans {
                prop_assert!((top - expected_top).abs() < 1e-9, "{:?} after {:?}", spans, op);
                expected_top = top + height + config.stack_spacing;
            }
            let gaps = spans.len().saturating_sub(1) as f64 * config.stack_spacing;
            let total: f64 = spans.iter().map(|(_, h)| h).sum();
            let expected =
                config.stack_top_margin + total + gaps + config.stack_bottom_margin;
            prop_assert!((stack.height - expected).abs() < 1e-9);
        }
    }
    Ok(())
}

/// No exclusive endpoint ever carries more than one connection.
fn check_exclusive_endpoints_stay_single(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut d = diagram();
    for op in &ops {
        let _ = run(&mut d, op);
        for id in port_ids(&d) {
            if d.is_exclusive(id) {
                prop_assert!(d.connection_count(id) <= 1, "{} after {:?}", id, op);
            }
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn can_connect_is_symmetric(p in protocol_strategy(), q in protocol_strategy()) {
        check_can_connect_is_symmetric(p, q)?;
    }

    #[test]
    fn undo_round_trip(ops in ops_strategy()) {
        check_undo_round_trip(ops)?;
    }

    #[test]
    fn stacking_invariant(ops in ops_strategy()) {
        check_stacking_invariant(ops)?;
    }

    #[test]
    fn exclusive_endpoints_stay_single(ops in ops_strategy()) {
        check_exclusive_endpoints_stay_single(ops)?;
    }
}
