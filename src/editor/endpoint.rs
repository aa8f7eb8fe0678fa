//! Endpoints and the protocol rules that decide which of them may connect.
//!
//! One [`Endpoint`] struct covers all three endpoint kinds; the
//! [`EndpointKind`] discriminant says whether it is a component port, a
//! top-level interface of the designed component, or the off-page proxy of
//! another endpoint. Proxies carry no protocol of their own: every capability
//! query on the diagram resolves a proxy to its real endpoint first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{ComponentId, ConnectionId, EndpointId};
use crate::geometry::{Point, Vector};
use crate::model::{ApiRole, Protocol};

/// Which border of a component item a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Unit vector pointing away from the component on this side.
    pub fn direction(self) -> Vector {
        match self {
            Side::Left => Vector::LEFT,
            Side::Right => Vector::RIGHT,
        }
    }

    /// Side for a local x coordinate: left of the centre line goes left.
    pub fn from_local_x(x: f64) -> Side {
        if x < 0.0 { Side::Left } else { Side::Right }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    ComponentPort { owner: ComponentId },
    TopLevelInterface,
    OffPageProxy { real: EndpointId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub kind: EndpointKind,
    pub name: String,
    pub description: String,
    /// Always [`Protocol::Undefined`] on proxies.
    pub protocol: Protocol,
    pub type_locked: bool,
    /// Ports: relative to the owner's top-centre. Interfaces: relative to
    /// the stack origin. Proxies: unused, derived from the real endpoint.
    pub position: Point,
    pub direction: Vector,
    pub connections: BTreeSet<ConnectionId>,
    /// Off-page companion; `None` on proxies themselves.
    pub proxy: Option<EndpointId>,
    /// Synthesized on load because a connection referred to it.
    pub temporary: bool,
}

impl Endpoint {
    pub fn new(id: EndpointId, kind: EndpointKind, name: &str, protocol: Protocol) -> Self {
        let type_locked = protocol != Protocol::Undefined;
        Self {
            id,
            kind,
            name: name.to_string(),
            description: String::new(),
            protocol,
            type_locked,
            position: Point::default(),
            direction: Vector::RIGHT,
            connections: BTreeSet::new(),
            proxy: None,
            temporary: false,
        }
    }

    /// Companion proxy for the real endpoint `real`.
    pub fn new_proxy(id: EndpointId, real: &Endpoint) -> Self {
        let mut proxy = Endpoint::new(
            id,
            EndpointKind::OffPageProxy { real: real.id },
            &real.name,
            Protocol::Undefined,
        );
        proxy.direction = Vector::UP;
        proxy
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, EndpointKind::OffPageProxy { .. })
    }

    pub fn owner(&self) -> Option<ComponentId> {
        match self.kind {
            EndpointKind::ComponentPort { owner } => Some(owner),
            _ => None,
        }
    }

    /// The real endpoint behind a proxy, or the endpoint itself.
    pub fn real_id(&self) -> EndpointId {
        match self.kind {
            EndpointKind::OffPageProxy { real } => real,
            _ => self.id,
        }
    }
}

/// Type state of an endpoint as touched by explicit and implicit retyping.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeState {
    pub name: String,
    pub protocol: Protocol,
    pub type_locked: bool,
}

impl TypeState {
    pub fn of(ep: &Endpoint) -> Self {
        Self {
            name: ep.name.clone(),
            protocol: ep.protocol.clone(),
            type_locked: ep.type_locked,
        }
    }

    pub fn apply_to(&self, ep: &mut Endpoint) {
        ep.name = self.name.clone();
        ep.protocol = self.protocol.clone();
        ep.type_locked = self.type_locked;
    }
}

fn identifiers_match(a: &str, b: &str) -> bool {
    a.is_empty() || b.is_empty() || a == b
}

/// Protocol compatibility of two real endpoints.
///
/// Undefined is permissive. API endpoints need matching (or empty) API types
/// and the same role; COM endpoints need matching (or empty) COM and transfer
/// types and the same direction. The relation is symmetric.
pub fn protocols_compatible(a: &Protocol, b: &Protocol) -> bool {
    match (a, b) {
        (Protocol::Undefined, _) | (_, Protocol::Undefined) => true,
        (
            Protocol::Api {
                api_type: t1,
                role: r1,
            },
            Protocol::Api {
                api_type: t2,
                role: r2,
            },
        ) => identifiers_match(t1, t2) && r1 == r2,
        (
            Protocol::Com {
                com_type: c1,
                transfer_type: x1,
                direction: d1,
            },
            Protocol::Com {
                com_type: c2,
                transfer_type: x2,
                direction: d2,
            },
        ) => identifiers_match(c1, c2) && identifiers_match(x1, x2) && d1 == d2,
        _ => false,
    }
}

/// Whether an endpoint with this protocol accepts at most one connection.
pub fn is_exclusive(protocol: &Protocol) -> bool {
    match protocol {
        Protocol::Com { .. } => true,
        Protocol::Api { role, .. } => *role == ApiRole::Provider,
        Protocol::Undefined => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComDirection;

    #[test]
    fn api_requires_equal_roles() {
        let p = Protocol::api("audio", ApiRole::Provider);
        let r = Protocol::api("audio", ApiRole::Requester);
        assert!(protocols_compatible(&p, &p.clone()));
        assert!(!protocols_compatible(&p, &r));
        assert!(protocols_compatible(&r, &Protocol::api("", ApiRole::Requester)));
        assert!(!protocols_compatible(&r, &Protocol::api("video", ApiRole::Requester)));
    }

    #[test]
    fn com_requires_equal_direction_and_types() {
        let a = Protocol::com("bus", "tcp", ComDirection::InOut);
        assert!(protocols_compatible(&a, &Protocol::com("bus", "", ComDirection::InOut)));
        assert!(!protocols_compatible(&a, &Protocol::com("bus", "tcp", ComDirection::In)));
        assert!(!protocols_compatible(&a, &Protocol::com("bus", "udp", ComDirection::InOut)));
        assert!(!protocols_compatible(&a, &Protocol::api("bus", ApiRole::Provider)));
    }

    #[test]
    fn undefined_is_permissive() {
        let u = Protocol::Undefined;
        assert!(protocols_compatible(&u, &Protocol::com("x", "y", ComDirection::Out)));
        assert!(protocols_compatible(&Protocol::api("a", ApiRole::Requester), &u));
        assert!(protocols_compatible(&u, &u));
    }

    #[test]
    fn exclusivity_by_family_and_role() {
        assert!(is_exclusive(&Protocol::com("", "", ComDirection::In)));
        assert!(is_exclusive(&Protocol::api("", ApiRole::Provider)));
        assert!(!is_exclusive(&Protocol::api("", ApiRole::Requester)));
        assert!(!is_exclusive(&Protocol::Undefined));
    }
}
