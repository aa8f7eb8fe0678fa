//! Helper functions for reading attribute values (numbers, points, type
//! references, protocols) off XML nodes.

use crate::geometry::Point;
use crate::model::{ApiRole, ComDirection, Protocol, TypeRef};
use anyhow::{Result, anyhow};
use roxmltree::Node;

/// First element child with tag `name`.
pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.is_element() && c.has_tag_name(name))
}

/// All element children with tag `name`.
pub fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.has_tag_name(name))
}

/// Trimmed text of the first child element `name`, or an empty string.
pub fn child_text(node: Node, name: &str) -> String {
    child(node, name)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

pub fn attr_string(node: Node, name: &str) -> String {
    node.attribute(name).unwrap_or_default().to_string()
}

/// Parse a numeric attribute; missing attributes yield `None`.
pub fn attr_f64(node: Node, name: &str) -> Result<Option<f64>> {
    match node.attribute(name) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| anyhow!("Attribute {}=\"{}\" is not a number", name, v)),
    }
}

/// `true`/`false`/`1`/`0`; anything else (or absence) is `false`.
pub fn attr_bool(node: Node, name: &str) -> bool {
    matches!(node.attribute(name).map(str::trim), Some("true") | Some("1"))
}

/// Point from `x`/`y` attributes. Both must be present.
pub fn parse_point(node: Node) -> Result<Point> {
    match (attr_f64(node, "x")?, attr_f64(node, "y")?) {
        (Some(x), Some(y)) => Ok(Point::new(x, y)),
        _ => Err(anyhow!("<{}> needs x and y", node.tag_name().name())),
    }
}

/// Point from `x`/`y` attributes when present.
pub fn parse_optional_point(node: Node) -> Result<Option<Point>> {
    match (attr_f64(node, "x")?, attr_f64(node, "y")?) {
        (Some(x), Some(y)) => Ok(Some(Point::new(x, y))),
        (None, None) => Ok(None),
        _ => Err(anyhow!("<{}> has only one of x and y", node.tag_name().name())),
    }
}

/// Type reference from `vendor`/`library`/`name`/`version` attributes.
pub fn parse_type_ref(node: Node) -> TypeRef {
    TypeRef::new(
        node.attribute("vendor").unwrap_or_default(),
        node.attribute("library").unwrap_or_default(),
        node.attribute("name").unwrap_or_default(),
        node.attribute("version").unwrap_or_default(),
    )
}

/// Protocol of an interface element: an `<api>` or `<com>` child, or
/// Undefined when neither is present.
pub fn parse_protocol(node: Node) -> Result<Protocol> {
    if let Some(api) = child(node, "api") {
        let role = api.attribute("role").unwrap_or("provider");
        let role = ApiRole::parse(role).ok_or_else(|| anyhow!("Unknown API role '{}'", role))?;
        return Ok(Protocol::api(api.attribute("type").unwrap_or_default(), role));
    }
    if let Some(com) = child(node, "com") {
        let direction = com.attribute("direction").unwrap_or("inout");
        let direction = ComDirection::parse(direction)
            .ok_or_else(|| anyhow!("Unknown COM direction '{}'", direction))?;
        return Ok(Protocol::com(
            com.attribute("type").unwrap_or_default(),
            com.attribute("transfer").unwrap_or_default(),
            direction,
        ));
    }
    Ok(Protocol::Undefined)
}
