//! Generate design and component definition XML text from the model records.
//!
//! The output is what [`crate::parser`] reads back: a design written here and
//! parsed again yields an equal [`DesignDoc`].

use crate::geometry::Point;
use crate::model::*;
use indexmap::IndexMap;

/// Generate the XML text for a design document.
///
/// The output includes the XML declaration and uses 2-space indentation.
pub fn generate_design_xml(design: &DesignDoc) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    write_design(&mut out, design);
    out
}

/// Generate the XML text for a component definition.
pub fn generate_component_xml(def: &ComponentDef) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<component");
    if let Some(r) = &def.type_ref {
        write_type_ref_attrs(&mut out, r);
    }
    write_kind_attr(&mut out, def.kind);
    out.push_str(">\n");
    write_text_element(&mut out, 1, "description", &def.description);
    if !def.interfaces.is_empty() {
        indent(&mut out, 1);
        out.push_str("<interfaces>\n");
        for iface in &def.interfaces {
            indent(&mut out, 2);
            out.push_str(&format!("<interface name=\"{}\"", xml_escape_attr(&iface.name)));
            if let Some(p) = iface.default_pos {
                write_point_attrs(&mut out, p);
            }
            write_interface_body(&mut out, 2, &iface.protocol, &iface.description);
        }
        indent(&mut out, 1);
        out.push_str("</interfaces>\n");
    }
    if !def.properties.is_empty() {
        indent(&mut out, 1);
        out.push_str("<properties>\n");
        for (name, value) in &def.properties {
            write_named_value(&mut out, 2, "property", name, value);
        }
        indent(&mut out, 1);
        out.push_str("</properties>\n");
    }
    out.push_str("</component>\n");
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

/// Escape text content for XML.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape an attribute value for XML. Like [`xml_escape`] but also encodes
/// quotes, newlines and carriage returns.
fn xml_escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

fn write_point_attrs(out: &mut String, p: Point) {
    out.push_str(&format!(" x=\"{}\" y=\"{}\"", p.x, p.y));
}

fn write_type_ref_attrs(out: &mut String, r: &TypeRef) {
    out.push_str(&format!(
        " vendor=\"{}\" library=\"{}\" name=\"{}\" version=\"{}\"",
        xml_escape_attr(&r.vendor),
        xml_escape_attr(&r.library),
        xml_escape_attr(&r.name),
        xml_escape_attr(&r.version)
    ));
}

fn write_kind_attr(out: &mut String, kind: ComponentKind) {
    if kind == ComponentKind::Platform {
        out.push_str(" kind=\"platform\"");
    }
}

fn write_text_element(out: &mut String, level: usize, tag: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    indent(out, level);
    out.push_str(&format!("<{}>{}</{}>\n", tag, xml_escape(text), tag));
}

fn write_named_value(out: &mut String, level: usize, tag: &str, name: &str, value: &str) {
    indent(out, level);
    if value.is_empty() {
        out.push_str(&format!("<{} name=\"{}\"/>\n", tag, xml_escape_attr(name)));
    } else {
        out.push_str(&format!(
            "<{} name=\"{}\">{}</{}>\n",
            tag,
            xml_escape_attr(name),
            xml_escape(value),
            tag
        ));
    }
}

fn write_protocol(out: &mut String, level: usize, protocol: &Protocol) {
    match protocol {
        Protocol::Undefined => {}
        Protocol::Api { api_type, role } => {
            indent(out, level);
            out.push_str(&format!(
                "<api type=\"{}\" role=\"{}\"/>\n",
                xml_escape_attr(api_type),
                role.as_str()
            ));
        }
        Protocol::Com {
            com_type,
            transfer_type,
            direction,
        } => {
            indent(out, level);
            out.push_str(&format!(
                "<com type=\"{}\" transfer=\"{}\" direction=\"{}\"/>\n",
                xml_escape_attr(com_type),
                xml_escape_attr(transfer_type),
                direction.as_str()
            ));
        }
    }
}

/// Close the opening tag of an `<interface>` and write its children, using
/// the self-closing form when there are none.
fn write_interface_body(out: &mut String, level: usize, protocol: &Protocol, description: &str) {
    if *protocol == Protocol::Undefined && description.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    write_protocol(out, level + 1, protocol);
    write_text_element(out, level + 1, "description", description);
    indent(out, level);
    out.push_str("</interface>\n");
}

fn write_design(out: &mut String, design: &DesignDoc) {
    out.push_str(&format!("<design name=\"{}\">\n", xml_escape_attr(&design.name)));

    if !design.columns.is_empty() {
        indent(out, 1);
        out.push_str("<columns>\n");
        for col in &design.columns {
            indent(out, 2);
            out.push_str(&format!(
                "<column name=\"{}\" content=\"{}\" allowedItems=\"{}\" width=\"{}\"/>\n",
                xml_escape_attr(&col.name),
                col.content.as_str(),
                col.allowed_items.0,
                col.width
            ));
        }
        indent(out, 1);
        out.push_str("</columns>\n");
    }

    if !design.instances.is_empty() {
        indent(out, 1);
        out.push_str("<componentInstances>\n");
        for inst in &design.instances {
            write_instance(out, inst, 2);
        }
        indent(out, 1);
        out.push_str("</componentInstances>\n");
    }

    if !design.interfaces.is_empty() {
        indent(out, 1);
        out.push_str("<interfaces>\n");
        for iface in &design.interfaces {
            indent(out, 2);
            out.push_str(&format!("<interface name=\"{}\"", xml_escape_attr(&iface.name)));
            write_point_attrs(out, iface.position);
            write_interface_body(out, 2, &iface.protocol, &iface.description);
        }
        indent(out, 1);
        out.push_str("</interfaces>\n");
    }

    if !design.connections.is_empty() {
        indent(out, 1);
        out.push_str("<connections>\n");
        for conn in &design.connections {
            write_connection(out, conn, 2);
        }
        indent(out, 1);
        out.push_str("</connections>\n");
    }

    out.push_str("</design>\n");
}

fn write_position_map(out: &mut String, level: usize, tag: &str, map: &IndexMap<String, Point>) {
    if map.is_empty() {
        return;
    }
    indent(out, level);
    out.push_str(&format!("<{}>\n", tag));
    for (name, p) in map {
        indent(out, level + 1);
        out.push_str(&format!("<position interface=\"{}\"", xml_escape_attr(name)));
        write_point_attrs(out, *p);
        out.push_str("/>\n");
    }
    indent(out, level);
    out.push_str(&format!("</{}>\n", tag));
}

fn write_instance(out: &mut String, inst: &ComponentInstance, level: usize) {
    indent(out, level);
    out.push_str(&format!("<componentInstance name=\"{}\"", xml_escape_attr(&inst.name)));
    if !inst.display_name.is_empty() {
        out.push_str(&format!(" displayName=\"{}\"", xml_escape_attr(&inst.display_name)));
    }
    if let Some(m) = &inst.mapping {
        out.push_str(&format!(" mapping=\"{}\"", xml_escape_attr(m)));
    }
    if inst.draft {
        out.push_str(" draft=\"true\"");
    }
    write_kind_attr(out, inst.kind);
    out.push_str(">\n");

    if let Some(r) = &inst.component_ref {
        indent(out, level + 1);
        out.push_str("<componentRef");
        write_type_ref_attrs(out, r);
        out.push_str("/>\n");
    }
    write_text_element(out, level + 1, "description", &inst.description);
    if let Some(p) = inst.position {
        indent(out, level + 1);
        out.push_str("<position");
        write_point_attrs(out, p);
        out.push_str("/>\n");
    }
    if !inst.config_values.is_empty() {
        indent(out, level + 1);
        out.push_str("<configurableElementValues>\n");
        for (name, value) in &inst.config_values {
            write_named_value(out, level + 2, "value", name, value);
        }
        indent(out, level + 1);
        out.push_str("</configurableElementValues>\n");
    }
    write_position_map(out, level + 1, "apiInterfacePositions", &inst.api_positions);
    write_position_map(out, level + 1, "comInterfacePositions", &inst.com_positions);

    indent(out, level);
    out.push_str("</componentInstance>\n");
}

fn write_interface_ref(out: &mut String, level: usize, tag: &str, r: &InterfaceRef) {
    indent(out, level);
    match r {
        InterfaceRef::Instance {
            instance,
            interface,
        } => out.push_str(&format!(
            "<{} instance=\"{}\" interface=\"{}\"/>\n",
            tag,
            xml_escape_attr(instance),
            xml_escape_attr(interface)
        )),
        InterfaceRef::TopLevel { interface } => out.push_str(&format!(
            "<{} interface=\"{}\"/>\n",
            tag,
            xml_escape_attr(interface)
        )),
    }
}

fn write_connection(out: &mut String, conn: &ConnectionRecord, level: usize) {
    indent(out, level);
    out.push_str(&format!(
        "<connection name=\"{}\" kind=\"{}\"",
        xml_escape_attr(&conn.name),
        conn.kind.as_str()
    ));
    if conn.off_page {
        out.push_str(" offPage=\"true\"");
    }
    out.push_str(">\n");
    write_interface_ref(out, level + 1, "start", &conn.start);
    write_interface_ref(out, level + 1, "end", &conn.end);
    if !conn.route.is_empty() {
        indent(out, level + 1);
        out.push_str("<route>\n");
        for p in &conn.route {
            indent(out, level + 2);
            out.push_str("<point");
            write_point_attrs(out, *p);
            out.push_str("/>\n");
        }
        indent(out, level + 1);
        out.push_str("</route>\n");
    }
    indent(out, level);
    out.push_str("</connection>\n");
}
