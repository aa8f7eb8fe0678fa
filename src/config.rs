//! Layout and editing constants.
//!
//! All values have defaults so a partial TOML file is enough to override a
//! single constant:
//!
//! ```toml
//! grid_size = 10.0
//! history_limit = 50
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramConfig {
    /// Base grid unit. Port positions and snapping are multiples of it.
    pub grid_size: f64,
    /// Top margin of a stack: the first item never goes above this offset.
    pub stack_top_margin: f64,
    /// Bottom margin added below the last item of a stack.
    pub stack_bottom_margin: f64,
    /// Minimum vertical gap between items of a component column.
    pub stack_spacing: f64,
    /// Minimum vertical gap between items of an IO column.
    pub io_spacing: f64,
    /// Width of a newly created component column.
    pub component_column_width: f64,
    /// Width of a newly created IO column.
    pub io_column_width: f64,
    /// Width of a component item.
    pub component_width: f64,
    /// Minimum height of a component item.
    pub component_min_height: f64,
    /// Height of a top-level interface item.
    pub interface_height: f64,
    /// First y offset (inside the owner) at which ports may be placed.
    pub port_min_y: f64,
    /// Vertical extent of one port slot.
    pub port_height: f64,
    /// Gap kept between two ports on the same side.
    pub port_spacing: f64,
    /// Distance from a port at which its off-page proxy is drawn.
    pub offpage_offset: f64,
    /// Cursor distance within which endpoints are snapped to.
    pub snap_radius: f64,
    /// Required vertical overlap before a dragged item drops into a container.
    pub container_drop_overlap: f64,
    /// Maximum number of undo entries kept.
    pub history_limit: usize,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        let grid = 8.0;
        Self {
            grid_size: grid,
            stack_top_margin: 10.0 * grid,
            stack_bottom_margin: 2.0 * grid,
            stack_spacing: 2.0 * grid,
            io_spacing: grid,
            component_column_width: 259.0,
            io_column_width: 119.0,
            component_width: 20.0 * grid,
            component_min_height: 10.0 * grid,
            interface_height: 2.0 * grid,
            port_min_y: 4.0 * grid,
            port_height: grid,
            port_spacing: grid,
            offpage_offset: 2.0 * grid,
            snap_radius: grid,
            container_drop_overlap: 3.0 * grid,
            history_limit: 200,
        }
    }
}

impl DiagramConfig {
    /// Parse a TOML fragment; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = DiagramConfig::from_toml("grid_size = 10.0\nhistory_limit = 3\n").unwrap();
        assert_eq!(cfg.grid_size, 10.0);
        assert_eq!(cfg.history_limit, 3);
        assert_eq!(cfg.port_min_y, DiagramConfig::default().port_min_y);
    }
}
