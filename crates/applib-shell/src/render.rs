//! Log-only stand-ins for the window host's renderers.

use applib_client::ui::{MenuNode, TabEntry, UiRenderer};
use applib_client::{MapLayer, Placemark, TabSide};

pub struct LogRenderer;

impl UiRenderer for LogRenderer {
    fn menu_reflowed(&mut self, parent: &[String], children: &[MenuNode]) {
        let labels: Vec<String> = children
            .iter()
            .map(|c| format!("{}({})", c.label(), c.weight()))
            .collect();
        tracing::info!("menu [{}] -> {}", parent.join(" > "), labels.join(", "));
    }

    fn tabs_reflowed(&mut self, side: TabSide, tabs: &[TabEntry]) {
        let labels: Vec<String> = tabs
            .iter()
            .map(|t| if t.focused { format!("*{}", t.label) } else { t.label.clone() })
            .collect();
        tracing::info!("{} tabs -> {}", side, labels.join(", "));
    }

    fn navigated(&mut self, side: TabSide, url: &str) {
        tracing::info!("{} pane -> {}", side, url);
    }
}

pub struct LogLayer;

impl MapLayer for LogLayer {
    fn add_placemark(&mut self, handle: u64, placemark: &Placemark) {
        tracing::info!(
            "placemark #{} {} at ({}, {}, {}m)",
            handle,
            placemark.id,
            placemark.lat,
            placemark.lon,
            placemark.altitude
        );
    }

    fn remove_placemark(&mut self, handle: u64) {
        tracing::debug!("placemark #{} removed", handle);
    }
}
