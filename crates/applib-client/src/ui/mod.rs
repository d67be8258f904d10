//! UI composition engine.
//!
//! Menu items and tabs may be declared at any time, in any order, before or
//! after a renderer exists. The engine keeps the model; a [`UiRenderer`] is
//! told which sibling lists to re-flow.

mod menu;
mod sort;
mod tabs;

pub use menu::{MenuNode, MenuTree};
pub use sort::{HostOrdering, NativeAscending, NativeDescending, PROBE, SortDirection, Sorter, Weighted};
pub use tabs::{TabEntry, TabStrip};

use applib_core::TabSide;
use std::cell::OnceCell;

/// Visual collaborator. Receives ordered lists, never mutates the model.
pub trait UiRenderer: Send {
    /// Children of `parent` (empty path: top level) in display order.
    fn menu_reflowed(&mut self, parent: &[String], children: &[MenuNode]);
    fn tabs_reflowed(&mut self, side: TabSide, tabs: &[TabEntry]);
    fn navigated(&mut self, side: TabSide, url: &str);
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UiError {
    #[error("menu path must contain at least one label")]
    EmptyMenuPath,
}

pub struct UiEngine {
    host: Box<dyn HostOrdering>,
    direction: OnceCell<SortDirection>,
    menu: MenuTree,
    left: TabStrip,
    right: TabStrip,
    renderer: Option<Box<dyn UiRenderer>>,
}

impl Default for UiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UiEngine {
    pub fn new() -> Self {
        Self::with_host(Box::new(NativeAscending))
    }

    pub fn with_host(host: Box<dyn HostOrdering>) -> Self {
        Self {
            host,
            direction: OnceCell::new(),
            menu: MenuTree::default(),
            left: TabStrip::default(),
            right: TabStrip::default(),
            renderer: None,
        }
    }

    /// Host sort polarity, probed on first use and cached afterwards.
    pub fn sort_direction(&self) -> SortDirection {
        *self
            .direction
            .get_or_init(|| SortDirection::probe(self.host.as_ref()))
    }

    /// Attach the visual collaborator and replay the current model into it.
    pub fn attach_renderer(&mut self, renderer: Box<dyn UiRenderer>) {
        let mut renderer = renderer;
        replay_menu(renderer.as_mut(), &mut Vec::new(), self.menu.roots());
        for side in [TabSide::Left, TabSide::Right] {
            let strip = self.strip(side);
            renderer.tabs_reflowed(side, strip.entries());
            if let Some(url) = strip.active_url() {
                renderer.navigated(side, url);
            }
        }
        self.renderer = Some(renderer);
    }

    pub fn menu(&self) -> &MenuTree {
        &self.menu
    }

    pub fn tabs(&self, side: TabSide) -> &TabStrip {
        self.strip(side)
    }

    /// Create or update the menu node at `path`.
    pub fn declare_menu_item<S: AsRef<str>>(
        &mut self,
        path: &[S],
        weight: i64,
        action: &str,
    ) -> Result<(), UiError> {
        if path.is_empty() {
            return Err(UiError::EmptyMenuPath);
        }
        let sorter = Sorter {
            direction: self.sort_direction(),
            host: self.host.as_ref(),
        };
        let changed = self.menu.declare(path, weight, action, &sorter);

        if let Some(renderer) = self.renderer.as_mut() {
            for parent in &changed {
                if let Some(children) = self.menu.children_of(parent.as_slice()) {
                    renderer.menu_reflowed(parent, children);
                }
            }
        }
        Ok(())
    }

    /// Append a tab to `side`, optionally taking focus from its siblings.
    pub fn declare_tab(&mut self, side: TabSide, label: &str, weight: i64, action: &str, focused: bool) {
        let entry = TabEntry {
            label: label.to_string(),
            weight,
            action: action.to_string(),
            focused,
        };
        let sorter = Sorter {
            direction: self.sort_direction(),
            host: self.host.as_ref(),
        };
        let strip = match side {
            TabSide::Left => &mut self.left,
            TabSide::Right => &mut self.right,
        };
        strip.push(entry, &sorter);

        if let Some(renderer) = self.renderer.as_mut() {
            renderer.tabs_reflowed(side, strip.entries());
        }
    }

    /// Focus the tab at `index` on `side` and return its action.
    pub fn click_tab(&mut self, side: TabSide, index: usize) -> Option<String> {
        let strip = match side {
            TabSide::Left => &mut self.left,
            TabSide::Right => &mut self.right,
        };
        let action = strip.focus(index)?;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.tabs_reflowed(side, strip.entries());
        }
        Some(action)
    }

    /// Point `side`'s content area at `url`. Tabs are untouched.
    pub fn navigate(&mut self, side: TabSide, url: &str) {
        self.strip_mut(side).set_active_url(url);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.navigated(side, url);
        }
    }

    fn strip(&self, side: TabSide) -> &TabStrip {
        match side {
            TabSide::Left => &self.left,
            TabSide::Right => &self.right,
        }
    }

    fn strip_mut(&mut self, side: TabSide) -> &mut TabStrip {
        match side {
            TabSide::Left => &mut self.left,
            TabSide::Right => &mut self.right,
        }
    }
}

fn replay_menu(renderer: &mut dyn UiRenderer, prefix: &mut Vec<String>, nodes: &[MenuNode]) {
    renderer.menu_reflowed(prefix, nodes);
    for node in nodes {
        if !node.children().is_empty() {
            prefix.push(node.label().to_string());
            replay_menu(renderer, prefix, node.children());
            prefix.pop();
        }
    }
}
