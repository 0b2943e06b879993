//! Bookkeeping and geometry helpers shared by the decorator skins.

use super::ResizeEdge;
use crate::types::{Point, Rect, WindowId};
use crate::window::{WindowFlags, WindowLook};

/// Gap between a button and the tab edge.
pub const BUTTON_GAP: i32 = 4;

/// Corner grab size along the border.
pub const CORNER_SIZE: i32 = 12;

/// Horizontal padding around a tab title.
pub const TITLE_PADDING: i32 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoratorTab {
    pub window: WindowId,
    pub title: String,
}

/// Everything a skin remembers besides its metrics.
#[derive(Clone, Debug, Default)]
pub struct DecoratorState {
    pub look: WindowLook,
    pub flags: WindowFlags,
    /// Content frame, screen coordinates.
    pub content: Rect,
    pub tabs: Vec<DecoratorTab>,
    pub front: usize,
    pub focused: bool,
    /// Offset of the first tab from the left border edge.
    pub tab_location: f32,
}

impl DecoratorState {
    pub fn add_tab(&mut self, window: WindowId, title: &str, index: usize) -> usize {
        let index = index.min(self.tabs.len());
        let front = self.tabs.get(self.front).map(|t| t.window);
        self.tabs.insert(index, DecoratorTab { window, title: title.to_string() });
        if let Some(f) = front {
            self.front = self.tabs.iter().position(|t| t.window == f).unwrap_or(0);
        }
        index
    }

    pub fn remove_tab(&mut self, index: usize) -> bool {
        if index >= self.tabs.len() {
            return false;
        }
        let front = self.tabs.get(self.front).map(|t| t.window);
        let removed = self.tabs.remove(index);
        self.front = match front {
            Some(f) if f != removed.window => self.tabs.iter().position(|t| t.window == f).unwrap_or(0),
            _ => index.min(self.tabs.len().saturating_sub(1)),
        };
        true
    }

    pub fn move_tab(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tabs.len() || to >= self.tabs.len() {
            return false;
        }
        let front = self.tabs.get(self.front).map(|t| t.window);
        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);
        if let Some(f) = front {
            self.front = self.tabs.iter().position(|t| t.window == f).unwrap_or(0);
        }
        true
    }
}

/// Button at the leading (left) end of a tab.
pub fn leading_button(tab: Rect, tab_height: i32) -> Rect {
    let size = button_size(tab_height);
    Rect::new(tab.left + BUTTON_GAP, tab.top + (tab.height() - size) / 2, size, size)
}

/// Button `slot` places from the trailing (right) end of a tab.
pub fn trailing_button(tab: Rect, tab_height: i32, slot: i32) -> Rect {
    let size = button_size(tab_height);
    let right = tab.right - BUTTON_GAP - slot * (size + BUTTON_GAP);
    Rect::new(right - size, tab.top + (tab.height() - size) / 2, size, size)
}

pub fn button_size(tab_height: i32) -> i32 {
    (tab_height - 2 * BUTTON_GAP).max(1)
}

/// Width reserved for buttons at both ends of a titled tab.
pub fn button_reserve(tab_height: i32) -> i32 {
    3 * (button_size(tab_height) + BUTTON_GAP)
}

/// Which edge or corner of the border ring `p` grabs.
pub fn border_edge(border: Rect, content: Rect, p: Point) -> ResizeEdge {
    let near_left = p.x < border.left + CORNER_SIZE;
    let near_right = p.x >= border.right - CORNER_SIZE;
    let near_top = p.y < border.top + CORNER_SIZE;
    let near_bottom = p.y >= border.bottom - CORNER_SIZE;
    match (near_left, near_right, near_top, near_bottom) {
        (true, _, true, _) => ResizeEdge::TopLeft,
        (_, true, true, _) => ResizeEdge::TopRight,
        (true, _, _, true) => ResizeEdge::BottomLeft,
        (_, true, _, true) => ResizeEdge::BottomRight,
        _ if p.x < content.left => ResizeEdge::Left,
        _ if p.x >= content.right => ResizeEdge::Right,
        _ if p.y < content.top => ResizeEdge::Top,
        _ => ResizeEdge::Bottom,
    }
}

/// Lay tabs of the given natural widths side by side starting at `x`. When
/// they do not fit in `available`, every tab gets an equal share.
pub fn row_of_tabs(x: i32, top: i32, height: i32, widths: &[i32], available: i32) -> Vec<Rect> {
    if widths.is_empty() {
        return Vec::new();
    }
    let total: i32 = widths.iter().sum();
    let shares: Vec<i32> = if total <= available {
        widths.to_vec()
    } else {
        equal_shares(available, widths.len())
    };
    let mut left = x;
    shares
        .iter()
        .map(|w| {
            let r = Rect::new(left, top, *w, height);
            left += w;
            r
        })
        .collect()
}

/// Split `total` into `n` near-equal parts; the remainder goes to the
/// leading parts.
pub fn equal_shares(total: i32, n: usize) -> Vec<i32> {
    if n == 0 {
        return Vec::new();
    }
    let n = n as i32;
    let base = total / n;
    let extra = total % n;
    (0..n).map(|i| base + if i < extra { 1 } else { 0 }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tab_bookkeeping_keeps_front() {
        let mut state = DecoratorState::default();
        state.add_tab(WindowId(1), "a", 0);
        state.add_tab(WindowId(2), "b", 1);
        state.front = 1;
        state.add_tab(WindowId(3), "c", 0);
        assert_eq!(state.tabs[state.front].window, WindowId(2));
        assert!(state.move_tab(2, 0));
        assert_eq!(state.tabs[state.front].window, WindowId(2));
        assert!(state.remove_tab(0));
        assert_eq!(state.tabs.len(), 2);
        assert!(!state.remove_tab(5));
    }

    #[test]
    fn test_row_of_tabs_shrinks_to_fit() {
        let rects = row_of_tabs(0, 0, 20, &[100, 100, 100], 200);
        assert_eq!(rects.iter().map(|r| r.width()).collect::<Vec<_>>(), vec![67, 67, 66]);
        assert_eq!(rects[2].right, 200);
        let rects = row_of_tabs(10, 0, 20, &[50, 60], 200);
        assert_eq!(rects[1], Rect::new(60, 0, 60, 20));
    }

    #[test]
    fn test_buttons_sit_inside_tab() {
        let tab = Rect::new(0, 0, 120, 21);
        let close = leading_button(tab, 21);
        let zoom = trailing_button(tab, 21, 0);
        let minimize = trailing_button(tab, 21, 1);
        assert!(tab.contains_rect(&close));
        assert!(tab.contains_rect(&zoom));
        assert!(!zoom.intersects(&minimize));
        assert_eq!(zoom.right, 116);
    }
}
