//! List-cursor arithmetic for menu screens.

/// Move selection cursor one item up.
pub fn select_prev(selected: usize) -> usize {
    selected.saturating_sub(1)
}

/// Move selection cursor one item down if another item exists.
pub fn select_next(selected: usize, item_count: usize) -> usize {
    if selected + 1 < item_count {
        selected + 1
    } else {
        selected
    }
}

/// Move up, wrapping from the first item to the last.
pub fn select_wrapping_prev(selected: usize, item_count: usize) -> usize {
    match item_count {
        0 => 0,
        _ if selected == 0 || selected >= item_count => item_count - 1,
        _ => selected - 1,
    }
}

/// Move down, wrapping from the last item to the first.
pub fn select_wrapping_next(selected: usize, item_count: usize) -> usize {
    if selected + 1 < item_count {
        selected + 1
    } else {
        0
    }
}

/// First item to draw so that `selected` is visible in a window of `rows`.
pub fn window_start(selected: usize, item_count: usize, rows: usize) -> usize {
    if rows == 0 || item_count <= rows {
        return 0;
    }
    let last_start = item_count - rows;
    selected.saturating_sub(rows - 1).min(last_start)
}
