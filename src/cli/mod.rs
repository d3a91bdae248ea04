pub mod labels;
pub mod tui;
