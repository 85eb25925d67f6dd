pub mod engine;
pub mod pattern;
pub mod template;

pub use engine::evaluate_sheet;
pub use pattern::{parse_formula, shift_formula_rows};
pub use template::{TemplateRow, prepare_template_row, unescape_template_cell};
