use super::pattern::shift_formula_rows;
use crate::model::CellValue;

/// Formula text for one template cell. Empty cells yield an empty string. A
/// leading `'` guarding an `=` (stored so the backend keeps the formula as
/// text) is dropped; anything else passes through trimmed.
pub fn unescape_template_cell(cell: &CellValue) -> String {
    let Some(text) = cell.as_text() else {
        return String::new();
    };
    let text = text.trim();
    match text.strip_prefix('\'') {
        Some(rest) if rest.starts_with('=') => rest.to_string(),
        _ => text.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateRow {
    pub formulas: Vec<String>,
    /// Formulas written verbatim because row translation failed.
    pub untranslated: Vec<usize>,
}

impl TemplateRow {
    pub fn populated(&self) -> usize {
        self.formulas.iter().filter(|f| !f.is_empty()).count()
    }
}

/// Unescape a template row and, when `row_delta` is given, re-anchor every
/// `=` formula that many rows down.
pub fn prepare_template_row(cells: &[CellValue], row_delta: Option<i32>) -> TemplateRow {
    let mut row = TemplateRow::default();
    for (idx, cell) in cells.iter().enumerate() {
        let text = unescape_template_cell(cell);
        let text = match row_delta {
            Some(delta) if text.starts_with('=') => match shift_formula_rows(&text, delta) {
                Ok(shifted) => shifted,
                Err(error) => {
                    tracing::warn!(column = idx, %error, "template formula kept verbatim");
                    row.untranslated.push(idx);
                    text
                }
            },
            _ => text,
        };
        row.formulas.push(text);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_the_guarding_apostrophe() {
        let cell = CellValue::Text("  '=SUM(A1:A2) ".to_string());
        assert_eq!(unescape_template_cell(&cell), "=SUM(A1:A2)");
        let quoted = CellValue::Text("'quoted text".to_string());
        assert_eq!(unescape_template_cell(&quoted), "'quoted text");
    }

    #[test]
    fn empty_and_plain_cells() {
        assert_eq!(unescape_template_cell(&CellValue::Empty), "");
        assert_eq!(unescape_template_cell(&CellValue::Text("   ".into())), "");
        assert_eq!(unescape_template_cell(&CellValue::Text("n/a".into())), "n/a");
        assert_eq!(unescape_template_cell(&CellValue::Number(4.0)), "4");
    }

    #[test]
    fn verbatim_without_row_delta() {
        let cells = vec![
            CellValue::Text("'=A2*2".into()),
            CellValue::Empty,
            CellValue::Text("label".into()),
        ];
        let row = prepare_template_row(&cells, None);
        assert_eq!(row.formulas, vec!["=A2*2", "", "label"]);
        assert_eq!(row.populated(), 2);
        assert!(row.untranslated.is_empty());
    }
}
