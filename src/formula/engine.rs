//! Sheet evaluation on the formualizer engine.

use super::pattern::parse_formula;
use crate::model::{CellValue, cell_address, datetime_to_serial};
use anyhow::{Result, anyhow};
use formualizer::eval::engine::{Engine, EvalConfig};
use formualizer::workbook::LiteralValue;
use formualizer::workbook::workbook::WBResolver;
use std::collections::BTreeMap;

type SheetEngine = Engine<WBResolver>;

/// Result for formula text the parser rejects.
pub const UNPARSEABLE: &str = "#NAME?";

/// Computes every formula cell of one sheet. `cells` yields raw content keyed
/// by `(row, col)`; the result holds one entry per formula cell. Formula text
/// without a leading `=` is a literal.
pub fn evaluate_sheet<'a>(
    sheet_name: &str,
    cells: impl IntoIterator<Item = ((u32, u32), &'a CellValue)>,
) -> Result<BTreeMap<(u32, u32), CellValue>> {
    let mut engine = SheetEngine::new(WBResolver::default(), EvalConfig::default());
    let mut formulas = Vec::new();
    let mut results = BTreeMap::new();

    for ((row, col), content) in cells {
        let literal = match content {
            CellValue::Empty => continue,
            CellValue::Formula(text) if text.trim_start().starts_with('=') => {
                match parse_formula(text) {
                    Ok(ast) => {
                        engine
                            .set_cell_formula(sheet_name, row, col, ast)
                            .map_err(|e| {
                                anyhow!("failed to load formula at {}: {e}", cell_address(col, row))
                            })?;
                        formulas.push((row, col));
                    }
                    Err(err) => {
                        tracing::debug!(cell = %cell_address(col, row), error = %err, "formula rejected");
                        results.insert((row, col), CellValue::Error(UNPARSEABLE.to_string()));
                    }
                }
                continue;
            }
            CellValue::Formula(text) => {
                let value = literal_formula_text(text);
                let literal = to_literal(&value);
                results.insert((row, col), value);
                literal
            }
            other => to_literal(other),
        };
        engine
            .set_cell_value(sheet_name, row, col, literal)
            .map_err(|e| anyhow!("failed to load value at {}: {e}", cell_address(col, row)))?;
    }

    if formulas.is_empty() {
        return Ok(results);
    }

    engine
        .evaluate_all()
        .map_err(|e| anyhow!("formualizer evaluate_all failed: {e}"))?;

    for (row, col) in formulas {
        let value = engine
            .get_cell_value(sheet_name, row, col)
            .unwrap_or(LiteralValue::Empty);
        results.insert((row, col), from_literal(value));
    }
    Ok(results)
}

fn literal_formula_text(text: &str) -> CellValue {
    match text.trim().parse::<f64>() {
        Ok(n) => CellValue::Number(n),
        Err(_) => CellValue::Text(text.to_string()),
    }
}

fn to_literal(value: &CellValue) -> LiteralValue {
    match value {
        CellValue::Empty => LiteralValue::Empty,
        CellValue::Number(n) => LiteralValue::Number(*n),
        CellValue::Bool(b) => LiteralValue::Boolean(*b),
        CellValue::Date(d) => LiteralValue::Number(datetime_to_serial(*d)),
        CellValue::Text(s) | CellValue::Error(s) | CellValue::Formula(s) => {
            LiteralValue::Text(s.clone())
        }
    }
}

fn from_literal(value: LiteralValue) -> CellValue {
    match value {
        LiteralValue::Empty | LiteralValue::Pending => CellValue::Empty,
        LiteralValue::Int(i) => CellValue::Number(i as f64),
        LiteralValue::Number(n) => CellValue::Number(n),
        LiteralValue::Boolean(b) => CellValue::Bool(b),
        LiteralValue::Text(s) => CellValue::Text(s),
        LiteralValue::Error(err) => CellValue::Error(err.kind.to_string()),
        LiteralValue::DateTime(dt) => CellValue::Date(dt),
        LiteralValue::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Empty),
        _ => CellValue::Error("#VALUE!".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(entries: &[((u32, u32), CellValue)]) -> BTreeMap<(u32, u32), CellValue> {
        evaluate_sheet("S", entries.iter().map(|(k, v)| (*k, v))).unwrap()
    }

    #[test]
    fn arithmetic_and_functions_evaluate() {
        let out = eval(&[
            ((1, 1), CellValue::Number(2.0)),
            ((2, 1), CellValue::Number(3.0)),
            ((1, 2), CellValue::Formula("=SUM(A1:A2)".into())),
            ((2, 2), CellValue::Formula("=IF(A2>2,A2*10,0)".into())),
            ((3, 2), CellValue::Formula("=(A1+A2)*2-1".into())),
        ]);
        assert_eq!(out[&(1, 2)], CellValue::Number(5.0));
        assert_eq!(out[&(2, 2)], CellValue::Number(30.0));
        assert_eq!(out[&(3, 2)], CellValue::Number(9.0));
    }

    #[test]
    fn evaluation_errors_surface_as_error_cells() {
        let out = eval(&[
            ((1, 1), CellValue::Number(2.0)),
            ((1, 2), CellValue::Formula("=A1/0".into())),
        ]);
        assert_eq!(out[&(1, 2)], CellValue::Error("#DIV/0!".into()));
    }

    #[test]
    fn formula_text_without_equals_is_literal() {
        let out = eval(&[
            ((1, 1), CellValue::Formula("note".into())),
            ((1, 2), CellValue::Formula("12".into())),
        ]);
        assert_eq!(out[&(1, 1)], CellValue::Text("note".into()));
        assert_eq!(out[&(1, 2)], CellValue::Number(12.0));
    }

    #[test]
    fn sheets_without_formulas_skip_evaluation() {
        let out = eval(&[((1, 1), CellValue::Text("x".into()))]);
        assert!(out.is_empty());
    }
}
