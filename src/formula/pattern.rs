use anyhow::{Result, anyhow, bail};
use formualizer_parse::parser::ReferenceType;
use formualizer_parse::pretty::canonical_formula;
use formualizer_parse::{ASTNode, ASTNodeType};

pub fn parse_formula(formula: &str) -> Result<ASTNode> {
    let trimmed = formula.trim();
    let with_equals = if trimmed.starts_with('=') {
        trimmed.to_string()
    } else {
        format!("={}", trimmed)
    };
    formualizer_parse::parse(&with_equals)
        .map_err(|e| anyhow!("failed to parse formula '{}': {}", trimmed, e.message))
}

/// Re-anchor a formula written for one row onto a row `delta_row` below it.
/// Absolute rows, column-only ranges, named ranges and table references stay put.
pub fn shift_formula_rows(formula: &str, delta_row: i32) -> Result<String> {
    let mut ast = parse_formula(formula)?;
    if delta_row != 0 {
        shift_rows_in_place(&mut ast, delta_row)?;
    }
    Ok(canonical_formula(&ast))
}

fn shift_rows_in_place(node: &mut ASTNode, delta_row: i32) -> Result<()> {
    match &mut node.node_type {
        ASTNodeType::Reference {
            original,
            reference,
        } => {
            shift_reference_rows(reference, delta_row)?;
            *original = reference.to_string();
        }
        ASTNodeType::UnaryOp { expr, .. } => {
            shift_rows_in_place(expr, delta_row)?;
        }
        ASTNodeType::BinaryOp { left, right, .. } => {
            shift_rows_in_place(left, delta_row)?;
            shift_rows_in_place(right, delta_row)?;
        }
        ASTNodeType::Function { args, .. } => {
            for arg in args.iter_mut() {
                shift_rows_in_place(arg, delta_row)?;
            }
        }
        ASTNodeType::Array(rows) => {
            for row in rows.iter_mut() {
                for cell in row.iter_mut() {
                    shift_rows_in_place(cell, delta_row)?;
                }
            }
        }
        ASTNodeType::Literal(_) => {}
    }
    Ok(())
}

fn shift_reference_rows(reference: &mut ReferenceType, delta_row: i32) -> Result<()> {
    match reference {
        ReferenceType::Cell { row, row_abs, .. } => {
            *row = shift_row(*row, *row_abs, delta_row)?;
        }
        ReferenceType::Range {
            start_row,
            end_row,
            start_row_abs,
            end_row_abs,
            ..
        } => {
            if let Some(row) = start_row.as_mut() {
                *row = shift_row(*row, *start_row_abs, delta_row)?;
            }
            if let Some(row) = end_row.as_mut() {
                *row = shift_row(*row, *end_row_abs, delta_row)?;
            }
        }
        ReferenceType::Table(_) | ReferenceType::NamedRange(_) | ReferenceType::External(_) => {}
    }
    Ok(())
}

fn shift_row(row: u32, abs: bool, delta: i32) -> Result<u32> {
    if abs {
        return Ok(row);
    }
    let shifted = row as i64 + delta as i64;
    if shifted < 1 {
        bail!("shift would move reference above row 1");
    }
    Ok(shifted as u32)
}
