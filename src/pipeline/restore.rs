use crate::backend::Sheet;
use crate::config::SheetLayout;
use crate::formula::prepare_template_row;
use crate::model::SheetRegion;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreReport {
    pub region: SheetRegion,
    pub formulas: usize,
    pub untranslated: Vec<usize>,
}

/// Rewrite the first data row's formula region from the template row above it.
pub async fn restore_formulas(
    dest: &dyn Sheet,
    layout: &SheetLayout,
    translate: bool,
) -> Result<RestoreReport> {
    let template = layout.template_region();
    let cells = dest
        .read_values(template)
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

    let row_delta = translate.then(|| (layout.data_start_row - layout.template_row()) as i32);
    let mut prepared = prepare_template_row(&cells, row_delta);
    prepared
        .formulas
        .resize(layout.formula_cols() as usize, String::new());

    let target = layout.first_formula_row_region();
    let formulas = prepared.populated();
    dest.write_formulas(target, vec![prepared.formulas]).await?;

    tracing::info!(
        sheet = dest.name(),
        formulas,
        from = %template,
        to = %target,
        "restored template formulas"
    );

    Ok(RestoreReport {
        region: target,
        formulas,
        untranslated: prepared.untranslated,
    })
}
