use tracing::debug;

use crate::errors::{PolicyViolation, ScanGuidance, ServiceError};
use crate::models::{CellCode, CellScope, DocumentType, Line, ProductRef, ReconcilePolicy};

const MAX_CODE_LEN: usize = 128;

/// Everything the resolver looks at for one scan. Borrowed from the session, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub doc_type: DocumentType,
    pub policy: &'a ReconcilePolicy,
    pub active_cell: Option<&'a CellCode>,
    pub lines: &'a [Line],
    /// Maximum number of product names returned as guidance.
    pub guidance_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Cell(CellCode),
    /// Index of the matched line in the context's line table.
    Line(usize),
    /// No line matched and the workflow counts blind: a zero-plan line should be inserted.
    Placeholder {
        product: ProductRef,
        cell_id: Option<String>,
    },
}

/// Classifies a raw scanner payload. Pure: the only side effect it can ask for is a placeholder
/// insert, which the caller performs as an ordinary line insert.
pub fn resolve(code: &str, ctx: &ScanContext<'_>) -> Result<Resolution, ServiceError> {
    let code = validate_code(code)?;

    if let Some(cell) = CellCode::parse(code) {
        return Ok(Resolution::Cell(cell));
    }

    if ctx.policy.cell_scope == CellScope::RequireActiveCell && ctx.active_cell.is_none() {
        return Err(ServiceError::not_found(
            "scan cell first",
            ScanGuidance::products(pending_names(ctx.lines.iter(), ctx.guidance_limit)),
        ));
    }

    let restrict_to = match ctx.policy.cell_scope {
        CellScope::None => None,
        CellScope::RestrictToActiveCell | CellScope::RequireActiveCell => ctx.active_cell,
    };

    let in_scope = |line: &Line| match restrict_to {
        Some(cell) => line.in_cell(cell.as_str()),
        None => true,
    };

    if let Some(index) = best_match(ctx.lines, code, in_scope) {
        return Ok(Resolution::Line(index));
    }

    // Known product, but assigned elsewhere.
    let elsewhere = restrict_to.and_then(|_| ctx.lines.iter().find(|line| line.matches_code(code)));

    if ctx.policy.blind_count {
        let product = elsewhere
            .map(Line::product)
            .unwrap_or_else(|| ProductRef::unknown(code));
        debug!(code, doc_type = %ctx.doc_type, "unmatched code, creating blind-count line");
        return Ok(Resolution::Placeholder {
            product,
            cell_id: ctx.active_cell.map(|cell| cell.as_str().to_string()),
        });
    }

    if let Some(line) = elsewhere {
        return Err(PolicyViolation::WrongCellProduct {
            product: line.product_name.clone(),
            expected_cell: line.cell_id.clone(),
        }
        .into());
    }

    let scope = ctx.lines.iter().filter(|line| in_scope(line));
    Err(ServiceError::not_found(
        format!("code {} is not part of this document", code),
        ScanGuidance::products(pending_names(scope, ctx.guidance_limit)),
    ))
}

/// Rejects blank, oversized or control-character payloads. Returns the trimmed code.
pub fn validate_code(raw: &str) -> Result<&str, ServiceError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(ServiceError::ValidationError("empty scan code".to_string()));
    }
    if code.len() > MAX_CODE_LEN || code.chars().any(char::is_control) {
        return Err(ServiceError::ValidationError(format!(
            "malformed scan code {:?}",
            code
        )));
    }
    Ok(code)
}

/// First in-scope match still short of its plan, else the first in-scope match.
fn best_match(lines: &[Line], code: &str, in_scope: impl Fn(&Line) -> bool) -> Option<usize> {
    let mut first = None;
    for (index, line) in lines.iter().enumerate() {
        if !in_scope(line) || !line.matches_code(code) {
            continue;
        }
        if !line.status.is_done() {
            return Some(index);
        }
        first.get_or_insert(index);
    }
    first
}

/// Distinct names of lines not yet completed, in table order.
pub fn pending_names<'a>(lines: impl Iterator<Item = &'a Line>, limit: usize) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in lines.filter(|line| !line.status.is_done()) {
        if names.len() >= limit {
            break;
        }
        if !names.contains(&line.product_name) {
            names.push(line.product_name.clone());
        }
    }
    names
}
