use crate::models::{DiscrepancyKind, DiscrepancyRecord, DiscrepancyReport, DiscrepancyTag, Line};

pub fn classify(line: &Line) -> DiscrepancyKind {
    classify_quantities(line.quantity_plan, line.quantity_fact)
}

pub fn classify_quantities(plan: u32, fact: u32) -> DiscrepancyKind {
    match fact.cmp(&plan) {
        std::cmp::Ordering::Less => DiscrepancyKind::Shortage,
        std::cmp::Ordering::Greater => DiscrepancyKind::Surplus,
        std::cmp::Ordering::Equal => DiscrepancyKind::Ok,
    }
}

pub fn record_for(line: &Line, tag: Option<DiscrepancyTag>) -> DiscrepancyRecord {
    DiscrepancyRecord {
        line_id: line.id.clone(),
        product_name: line.product_name.clone(),
        planned: line.quantity_plan,
        actual: line.quantity_fact,
        kind: classify(line),
        tag,
    }
}

/// Document-level report: every line whose fact differs from its plan.
pub fn report(lines: &[Line]) -> DiscrepancyReport {
    let records: Vec<DiscrepancyRecord> = lines
        .iter()
        .filter(|line| classify(line) != DiscrepancyKind::Ok)
        .map(|line| record_for(line, None))
        .collect();

    DiscrepancyReport {
        has_discrepancy: !records.is_empty(),
        records,
    }
}
