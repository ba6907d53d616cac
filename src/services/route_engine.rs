use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PolicyViolation, ServiceError};
use crate::models::{
    CellCode, DiscrepancyKind, DiscrepancyRecord, DiscrepancyTag, Line, LineId, RouteItem,
    RouteStep, RouteStepStatus,
};

/// Handle for a scheduled automatic advance. Stale once the operator navigates manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceTicket {
    pub route_generation: u64,
    pub step_index: usize,
}

/// Cell-by-cell picking route over a reconciled line table.
///
/// Invariant: at most one step is `current`, every step before it is closed and none after it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    steps: Vec<RouteStep>,
    current: usize,
    awaiting_product: bool,
    generation: u64,
    missing: Vec<DiscrepancyRecord>,
}

impl Route {
    /// Groups lines by cell in first-seen order. Lines without a cell share one step.
    pub fn build(lines: &[Line]) -> Self {
        let mut steps: Vec<RouteStep> = Vec::new();
        for line in lines {
            let cell = line.cell_id.as_ref().map(|c| c.trim().to_ascii_uppercase());
            let item = RouteItem {
                line_id: line.id.clone(),
                product_name: line.product_name.clone(),
                barcode: line.barcode.clone(),
                sku: line.product_sku.clone(),
                quantity_plan: line.quantity_plan,
            };
            match steps.iter_mut().find(|step| step.cell_id == cell) {
                Some(step) => step.items.push(item),
                None => steps.push(RouteStep {
                    cell_id: cell,
                    items: vec![item],
                    status: RouteStepStatus::Pending,
                }),
            }
        }

        let mut route = Self {
            steps,
            current: 0,
            awaiting_product: false,
            generation: 0,
            missing: Vec::new(),
        };
        route.enter_current();
        route
    }

    /// Builds the route for a reopened document: leading steps that are already filled are
    /// closed so the operator resumes at the first unfilled cell.
    pub fn resume(lines: &[Line]) -> Self {
        let mut route = Self::build(lines);
        while !route.is_complete() && route.step_filled(lines) {
            route.close_current(RouteStepStatus::Completed);
        }
        route
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    pub fn current_index(&self) -> Option<usize> {
        (self.current < self.steps.len()).then_some(self.current)
    }

    pub fn current_step(&self) -> Option<&RouteStep> {
        self.steps.get(self.current)
    }

    pub fn current_cell(&self) -> Option<&str> {
        self.current_step().and_then(|step| step.cell_id.as_deref())
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.steps.len()
    }

    pub fn is_awaiting_product(&self) -> bool {
        self.awaiting_product
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Shortages recorded through "not in cell".
    pub fn missing(&self) -> &[DiscrepancyRecord] {
        &self.missing
    }

    /// Confirms the operator is at the current cell. A different cell is rejected without any
    /// state change.
    pub fn scan_cell(&mut self, cell: &CellCode) -> Result<usize, ServiceError> {
        let index = self.current_index().ok_or(PolicyViolation::RouteComplete)?;
        match self.steps[index].cell_id.as_deref() {
            Some(expected) if cell.matches(expected) => {
                self.awaiting_product = true;
                Ok(index)
            }
            Some(expected) => Err(PolicyViolation::WrongCell {
                expected: expected.to_string(),
                scanned: cell.to_string(),
            }
            .into()),
            None => {
                self.awaiting_product = true;
                Ok(index)
            }
        }
    }

    /// Checks that a resolved line may be picked right now.
    pub fn check_product(&self, line: &Line) -> Result<(), ServiceError> {
        let step = self.current_step().ok_or(PolicyViolation::RouteComplete)?;
        if !self.awaiting_product {
            return Err(PolicyViolation::ScanCellFirst {
                expected_cell: step.cell_id.clone(),
            }
            .into());
        }
        if !step.contains_line(&line.id) {
            return Err(PolicyViolation::WrongCellProduct {
                product: line.product_name.clone(),
                expected_cell: line.cell_id.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// True when every product of the current step is at or above plan.
    pub fn step_filled(&self, lines: &[Line]) -> bool {
        self.current_step()
            .map(|step| {
                step.items.iter().all(|item| {
                    find_line(lines, &item.line_id)
                        .map(|line| line.quantity_fact >= item.quantity_plan)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// Ticket for advancing the current step if it is filled.
    pub fn ticket(&self, lines: &[Line]) -> Option<AdvanceTicket> {
        if !self.step_filled(lines) {
            return None;
        }
        self.current_index().map(|step_index| AdvanceTicket {
            route_generation: self.generation,
            step_index,
        })
    }

    /// Completes the step a ticket was issued for. Stale tickets, or a step that no longer
    /// is filled, leave the route untouched and return false.
    pub fn apply_ticket(&mut self, ticket: AdvanceTicket, lines: &[Line]) -> bool {
        if ticket.route_generation != self.generation
            || self.current_index() != Some(ticket.step_index)
            || !self.step_filled(lines)
        {
            debug!(?ticket, generation = self.generation, "ignoring stale advance ticket");
            return false;
        }
        self.close_current(RouteStepStatus::Completed);
        true
    }

    /// Manual "next" for a filled step.
    pub fn confirm_step(&mut self, lines: &[Line]) -> Result<(), ServiceError> {
        let step = self.current_step().ok_or(PolicyViolation::RouteComplete)?;
        if !self.step_filled(lines) {
            return Err(PolicyViolation::StepIncomplete {
                cell: step.cell_id.clone().unwrap_or_default(),
            }
            .into());
        }
        self.close_current(RouteStepStatus::Completed);
        Ok(())
    }

    /// Leaves the current step regardless of its completion state.
    pub fn skip(&mut self) -> Result<(), ServiceError> {
        if self.is_complete() {
            return Err(PolicyViolation::RouteComplete.into());
        }
        self.close_current(RouteStepStatus::Skipped);
        Ok(())
    }

    /// "Not in cell": records a missing shortage for every under-plan product of the current
    /// step, then skips it. Returns the records added.
    pub fn not_in_cell(&mut self, lines: &[Line]) -> Result<Vec<DiscrepancyRecord>, ServiceError> {
        let step = self.current_step().ok_or(PolicyViolation::RouteComplete)?;
        let records: Vec<DiscrepancyRecord> = step
            .items
            .iter()
            .filter_map(|item| {
                let actual = find_line(lines, &item.line_id)
                    .map(|line| line.quantity_fact)
                    .unwrap_or(0);
                (actual < item.quantity_plan).then(|| DiscrepancyRecord {
                    line_id: item.line_id.clone(),
                    product_name: item.product_name.clone(),
                    planned: item.quantity_plan,
                    actual,
                    kind: DiscrepancyKind::Shortage,
                    tag: Some(DiscrepancyTag::Missing),
                })
            })
            .collect();

        self.missing.extend(records.iter().cloned());
        self.close_current(RouteStepStatus::Skipped);
        Ok(records)
    }

    /// Checks the single-current-step invariant.
    pub fn is_consistent(&self) -> bool {
        let current_count = self
            .steps
            .iter()
            .filter(|step| step.status == RouteStepStatus::Current)
            .count();
        if self.is_complete() {
            return current_count == 0 && self.steps.iter().all(|step| step.status.is_closed());
        }
        current_count == 1
            && self.steps[self.current].status == RouteStepStatus::Current
            && self.steps[..self.current]
                .iter()
                .all(|step| step.status.is_closed())
            && self.steps[self.current + 1..]
                .iter()
                .all(|step| step.status == RouteStepStatus::Pending)
    }

    fn close_current(&mut self, status: RouteStepStatus) {
        if let Some(step) = self.steps.get_mut(self.current) {
            step.status = status;
        }
        self.current += 1;
        self.generation += 1;
        self.enter_current();
    }

    fn enter_current(&mut self) {
        self.awaiting_product = false;
        if let Some(step) = self.steps.get_mut(self.current) {
            step.status = RouteStepStatus::Current;
            // Nothing to scan first when the step has no cell.
            self.awaiting_product = step.cell_id.is_none();
        }
    }
}

fn find_line<'a>(lines: &'a [Line], id: &LineId) -> Option<&'a Line> {
    lines.iter().find(|line| &line.id == id)
}
