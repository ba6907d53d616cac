use crate::errors::{PolicyViolation, ServiceError};
use crate::models::{Line, LineStatus, ReconcilePolicy, SurplusPolicy};

/// Fact quantity after applying a relative delta or an absolute value.
///
/// Relative deltas clamp at zero; absolute values must be non-negative.
pub fn target_fact(current: u32, delta: i64, absolute: bool) -> Result<u32, ServiceError> {
    let raw = if absolute {
        if delta < 0 {
            return Err(ServiceError::ValidationError(format!(
                "absolute quantity must not be negative, got {}",
                delta
            )));
        }
        delta
    } else {
        (i64::from(current) + delta).max(0)
    };

    u32::try_from(raw)
        .map_err(|_| ServiceError::ValidationError(format!("quantity {} is out of range", raw)))
}

/// Status for a new fact under the document-type policy.
///
/// Exceeding the plan is only accepted when the policy allows surplus or the operator confirmed.
pub fn derive_status(
    new_fact: u32,
    plan: u32,
    policy: &ReconcilePolicy,
    confirmed: bool,
) -> Result<LineStatus, SurplusRejected> {
    let status = LineStatus::derive(new_fact, plan);
    if status == LineStatus::Over
        && policy.surplus == SurplusPolicy::RequireConfirmation
        && !confirmed
    {
        return Err(SurplusRejected {
            plan,
            attempted: new_fact,
        });
    }
    Ok(status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurplusRejected {
    pub plan: u32,
    pub attempted: u32,
}

/// Applies a quantity change to a line and returns the updated copy.
///
/// Confirmation is only demanded when the change actually increases an over-plan fact, so
/// correcting an already confirmed surplus downwards never prompts again.
pub fn apply_delta(
    line: &Line,
    delta: i64,
    absolute: bool,
    policy: &ReconcilePolicy,
    confirmed: bool,
) -> Result<Line, ServiceError> {
    let new_fact = target_fact(line.quantity_fact, delta, absolute)?;
    let increasing = new_fact > line.quantity_fact;

    let status = derive_status(new_fact, line.quantity_plan, policy, confirmed || !increasing)
        .map_err(|rejected| PolicyViolation::PlanExceeded {
            line_id: line.id.clone(),
            plan: rejected.plan,
            attempted: rejected.attempted,
        })?;

    let mut updated = line.clone();
    updated.quantity_fact = new_fact;
    updated.status = status;
    Ok(updated)
}
