//! Operation contract and request dispatch.

use crate::impact;
use refit_foundation::{PlanOptions, RefactorRequest, RefactoringPlan, RefitResult};
use refit_workspace::Workspace;
use tracing::{debug, info};

/// Read-only inputs every operation plans against
#[derive(Clone, Copy)]
pub struct PlanContext<'w> {
    pub workspace: &'w Workspace,
    pub options: PlanOptions,
}

impl<'w> PlanContext<'w> {
    pub fn new(workspace: &'w Workspace, options: PlanOptions) -> Self {
        Self { workspace, options }
    }
}

/// A refactoring kind.
///
/// `validate` performs the checks that need the workspace but no edit
/// synthesis (names resolve, identifiers are legal); `plan` produces the
/// changes and their impact. Neither touches the filesystem.
pub trait Operation {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()>;

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan>;
}

/// The operation implementing a request
pub fn operation_for(request: &RefactorRequest) -> &dyn Operation {
    match request {
        RefactorRequest::MoveSymbol(r) => r,
        RefactorRequest::RenameSymbol(r) => r,
        RefactorRequest::RenameInterfaceMethod(r) => r,
        RefactorRequest::RenameLocal(r) => r,
        RefactorRequest::ExtractFunction(r) => r,
        RefactorRequest::ExtractMethod(r) => r,
        RefactorRequest::ExtractInterface(r) => r,
        RefactorRequest::ExtractVariable(r) => r,
        RefactorRequest::ExtractConstant(r) => r,
        RefactorRequest::ExtractBlock(r) => r,
        RefactorRequest::InlineMethod(r) => r,
        RefactorRequest::InlineFunction(r) => r,
        RefactorRequest::InlineVariable(r) => r,
        RefactorRequest::InlineConstant(r) => r,
        RefactorRequest::ChangeSignature(r) => r,
        RefactorRequest::SafeDelete(r) => r,
    }
}

/// Validate and plan one request, then gate the plan on its issues.
///
/// Hard issues always reject; other Error issues reject unless
/// `options.force` is set.
pub fn plan_request(ctx: &PlanContext<'_>, request: &RefactorRequest) -> RefitResult<RefactoringPlan> {
    request.check_shape()?;
    let operation = operation_for(request);
    debug!(operation = request.operation_name(), "Validating request");
    operation.validate(ctx)?;
    let plan = operation.plan(ctx)?;
    impact::gate(&plan, &ctx.options)?;
    info!(
        operation = request.operation_name(),
        changes = plan.changes.len(),
        files = plan.affected_files.len(),
        issues = plan.impact.issues.len(),
        "Planned refactoring"
    );
    Ok(plan)
}
