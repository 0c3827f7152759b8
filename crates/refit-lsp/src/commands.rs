//! Arguments of `refit.applyRefactoring`

use refit_foundation::{PlanOptions, RefactorRequest, RefitError, RefitResult};
use serde::Deserialize;
use serde_json::Value;

/// What the command should plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    Single(RefactorRequest),
    Batch(Vec<RefactorRequest>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apply {
    pub work: Work,
    pub options: PlanOptions,
    /// Return the plan and its diff instead of writing
    pub dry_run: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    request: Option<RefactorRequest>,
    #[serde(default)]
    requests: Option<Vec<RefactorRequest>>,
    #[serde(default)]
    options: PlanOptions,
    #[serde(default)]
    dry_run: bool,
}

impl Apply {
    /// Accepts a bare request (`{"kind": ...}`) or an envelope carrying
    /// `request` or `requests` plus `options` and `dryRun`
    pub fn parse(arguments: Vec<Value>) -> RefitResult<Self> {
        let Some(first) = arguments.into_iter().next() else {
            return Err(RefitError::usage("refit.applyRefactoring needs one argument"));
        };
        if first.get("kind").is_some() {
            return Ok(Self {
                work: Work::Single(serde_json::from_value(first)?),
                options: PlanOptions::default(),
                dry_run: false,
            });
        }
        let envelope: Envelope = serde_json::from_value(first)?;
        let work = match (envelope.request, envelope.requests) {
            (Some(request), None) => Work::Single(request),
            (None, Some(requests)) if !requests.is_empty() => Work::Batch(requests),
            (None, Some(_)) => return Err(RefitError::usage("batch contains no requests")),
            _ => {
                return Err(RefitError::usage(
                    "expected exactly one of 'request' or 'requests'",
                ))
            }
        };
        Ok(Self {
            work,
            options: envelope.options,
            dry_run: envelope.dry_run,
        })
    }

    pub fn operation(&self) -> &'static str {
        match &self.work {
            Work::Single(request) => request.operation_name(),
            Work::Batch(_) => "batch",
        }
    }
}
