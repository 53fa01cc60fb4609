//! Orchestrator main loop
//!
//! `Planning → Executing → Verifying → Done | Retrying | Failed(reason)`.
//! Each planning cycle consumes one attempt. A failed verification or an
//! unusable plan re-plans from scratch with the failure injected as
//! context while attempts remain.

use crate::error::{Error, FailureReason, PipelineFailure};
use crate::executor::Draft;
use crate::plan::Plan;
use crate::planner::PlanningFeedback;
use crate::request::Request;
use crate::verifier::Verdict;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::core::Orchestrator;
use super::types::{Answer, AnswerStatus, RunState};

/// Progress visible after the run future is dropped (deadline)
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    transitions: Vec<RunState>,
}

impl Progress {
    fn enter(&mut self, state: RunState) {
        info!(attempt = self.attempts, state = %state, "Pipeline state");
        self.transitions.push(state);
    }
}

/// A draft that failed verification, kept in case no later one passes
struct Candidate {
    plan: Plan,
    draft: Draft,
    verdict: Verdict,
}

impl Candidate {
    fn missing(&self) -> usize {
        self.verdict.missing_categories.len()
    }
}

impl Orchestrator {
    /// Answer a request
    ///
    /// `timeout` overrides the configured deadline. Always returns either a
    /// run report or a failure with a code from [`FailureReason`].
    pub async fn answer(
        &self,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Answer, PipelineFailure> {
        self.answer_with_cancel(text, timeout, CancellationToken::new())
            .await
    }

    /// Answer a request, observing an external cancellation token
    #[instrument(skip_all, fields(request_id = tracing::field::Empty))]
    pub async fn answer_with_cancel(
        &self,
        text: &str,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<Answer, PipelineFailure> {
        let request = Request::new(text);
        tracing::Span::current().record("request_id", tracing::field::display(request.id));
        let started = Instant::now();
        let mut progress = Progress::default();

        let result = match timeout.or(self.config.timeout) {
            Some(limit) => {
                match tokio::time::timeout(limit, self.run(&request, &cancel, &mut progress)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        cancel.cancel();
                        Err(Error::Timeout(limit.as_millis() as u64))
                    }
                }
            }
            None => self.run(&request, &cancel, &mut progress).await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(mut answer) => {
                answer.elapsed_ms = elapsed_ms;
                answer.transitions = progress.transitions;
                info!(
                    verified = answer.verified,
                    attempts = answer.attempts,
                    tools = answer.invocation_count(),
                    elapsed_ms,
                    "Request answered"
                );
                Ok(answer)
            }
            Err(e) => {
                let reason = e.reason();
                progress.enter(RunState::Failed(reason));
                warn!(reason = %reason, error = %e, elapsed_ms, "Request failed");
                Err(PipelineFailure::from_error(
                    &e,
                    request.id,
                    progress.attempts,
                ))
            }
        }
    }

    /// Plan only, without executing (re-plans on unusable plans)
    pub async fn plan_only(&self, text: &str) -> Result<Plan, PipelineFailure> {
        let request = Request::new(text);
        let catalogue = self.catalogue();
        let cancel = CancellationToken::new();
        let mut feedback = None;

        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self
                .planner
                .plan(&request, &catalogue, feedback.as_ref(), &cancel)
                .await
            {
                Ok(plan) => return Ok(plan),
                Err(Error::InvalidPlan(detail)) if attempt < max_attempts => {
                    feedback = Some(PlanningFeedback::invalid_plan(detail));
                }
                Err(e) => return Err(PipelineFailure::from_error(&e, request.id, attempt)),
            }
        }
        Err(PipelineFailure::new(
            FailureReason::InvalidPlan,
            "no planning attempts configured",
        ))
    }

    async fn run(
        &self,
        request: &Request,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> crate::Result<Answer> {
        let catalogue = self.catalogue();
        let max_attempts = self.config.max_attempts.max(1);
        let mut feedback: Option<PlanningFeedback> = None;
        let mut best: Option<Candidate> = None;

        while progress.attempts < max_attempts {
            progress.attempts += 1;
            let attempt = progress.attempts;
            if attempt > 1 {
                progress.enter(RunState::Retrying);
            }

            progress.enter(RunState::Planning);
            let plan = match self
                .planner
                .plan(request, &catalogue, feedback.as_ref(), cancel)
                .await
            {
                Ok(plan) => plan,
                Err(Error::InvalidPlan(detail)) => {
                    warn!(attempt, error = %detail, "Unusable plan");
                    if attempt < max_attempts {
                        feedback = Some(PlanningFeedback::invalid_plan(detail));
                        continue;
                    }
                    return match best {
                        Some(candidate) => {
                            progress.enter(RunState::Failed(FailureReason::VerificationExhausted));
                            Ok(self.report(request, candidate, attempt, false))
                        }
                        None => Err(Error::InvalidPlan(detail)),
                    };
                }
                Err(e) => return Err(e),
            };

            progress.enter(RunState::Executing);
            let draft = self.executor.execute(request, &plan, cancel).await?;

            progress.enter(RunState::Verifying);
            let verdict = self.verifier.verify(request, &plan, &draft, cancel).await?;

            if verdict.passed() {
                progress.enter(RunState::Done);
                let candidate = Candidate {
                    plan,
                    draft,
                    verdict,
                };
                return Ok(self.report(request, candidate, attempt, true));
            }

            warn!(
                attempt,
                missing = ?verdict.missing_categories,
                issues = ?verdict.issues,
                "Verification failed"
            );
            feedback = Some(PlanningFeedback::from_verdict(&verdict, &plan));
            let candidate = Candidate {
                plan,
                draft,
                verdict,
            };
            // Fewest missing categories wins; ties go to the latest draft
            best = match best {
                Some(previous) if previous.missing() < candidate.missing() => Some(previous),
                _ => Some(candidate),
            };
        }

        match best {
            Some(candidate) => {
                progress.enter(RunState::Failed(FailureReason::VerificationExhausted));
                Ok(self.report(request, candidate, progress.attempts, false))
            }
            None => Err(Error::Internal(
                "attempt bound reached without a draft".to_string(),
            )),
        }
    }

    fn report(&self, request: &Request, candidate: Candidate, attempts: u32, verified: bool) -> Answer {
        let Candidate {
            plan,
            draft,
            verdict,
        } = candidate;
        Answer {
            request_id: request.id,
            text: draft.text,
            verified,
            status: if verified {
                AnswerStatus::Verified
            } else {
                AnswerStatus::Unverified
            },
            reason: (!verified).then_some(FailureReason::VerificationExhausted),
            attempts,
            plan,
            tool_results: draft.tool_results,
            verdict,
            unavailable: draft.unavailable,
            elapsed_ms: 0,
            transitions: Vec::new(),
        }
    }
}
