//! The executor: the perceive-plan-act loop.
//!
//! One [`Executor`] is constructed per run and owns the subprocess facade,
//! the monotonically increasing correlation-id counter, and the executor's
//! own memory of the last `RunTests` outcome — these live on the executor
//! instance, not as global state, so concurrent runs against different
//! repositories never interfere with each other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use goap_git::facade::SubprocessFacade;

use crate::action::{ExecutionContext, PlanningContext, RegisteredAction};
use crate::config::Config;
use crate::error::GoapError;
use crate::goal;
use crate::observer;
use crate::planner::{self, Plan};
use crate::report::{ExecutionReport, Level, ReportRecord, TerminalStatus};
use crate::state::{RepoState, RepoStateDraft, StateDigest, TestsResult};
use crate::actions;

/// Action names whose failure is classified as unrecoverable: the executor
/// terminates `fatal` rather than replanning.
fn is_unrecoverable(action_name: &str) -> bool {
    matches!(action_name, "PushWithLease" | "RebaseAbort")
}

/// Hard ceiling on loop iterations, independent of `replan_count`: a step
/// can succeed, report no drift, and still leave the observed state's full
/// digest unchanged (a no-op under dry-run being the common case), in which
/// case neither the drift nor the failure path ever fires and `replan_count`
/// never advances. This bound guarantees termination regardless.
const MAX_ITERATIONS: u64 = 10_000;

/// Consecutive no-drift steps that leave the full `digest()` unchanged before
/// the loop is considered stalled and terminated. One is not enough: a
/// multi-action plan can legitimately leave the digest briefly unchanged
/// between bookkeeping steps, so this gives a little slack before giving up.
const MAX_STALLED_STEPS: u32 = 3;

/// `true` if `predicted` and `observed` agree on the safety-relevant
/// dimensions: the conflict *set* (by path), the in-flight rebase/merge
/// booleans, and the diverged counts within `tolerance` (default `±1`,
/// configurable via `safety.drift_tolerance`).
fn matches_within_tolerance(predicted: &RepoState, observed: &RepoState, tolerance: u32) -> bool {
    let mut predicted_paths: Vec<_> = predicted.conflicts.iter().map(|c| &c.path).collect();
    let mut observed_paths: Vec<_> = observed.conflicts.iter().map(|c| &c.path).collect();
    predicted_paths.sort();
    observed_paths.sort();

    predicted_paths == observed_paths
        && predicted.ongoing_rebase == observed.ongoing_rebase
        && predicted.ongoing_merge == observed.ongoing_merge
        && predicted.diverged_local.abs_diff(observed.diverged_local) <= tolerance
        && predicted.diverged_remote.abs_diff(observed.diverged_remote) <= tolerance
}

/// Drives one repository from its current state to `config.goal`.
pub struct Executor {
    facade: SubprocessFacade,
    next_correlation_id: u64,
    last_tests_result: TestsResult,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Construct an executor with a fresh facade and correlation counter.
    #[must_use]
    pub fn new() -> Self {
        Self { facade: SubprocessFacade::new(), next_correlation_id: 0, last_tests_result: TestsResult::Unknown }
    }

    fn correlation_id(&mut self) -> u64 {
        let id = self.next_correlation_id;
        self.next_correlation_id += 1;
        id
    }

    fn record(
        &mut self,
        level: Level,
        action: Option<String>,
        predicted_state_digest: Option<StateDigest>,
        observed_state_digest: Option<StateDigest>,
        exit_code: Option<i32>,
        message: String,
    ) -> ReportRecord {
        ReportRecord {
            timestamp: chrono::Utc::now(),
            level,
            correlation_id: self.correlation_id(),
            action,
            predicted_state_digest,
            observed_state_digest,
            exit_code,
            message,
        }
    }

    /// Overlay the executor's own memory of the last `RunTests` outcome
    /// onto a freshly observed state. Git has no notion of a test result,
    /// so [`observer::observe`] always reports [`TestsResult::Unknown`];
    /// this run-local overlay is never persisted to disk; there is no
    /// history kept between runs.
    fn overlay_tests_result(&self, observed: RepoState, config: &Config) -> RepoState {
        if observed.tests_last_result != TestsResult::Unknown || self.last_tests_result == TestsResult::Unknown {
            return observed;
        }
        let mut draft = RepoStateDraft::from_state(&observed);
        draft.tests_last_result = self.last_tests_result;
        draft.freeze(config)
    }

    /// Run the perceive-plan-act loop until the goal is reached, the run is
    /// cancelled, or a terminal error condition is hit.
    ///
    /// `cancel` is checked at the top of every iteration: a cancellation
    /// mid-action still finishes the in-flight subprocess, but the loop
    /// attempts no further actions afterward.
    #[tracing::instrument(skip(self, config, cancel), fields(repo = %repo_root.display()))]
    pub fn execute(&mut self, repo_root: &Path, config: &Config, cancel: &AtomicBool) -> ExecutionReport {
        let mut records = Vec::new();
        let mut replan_count: u32 = 0;
        let mut final_state_digest: Option<StateDigest> = None;
        let mut current_plan: Option<Plan> = None;
        let mut iteration: u64 = 0;
        let mut stalled_steps: u32 = 0;

        let registry = actions::registry();
        let by_name: HashMap<&str, &RegisteredAction> = registry.iter().map(|a| (a.name, a)).collect();
        let observation_timeout = Duration::from_secs(config.safety.observation_timeout_sec);
        let mutating_timeout = Duration::from_secs(config.safety.mutating_timeout_sec);

        loop {
            iteration += 1;
            let _iteration_span = tracing::info_span!("iteration", iteration).entered();

            if iteration > MAX_ITERATIONS {
                tracing::warn!(iteration, "iteration bound exceeded, terminating");
                records.push(self.record(
                    Level::Error,
                    None,
                    None,
                    None,
                    None,
                    format!("exceeded {MAX_ITERATIONS} iterations without reaching the goal"),
                ));
                return self.finish(records, TerminalStatus::ExhaustedReplans, replan_count, final_state_digest);
            }

            if cancel.load(Ordering::SeqCst) {
                tracing::info!("cancellation observed, finishing in-flight work only");
                return self.finish(records, TerminalStatus::Aborted, replan_count, final_state_digest);
            }

            let observed = match observer::observe(&mut self.facade, repo_root, config) {
                Ok(s) => self.overlay_tests_result(s, config),
                Err(err) => {
                    let msg = format!("observe failed: {err}");
                    let code = err.exit_code();
                    records.push(self.record(Level::Error, None, None, None, Some(code), msg));
                    return self.finish(records, TerminalStatus::Fatal, replan_count, final_state_digest);
                }
            };
            final_state_digest = Some(observed.digest());

            if goal::satisfied(&observed, &config.goal) {
                records.push(self.record(Level::Info, None, None, None, Some(0), "goal satisfied".to_owned()));
                return self.finish(records, TerminalStatus::GoalReached, replan_count, final_state_digest);
            }

            if current_plan.as_ref().is_none_or(|p| p.actions.is_empty()) {
                let _plan_span = tracing::info_span!("plan", replan_count).entered();
                match planner::plan(&observed, &config.goal, config) {
                    Ok(p) if p.actions.is_empty() => {
                        records.push(self.record(Level::Info, None, None, None, Some(0), "planner reports goal already satisfied".to_owned()));
                        return self.finish(records, TerminalStatus::GoalReached, replan_count, final_state_digest);
                    }
                    Ok(p) => current_plan = Some(p),
                    Err(GoapError::NoPlan { reason }) => {
                        records.push(self.record(Level::Error, None, None, None, Some(3), format!("no plan found: {reason}")));
                        return self.finish(records, TerminalStatus::NoPlan, replan_count, final_state_digest);
                    }
                    Err(err) => {
                        let code = err.exit_code();
                        records.push(self.record(Level::Error, None, None, None, Some(code), err.to_string()));
                        return self.finish(records, TerminalStatus::Fatal, replan_count, final_state_digest);
                    }
                }
            }

            let step = current_plan.as_ref().expect("populated above").actions[0].clone();
            let Some(action) = by_name.get(step.name.as_str()).copied() else {
                records.push(self.record(
                    Level::Error,
                    Some(step.name.clone()),
                    None,
                    None,
                    Some(2),
                    "plan named an action absent from the registry".to_owned(),
                ));
                return self.finish(records, TerminalStatus::Fatal, replan_count, final_state_digest);
            };

            let ctx = PlanningContext::new(repo_root.to_path_buf(), observation_timeout);
            if !(action.applicable)(&observed, config, &ctx) {
                records.push(self.record(
                    Level::Error,
                    Some(step.name.clone()),
                    None,
                    None,
                    Some(2),
                    "action precondition failed against the freshly observed state (drift between observe and plan)".to_owned(),
                ));
                return self.finish(records, TerminalStatus::Fatal, replan_count, final_state_digest);
            }

            let predicted = (action.predict)(&observed, config, &ctx);

            let _action_span = tracing::info_span!("execute_action", action = step.name.as_str(), cost = step.cost).entered();
            tracing::info!("dispatching action");
            let mut exec_ctx = ExecutionContext {
                facade: &mut self.facade,
                repo_root,
                mutating_timeout,
                observation_timeout,
                dry_run: config.safety.dry_run,
            };
            let outcome = (action.execute)(&observed, config, &mut exec_ctx);
            drop(_action_span);

            if step.name == "RunTests" {
                self.last_tests_result = if outcome.is_ok() { TestsResult::Passed } else { TestsResult::Failed };
            }

            if let Err(err) = outcome {
                records.push(self.record(
                    Level::Warn,
                    Some(step.name.clone()),
                    Some(predicted.safety_digest()),
                    None,
                    None,
                    format!("action failed: {err}"),
                ));
                if is_unrecoverable(&step.name) {
                    return self.finish(records, TerminalStatus::Fatal, replan_count, final_state_digest);
                }
                replan_count += 1;
                if replan_count > config.safety.max_replans {
                    return self.finish(records, TerminalStatus::ExhaustedReplans, replan_count, final_state_digest);
                }
                current_plan = None;
                continue;
            }

            let reobserved = match observer::observe(&mut self.facade, repo_root, config) {
                Ok(s) => self.overlay_tests_result(s, config),
                Err(err) => {
                    let msg = format!("observe after {} failed: {err}", step.name);
                    let code = err.exit_code();
                    records.push(self.record(Level::Error, Some(step.name.clone()), None, None, Some(code), msg));
                    return self.finish(records, TerminalStatus::Fatal, replan_count, final_state_digest);
                }
            };
            final_state_digest = Some(reobserved.digest());

            let drift = !matches_within_tolerance(&predicted, &reobserved, config.safety.drift_tolerance);
            records.push(self.record(
                if drift { Level::Warn } else { Level::Info },
                Some(step.name.clone()),
                Some(predicted.safety_digest()),
                Some(reobserved.safety_digest()),
                None,
                if drift {
                    "drift detected between predicted and observed post-state, replanning".to_owned()
                } else {
                    "action completed as predicted".to_owned()
                },
            ));

            if drift {
                stalled_steps = 0;
                replan_count += 1;
                if replan_count > config.safety.max_replans {
                    return self.finish(records, TerminalStatus::ExhaustedReplans, replan_count, final_state_digest);
                }
                current_plan = None;
            } else {
                // No drift on the dimensions `matches_within_tolerance` checks is not the
                // same as real progress: a step suppressed by dry-run, or one whose only
                // effect lies outside those dimensions, leaves the full state digest
                // unchanged too. Track that separately so such a step can't be replanned
                // and "completed" forever without ever advancing `replan_count`.
                if reobserved.digest() == observed.digest() {
                    stalled_steps += 1;
                } else {
                    stalled_steps = 0;
                }
                if stalled_steps >= MAX_STALLED_STEPS {
                    records.push(self.record(
                        Level::Error,
                        Some(step.name.clone()),
                        None,
                        Some(reobserved.digest()),
                        None,
                        format!("no observable progress after {stalled_steps} consecutive drift-free steps"),
                    ));
                    return self.finish(records, TerminalStatus::ExhaustedReplans, replan_count, final_state_digest);
                }
                if let Some(plan) = current_plan.as_mut() {
                    plan.actions.remove(0);
                    if !plan.notes.is_empty() {
                        plan.notes.remove(0);
                    }
                }
            }
        }
    }

    fn finish(
        &mut self,
        records: Vec<ReportRecord>,
        terminal: TerminalStatus,
        replan_count: u32,
        final_state_digest: Option<StateDigest>,
    ) -> ExecutionReport {
        ExecutionReport { records, terminal, replan_count, final_state_digest }
    }

    /// The facade's dry-run journal, for callers that want to print it.
    #[must_use]
    pub fn journal(&self) -> &[String] {
        self.facade.journal()
    }
}

/// Resolve a repository root to an absolute path for stable digests across
/// relative invocations.
///
/// # Errors
/// Returns [`GoapError::EnvironmentMissing`] if the path cannot be resolved.
pub fn canonical_repo_root(path: &Path) -> Result<PathBuf, GoapError> {
    std::fs::canonicalize(path)
        .map_err(|e| GoapError::EnvironmentMissing(format!("cannot resolve repository path {}: {e}", path.display())))
}
