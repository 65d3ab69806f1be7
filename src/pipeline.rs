//! Request orchestration.
//!
//! The state machine behind the intake endpoint: authenticate, validate the
//! round, suppress duplicates through the ledger, then run the build
//! pipeline as a detached task. Expensive side effects happen at most once
//! per idempotency key; the final ledger write is the durable done marker.

use crate::attachments;
use crate::generator::{fallback_site, CodeGenerator, GenerationInput};
use crate::github::RepoService;
use crate::ledger::LedgerStore;
use crate::notify::{notify_best_effort, Notifier};
use crate::publisher::{self, pages_url_for};
use crate::request::{idempotency_key, BuildRequest, ResultPayload, Round};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

/// Outcome of intake, before any background work has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeReply {
    /// Shared secret mismatch. Nothing was looked up or written.
    InvalidSecret,
    /// Round outside {1, 2}; rejected at the boundary.
    InvalidRound(u32),
    /// Ledger hit: the stored payload was re-delivered, nothing re-ran.
    Duplicate,
    /// Fresh request; the pipeline for this round was scheduled.
    Accepted(u32),
}

/// Wires the service seams together and drives one request at a time
/// through intake; accepted requests continue on their own spawned task.
pub struct Orchestrator {
    shared_secret: String,
    github_username: String,
    attachments_dir: PathBuf,
    ledger: Arc<dyn LedgerStore>,
    generator: Arc<dyn CodeGenerator>,
    repos: Arc<dyn RepoService>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        shared_secret: impl Into<String>,
        github_username: impl Into<String>,
        attachments_dir: impl Into<PathBuf>,
        ledger: Arc<dyn LedgerStore>,
        generator: Arc<dyn CodeGenerator>,
        repos: Arc<dyn RepoService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            github_username: github_username.into(),
            attachments_dir: attachments_dir.into(),
            ledger,
            generator,
            repos,
            notifier,
        }
    }

    /// Intake. Returns as soon as the request is rejected, recognized as a
    /// duplicate, or scheduled; the caller never waits on the build itself.
    pub async fn handle(self: Arc<Self>, request: BuildRequest) -> anyhow::Result<IntakeReply> {
        if request.secret != self.shared_secret {
            tracing::warn!(task = %request.task, "Rejected request with invalid secret");
            return Ok(IntakeReply::InvalidSecret);
        }

        let Some(round) = Round::from_wire(request.round) else {
            tracing::warn!(task = %request.task, round = request.round, "Rejected out-of-range round");
            return Ok(IntakeReply::InvalidRound(request.round));
        };

        let key = idempotency_key(&request.email, &request.task, round, &request.nonce);
        if let Some(stored) = self.ledger.get(&key)? {
            tracing::info!(key = %key, "Duplicate request; re-delivering stored payload");
            notify_best_effort(
                self.notifier.as_ref(),
                &request.evaluation_url,
                &stored,
                "duplicate re-notify",
            )
            .await;
            return Ok(IntakeReply::Duplicate);
        }

        let span = tracing::info_span!(
            "pipeline",
            task = %request.task,
            round = round.number(),
            run_id = %uuid::Uuid::new_v4(),
        );
        let orchestrator = Arc::clone(&self);
        tokio::spawn(
            async move {
                if let Err(err) = orchestrator.process(&request, round, &key).await {
                    tracing::error!(error = %err, "Build pipeline aborted; request can be resubmitted");
                }
            }
            .instrument(span),
        );

        Ok(IntakeReply::Accepted(round.number()))
    }

    /// The build pipeline for one accepted request. Runs to completion off
    /// the request path; shares nothing with concurrent pipelines except
    /// the ledger.
    async fn process(&self, request: &BuildRequest, round: Round, key: &str) -> anyhow::Result<()> {
        tracing::info!("Starting build pipeline");

        let saved = attachments::materialize(&request.attachments, &self.attachments_dir);

        // Repository creation failures abort: nothing is persisted yet, so
        // resubmission with the same key is safe.
        let description = format!("Auto-generated app for task: {}", request.brief);
        let repo = self.repos.get_or_create(&request.task, &description).await?;

        let prev_readme = match round {
            Round::Revision => match self.repos.get_file(&request.task, "README.md").await {
                Ok(readme) => Some(readme),
                Err(err) => {
                    tracing::warn!(error = %err, "No previous README available for revision context");
                    None
                }
            },
            Round::Fresh => None,
        };

        let input = GenerationInput {
            brief: &request.brief,
            checks: &request.checks,
            attachments: &saved,
            round,
            prev_readme: prev_readme.as_deref(),
        };
        let site = match self.generator.generate(&input).await {
            Ok(site) => site,
            Err(err) => {
                tracing::warn!(error = %err, "Generation failed; publishing fallback site");
                fallback_site()
            }
        };

        publisher::publish(self.repos.as_ref(), &repo, &site, round, &self.github_username).await?;

        let pages_url = match round {
            Round::Fresh => match self.repos.enable_static_hosting(&request.task).await {
                Ok(true) => Some(pages_url_for(&self.github_username, &request.task)),
                Ok(false) => {
                    tracing::warn!("Hosting activation reported inactive");
                    None
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Hosting activation failed");
                    None
                }
            },
            // Hosting was turned on in round 1; the URL is stable.
            Round::Revision => Some(pages_url_for(&self.github_username, &request.task)),
        };

        let commit_sha = match self.repos.latest_commit_sha(&request.task).await {
            Ok(sha) => Some(sha),
            Err(err) => {
                tracing::warn!(error = %err, "Could not resolve latest commit");
                None
            }
        };

        let payload = ResultPayload {
            email: request.email.clone(),
            task: request.task.clone(),
            round: round.number(),
            nonce: request.nonce.clone(),
            repo_url: repo.html_url.clone(),
            commit_sha,
            pages_url,
        };

        notify_best_effort(
            self.notifier.as_ref(),
            &request.evaluation_url,
            &payload,
            "completion",
        )
        .await;

        // The durable done marker. Written even when hosting, commit
        // resolution, or notification degraded: the build itself succeeded.
        self.ledger.record(key, &payload)?;

        tracing::info!("Build pipeline finished");
        Ok(())
    }
}
