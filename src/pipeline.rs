//! Company research → contacts → outreach email pipeline.
//!
//! Stage graph:
//!
//! ```text
//! company_profile ─┐
//!                  ├─────────────────────────┐
//! contacts ────────┼─> contact_profile ──────┼─> outreach_email ─> (Gmail draft)
//!                  └─────────────────────────┘
//! ```
//!
//! Each stage is one batch over all companies. A failed batch aborts the
//! pipeline; snapshots of finished stages stay on disk.

use anyhow::Context;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    agdev::{Agent, BatchItem, BatchOptions, RunStatus, WaitOptions},
    arcade::{ArcadeClient, EmailDraft},
    snapshot::SnapshotWriter,
};

/// The four agents the pipeline drives.
#[derive(Debug, Clone)]
pub struct PipelineAgents {
    pub company_profile: Agent,
    pub contacts: Agent,
    pub contact_profile: Agent,
    pub outreach_email: Agent,
}

/// Where and as whom to save email drafts.
#[derive(Debug, Clone)]
pub struct Mailer {
    pub client: ArcadeClient,
    pub user_id: String,
    pub wait: WaitOptions,
}

/// Outcome of one stage for one company.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub company: String,
    pub run_id: String,
    pub status: RunStatus,
    pub data: Value,
}

/// Everything gathered for one company.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyReport {
    pub company: String,
    pub profile: Value,
    pub contacts: Value,
    pub contact_profiles: Value,
    pub email: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<Value>,
}

#[derive(Debug)]
pub struct Pipeline {
    agents: PipelineAgents,
    options: BatchOptions,
    snapshots: SnapshotWriter,
    mailer: Option<Mailer>,
}

impl Pipeline {
    pub fn new(agents: PipelineAgents, options: BatchOptions, snapshots: SnapshotWriter) -> Self {
        Self {
            agents,
            options,
            snapshots,
            mailer: None,
        }
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Mailer) -> Self {
        self.mailer = Some(mailer);
        self
    }

    #[tracing::instrument(skip_all, fields(companies = companies.len()))]
    pub async fn run(&self, companies: &[String]) -> anyhow::Result<Vec<CompanyReport>> {
        let company_inputs: Vec<Value> = companies
            .iter()
            .map(|c| json!({ "company_name": c }))
            .collect();

        tracing::info!(name: "pipeline.stage.started", stage = "research", "Researching companies and contacts");
        let (profiles, contacts) = tokio::try_join!(
            self.agents
                .company_profile
                .run_batch(company_inputs.clone(), self.options),
            self.agents.contacts.run_batch(company_inputs, self.options),
        )
        .context("company research failed")?;
        let profiles = self.finish_stage("company_profiles", companies, profiles).await?;
        let contacts = self.finish_stage("contacts", companies, contacts).await?;

        tracing::info!(name: "pipeline.stage.started", stage = "contact_profile", "Profiling contacts");
        let contact_inputs: Vec<Value> = companies
            .iter()
            .zip(&contacts)
            .map(|(company, contacts)| json!({ "company_name": company, "contacts": contacts }))
            .collect();
        let contact_profiles = self
            .agents
            .contact_profile
            .run_batch(contact_inputs, self.options)
            .await
            .context("contact profiling failed")?;
        let contact_profiles = self
            .finish_stage("contact_profiles", companies, contact_profiles)
            .await?;

        tracing::info!(name: "pipeline.stage.started", stage = "outreach_email", "Writing outreach emails");
        let email_inputs: Vec<Value> = (0..companies.len())
            .map(|i| {
                json!({
                    "company_name": companies[i],
                    "company_profile": profiles[i],
                    "contacts": contacts[i],
                    "contact_profiles": contact_profiles[i],
                })
            })
            .collect();
        let emails = self
            .agents
            .outreach_email
            .run_batch(email_inputs, self.options)
            .await
            .context("outreach email generation failed")?;
        let emails = self.finish_stage("outreach_emails", companies, emails).await?;

        let mut reports: Vec<CompanyReport> = companies
            .iter()
            .enumerate()
            .map(|(i, company)| CompanyReport {
                company: company.clone(),
                profile: profiles[i].clone(),
                contacts: contacts[i].clone(),
                contact_profiles: contact_profiles[i].clone(),
                email: emails[i].clone(),
                draft: None,
            })
            .collect();

        if let Some(mailer) = &self.mailer {
            self.draft_emails(mailer, &mut reports).await?;
        }

        self.snapshots.write("final", &reports).await?;
        tracing::info!(name: "pipeline.finished", reports = reports.len(), "Pipeline finished");
        Ok(reports)
    }

    /// Snapshot a stage and return each company's result data in order.
    async fn finish_stage(
        &self,
        stage: &str,
        companies: &[String],
        items: Vec<BatchItem<Value>>,
    ) -> anyhow::Result<Vec<Value>> {
        let records = stage_records(stage, companies, items);
        self.snapshots.write(stage, &records).await?;
        Ok(records.into_iter().map(|r| r.data).collect())
    }

    async fn draft_emails(&self, mailer: &Mailer, reports: &mut [CompanyReport]) -> anyhow::Result<()> {
        for report in reports.iter_mut() {
            let Some(draft) = extract_draft(&report.email) else {
                tracing::warn!(
                    name: "pipeline.draft.skipped",
                    company = %report.company,
                    "Email result has no recipient, subject and body; skipping draft"
                );
                continue;
            };
            let output = mailer
                .client
                .write_draft_email(&mailer.user_id, &draft, mailer.wait)
                .await
                .with_context(|| format!("failed to draft email for {}", report.company))?;
            report.draft = Some(output);
        }
        Ok(())
    }
}

fn stage_records(stage: &str, companies: &[String], items: Vec<BatchItem<Value>>) -> Vec<StageRecord> {
    companies
        .iter()
        .zip(items)
        .map(|(company, item)| {
            if item.run.status == RunStatus::Error {
                tracing::warn!(
                    name: "pipeline.run.failed",
                    stage,
                    company = %company,
                    run_id = %item.run.id,
                    "Run ended in error; continuing without its data"
                );
            }
            StageRecord {
                company: company.clone(),
                run_id: item.run.id.clone(),
                status: item.run.status,
                data: item.run.result().cloned().unwrap_or(Value::Null),
            }
        })
        .collect()
}

/// Pull an email draft out of an outreach result.
///
/// Accepts the fields at the top level or nested under `email`, and
/// `recipient`, `to` or `email_address` for the address.
pub fn extract_draft(email: &Value) -> Option<EmailDraft> {
    let source = match email.get("email") {
        Some(nested) if nested.is_object() => nested,
        _ => email,
    };
    let text = |key: &str| {
        source
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    Some(EmailDraft {
        recipient: text("recipient")
            .or_else(|| text("to"))
            .or_else(|| text("email_address"))?,
        subject: text("subject")?,
        body: text("body")?,
    })
}
