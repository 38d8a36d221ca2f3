use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use sqlx::SqlitePool;

use crate::error::{ComplianceError, Result};
use crate::models::{
    StepStatus, WorkflowInstance, WorkflowStatus, WorkflowStep, WorkflowStepTemplate,
    WorkflowTemplate,
};

/// Result of running one automated step. Failures never halt the workflow;
/// the step completes with the failure notes recorded for manual follow-up.
#[derive(Debug, Clone)]
pub struct AutomationOutcome {
    pub success: bool,
    pub notes: String,
}

impl AutomationOutcome {
    pub fn success(notes: impl Into<String>) -> Self {
        Self {
            success: true,
            notes: notes.into(),
        }
    }

    pub fn failure(notes: impl Into<String>) -> Self {
        Self {
            success: false,
            notes: notes.into(),
        }
    }
}

/// Capability seam for automated steps. The runner only requires a
/// success flag and notes from an execution.
pub trait AutomationProvider: Send + Sync {
    fn execute(&self, step: &WorkflowStep) -> AutomationOutcome;
}

/// Default provider, keyed on the step's automation script name.
pub struct ScriptAutomation;

impl AutomationProvider for ScriptAutomation {
    fn execute(&self, step: &WorkflowStep) -> AutomationOutcome {
        match step.automation_script.as_deref() {
            Some("generate_document") => {
                AutomationOutcome::success("Document generated from template")
            }
            Some("send_notification") => {
                AutomationOutcome::success("Notification queued for delivery")
            }
            Some(other) => {
                AutomationOutcome::failure(format!("Unknown automation script '{other}'"))
            }
            None => AutomationOutcome::failure("Automated step has no automation script configured"),
        }
    }
}

/// Summary of one automated-processing sweep over in-progress workflows.
#[derive(Debug, Default, serde::Serialize)]
pub struct AutomationRunSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Template engine and state-machine runner for remediation workflows.
pub struct WorkflowService {
    pool: SqlitePool,
    automation: Arc<dyn AutomationProvider>,
}

impl WorkflowService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            automation: Arc::new(ScriptAutomation),
        }
    }

    pub fn with_automation(pool: SqlitePool, automation: Arc<dyn AutomationProvider>) -> Self {
        Self { pool, automation }
    }

    /// Expand a template into a concrete instance bound to an optional
    /// subject and/or request. All steps start `pending`; the instance is
    /// not started. Inactive templates and duplicate step orders are
    /// configuration errors.
    pub async fn instantiate(
        &self,
        template_id: i64,
        data_subject_id: Option<i64>,
        related_request_id: Option<i64>,
    ) -> Result<WorkflowInstance> {
        let template =
            sqlx::query_as::<_, WorkflowTemplate>("SELECT * FROM workflow_templates WHERE id = ?")
                .bind(template_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| {
                    ComplianceError::NotFound(format!("workflow template {template_id}"))
                })?;

        if !template.is_active {
            return Err(ComplianceError::Configuration(format!(
                "workflow template '{}' is inactive",
                template.name
            )));
        }

        let step_templates = sqlx::query_as::<_, WorkflowStepTemplate>(
            "SELECT * FROM workflow_step_templates WHERE workflow_template_id = ? ORDER BY step_order",
        )
        .bind(template.id)
        .fetch_all(&self.pool)
        .await?;

        for pair in step_templates.windows(2) {
            if pair[0].step_order == pair[1].step_order {
                return Err(ComplianceError::Configuration(format!(
                    "workflow template '{}' has duplicate step order {}",
                    template.name, pair[0].step_order
                )));
            }
        }

        let now = Utc::now();
        let due_date = (template.estimated_completion_days > 0)
            .then(|| now + Duration::days(template.estimated_completion_days));

        let mut tx = self.pool.begin().await?;

        let instance_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO workflow_instances
                (organization_id, template_id, name, status, data_subject_id,
                 related_request_id, due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(template.organization_id)
        .bind(template.id)
        .bind(&template.name)
        .bind(WorkflowStatus::Pending)
        .bind(data_subject_id)
        .bind(related_request_id)
        .bind(due_date)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for step_template in &step_templates {
            sqlx::query(
                r#"
                INSERT INTO workflow_steps
                    (workflow_id, name, description, step_order, is_automated,
                     automation_script, document_template_id, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(instance_id)
            .bind(&step_template.name)
            .bind(&step_template.description)
            .bind(step_template.step_order)
            .bind(step_template.is_automated)
            .bind(&step_template.automation_script)
            .bind(step_template.document_template_id)
            .bind(StepStatus::Pending)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            "Instantiated workflow {} from template '{}' with {} steps",
            instance_id,
            template.name,
            step_templates.len()
        );
        self.instance(instance_id).await
    }

    /// Start a pending instance: its lowest-order pending step becomes the
    /// current step. A no-op when the instance has no steps.
    pub async fn start(&self, workflow_id: i64) -> Result<WorkflowInstance> {
        let instance = self.instance(workflow_id).await?;
        if instance.status != WorkflowStatus::Pending {
            return Err(ComplianceError::InvalidTransition(format!(
                "workflow {workflow_id} has already been started"
            )));
        }

        let first_step = sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM workflow_steps WHERE workflow_id = ? AND status = ? ORDER BY step_order LIMIT 1",
        )
        .bind(workflow_id)
        .bind(StepStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;

        let Some(first_step) = first_step else {
            warn!("Workflow {} has no steps to start", workflow_id);
            return Ok(instance);
        };

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE workflow_steps SET status = ?, start_date = ?, updated_at = ? WHERE id = ?",
        )
        .bind(StepStatus::InProgress)
        .bind(now)
        .bind(now)
        .bind(first_step.id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE workflow_instances SET status = ?, start_date = ?, current_step_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(WorkflowStatus::InProgress)
        .bind(now)
        .bind(first_step.id)
        .bind(now)
        .bind(workflow_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "Started workflow {} at step '{}' (order {})",
            workflow_id, first_step.name, first_step.step_order
        );
        self.instance(workflow_id).await
    }

    /// Advance past the current step. An automated step still in progress is
    /// executed first and completed with the outcome notes (success or
    /// failure). Returns the new current step, or `None` when the workflow
    /// just completed.
    pub async fn advance(&self, workflow_id: i64) -> Result<Option<WorkflowStep>> {
        let (next, _) = self.advance_current(workflow_id).await?;
        Ok(next)
    }

    async fn advance_current(
        &self,
        workflow_id: i64,
    ) -> Result<(Option<WorkflowStep>, Option<AutomationOutcome>)> {
        let instance = self.instance(workflow_id).await?;
        let current_step_id = instance.current_step_id.ok_or_else(|| {
            ComplianceError::InvalidTransition(format!(
                "workflow {workflow_id} has no step in progress"
            ))
        })?;

        let current =
            sqlx::query_as::<_, WorkflowStep>("SELECT * FROM workflow_steps WHERE id = ?")
                .bind(current_step_id)
                .fetch_one(&self.pool)
                .await?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let (next_id, outcome) = self.advance_in_tx(&mut tx, &instance, &current, now).await?;
        tx.commit().await?;

        let next = match next_id {
            Some(next_id) => Some(
                sqlx::query_as::<_, WorkflowStep>("SELECT * FROM workflow_steps WHERE id = ?")
                    .bind(next_id)
                    .fetch_one(&self.pool)
                    .await?,
            ),
            None => None,
        };
        Ok((next, outcome))
    }

    /// Finish the current step if it is still in progress, then move the
    /// workflow pointer, all inside the caller's transaction: no reader ever
    /// observes a completed step that is still the current one.
    async fn advance_in_tx(
        &self,
        tx: &mut sqlx::SqliteConnection,
        instance: &WorkflowInstance,
        current: &WorkflowStep,
        now: DateTime<Utc>,
    ) -> Result<(Option<i64>, Option<AutomationOutcome>)> {
        let mut outcome = None;
        if current.status == StepStatus::InProgress {
            let mut generated_document_id = None;
            let result_notes = if current.is_automated {
                let executed = self.automation.execute(current);
                if executed.success {
                    generated_document_id =
                        self.generate_document(&mut *tx, instance, current).await?;
                } else {
                    warn!(
                        "Automated step '{}' of workflow {} failed: {}",
                        current.name, instance.id, executed.notes
                    );
                }
                let notes = executed.notes.clone();
                outcome = Some(executed);
                notes
            } else {
                current.result_notes.clone()
            };

            sqlx::query(
                r#"
                UPDATE workflow_steps
                SET status = ?, completed_date = ?, result_notes = ?,
                    generated_document_id = COALESCE(?, generated_document_id), updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(StepStatus::Completed)
            .bind(now)
            .bind(result_notes)
            .bind(generated_document_id)
            .bind(now)
            .bind(current.id)
            .execute(&mut *tx)
            .await?;
        }

        let next = sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM workflow_steps WHERE workflow_id = ? AND step_order > ? ORDER BY step_order LIMIT 1",
        )
        .bind(instance.id)
        .bind(current.step_order)
        .fetch_optional(&mut *tx)
        .await?;

        match next {
            Some(next_step) => {
                sqlx::query(
                    "UPDATE workflow_steps SET status = ?, start_date = ?, updated_at = ? WHERE id = ?",
                )
                .bind(StepStatus::InProgress)
                .bind(now)
                .bind(now)
                .bind(next_step.id)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "UPDATE workflow_instances SET current_step_id = ?, updated_at = ? WHERE id = ?",
                )
                .bind(next_step.id)
                .bind(now)
                .bind(instance.id)
                .execute(&mut *tx)
                .await?;
                Ok((Some(next_step.id), outcome))
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE workflow_instances
                    SET status = ?, completed_date = ?, current_step_id = NULL, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(WorkflowStatus::Completed)
                .bind(now)
                .bind(now)
                .bind(instance.id)
                .execute(&mut *tx)
                .await?;
                info!("Workflow {} completed", instance.id);
                Ok((None, outcome))
            }
        }
    }

    /// Manually complete an in-progress step with result notes, then advance
    /// the owning workflow. Completion and pointer movement commit together.
    /// Any other step status is an invalid transition.
    pub async fn complete_step(&self, step_id: i64, notes: &str) -> Result<Option<WorkflowStep>> {
        let step = sqlx::query_as::<_, WorkflowStep>("SELECT * FROM workflow_steps WHERE id = ?")
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("workflow step {step_id}")))?;

        if step.status != StepStatus::InProgress {
            return Err(ComplianceError::InvalidTransition(format!(
                "step '{}' is not in progress and cannot be completed",
                step.name
            )));
        }

        let instance = self.instance(step.workflow_id).await?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE workflow_steps SET status = ?, completed_date = ?, result_notes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(StepStatus::Completed)
        .bind(now)
        .bind(notes)
        .bind(now)
        .bind(step_id)
        .execute(&mut *tx)
        .await?;

        let mut completed = step;
        completed.status = StepStatus::Completed;
        let (next_id, _) = self.advance_in_tx(&mut tx, &instance, &completed, now).await?;
        tx.commit().await?;

        match next_id {
            Some(next_id) => {
                let next =
                    sqlx::query_as::<_, WorkflowStep>("SELECT * FROM workflow_steps WHERE id = ?")
                        .bind(next_id)
                        .fetch_one(&self.pool)
                        .await?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Sweep an organization's in-progress workflows whose current step is
    /// automated, advancing each one.
    pub async fn process_automated(&self, organization_id: i64) -> Result<AutomationRunSummary> {
        let workflows = sqlx::query_as::<_, WorkflowInstance>(
            r#"
            SELECT wi.* FROM workflow_instances wi
            JOIN workflow_steps ws ON ws.id = wi.current_step_id
            WHERE wi.organization_id = ? AND wi.status = ? AND ws.is_automated = 1
            "#,
        )
        .bind(organization_id)
        .bind(WorkflowStatus::InProgress)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = AutomationRunSummary::default();
        for workflow in workflows {
            summary.processed += 1;
            let (_, outcome) = self.advance_current(workflow.id).await?;
            if outcome.is_some_and(|o| o.success) {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
        }
        Ok(summary)
    }

    pub async fn instance(&self, workflow_id: i64) -> Result<WorkflowInstance> {
        sqlx::query_as::<_, WorkflowInstance>("SELECT * FROM workflow_instances WHERE id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("workflow instance {workflow_id}")))
    }

    pub async fn steps(&self, workflow_id: i64) -> Result<Vec<WorkflowStep>> {
        let steps = sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM workflow_steps WHERE workflow_id = ? ORDER BY step_order",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(steps)
    }

    pub fn progress_percentage(steps: &[WorkflowStep]) -> u8 {
        if steps.is_empty() {
            return 0;
        }
        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        ((completed * 100) / steps.len()) as u8
    }

    /// Document generation for automated steps that carry a document
    /// template: the template content is copied into a new document bound to
    /// the workflow's subject and recorded on the step.
    async fn generate_document(
        &self,
        tx: &mut sqlx::SqliteConnection,
        instance: &WorkflowInstance,
        step: &WorkflowStep,
    ) -> Result<Option<i64>> {
        let Some(template_id) = step.document_template_id else {
            return Ok(None);
        };
        let template = sqlx::query_as::<_, crate::models::Document>(
            "SELECT * FROM documents WHERE id = ?",
        )
        .bind(template_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(template) = template else {
            warn!(
                "Step '{}' references missing document template {}",
                step.name, template_id
            );
            return Ok(None);
        };

        let now = Utc::now();
        let document_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO documents
                (organization_id, data_subject_id, title, document_type, is_template,
                 content, version, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?, 'active', ?, ?)
            RETURNING id
            "#,
        )
        .bind(instance.organization_id)
        .bind(instance.data_subject_id)
        .bind(format!("{} ({})", template.title, instance.name))
        .bind(&template.document_type)
        .bind(&template.content)
        .bind(&template.version)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        Ok(Some(document_id))
    }
}
