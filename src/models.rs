use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ConsentType {
    Marketing,
    DataProcessing,
    Cookie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActivityType {
    Grant,
    Revoke,
    DataDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestType {
    Access,
    Rectification,
    Erasure,
    Restriction,
    Portability,
    Objection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    InProgress,
    Completed,
    Denied,
    /// Terminal status for deletion requests with no matching subject.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One real person whose data an organization processes. Never hard-deleted:
/// expired or erased subjects are anonymized in place to keep the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DataSubject {
    pub id: i64,
    pub organization_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub marketing_consent: bool,
    pub marketing_consent_date: Option<DateTime<Utc>>,
    pub data_processing_consent: bool,
    pub data_processing_consent_date: Option<DateTime<Utc>>,
    pub cookie_consent: bool,
    pub cookie_consent_date: Option<DateTime<Utc>>,
    pub data_expiry_date: Option<DateTime<Utc>>,
    pub privacy_notice_version: Option<String>,
    pub privacy_notice_accepted_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataSubject {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn consent_granted(&self, consent_type: ConsentType) -> bool {
        match consent_type {
            ConsentType::Marketing => self.marketing_consent,
            ConsentType::DataProcessing => self.data_processing_consent,
            ConsentType::Cookie => self.cookie_consent,
        }
    }

    pub fn consent_date(&self, consent_type: ConsentType) -> Option<DateTime<Utc>> {
        match consent_type {
            ConsentType::Marketing => self.marketing_consent_date,
            ConsentType::DataProcessing => self.data_processing_consent_date,
            ConsentType::Cookie => self.cookie_consent_date,
        }
    }
}

/// Append-only audit record of one consent state transition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConsentActivity {
    pub id: i64,
    pub data_subject_id: i64,
    pub activity_type: ActivityType,
    pub consent_type: Option<ConsentType>,
    pub notes: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A GDPR rights request, keyed on the subject's email rather than a foreign
/// key: the subject may not exist yet or may already be anonymized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DataSubjectRequest {
    pub id: i64,
    pub organization_id: i64,
    pub request_type: RequestType,
    pub data_subject_name: String,
    pub data_subject_email: String,
    pub request_details: String,
    pub date_received: DateTime<Utc>,
    pub status: RequestStatus,
    pub due_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub organization_id: i64,
    pub data_subject_id: Option<i64>,
    pub title: String,
    pub document_type: String,
    pub is_template: bool,
    pub content: String,
    pub version: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reusable process definition. `is_active` gates whether new instances may
/// be created from it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowTemplate {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub description: String,
    pub workflow_type: String,
    pub estimated_completion_days: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowStepTemplate {
    pub id: i64,
    pub workflow_template_id: i64,
    pub name: String,
    pub description: String,
    pub step_order: i64,
    pub is_automated: bool,
    pub automation_script: Option<String>,
    pub document_template_id: Option<i64>,
    pub estimated_duration_hours: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One running execution of a template. `current_step_id`, when set, names a
/// step of this instance with status `in_progress`; it is null exactly when
/// the instance is pending or completed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowInstance {
    pub id: i64,
    pub organization_id: i64,
    pub template_id: i64,
    pub name: String,
    pub status: WorkflowStatus,
    pub data_subject_id: Option<i64>,
    pub related_request_id: Option<i64>,
    pub assigned_to: Option<String>,
    pub current_step_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One materialized step. `step_order` is copied from the template at
/// instantiation time and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowStep {
    pub id: i64,
    pub workflow_id: i64,
    pub name: String,
    pub description: String,
    pub step_order: i64,
    pub is_automated: bool,
    pub automation_script: Option<String>,
    pub document_template_id: Option<i64>,
    pub status: StepStatus,
    pub assigned_to: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub result_notes: String,
    pub generated_document_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewDataSubject {
    pub organization_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub data_expiry_date: Option<DateTime<Utc>>,
    pub privacy_notice_version: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct NewDataSubjectRequest {
    pub organization_id: i64,
    pub request_type: RequestType,
    pub data_subject_name: String,
    pub data_subject_email: String,
    #[serde(default)]
    pub request_details: String,
    pub date_received: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}
