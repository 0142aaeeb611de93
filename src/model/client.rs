//! The Client aggregate: entity plus its embedded documents and notes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationErrors;
use crate::model::{Currency, check_len, check_opt_email, check_opt_len, is_valid_client_code};

pub const MAX_NOTE_LEN: usize = 2000;
pub const MAX_DOCUMENT_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
    Prospect,
    Archived,
}

impl ClientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Prospect => "prospect",
            Self::Archived => "archived",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "prospect" => Some(Self::Prospect),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Proposal,
    Contract,
    Sow,
    Invoice,
    Report,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySize {
    Startup,
    Small,
    Medium,
    Large,
    Enterprise,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Annually,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Address,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryContact {
    pub name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessInfo {
    pub industry: Option<String>,
    pub size: Option<CompanySize>,
    pub revenue: Option<String>,
    pub employees: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Billing {
    pub tax_id: Option<String>,
    pub billing_cycle: BillingCycle,
    /// Payment terms in days, 0-365.
    pub payment_terms: u16,
    /// Discount percentage, 0-100.
    pub discount: Decimal,
}

impl Default for Billing {
    fn default() -> Self {
        Self {
            tax_id: None,
            billing_cycle: BillingCycle::Monthly,
            payment_terms: 30,
            discount: Decimal::ZERO,
        }
    }
}

/// A stored file attached to a client. Created only via the upload gate; the
/// underlying blob lives in external storage and is deleted in lock-step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Storage key of the blob.
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: u64,
    /// Blob store path, used for deletion and reads.
    pub path: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub category: DocumentCategory,
    pub description: Option<String>,
}

/// Append-only note on a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    pub author: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetrics {
    pub total_revenue: Decimal,
    pub total_projects: u32,
    pub average_project_value: Decimal,
    pub last_engagement: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    /// Optimistic-concurrency version, bumped by the store on every replace.
    pub version: u64,
    pub name: String,
    /// Globally unique, `[A-Z0-9]{2,20}`, normalized to uppercase.
    pub code: String,
    pub currency: Currency,
    pub description: Option<String>,
    pub contact_info: ContactInfo,
    pub primary_contact: PrimaryContact,
    pub business_info: BusinessInfo,
    pub billing: Billing,
    pub status: ClientStatus,
    /// Owning engagement manager; always set, defaults to the creator.
    pub engagement_manager: Uuid,
    pub created_by: Uuid,
    pub documents: Vec<Document>,
    pub notes: Vec<Note>,
    pub tags: Vec<String>,
    pub metrics: ClientMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation parameters.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub code: String,
    pub currency: Option<Currency>,
    pub description: Option<String>,
    pub contact_info: Option<ContactInfo>,
    pub primary_contact: Option<PrimaryContact>,
    pub business_info: Option<BusinessInfo>,
    pub billing: Option<Billing>,
    pub status: Option<ClientStatus>,
    /// Defaults to the creator when unset.
    pub engagement_manager: Option<Uuid>,
    pub tags: Vec<String>,
}

/// Update parameters. `None` leaves a field untouched; the double-`Option`
/// fields distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub currency: Option<Currency>,
    pub description: Option<Option<String>>,
    pub contact_info: Option<ContactInfo>,
    pub primary_contact: Option<PrimaryContact>,
    pub business_info: Option<BusinessInfo>,
    pub billing: Option<Billing>,
    pub status: Option<ClientStatus>,
    pub engagement_manager: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

impl Client {
    /// Build and validate a new client. Validation runs before anything is
    /// persisted, so a failure here has no side effects.
    pub fn create(input: NewClient, creator: Uuid) -> Result<Self, ValidationErrors> {
        let now = Utc::now();
        let client = Self {
            id: Uuid::new_v4(),
            version: 1,
            name: input.name.trim().to_string(),
            code: input.code.trim().to_ascii_uppercase(),
            currency: input.currency.unwrap_or(Currency::Usd),
            description: input.description,
            contact_info: input.contact_info.unwrap_or_default(),
            primary_contact: input.primary_contact.unwrap_or_default(),
            business_info: input.business_info.unwrap_or_default(),
            billing: input.billing.unwrap_or_default(),
            status: input.status.unwrap_or_default(),
            engagement_manager: input.engagement_manager.unwrap_or(creator),
            created_by: creator,
            documents: Vec::new(),
            notes: Vec::new(),
            tags: input.tags,
            metrics: ClientMetrics::default(),
            created_at: now,
            updated_at: now,
        };
        client.validate()?;
        Ok(client)
    }

    /// Apply an update, re-validating the whole aggregate afterwards.
    pub fn apply(&mut self, patch: ClientPatch) -> Result<(), ValidationErrors> {
        let mut candidate = self.clone();
        if let Some(name) = patch.name {
            candidate.name = name.trim().to_string();
        }
        if let Some(code) = patch.code {
            candidate.code = code.trim().to_ascii_uppercase();
        }
        if let Some(currency) = patch.currency {
            candidate.currency = currency;
        }
        if let Some(description) = patch.description {
            candidate.description = description;
        }
        if let Some(contact_info) = patch.contact_info {
            candidate.contact_info = contact_info;
        }
        if let Some(primary_contact) = patch.primary_contact {
            candidate.primary_contact = primary_contact;
        }
        if let Some(business_info) = patch.business_info {
            candidate.business_info = business_info;
        }
        if let Some(billing) = patch.billing {
            candidate.billing = billing;
        }
        if let Some(status) = patch.status {
            candidate.status = status;
        }
        if let Some(engagement_manager) = patch.engagement_manager {
            candidate.engagement_manager = engagement_manager;
        }
        if let Some(tags) = patch.tags {
            candidate.tags = tags;
        }
        candidate.validate()?;
        candidate.updated_at = Utc::now();
        *self = candidate;
        Ok(())
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_len(&mut errors, "name", &self.name, 1, 200);
        if !is_valid_client_code(&self.code) {
            errors.push("code", "must be 2-20 uppercase letters/numbers");
        }
        check_opt_len(&mut errors, "description", self.description.as_deref(), 1000);
        check_opt_email(&mut errors, "contactInfo.email", self.contact_info.email.as_deref());
        check_opt_email(
            &mut errors,
            "primaryContact.email",
            self.primary_contact.email.as_deref(),
        );
        if self.billing.payment_terms > 365 {
            errors.push("billing.paymentTerms", "must be between 0 and 365 days");
        }
        if self.billing.discount < Decimal::ZERO || self.billing.discount > Decimal::from(100) {
            errors.push("billing.discount", "must be between 0 and 100");
        }
        errors.into_result()
    }

    pub fn document(&self, document_id: Uuid) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == document_id)
    }

    pub fn add_document(&mut self, document: Document) {
        self.documents.push(document);
        self.updated_at = Utc::now();
    }

    /// Remove a document sub-record. The caller is responsible for deleting
    /// the underlying blob first (blob first, record second, so a failure
    /// leaves the record and a retry stays safe).
    pub fn remove_document(&mut self, document_id: Uuid) -> Option<Document> {
        let idx = self.documents.iter().position(|d| d.id == document_id)?;
        self.updated_at = Utc::now();
        Some(self.documents.remove(idx))
    }

    pub fn add_note(&mut self, content: &str, author: Uuid) -> Result<(), ValidationErrors> {
        let content = content.trim();
        let mut errors = ValidationErrors::new();
        if content.is_empty() {
            errors.push("content", "note content is required");
        } else if content.chars().count() > MAX_NOTE_LEN {
            errors.push(
                "content",
                format!("cannot be more than {MAX_NOTE_LEN} characters"),
            );
        }
        errors.into_result()?;

        self.notes.push(Note {
            content: content.to_string(),
            author,
            created_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}
