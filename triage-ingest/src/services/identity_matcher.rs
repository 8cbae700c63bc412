//! Identity matching for the ingestion pipeline
//!
//! Resolves a loosely-specified contact (name, company, email, phone)
//! against an organization's existing customers. Matching runs in strict
//! priority order and absence always resolves to creation; the matcher
//! never fails on "not found".

use chrono::Utc;
use sqlx::SqlitePool;
use triage_common::{
    db::models::Customer,
    events::{ChangeAction, ChangeBus, ChangeType, DatabaseChange},
    Result,
};
use uuid::Uuid;

use crate::db::customers;

/// Contact identity extracted from an analysis result or caller metadata
#[derive(Debug, Clone, Default)]
pub struct ContactCandidate {
    pub name: String,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Scores learned from the analysis, merged into the record when present
    pub risk_score: Option<i64>,
    pub opportunity_score: Option<i64>,
}

/// How the candidate resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Existing record matched by email
    Email,
    /// Existing record matched by normalized phone
    Phone,
    /// Existing record matched by name + fuzzy company
    NameCompany,
    /// No rule matched; a record was created
    Created,
}

/// Identity Matcher
pub struct IdentityMatcher {
    db: SqlitePool,
    bus: ChangeBus,
}

impl IdentityMatcher {
    pub fn new(db: SqlitePool, bus: ChangeBus) -> Self {
        Self { db, bus }
    }

    /// Resolve a candidate to a customer, creating one when no rule matches
    ///
    /// Match priority, first hit wins:
    /// 1. Exact case-insensitive email within the organization
    /// 2. Normalized phone equality
    /// 3. Normalized person name equality plus fuzzy company match
    ///
    /// A match that teaches us a missing email/phone/score merges the new
    /// field into the record and emits `customer:updated`; creation emits
    /// `customer:created`.
    pub async fn resolve(
        &self,
        org_id: Uuid,
        candidate: &ContactCandidate,
    ) -> Result<(Customer, MatchOutcome)> {
        if let Some(email) = candidate.email.as_deref().filter(|e| !e.trim().is_empty()) {
            if let Some(existing) = customers::find_by_email(&self.db, org_id, email.trim()).await? {
                tracing::debug!(customer = %existing.guid, "Matched customer by email");
                let merged = self.merge_learned_fields(existing, candidate).await?;
                return Ok((merged, MatchOutcome::Email));
            }
        }

        let candidate_phone = candidate
            .phone
            .as_deref()
            .map(normalize_phone)
            .filter(|p| !p.is_empty());

        // Phone and name+company rules scan the org's records; neither key
        // is uniquely constrained so equality is computed on normalized forms.
        let org_customers = customers::list_for_org(&self.db, org_id).await?;

        if let Some(ref phone) = candidate_phone {
            if let Some(existing) = org_customers.iter().find(|c| {
                c.phone
                    .as_deref()
                    .map(|p| &normalize_phone(p) == phone)
                    .unwrap_or(false)
            }) {
                tracing::debug!(customer = %existing.guid, "Matched customer by phone");
                let merged = self.merge_learned_fields(existing.clone(), candidate).await?;
                return Ok((merged, MatchOutcome::Phone));
            }
        }

        let candidate_name = normalize_person_name(&candidate.name);
        if !candidate_name.is_empty() {
            if let Some(company) = candidate.company_name.as_deref() {
                if let Some(existing) = org_customers.iter().find(|c| {
                    normalize_person_name(&c.name) == candidate_name
                        && companies_match(&c.company_name, company)
                }) {
                    tracing::debug!(customer = %existing.guid, "Matched customer by name+company");
                    let merged = self.merge_learned_fields(existing.clone(), candidate).await?;
                    return Ok((merged, MatchOutcome::NameCompany));
                }
            }
        }

        let customer = self.create_customer(org_id, candidate).await?;
        Ok((customer, MatchOutcome::Created))
    }

    /// Merge newly-learned fields into an existing record
    ///
    /// A present email is never overwritten; phone is overwritten only when
    /// the normalized values differ; scores fill in when the analysis
    /// provided them.
    async fn merge_learned_fields(
        &self,
        mut customer: Customer,
        candidate: &ContactCandidate,
    ) -> Result<Customer> {
        let mut changed = false;

        if customer.email.is_none() {
            if let Some(email) = candidate.email.as_deref().filter(|e| !e.trim().is_empty()) {
                customer.email = Some(email.trim().to_lowercase());
                changed = true;
            }
        }

        if let Some(phone) = candidate.phone.as_deref() {
            let normalized = normalize_phone(phone);
            if !normalized.is_empty()
                && customer.phone.as_deref().map(normalize_phone).as_deref()
                    != Some(normalized.as_str())
            {
                customer.phone = Some(normalized);
                changed = true;
            }
        }

        if let Some(risk) = candidate.risk_score {
            if customer.risk_score != Some(risk) {
                customer.risk_score = Some(risk);
                changed = true;
            }
        }
        if let Some(opportunity) = candidate.opportunity_score {
            if customer.opportunity_score != Some(opportunity) {
                customer.opportunity_score = Some(opportunity);
                changed = true;
            }
        }

        if changed {
            customer.updated_at = Utc::now();
            customers::update_contact(&self.db, &customer).await?;
            self.bus.emit(DatabaseChange::new(
                ChangeType::Customer,
                ChangeAction::Updated,
                customer.org_id,
                customer.guid,
                serde_json::to_value(&customer).ok(),
            ));
        }

        Ok(customer)
    }

    async fn create_customer(
        &self,
        org_id: Uuid,
        candidate: &ContactCandidate,
    ) -> Result<Customer> {
        let now = Utc::now();
        let name = if candidate.name.trim().is_empty() {
            "Unknown Contact".to_string()
        } else {
            candidate.name.trim().to_string()
        };

        let customer = Customer {
            guid: Uuid::new_v4(),
            org_id,
            avatar_url: Some(avatar_url(&name)),
            name,
            company_name: candidate
                .company_name
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string(),
            email: candidate
                .email
                .as_deref()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            phone: candidate
                .phone
                .as_deref()
                .map(normalize_phone)
                .filter(|p| !p.is_empty()),
            risk_score: candidate.risk_score,
            opportunity_score: candidate.opportunity_score,
            created_at: now,
            updated_at: now,
        };

        customers::insert(&self.db, &customer).await?;
        tracing::info!(customer = %customer.guid, org = %org_id, "Created customer");

        self.bus.emit(DatabaseChange::new(
            ChangeType::Customer,
            ChangeAction::Created,
            org_id,
            customer.guid,
            serde_json::to_value(&customer).ok(),
        ));

        Ok(customer)
    }
}

/// Initials-seeded avatar for newly created customers
fn avatar_url(name: &str) -> String {
    format!(
        "https://api.dicebear.com/7.x/initials/svg?seed={}",
        name.replace(' ', "%20")
    )
}

/// Normalize a phone number for equality comparison
///
/// Strips every non-digit character, then drops a leading country-code `1`
/// on 11-digit numbers.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

const NAME_SUFFIXES: &[&str] = &["jr", "jr.", "sr", "sr.", "ii", "iii", "iv", "esq", "esq."];

/// Normalize a person name: lowercase, strip suffixes, collapse whitespace
pub fn normalize_person_name(name: &str) -> String {
    let mut words: Vec<&str> = name.split_whitespace().collect();
    while let Some(last) = words.last() {
        if NAME_SUFFIXES.contains(&last.to_lowercase().trim_end_matches(',')) {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ").to_lowercase()
}

/// Normalize a company name: lowercase, expand abbreviations, strip punctuation
pub fn normalize_company(company: &str) -> String {
    let lowered = company.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    stripped
        .split_whitespace()
        .map(|word| match word {
            "corp" => "corporation",
            "inc" => "incorporated",
            "ltd" => "limited",
            "llc" => "llc",
            "co" => "company",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fuzzy company equality
///
/// Normalized forms must be equal, or one must contain the other — the
/// containment shortcut only applies when both names are longer than five
/// characters, so tiny fragments never match.
pub fn companies_match(a: &str, b: &str) -> bool {
    let na = normalize_company(a);
    let nb = normalize_company(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb {
        return true;
    }
    na.len() > 5 && nb.len() > 5 && (na.contains(&nb) || nb.contains(&na))
}
