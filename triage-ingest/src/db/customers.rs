//! Customer table queries

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use triage_common::{db::models::Customer, Error, Result};
use uuid::Uuid;

use super::parse_guid;

type CustomerRow = (
    String,                // guid
    String,                // org_id
    String,                // name
    String,                // company_name
    Option<String>,        // email
    Option<String>,        // phone
    Option<String>,        // avatar_url
    Option<i64>,           // risk_score
    Option<i64>,           // opportunity_score
    DateTime<Utc>,         // created_at
    DateTime<Utc>,         // updated_at
);

const COLUMNS: &str = "guid, org_id, name, company_name, email, phone, avatar_url, \
                       risk_score, opportunity_score, created_at, updated_at";

fn from_row(row: CustomerRow) -> Result<Customer> {
    Ok(Customer {
        guid: parse_guid(&row.0)?,
        org_id: parse_guid(&row.1)?,
        name: row.2,
        company_name: row.3,
        email: row.4,
        phone: row.5,
        avatar_url: row.6,
        risk_score: row.7,
        opportunity_score: row.8,
        created_at: row.9,
        updated_at: row.10,
    })
}

/// Fetch one customer by guid
pub async fn get(pool: &SqlitePool, guid: Uuid) -> Result<Customer> {
    let row: Option<CustomerRow> =
        sqlx::query_as(&format!("SELECT {} FROM customers WHERE guid = ?", COLUMNS))
            .bind(guid.to_string())
            .fetch_optional(pool)
            .await?;

    row.map(from_row)
        .transpose()?
        .ok_or_else(|| Error::NotFound(format!("Customer {}", guid)))
}

/// Exact case-insensitive email lookup within an organization
pub async fn find_by_email(
    pool: &SqlitePool,
    org_id: Uuid,
    email: &str,
) -> Result<Option<Customer>> {
    let row: Option<CustomerRow> = sqlx::query_as(&format!(
        "SELECT {} FROM customers WHERE org_id = ? AND LOWER(email) = LOWER(?)",
        COLUMNS
    ))
    .bind(org_id.to_string())
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.map(from_row).transpose()
}

/// All customers of an organization (fuzzy phone/name matching scans these)
pub async fn list_for_org(pool: &SqlitePool, org_id: Uuid) -> Result<Vec<Customer>> {
    let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
        "SELECT {} FROM customers WHERE org_id = ? ORDER BY created_at",
        COLUMNS
    ))
    .bind(org_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(from_row).collect()
}

/// Insert a new customer record
pub async fn insert(pool: &SqlitePool, customer: &Customer) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO customers
            (guid, org_id, name, company_name, email, phone, avatar_url,
             risk_score, opportunity_score, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(customer.guid.to_string())
    .bind(customer.org_id.to_string())
    .bind(&customer.name)
    .bind(&customer.company_name)
    .bind(&customer.email)
    .bind(&customer.phone)
    .bind(&customer.avatar_url)
    .bind(customer.risk_score)
    .bind(customer.opportunity_score)
    .bind(customer.created_at)
    .bind(customer.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist merged contact fields and scores
pub async fn update_contact(pool: &SqlitePool, customer: &Customer) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE customers
        SET email = ?, phone = ?, risk_score = ?, opportunity_score = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&customer.email)
    .bind(&customer.phone)
    .bind(customer.risk_score)
    .bind(customer.opportunity_score)
    .bind(customer.updated_at)
    .bind(customer.guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}
