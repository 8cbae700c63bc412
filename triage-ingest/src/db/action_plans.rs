//! Action plan, action item, board card, and audit-trail queries

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use triage_common::{
    db::models::{
        ActionItem, ActionItemKind, ActionItemStatus, ActionPlan, AuditEntry, Badge, BoardCard,
        CardStatus, PlanStatus,
    },
    Error, Result,
};
use uuid::Uuid;

use super::{parse_guid, parse_opt_guid};

#[derive(sqlx::FromRow)]
struct PlanRow {
    guid: String,
    customer_id: String,
    badge: String,
    recommendation: String,
    what_to_do: Option<String>,
    why_strategy: Option<String>,
    status: String,
    completed_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    assigned_user_id: Option<String>,
    assigned_team_id: Option<String>,
    board_card_id: Option<String>,
    last_promoted_at: Option<DateTime<Utc>>,
    last_promoted_by: Option<String>,
    last_promoted_board_id: Option<String>,
    last_promoted_column_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlanRow {
    fn into_plan(self) -> Result<ActionPlan> {
        Ok(ActionPlan {
            guid: parse_guid(&self.guid)?,
            customer_id: parse_guid(&self.customer_id)?,
            badge: Badge::parse(&self.badge)
                .ok_or_else(|| Error::Internal(format!("Invalid badge in database: {}", self.badge)))?,
            recommendation: self.recommendation,
            what_to_do: self.what_to_do,
            why_strategy: self.why_strategy,
            status: PlanStatus::parse(&self.status).ok_or_else(|| {
                Error::Internal(format!("Invalid plan status in database: {}", self.status))
            })?,
            completed_at: self.completed_at,
            canceled_at: self.canceled_at,
            assigned_user_id: parse_opt_guid(self.assigned_user_id.as_deref())?,
            assigned_team_id: parse_opt_guid(self.assigned_team_id.as_deref())?,
            board_card_id: parse_opt_guid(self.board_card_id.as_deref())?,
            last_promoted_at: self.last_promoted_at,
            last_promoted_by: parse_opt_guid(self.last_promoted_by.as_deref())?,
            last_promoted_board_id: parse_opt_guid(self.last_promoted_board_id.as_deref())?,
            last_promoted_column_id: parse_opt_guid(self.last_promoted_column_id.as_deref())?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fetch a plan by guid
pub async fn get(pool: &SqlitePool, guid: Uuid) -> Result<ActionPlan> {
    let row: Option<PlanRow> = sqlx::query_as("SELECT * FROM action_plans WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(PlanRow::into_plan)
        .transpose()?
        .ok_or_else(|| Error::NotFound(format!("Action plan {}", guid)))
}

/// Fetch a plan by guid, scoped to the owning organization
///
/// Returns `Ok(None)` when the plan does not exist or belongs to another org.
pub async fn get_for_org(
    pool: &SqlitePool,
    org_id: Uuid,
    guid: Uuid,
) -> Result<Option<ActionPlan>> {
    let row: Option<PlanRow> = sqlx::query_as(
        "SELECT p.* FROM action_plans p \
         JOIN customers c ON c.guid = p.customer_id \
         WHERE p.guid = ? AND c.org_id = ?",
    )
    .bind(guid.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(PlanRow::into_plan).transpose()
}

/// All currently-active plans for a customer
pub async fn list_active_for_customer(
    pool: &SqlitePool,
    customer_id: Uuid,
) -> Result<Vec<ActionPlan>> {
    let rows: Vec<PlanRow> = sqlx::query_as(
        "SELECT * FROM action_plans WHERE customer_id = ? AND status = 'active' \
         ORDER BY created_at",
    )
    .bind(customer_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PlanRow::into_plan).collect()
}

/// Insert a new plan row
pub async fn insert(pool: &SqlitePool, plan: &ActionPlan) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO action_plans
            (guid, customer_id, badge, recommendation, what_to_do, why_strategy, status,
             completed_at, canceled_at, assigned_user_id, assigned_team_id, board_card_id,
             last_promoted_at, last_promoted_by, last_promoted_board_id,
             last_promoted_column_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(plan.guid.to_string())
    .bind(plan.customer_id.to_string())
    .bind(plan.badge.as_str())
    .bind(&plan.recommendation)
    .bind(&plan.what_to_do)
    .bind(&plan.why_strategy)
    .bind(plan.status.as_str())
    .bind(plan.completed_at)
    .bind(plan.canceled_at)
    .bind(plan.assigned_user_id.map(|u| u.to_string()))
    .bind(plan.assigned_team_id.map(|u| u.to_string()))
    .bind(plan.board_card_id.map(|u| u.to_string()))
    .bind(plan.last_promoted_at)
    .bind(plan.last_promoted_by.map(|u| u.to_string()))
    .bind(plan.last_promoted_board_id.map(|u| u.to_string()))
    .bind(plan.last_promoted_column_id.map(|u| u.to_string()))
    .bind(plan.created_at)
    .bind(plan.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist a lifecycle transition (status + timestamp fields)
pub async fn update_status(pool: &SqlitePool, plan: &ActionPlan) -> Result<()> {
    sqlx::query(
        "UPDATE action_plans \
         SET status = ?, completed_at = ?, canceled_at = ?, updated_at = ? \
         WHERE guid = ?",
    )
    .bind(plan.status.as_str())
    .bind(plan.completed_at)
    .bind(plan.canceled_at)
    .bind(plan.updated_at)
    .bind(plan.guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist user/team assignment
pub async fn update_assignment(pool: &SqlitePool, plan: &ActionPlan) -> Result<()> {
    sqlx::query(
        "UPDATE action_plans \
         SET assigned_user_id = ?, assigned_team_id = ?, updated_at = ? \
         WHERE guid = ?",
    )
    .bind(plan.assigned_user_id.map(|u| u.to_string()))
    .bind(plan.assigned_team_id.map(|u| u.to_string()))
    .bind(plan.updated_at)
    .bind(plan.guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist board promotion metadata and the card back-reference
pub async fn update_promotion(pool: &SqlitePool, plan: &ActionPlan) -> Result<()> {
    sqlx::query(
        "UPDATE action_plans \
         SET board_card_id = ?, last_promoted_at = ?, last_promoted_by = ?, \
             last_promoted_board_id = ?, last_promoted_column_id = ?, updated_at = ? \
         WHERE guid = ?",
    )
    .bind(plan.board_card_id.map(|u| u.to_string()))
    .bind(plan.last_promoted_at)
    .bind(plan.last_promoted_by.map(|u| u.to_string()))
    .bind(plan.last_promoted_board_id.map(|u| u.to_string()))
    .bind(plan.last_promoted_column_id.map(|u| u.to_string()))
    .bind(plan.updated_at)
    .bind(plan.guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one ordered action item
pub async fn insert_item(pool: &SqlitePool, item: &ActionItem) -> Result<()> {
    sqlx::query(
        "INSERT INTO action_items (guid, plan_id, kind, description, position, status) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(item.guid.to_string())
    .bind(item.plan_id.to_string())
    .bind(item.kind.as_str())
    .bind(&item.description)
    .bind(item.position)
    .bind(item.status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// All items of a plan, in order
pub async fn items_for_plan(pool: &SqlitePool, plan_id: Uuid) -> Result<Vec<ActionItem>> {
    let rows: Vec<(String, String, String, String, i64, String)> = sqlx::query_as(
        "SELECT guid, plan_id, kind, description, position, status \
         FROM action_items WHERE plan_id = ? ORDER BY position",
    )
    .bind(plan_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(guid, plan_id, kind, description, position, status)| {
            Ok(ActionItem {
                guid: parse_guid(&guid)?,
                plan_id: parse_guid(&plan_id)?,
                kind: ActionItemKind::parse(&kind)
                    .ok_or_else(|| Error::Internal(format!("Invalid item kind: {}", kind)))?,
                description,
                position,
                status: ActionItemStatus::parse(&status)
                    .ok_or_else(|| Error::Internal(format!("Invalid item status: {}", status)))?,
            })
        })
        .collect()
}

/// Fetch the board card mirroring a plan, if one exists
pub async fn card_for_plan(pool: &SqlitePool, plan_id: Uuid) -> Result<Option<BoardCard>> {
    let row: Option<(String, String, String, String, String, i64, DateTime<Utc>, DateTime<Utc>)> =
        sqlx::query_as(
            "SELECT guid, plan_id, board_id, column_id, status, position, created_at, updated_at \
             FROM board_cards WHERE plan_id = ?",
        )
        .bind(plan_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(
        |(guid, plan_id, board_id, column_id, status, position, created_at, updated_at)| {
            Ok(BoardCard {
                guid: parse_guid(&guid)?,
                plan_id: parse_guid(&plan_id)?,
                board_id: parse_guid(&board_id)?,
                column_id: parse_guid(&column_id)?,
                status: CardStatus::parse(&status)
                    .ok_or_else(|| Error::Internal(format!("Invalid card status: {}", status)))?,
                position,
                created_at,
                updated_at,
            })
        },
    )
    .transpose()
}

/// Insert a board card
pub async fn insert_card(pool: &SqlitePool, card: &BoardCard) -> Result<()> {
    sqlx::query(
        "INSERT INTO board_cards \
         (guid, plan_id, board_id, column_id, status, position, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(card.guid.to_string())
    .bind(card.plan_id.to_string())
    .bind(card.board_id.to_string())
    .bind(card.column_id.to_string())
    .bind(card.status.as_str())
    .bind(card.position)
    .bind(card.created_at)
    .bind(card.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist card status/column/position changes
pub async fn update_card(pool: &SqlitePool, card: &BoardCard) -> Result<()> {
    sqlx::query(
        "UPDATE board_cards \
         SET board_id = ?, column_id = ?, status = ?, position = ?, updated_at = ? \
         WHERE guid = ?",
    )
    .bind(card.board_id.to_string())
    .bind(card.column_id.to_string())
    .bind(card.status.as_str())
    .bind(card.position)
    .bind(card.updated_at)
    .bind(card.guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Number of cards currently in a board column (new cards append at the end)
pub async fn count_cards_in_column(
    pool: &SqlitePool,
    board_id: Uuid,
    column_id: Uuid,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM board_cards WHERE board_id = ? AND column_id = ?",
    )
    .bind(board_id.to_string())
    .bind(column_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Append one audit-trail row
pub async fn insert_audit(pool: &SqlitePool, entry: &AuditEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO action_plan_audit \
         (guid, plan_id, previous_status, new_status, actor_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.guid.to_string())
    .bind(entry.plan_id.to_string())
    .bind(entry.previous_status.as_str())
    .bind(entry.new_status.as_str())
    .bind(entry.actor_id.map(|u| u.to_string()))
    .bind(entry.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Number of audit rows recorded for a plan
pub async fn audit_count(pool: &SqlitePool, plan_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM action_plan_audit WHERE plan_id = ?")
        .bind(plan_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}
