//! Action plan lifecycle
//!
//! State machine over `PlanStatus` with an audit row per transition and a
//! mirrored board card kept in sync within the same call. Valid
//! transitions: active to completed, active to canceled, completed back to
//! active. Canceled is terminal.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use triage_common::db::models::{
    ActionItem, ActionPlan, AuditEntry, BoardCard, PlanStatus,
};
use triage_common::events::{ChangeAction, ChangeBus, ChangeType, DatabaseChange};
use triage_common::{Error, Result};
use uuid::Uuid;

use crate::db;

/// Full plan view returned by every lifecycle operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanProjection {
    #[serde(flatten)]
    pub plan: ActionPlan,
    pub action_items: Vec<ActionItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_card: Option<BoardCard>,
}

pub struct PlanService {
    db: SqlitePool,
    bus: ChangeBus,
}

impl PlanService {
    pub fn new(db: SqlitePool, bus: ChangeBus) -> Self {
        Self { db, bus }
    }

    /// Load a plan's projection, scoped to the organization
    pub async fn projection(&self, org_id: Uuid, plan_id: Uuid) -> Result<PlanProjection> {
        let plan = db::action_plans::get_for_org(&self.db, org_id, plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Action plan {}", plan_id)))?;
        self.project(plan).await
    }

    pub async fn complete(
        &self,
        org_id: Uuid,
        plan_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<PlanProjection> {
        self.transition(org_id, plan_id, PlanStatus::Completed, actor_id)
            .await
    }

    /// Reopen a completed plan
    pub async fn mark_incomplete(
        &self,
        org_id: Uuid,
        plan_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<PlanProjection> {
        self.transition(org_id, plan_id, PlanStatus::Active, actor_id)
            .await
    }

    pub async fn cancel(
        &self,
        org_id: Uuid,
        plan_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<PlanProjection> {
        self.transition(org_id, plan_id, PlanStatus::Canceled, actor_id)
            .await
    }

    /// Apply one status transition: stamp timestamps, write the audit row,
    /// mirror the linked board card, emit `actionPlan:updated`.
    async fn transition(
        &self,
        org_id: Uuid,
        plan_id: Uuid,
        new_status: PlanStatus,
        actor_id: Option<Uuid>,
    ) -> Result<PlanProjection> {
        let mut plan = db::action_plans::get_for_org(&self.db, org_id, plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Action plan {}", plan_id)))?;

        let previous = plan.status;
        match (previous, new_status) {
            (PlanStatus::Active, PlanStatus::Completed)
            | (PlanStatus::Active, PlanStatus::Canceled)
            | (PlanStatus::Completed, PlanStatus::Active) => {}
            (PlanStatus::Canceled, _) => {
                return Err(Error::InvalidInput(
                    "Canceled plans cannot change status".to_string(),
                ));
            }
            (from, to) => {
                return Err(Error::InvalidInput(format!(
                    "Invalid plan transition {} -> {}",
                    from.as_str(),
                    to.as_str()
                )));
            }
        }

        let now = Utc::now();
        plan.status = new_status;
        plan.completed_at = match new_status {
            PlanStatus::Completed => Some(now),
            _ => None,
        };
        plan.canceled_at = match new_status {
            PlanStatus::Canceled => Some(now),
            _ => plan.canceled_at,
        };
        plan.updated_at = now;

        db::action_plans::update_status(&self.db, &plan).await?;

        db::action_plans::insert_audit(
            &self.db,
            &AuditEntry {
                guid: Uuid::new_v4(),
                plan_id: plan.guid,
                previous_status: previous,
                new_status,
                actor_id,
                created_at: now,
            },
        )
        .await?;

        let card = self.sync_card(org_id, &plan).await?;

        tracing::info!(
            plan = %plan.guid,
            from = previous.as_str(),
            to = new_status.as_str(),
            "Action plan transitioned"
        );
        self.bus.emit(DatabaseChange::new(
            ChangeType::ActionPlan,
            ChangeAction::Updated,
            org_id,
            plan.guid,
            Some(json!({
                "status": plan.status,
                "customerId": plan.customer_id,
            })),
        ));

        let items = db::action_plans::items_for_plan(&self.db, plan.guid).await?;
        Ok(PlanProjection {
            plan,
            action_items: items,
            board_card: card,
        })
    }

    /// Update who owns the plan
    pub async fn assign(
        &self,
        org_id: Uuid,
        plan_id: Uuid,
        user_id: Option<Uuid>,
        team_id: Option<Uuid>,
    ) -> Result<PlanProjection> {
        let mut plan = db::action_plans::get_for_org(&self.db, org_id, plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Action plan {}", plan_id)))?;

        plan.assigned_user_id = user_id;
        plan.assigned_team_id = team_id;
        plan.updated_at = Utc::now();
        db::action_plans::update_assignment(&self.db, &plan).await?;

        self.bus.emit(DatabaseChange::new(
            ChangeType::ActionPlan,
            ChangeAction::Updated,
            org_id,
            plan.guid,
            Some(json!({
                "assignedUserId": plan.assigned_user_id,
                "assignedTeamId": plan.assigned_team_id,
                "customerId": plan.customer_id,
            })),
        ));

        self.project(plan).await
    }

    /// Place the plan's card on a board column, creating the card on first
    /// promotion and moving it afterwards. Records routing metadata on the
    /// plan so later promotions can default to the last destination.
    pub async fn promote_to_board(
        &self,
        org_id: Uuid,
        plan_id: Uuid,
        board_id: Uuid,
        column_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<PlanProjection> {
        let mut plan = db::action_plans::get_for_org(&self.db, org_id, plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Action plan {}", plan_id)))?;

        let now = Utc::now();
        let position = db::action_plans::count_cards_in_column(&self.db, board_id, column_id).await?;

        let card = match db::action_plans::card_for_plan(&self.db, plan.guid).await? {
            Some(mut card) => {
                card.board_id = board_id;
                card.column_id = column_id;
                card.status = plan.status.card_status();
                card.position = position;
                card.updated_at = now;
                db::action_plans::update_card(&self.db, &card).await?;

                self.bus.emit(DatabaseChange::new(
                    ChangeType::BoardCard,
                    ChangeAction::Updated,
                    org_id,
                    card.guid,
                    Some(json!({ "planId": plan.guid, "columnId": column_id })),
                ));
                card
            }
            None => {
                let card = BoardCard {
                    guid: Uuid::new_v4(),
                    plan_id: plan.guid,
                    board_id,
                    column_id,
                    status: plan.status.card_status(),
                    position,
                    created_at: now,
                    updated_at: now,
                };
                db::action_plans::insert_card(&self.db, &card).await?;

                self.bus.emit(DatabaseChange::new(
                    ChangeType::BoardCard,
                    ChangeAction::Created,
                    org_id,
                    card.guid,
                    Some(json!({ "planId": plan.guid, "columnId": column_id })),
                ));
                card
            }
        };

        plan.board_card_id = Some(card.guid);
        plan.last_promoted_at = Some(now);
        plan.last_promoted_by = actor_id;
        plan.last_promoted_board_id = Some(board_id);
        plan.last_promoted_column_id = Some(column_id);
        plan.updated_at = now;
        db::action_plans::update_promotion(&self.db, &plan).await?;

        self.bus.emit(DatabaseChange::new(
            ChangeType::ActionPlan,
            ChangeAction::Updated,
            org_id,
            plan.guid,
            Some(json!({
                "boardCardId": card.guid,
                "customerId": plan.customer_id,
            })),
        ));

        let items = db::action_plans::items_for_plan(&self.db, plan.guid).await?;
        Ok(PlanProjection {
            plan,
            action_items: items,
            board_card: Some(card),
        })
    }

    /// Push the plan's status onto its linked board card, if it has one
    async fn sync_card(&self, org_id: Uuid, plan: &ActionPlan) -> Result<Option<BoardCard>> {
        let Some(mut card) = db::action_plans::card_for_plan(&self.db, plan.guid).await? else {
            return Ok(None);
        };

        let mirrored = plan.status.card_status();
        if card.status != mirrored {
            card.status = mirrored;
            card.updated_at = plan.updated_at;
            db::action_plans::update_card(&self.db, &card).await?;

            self.bus.emit(DatabaseChange::new(
                ChangeType::BoardCard,
                ChangeAction::Updated,
                org_id,
                card.guid,
                Some(json!({ "planId": plan.guid, "status": card.status })),
            ));
        }

        Ok(Some(card))
    }

    async fn project(&self, plan: ActionPlan) -> Result<PlanProjection> {
        let items = db::action_plans::items_for_plan(&self.db, plan.guid).await?;
        let card = db::action_plans::card_for_plan(&self.db, plan.guid).await?;
        Ok(PlanProjection {
            plan,
            action_items: items,
            board_card: card,
        })
    }
}
