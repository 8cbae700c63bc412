//! Reconciliation engine
//!
//! Applies one analyzed communication to the tenant's records in a fixed
//! order: customer resolution, conversation insert, aggregate advance,
//! last-communication upsert, then plan supersession when the analysis
//! recommends one. Each durable write is followed immediately by its
//! change event, so subscribers observe the same order the database does.
//! There is no cross-step rollback; a failure after committed steps leaves
//! those rows standing and surfaces as an error.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use triage_common::db::models::{
    ActionItem, ActionItemStatus, ActionPlan, Channel, Conversation, LastCommunication,
    PlanStatus,
};
use triage_common::events::{ChangeAction, ChangeBus, ChangeType, DatabaseChange};
use triage_common::Result;
use uuid::Uuid;

use crate::db;
use crate::db::communications::LastCommUpdate;

use super::action_plans::PlanService;
use super::analyzer::{AnalysisResult, PlanSuggestion};
use super::identity_matcher::IdentityMatcher;
use super::IngestMetadata;

/// Identifiers of everything one ingestion touched or created
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub customer_id: Uuid,
    pub conversation_id: Uuid,
    pub action_plan_id: Option<Uuid>,
}

pub struct Reconciler {
    db: SqlitePool,
    bus: ChangeBus,
    matcher: IdentityMatcher,
    plans: PlanService,
}

impl Reconciler {
    pub fn new(db: SqlitePool, bus: ChangeBus) -> Self {
        let matcher = IdentityMatcher::new(db.clone(), bus.clone());
        let plans = PlanService::new(db.clone(), bus.clone());
        Self {
            db,
            bus,
            matcher,
            plans,
        }
    }

    /// Reconcile one analyzed communication into the org's records.
    ///
    /// `user_id` identifies the acting user when the caller supplies one;
    /// it is recorded as the actor on any plan superseded by this call.
    pub async fn ingest(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
        channel: Channel,
        transcript: &str,
        metadata: &IngestMetadata,
        analysis: &AnalysisResult,
    ) -> Result<IngestOutcome> {
        let occurred_at = metadata.date.unwrap_or_else(Utc::now);

        let (customer, outcome) = self.matcher.resolve(org_id, &analysis.customer).await?;
        tracing::debug!(
            customer = %customer.guid,
            outcome = ?outcome,
            "Resolved communication to customer"
        );

        let conversation = Conversation {
            guid: Uuid::new_v4(),
            customer_id: customer.guid,
            channel,
            occurred_at,
            transcript: transcript.to_string(),
            summary: analysis.summary.clone(),
            sentiment: analysis.sentiment,
            intent: analysis.intent.clone(),
            insights: analysis.insights.clone(),
            key_stats: analysis.key_stats.clone(),
            duration_seconds: metadata.duration_seconds,
            message_count: metadata.message_count,
            created_at: Utc::now(),
        };
        db::conversations::insert(&self.db, &conversation).await?;
        self.bus.emit(DatabaseChange::new(
            ChangeType::Conversation,
            ChangeAction::Created,
            org_id,
            conversation.guid,
            Some(json!({
                "customerId": customer.guid,
                "channel": channel,
                "sentiment": conversation.sentiment,
            })),
        ));

        let aggregate =
            db::communications::advance(&self.db, customer.guid, channel, occurred_at).await?;
        self.bus.emit(DatabaseChange::new(
            ChangeType::Communication,
            if aggregate.created {
                ChangeAction::Created
            } else {
                ChangeAction::Updated
            },
            org_id,
            aggregate.communication.guid,
            Some(json!({
                "customerId": customer.guid,
                "channel": channel,
                "count": aggregate.communication.count,
            })),
        ));

        let last_update = db::communications::upsert_last(
            &self.db,
            LastCommunication {
                customer_id: customer.guid,
                channel,
                occurred_at,
                topic: analysis.topic.clone(),
                short_topic: analysis.short_topic.clone(),
                long_topic: analysis.long_topic.clone(),
                updated_at: Utc::now(),
            },
        )
        .await?;
        match last_update {
            LastCommUpdate::Created(last) => {
                self.bus.emit(DatabaseChange::new(
                    ChangeType::LastCommunication,
                    ChangeAction::Created,
                    org_id,
                    last.customer_id,
                    Some(json!({ "topic": last.topic, "channel": last.channel })),
                ));
            }
            LastCommUpdate::Updated(last) => {
                self.bus.emit(DatabaseChange::new(
                    ChangeType::LastCommunication,
                    ChangeAction::Updated,
                    org_id,
                    last.customer_id,
                    Some(json!({ "topic": last.topic, "channel": last.channel })),
                ));
            }
            LastCommUpdate::Stale => {
                tracing::debug!(
                    customer = %customer.guid,
                    "Incoming communication older than stored last contact; skipped"
                );
            }
        }

        let action_plan_id = match &analysis.action_plan {
            Some(suggestion) => Some(
                self.create_plan(org_id, user_id, customer.guid, suggestion)
                    .await?,
            ),
            None => None,
        };

        Ok(IngestOutcome {
            customer_id: customer.guid,
            conversation_id: conversation.guid,
            action_plan_id,
        })
    }

    /// Insert the suggested plan, superseding any active plans first so a
    /// customer carries at most one active plan.
    async fn create_plan(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
        customer_id: Uuid,
        suggestion: &PlanSuggestion,
    ) -> Result<Uuid> {
        for stale in db::action_plans::list_active_for_customer(&self.db, customer_id).await? {
            tracing::info!(
                plan = %stale.guid,
                customer = %customer_id,
                "Superseding active plan with newer recommendation"
            );
            self.plans.cancel(org_id, stale.guid, user_id).await?;
        }

        let now = Utc::now();
        let plan = ActionPlan {
            guid: Uuid::new_v4(),
            customer_id,
            badge: suggestion.badge,
            recommendation: suggestion.recommendation.clone(),
            what_to_do: suggestion.what_to_do.clone(),
            why_strategy: suggestion.why_strategy.clone(),
            status: PlanStatus::Active,
            completed_at: None,
            canceled_at: None,
            assigned_user_id: None,
            assigned_team_id: None,
            board_card_id: None,
            last_promoted_at: None,
            last_promoted_by: None,
            last_promoted_board_id: None,
            last_promoted_column_id: None,
            created_at: now,
            updated_at: now,
        };
        db::action_plans::insert(&self.db, &plan).await?;
        self.bus.emit(DatabaseChange::new(
            ChangeType::ActionPlan,
            ChangeAction::Created,
            org_id,
            plan.guid,
            Some(json!({
                "customerId": customer_id,
                "badge": plan.badge,
                "status": plan.status,
            })),
        ));

        for (position, step) in suggestion.action_items.iter().enumerate() {
            let item = ActionItem {
                guid: Uuid::new_v4(),
                plan_id: plan.guid,
                kind: step.kind,
                description: step.description.clone(),
                position: position as i64,
                status: ActionItemStatus::Pending,
            };
            db::action_plans::insert_item(&self.db, &item).await?;
            self.bus.emit(DatabaseChange::new(
                ChangeType::ActionItem,
                ChangeAction::Created,
                org_id,
                item.guid,
                Some(json!({ "planId": plan.guid, "kind": item.kind })),
            ));
        }

        Ok(plan.guid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_util::{seed_org, setup_pool};
    use crate::services::analyzer::SuggestedItem;
    use crate::services::identity_matcher::ContactCandidate;
    use chrono::Duration;
    use std::sync::{Arc, Mutex};
    use triage_common::db::models::{ActionItemKind, Badge, Sentiment};

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            customer: ContactCandidate {
                name: "Dana Alvarez".to_string(),
                company_name: Some("Northwind Traders".to_string()),
                email: Some("dana@northwind.example".to_string()),
                phone: None,
                risk_score: Some(80),
                opportunity_score: None,
            },
            summary: "Wants to cancel over stalled onboarding.".to_string(),
            sentiment: Sentiment::Negative,
            intent: Some("cancel subscription".to_string()),
            insights: vec!["Onboarding incomplete".to_string()],
            key_stats: serde_json::json!({"seats": 40}),
            topic: "Cancellation risk".to_string(),
            short_topic: "Cancellation".to_string(),
            long_topic: "Customer wants to cancel over stalled onboarding".to_string(),
            action_plan: Some(PlanSuggestion {
                badge: Badge::AtRisk,
                recommendation: "Call Dana today.".to_string(),
                what_to_do: None,
                why_strategy: None,
                action_items: vec![SuggestedItem {
                    kind: ActionItemKind::Call,
                    description: "Call Dana about onboarding".to_string(),
                }],
            }),
            fallback: false,
        }
    }

    #[tokio::test]
    async fn test_ingest_creates_full_record_set() {
        let pool = setup_pool().await;
        let org_id = seed_org(&pool, "key-a").await;
        let reconciler = Reconciler::new(pool.clone(), ChangeBus::new());

        let outcome = reconciler
            .ingest(
                org_id,
                None,
                Channel::Email,
                "I want to cancel.",
                &IngestMetadata::default(),
                &analysis(),
            )
            .await
            .unwrap();

        let customer = db::customers::get(&pool, outcome.customer_id).await.unwrap();
        assert_eq!(customer.email.as_deref(), Some("dana@northwind.example"));
        assert_eq!(customer.risk_score, Some(80));

        assert_eq!(
            db::conversations::count_for_customer(&pool, customer.guid)
                .await
                .unwrap(),
            1
        );
        let aggregate = db::communications::get(&pool, customer.guid, Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.count, 1);

        let plan_id = outcome.action_plan_id.unwrap();
        let plan = db::action_plans::get(&pool, plan_id).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Active);
        assert_eq!(plan.badge, Badge::AtRisk);
        assert_eq!(
            db::action_plans::items_for_plan(&pool, plan_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_events_follow_write_order() {
        let pool = setup_pool().await;
        let org_id = seed_org(&pool, "key-a").await;
        let bus = ChangeBus::new();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = bus.subscribe(
            None,
            None,
            Arc::new(move |change| sink.lock().unwrap().push(change.key())),
        );
        let reconciler = Reconciler::new(pool.clone(), bus);

        reconciler
            .ingest(
                org_id,
                None,
                Channel::Email,
                "I want to cancel.",
                &IngestMetadata::default(),
                &analysis(),
            )
            .await
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [
                "customer:created",
                "conversation:created",
                "communication:created",
                "lastCommunication:created",
                "actionPlan:created",
                "actionItem:created",
            ]
        );
    }

    #[tokio::test]
    async fn test_new_recommendation_supersedes_active_plan() {
        let pool = setup_pool().await;
        let org_id = seed_org(&pool, "key-a").await;
        let reconciler = Reconciler::new(pool.clone(), ChangeBus::new());

        let first = reconciler
            .ingest(
                org_id,
                None,
                Channel::Email,
                "I want to cancel.",
                &IngestMetadata::default(),
                &analysis(),
            )
            .await
            .unwrap();
        let agent = Uuid::new_v4();
        let second = reconciler
            .ingest(
                org_id,
                Some(agent),
                Channel::Phone,
                "Following up on my cancellation.",
                &IngestMetadata::default(),
                &analysis(),
            )
            .await
            .unwrap();

        assert_eq!(first.customer_id, second.customer_id, "matched by email");

        let active = db::action_plans::list_active_for_customer(&pool, first.customer_id)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(Some(active[0].guid), second.action_plan_id);

        let old = db::action_plans::get(&pool, first.action_plan_id.unwrap())
            .await
            .unwrap();
        assert_eq!(old.status, PlanStatus::Canceled);
        assert_eq!(
            db::action_plans::audit_count(&pool, old.guid).await.unwrap(),
            1
        );

        // The supersession audit row names the ingesting user as actor
        let actor: Option<String> =
            sqlx::query_scalar("SELECT actor_id FROM action_plan_audit WHERE plan_id = ?")
                .bind(old.guid.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(actor.as_deref(), Some(agent.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_out_of_order_event_does_not_regress_last_communication() {
        let pool = setup_pool().await;
        let org_id = seed_org(&pool, "key-a").await;
        let reconciler = Reconciler::new(pool.clone(), ChangeBus::new());
        let now = Utc::now();

        let newer = IngestMetadata {
            date: Some(now),
            ..Default::default()
        };
        let outcome = reconciler
            .ingest(org_id, None, Channel::Email, "newest message", &newer, &analysis())
            .await
            .unwrap();

        let older = IngestMetadata {
            date: Some(now - Duration::hours(2)),
            ..Default::default()
        };
        let mut stale_analysis = analysis();
        stale_analysis.topic = "Old topic".to_string();
        reconciler
            .ingest(org_id, None, Channel::Email, "older message", &older, &stale_analysis)
            .await
            .unwrap();

        let last = db::communications::get_last(&pool, outcome.customer_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.topic, "Cancellation risk");
        assert!((last.occurred_at - now).num_seconds().abs() < 1);

        // The aggregate still counts the stale message.
        let aggregate = db::communications::get(&pool, outcome.customer_id, Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.count, 2);
    }
}
