//! Conversation table queries
//!
//! Conversations are immutable: insert-only, no update surface.

use sqlx::SqlitePool;
use triage_common::{db::models::Conversation, Result};

/// Insert one conversation record
pub async fn insert(pool: &SqlitePool, conversation: &Conversation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversations
            (guid, customer_id, channel, occurred_at, transcript, summary, sentiment,
             intent, insights, key_stats, duration_seconds, message_count, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(conversation.guid.to_string())
    .bind(conversation.customer_id.to_string())
    .bind(conversation.channel.as_str())
    .bind(conversation.occurred_at)
    .bind(&conversation.transcript)
    .bind(&conversation.summary)
    .bind(conversation.sentiment.as_str())
    .bind(&conversation.intent)
    .bind(serde_json::to_string(&conversation.insights).unwrap_or_else(|_| "[]".to_string()))
    .bind(conversation.key_stats.to_string())
    .bind(conversation.duration_seconds)
    .bind(conversation.message_count)
    .bind(conversation.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Number of conversations recorded for a customer
pub async fn count_for_customer(pool: &SqlitePool, customer_id: uuid::Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE customer_id = ?")
            .bind(customer_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_util::{seed_customer, seed_org, setup_pool};
    use chrono::Utc;
    use triage_common::db::models::{Channel, Sentiment};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_insert_and_count() {
        let pool = setup_pool().await;
        let org = seed_org(&pool, "k").await;
        let customer_id = seed_customer(&pool, org).await.guid;

        let conversation = Conversation {
            guid: Uuid::new_v4(),
            customer_id,
            channel: Channel::Email,
            occurred_at: Utc::now(),
            transcript: "I want to cancel".to_string(),
            summary: "Cancellation request".to_string(),
            sentiment: Sentiment::Negative,
            intent: Some("cancel".to_string()),
            insights: vec!["churn risk".to_string()],
            key_stats: serde_json::json!({}),
            duration_seconds: None,
            message_count: Some(1),
            created_at: Utc::now(),
        };

        insert(&pool, &conversation).await.unwrap();
        assert_eq!(count_for_customer(&pool, customer_id).await.unwrap(), 1);
        assert_eq!(count_for_customer(&pool, Uuid::new_v4()).await.unwrap(), 0);
    }
}
