//! Communication aggregate and last-communication queries

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use triage_common::{
    db::models::{Channel, Communication, LastCommunication},
    Error, Result,
};
use uuid::Uuid;

use super::parse_guid;

/// Result of advancing an aggregate: the row plus whether it was created
pub struct AggregateUpdate {
    pub communication: Communication,
    pub created: bool,
}

/// Fetch the aggregate for (customer, channel), if any
pub async fn get(
    pool: &SqlitePool,
    customer_id: Uuid,
    channel: Channel,
) -> Result<Option<Communication>> {
    let row: Option<(String, String, String, i64, DateTime<Utc>)> = sqlx::query_as(
        "SELECT guid, customer_id, channel, count, last_at FROM communications \
         WHERE customer_id = ? AND channel = ?",
    )
    .bind(customer_id.to_string())
    .bind(channel.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|(guid, customer_id, channel, count, last_at)| {
        Ok(Communication {
            guid: parse_guid(&guid)?,
            customer_id: parse_guid(&customer_id)?,
            channel: Channel::parse(&channel)
                .ok_or_else(|| Error::Internal(format!("Invalid channel in database: {}", channel)))?,
            count,
            last_at,
        })
    })
    .transpose()
}

/// Increment the (customer, channel) counter and advance its last-contact time
///
/// Created lazily on first contact of that channel. The count only ever
/// increases; `last_at` only moves forward.
pub async fn advance(
    pool: &SqlitePool,
    customer_id: Uuid,
    channel: Channel,
    occurred_at: DateTime<Utc>,
) -> Result<AggregateUpdate> {
    match get(pool, customer_id, channel).await? {
        Some(mut existing) => {
            existing.count += 1;
            if occurred_at > existing.last_at {
                existing.last_at = occurred_at;
            }
            sqlx::query("UPDATE communications SET count = ?, last_at = ? WHERE guid = ?")
                .bind(existing.count)
                .bind(existing.last_at)
                .bind(existing.guid.to_string())
                .execute(pool)
                .await?;
            Ok(AggregateUpdate {
                communication: existing,
                created: false,
            })
        }
        None => {
            let communication = Communication {
                guid: Uuid::new_v4(),
                customer_id,
                channel,
                count: 1,
                last_at: occurred_at,
            };
            sqlx::query(
                "INSERT INTO communications (guid, customer_id, channel, count, last_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(communication.guid.to_string())
            .bind(customer_id.to_string())
            .bind(channel.as_str())
            .bind(communication.count)
            .bind(communication.last_at)
            .execute(pool)
            .await?;
            Ok(AggregateUpdate {
                communication,
                created: true,
            })
        }
    }
}

/// Result of a last-communication upsert
pub enum LastCommUpdate {
    Created(LastCommunication),
    Updated(LastCommunication),
    /// Incoming event is older than the stored one; nothing written
    Stale,
}

/// Fetch a customer's last-communication row, if any
pub async fn get_last(pool: &SqlitePool, customer_id: Uuid) -> Result<Option<LastCommunication>> {
    let row: Option<(String, String, DateTime<Utc>, String, String, String, DateTime<Utc>)> =
        sqlx::query_as(
            "SELECT customer_id, channel, occurred_at, topic, short_topic, long_topic, updated_at \
             FROM last_communications WHERE customer_id = ?",
        )
        .bind(customer_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(
        |(customer_id, channel, occurred_at, topic, short_topic, long_topic, updated_at)| {
            Ok(LastCommunication {
                customer_id: parse_guid(&customer_id)?,
                channel: Channel::parse(&channel).ok_or_else(|| {
                    Error::Internal(format!("Invalid channel in database: {}", channel))
                })?,
                occurred_at,
                topic,
                short_topic,
                long_topic,
                updated_at,
            })
        },
    )
    .transpose()
}

/// Overwrite the last-communication summary, but only monotonically
///
/// A stored row is never replaced by an older event.
pub async fn upsert_last(
    pool: &SqlitePool,
    incoming: LastCommunication,
) -> Result<LastCommUpdate> {
    match get_last(pool, incoming.customer_id).await? {
        Some(existing) if incoming.occurred_at < existing.occurred_at => Ok(LastCommUpdate::Stale),
        Some(_) => {
            sqlx::query(
                "UPDATE last_communications \
                 SET channel = ?, occurred_at = ?, topic = ?, short_topic = ?, long_topic = ?, \
                     updated_at = ? \
                 WHERE customer_id = ?",
            )
            .bind(incoming.channel.as_str())
            .bind(incoming.occurred_at)
            .bind(&incoming.topic)
            .bind(&incoming.short_topic)
            .bind(&incoming.long_topic)
            .bind(incoming.updated_at)
            .bind(incoming.customer_id.to_string())
            .execute(pool)
            .await?;
            Ok(LastCommUpdate::Updated(incoming))
        }
        None => {
            sqlx::query(
                "INSERT INTO last_communications \
                 (customer_id, channel, occurred_at, topic, short_topic, long_topic, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(incoming.customer_id.to_string())
            .bind(incoming.channel.as_str())
            .bind(incoming.occurred_at)
            .bind(&incoming.topic)
            .bind(&incoming.short_topic)
            .bind(&incoming.long_topic)
            .bind(incoming.updated_at)
            .execute(pool)
            .await?;
            Ok(LastCommUpdate::Created(incoming))
        }
    }
}
