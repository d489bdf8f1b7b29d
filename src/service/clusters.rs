//! Cluster membership (ordered signal links) and cluster statistics.

use crate::embedding;
use crate::error::AppError;
use crate::geo::{centroid, haversine_km, GeoPoint};
use crate::model::ResolvedModel;
use crate::service::crud::row_to_json;
use crate::sql::quoted;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgExecutor;

/// Link a signal to a cluster. Without a position it goes after the last one; re-adding keeps the old position.
pub async fn add_signal<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    cluster_id: &str,
    signal_id: &str,
    position: Option<i32>,
) -> Result<Value, AppError> {
    let links = model.table("cluster_signals");
    let sql = format!(
        "INSERT INTO {links} (cluster_id, signal_id, position) \
         VALUES ($1, $2, COALESCE($3, (SELECT COALESCE(MAX(position), -1) + 1 FROM {links} WHERE cluster_id = $1))) \
         ON CONFLICT (cluster_id, signal_id) \
         DO UPDATE SET position = COALESCE($3, {links}.position), updated_at = NOW() \
         RETURNING *"
    );
    tracing::debug!(sql = %sql, cluster_id, signal_id, ?position, "query");
    let row = sqlx::query(&sql)
        .bind(cluster_id)
        .bind(signal_id)
        .bind(position)
        .fetch_one(exec)
        .await?;
    row_to_json(&row)
}

/// Position after the cluster's last link, or 0 for an empty cluster.
pub async fn next_position<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    cluster_id: &str,
) -> Result<i32, AppError> {
    let sql = format!(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM {} WHERE cluster_id = $1",
        model.table("cluster_signals")
    );
    Ok(sqlx::query_scalar::<_, i32>(&sql).bind(cluster_id).fetch_one(exec).await?)
}

/// Signals of a cluster in link order, each with its `position`.
pub async fn list_signals<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    cluster_id: &str,
) -> Result<Vec<Value>, AppError> {
    let signals = model
        .entity_by_path("signals")
        .ok_or_else(|| AppError::NotFound("signals".into()))?;
    let columns: Vec<String> = signals
        .columns
        .iter()
        .map(|c| format!("s.{}", quoted(&c.name)))
        .collect();
    let sql = format!(
        "SELECT {}, cs.position FROM {} s JOIN {} cs ON cs.signal_id = s.id \
         WHERE cs.cluster_id = $1 ORDER BY cs.position, cs.created_at, s.id",
        columns.join(", "),
        model.table("signals"),
        model.table("cluster_signals")
    );
    tracing::debug!(sql = %sql, cluster_id, "query");
    let rows = sqlx::query(&sql).bind(cluster_id).fetch_all(exec).await?;
    rows.iter().map(row_to_json).collect()
}

/// Unlink a signal. False when it was not in the cluster.
pub async fn remove_signal<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    cluster_id: &str,
    signal_id: &str,
) -> Result<bool, AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE cluster_id = $1 AND signal_id = $2",
        model.table("cluster_signals")
    );
    let done = sqlx::query(&sql).bind(cluster_id).bind(signal_id).execute(exec).await?;
    Ok(done.rows_affected() > 0)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStats {
    pub signal_count: usize,
    pub located_count: usize,
    pub centroid: Option<Centroid>,
    /// Greatest distance from the centroid to a located signal.
    pub max_distance_km: Option<f64>,
    pub mean_embedding: Option<Vec<f32>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Centroid {
    pub latitude: f64,
    pub longitude: f64,
}

impl ClusterStats {
    pub fn from_signals(signals: &[Value]) -> Self {
        let points: Vec<GeoPoint> = signals
            .iter()
            .filter_map(|s| {
                let lat = s.get("latitude")?.as_f64()?;
                let lon = s.get("longitude")?.as_f64()?;
                GeoPoint::new(lat, lon).ok()
            })
            .collect();
        let center = centroid(&points);
        let max_distance_km = center.map(|c| points.iter().map(|p| haversine_km(c, *p)).fold(0.0, f64::max));
        let embeddings: Vec<Vec<f32>> = signals
            .iter()
            .filter_map(|s| s.get("embedding").and_then(embedding::from_json))
            .collect();
        ClusterStats {
            signal_count: signals.len(),
            located_count: points.len(),
            centroid: center.map(|c| Centroid {
                latitude: c.latitude,
                longitude: c.longitude,
            }),
            max_distance_km,
            mean_embedding: embedding::average(&embeddings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_over_mixed_signals() {
        let signals = vec![
            json!({ "latitude": 0.0, "longitude": -1.0, "embedding": [1.0, 0.0] }),
            json!({ "latitude": 0.0, "longitude": 1.0, "embedding": [0.0, 1.0] }),
            json!({ "latitude": null, "longitude": null, "embedding": null }),
        ];
        let stats = ClusterStats::from_signals(&signals);
        assert_eq!(stats.signal_count, 3);
        assert_eq!(stats.located_count, 2);
        let c = stats.centroid.clone().unwrap();
        assert!(c.latitude.abs() < 1e-9 && c.longitude.abs() < 1e-9);
        let d = stats.max_distance_km.unwrap();
        assert!((d - 111.2).abs() < 0.5, "{}", d);
        assert_eq!(stats.mean_embedding, Some(vec![0.5, 0.5]));
    }

    #[test]
    fn stats_of_empty_cluster() {
        let stats = ClusterStats::from_signals(&[]);
        assert_eq!(stats.signal_count, 0);
        assert!(stats.centroid.is_none());
        assert!(stats.max_distance_km.is_none());
        assert!(stats.mean_embedding.is_none());
        let wire = serde_json::to_value(&stats).unwrap();
        assert!(wire.get("maxDistanceKm").is_some());
    }
}
