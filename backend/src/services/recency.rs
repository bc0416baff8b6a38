//! Trailing-window selection of incidents that still need attention.

use crate::models::{Incident, Timestamp};

/// Incidents at or after `since`, optionally of one type, newest first.
///
/// An empty result means there is nothing to act on right now.
pub fn recent_incidents(
    incidents: Vec<Incident>,
    since: Timestamp,
    incident_type: Option<&str>,
) -> Vec<Incident> {
    let mut recent: Vec<Incident> = incidents
        .into_iter()
        .filter(|i| i.occurred_at >= since)
        .filter(|i| incident_type.map_or(true, |ty| i.incident_type == ty))
        .collect();
    recent.sort_by(|a, b| {
        b.occurred_at
            .cmp(&a.occurred_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncidentId, WorkerId};
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn incident(id: i64, kind: &str, at: i64) -> Incident {
        Incident {
            id: IncidentId(id),
            worker_id: WorkerId(1),
            incident_type: kind.to_string(),
            message: format!("incident {}", id),
            occurred_at: t(at),
        }
    }

    #[test]
    fn test_recent_newest_first() {
        let incidents = vec![
            incident(1, "fall", 10),
            incident(2, "no_helmet", 50),
            incident(3, "fall", 30),
            incident(4, "fall", 0),
        ];
        let ids: Vec<i64> = recent_incidents(incidents, t(10), None)
            .iter()
            .map(|i| i.id.value())
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_recent_type_filter() {
        let incidents = vec![incident(1, "fall", 10), incident(2, "no_helmet", 20)];
        let recent = recent_incidents(incidents, t(0), Some("fall"));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].incident_type, "fall");
    }

    #[test]
    fn test_recent_nothing_in_window() {
        let incidents = vec![incident(1, "fall", 10)];
        assert!(recent_incidents(incidents, t(11), None).is_empty());
    }

    #[test]
    fn test_same_timestamp_orders_by_id_descending() {
        let incidents = vec![incident(1, "fall", 10), incident(2, "fall", 10)];
        let ids: Vec<i64> = recent_incidents(incidents, t(0), None)
            .iter()
            .map(|i| i.id.value())
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
