use pq_core::{ConversationCatalog, JobRecord};

/// Fill in missing center/workflow names from the catalog.
/// Names already present are left alone. Returns whether anything changed.
pub fn backfill_one(job: &mut JobRecord, catalog: &ConversationCatalog) -> bool {
    let Some(info) = catalog.get(&job.conversation_id) else {
        return false;
    };

    let mut changed = false;
    if job.center_name.is_none() {
        if let Some(name) = &info.center_name {
            job.center_name = Some(name.clone());
            changed = true;
        }
    }
    if job.workflow_name.is_none() {
        if let Some(name) = &info.workflow_name {
            job.workflow_name = Some(name.clone());
            changed = true;
        }
    }
    changed
}

/// Backfill every record in place; order and membership are untouched.
/// Returns the number of records that changed.
pub fn backfill(jobs: &mut [JobRecord], catalog: &ConversationCatalog) -> usize {
    jobs.iter_mut()
        .map(|job| backfill_one(job, catalog))
        .filter(|changed| *changed)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_core::{ConversationInfo, NewJob};

    fn catalog() -> ConversationCatalog {
        ConversationCatalog::new([
            ConversationInfo {
                conversation_id: "c1".into(),
                center_name: Some("North".into()),
                workflow_name: Some("Intake".into()),
            },
            ConversationInfo {
                conversation_id: "c2".into(),
                center_name: None,
                workflow_name: Some("Billing".into()),
            },
        ])
    }

    fn job(id: &str, conversation: &str) -> JobRecord {
        JobRecord::new(id.into(), 1, NewJob::new(conversation, "w", "p"))
    }

    #[test]
    fn test_backfills_missing_names() {
        let mut jobs = vec![job("a", "c1"), job("b", "c2"), job("c", "unknown")];

        assert_eq!(backfill(&mut jobs, &catalog()), 2);
        assert_eq!(jobs[0].center_name.as_deref(), Some("North"));
        assert_eq!(jobs[0].workflow_name.as_deref(), Some("Intake"));
        assert!(jobs[1].center_name.is_none());
        assert_eq!(jobs[1].workflow_name.as_deref(), Some("Billing"));
        assert!(jobs[2].workflow_name.is_none());
    }

    #[test]
    fn test_never_overwrites() {
        let mut existing = job("a", "c1");
        existing.center_name = Some("Manual".into());

        assert!(backfill_one(&mut existing, &catalog()));
        assert_eq!(existing.center_name.as_deref(), Some("Manual"));
        assert_eq!(existing.workflow_name.as_deref(), Some("Intake"));
    }

    #[test]
    fn test_idempotent() {
        let mut jobs = vec![job("a", "c1"), job("b", "c2")];
        backfill(&mut jobs, &catalog());
        let first = jobs.clone();

        assert_eq!(backfill(&mut jobs, &catalog()), 0);
        assert_eq!(jobs, first);
    }

    #[test]
    fn test_keeps_order() {
        let mut jobs = vec![job("b", "c2"), job("a", "c1"), job("z", "c9")];
        backfill(&mut jobs, &catalog());

        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "z"]);
    }
}
