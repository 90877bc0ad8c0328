//! Group registry: the keyed store of in-progress logical archives.
//!
//! # Locking
//!
//! Groups live in a sharded [`DashMap`]. Every read-modify-write of one key
//! (adding a fragment, handing a group off, reaping it) happens while that
//! key's shard lock is held, so the complete transition and the hand-off
//! are each observed by exactly one caller. No lock is held across an
//! `.await`.
//!
//! A handed-off group is not dropped from the map straight away: its entry
//! is reduced to a tombstone (no fragment paths retained) until the
//! staleness window passes, so a late duplicate download of a finished
//! archive is recognised instead of starting a phantom group.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dropsort_core::event::{DomainEvent, EventBus};
use dropsort_core::fragment::FragmentDescriptor;
use dropsort_core::group::{AbandonedGroup, CompletedGroup, GroupStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Lifecycle of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    /// Still waiting for parts.
    Collecting,
    /// Every part arrived; waiting for the sweeper to hand it off.
    Complete,
    /// Handed to extraction; kept only as a tombstone.
    HandedOff,
}

/// One logical archive being assembled. Owned by the registry.
#[derive(Debug, Clone)]
pub struct FragmentGroup {
    pub group_key: String,
    pub folder_name: String,
    pub expected_part_count: u32,
    /// Part number → fragment path. One entry per distinct part.
    pub received_parts: BTreeMap<u32, PathBuf>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub origin_hint: Option<String>,
    state: GroupState,
}

impl FragmentGroup {
    fn new(descriptor: &FragmentDescriptor, at: DateTime<Utc>) -> Self {
        let mut received_parts = BTreeMap::new();
        received_parts.insert(descriptor.part_number, descriptor.source_path.clone());
        Self {
            group_key: descriptor.group_key.clone(),
            folder_name: descriptor.folder_name.clone(),
            expected_part_count: descriptor.declared_total_parts.max(1),
            received_parts,
            first_seen_at: at,
            last_updated_at: at,
            origin_hint: None,
            state: GroupState::Collecting,
        }
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Distinct parts received that count towards completion.
    pub fn counted_parts(&self) -> u32 {
        self.received_parts
            .range(1..=self.expected_part_count)
            .count() as u32
    }

    fn has_every_part(&self) -> bool {
        self.counted_parts() >= self.expected_part_count
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_updated_at {
            self.last_updated_at = at;
        }
        if at < self.first_seen_at {
            self.first_seen_at = at;
        }
    }

    fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_updated_at)
    }
}

/// Point-in-time view of a group, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    pub group_key: String,
    pub state: GroupState,
    pub expected_parts: u32,
    pub received_parts: Vec<u32>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub origin_hint: Option<String>,
}

/// Concurrency-safe store of fragment groups.
pub struct GroupRegistry {
    groups: DashMap<String, FragmentGroup>,
    events: EventBus,
    completion: Notify,
}

impl GroupRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            groups: DashMap::new(),
            events,
            completion: Notify::new(),
        }
    }

    /// Record a fragment observed now.
    pub fn add_fragment(&self, descriptor: &FragmentDescriptor) -> GroupStatus {
        self.add_fragment_at(descriptor, Utc::now())
    }

    /// Record a fragment observed at `at` (file modification time during a
    /// startup scan, `now` otherwise).
    pub fn add_fragment_at(&self, descriptor: &FragmentDescriptor, at: DateTime<Utc>) -> GroupStatus {
        let key = descriptor.group_key.as_str();
        let mut pending_events = Vec::new();
        let mut created = false;

        let status = {
            let mut entry = self.groups.entry(key.to_string()).or_insert_with(|| {
                created = true;
                FragmentGroup::new(descriptor, at)
            });
            let group = entry.value_mut();

            if created {
                info!(
                    group_key = %key,
                    part = descriptor.part_number,
                    expected = group.expected_part_count,
                    "New fragment group"
                );
                pending_events.push(DomainEvent::GroupCreated {
                    group_key: key.to_string(),
                    expected_parts: group.expected_part_count,
                    timestamp: Utc::now(),
                });
                if group.has_every_part() {
                    group.state = GroupState::Complete;
                    GroupStatus::BecameComplete
                } else {
                    GroupStatus::Created
                }
            } else {
                Self::merge(group, descriptor, at, &mut pending_events)
            }
        };

        for event in pending_events {
            self.events.publish(event);
        }

        if status.is_completion() {
            info!(group_key = %key, "Fragment group complete");
            self.completion.notify_one();
        }

        status
    }

    /// Apply a fragment to an existing group. Caller holds the key's lock.
    fn merge(
        group: &mut FragmentGroup,
        descriptor: &FragmentDescriptor,
        at: DateTime<Utc>,
        pending_events: &mut Vec<DomainEvent>,
    ) -> GroupStatus {
        group.touch(at);

        if group.state != GroupState::Collecting {
            debug!(
                group_key = %group.group_key,
                part = descriptor.part_number,
                "Fragment for an already complete group"
            );
            return GroupStatus::AlreadyCompleteDuplicate;
        }

        if descriptor.declared_total_parts != group.expected_part_count {
            warn!(
                group_key = %group.group_key,
                previous = group.expected_part_count,
                declared = descriptor.declared_total_parts,
                "Fragments disagree on total part count; keeping the larger"
            );
            pending_events.push(DomainEvent::GroupAnomaly {
                group_key: group.group_key.clone(),
                previous_total: group.expected_part_count,
                declared_total: descriptor.declared_total_parts,
                timestamp: Utc::now(),
            });
            group.expected_part_count = group
                .expected_part_count
                .max(descriptor.declared_total_parts);
        }

        if descriptor.part_number > group.expected_part_count {
            warn!(
                group_key = %group.group_key,
                part = descriptor.part_number,
                expected = group.expected_part_count,
                "Part number beyond declared total"
            );
        }

        if group.received_parts.contains_key(&descriptor.part_number) {
            debug!(
                group_key = %group.group_key,
                part = descriptor.part_number,
                "Duplicate fragment ignored"
            );
        } else {
            group
                .received_parts
                .insert(descriptor.part_number, descriptor.source_path.clone());
        }

        if group.has_every_part() {
            group.state = GroupState::Complete;
            GroupStatus::BecameComplete
        } else {
            GroupStatus::UpdatedIncomplete
        }
    }

    /// Attach the archive's source URL to a group.
    pub fn annotate_origin(&self, group_key: &str, origin: impl Into<String>) -> bool {
        match self.groups.get_mut(group_key) {
            Some(mut group) => {
                group.origin_hint = Some(origin.into());
                true
            }
            None => false,
        }
    }

    /// Hand off every complete group. Each group is returned by exactly one
    /// call, then reduced to a tombstone.
    pub fn take_completed(&self, now: DateTime<Utc>) -> Vec<CompletedGroup> {
        let mut taken = Vec::new();

        for key in self.keys() {
            let Some(mut group) = self.groups.get_mut(&key) else {
                continue;
            };
            if group.state != GroupState::Complete {
                continue;
            }

            group.state = GroupState::HandedOff;
            group.last_updated_at = now;
            let parts: Vec<(u32, PathBuf)> = std::mem::take(&mut group.received_parts)
                .into_iter()
                .collect();

            taken.push(CompletedGroup {
                group_key: group.group_key.clone(),
                folder_name: group.folder_name.clone(),
                expected_parts: group.expected_part_count,
                parts,
                origin_hint: group.origin_hint.clone(),
                first_seen_at: group.first_seen_at,
                completed_at: now,
            });
        }

        taken
    }

    /// Remove groups that never completed and have been idle longer than
    /// `stale_after`. Also drops tombstones older than `stale_after`.
    pub fn reap_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> Vec<AbandonedGroup> {
        let mut abandoned = Vec::new();

        for key in self.keys() {
            let removed = self.groups.remove_if(&key, |_, group| {
                group.state != GroupState::Complete && group.idle_for(now) > stale_after
            });

            let Some((_, group)) = removed else {
                continue;
            };

            if group.state == GroupState::HandedOff {
                debug!(group_key = %group.group_key, "Dropped hand-off tombstone");
                continue;
            }

            abandoned.push(AbandonedGroup {
                group_key: group.group_key,
                folder_name: group.folder_name,
                expected_parts: group.expected_part_count,
                received: group.received_parts.into_iter().collect(),
                first_seen_at: group.first_seen_at,
                last_updated_at: group.last_updated_at,
            });
        }

        abandoned
    }

    /// Wait until some group becomes complete. A completion that happened
    /// while nobody was waiting is not lost.
    pub async fn completed_notified(&self) {
        self.completion.notified().await;
    }

    /// Groups that are still live (collecting or awaiting hand-off).
    pub fn len(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.state != GroupState::HandedOff)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of a group, if known.
    pub fn status_of(&self, group_key: &str) -> Option<GroupState> {
        self.groups.get(group_key).map(|g| g.state)
    }

    /// Snapshot of every live group, oldest first.
    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        let mut out: Vec<GroupSnapshot> = self
            .groups
            .iter()
            .filter(|g| g.state != GroupState::HandedOff)
            .map(|g| GroupSnapshot {
                group_key: g.group_key.clone(),
                state: g.state,
                expected_parts: g.expected_part_count,
                received_parts: g.received_parts.keys().copied().collect(),
                first_seen_at: g.first_seen_at,
                last_updated_at: g.last_updated_at,
                origin_hint: g.origin_hint.clone(),
            })
            .collect();
        out.sort_by_key(|g| g.first_seen_at);
        out
    }

    fn keys(&self) -> Vec<String> {
        self.groups.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new(EventBus::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropsort_core::fragment::parse_fragment;
    use std::sync::{Arc, Barrier};

    fn road_part(n: u32) -> FragmentDescriptor {
        parse_fragment(&format!("ROAD TO EWC-20260205T124843Z-3-{n:03}.zip")).unwrap()
    }

    #[test]
    fn documented_scenario_completes_after_three() {
        let registry = GroupRegistry::default();

        assert_eq!(registry.add_fragment(&road_part(1)), GroupStatus::Created);
        assert_eq!(registry.add_fragment(&road_part(2)), GroupStatus::UpdatedIncomplete);
        assert_eq!(
            registry.status_of("ROAD TO EWC-20260205T124843Z-3"),
            Some(GroupState::Collecting)
        );

        assert_eq!(registry.add_fragment(&road_part(3)), GroupStatus::BecameComplete);
        assert_eq!(
            registry.status_of("ROAD TO EWC-20260205T124843Z-3"),
            Some(GroupState::Complete)
        );
    }

    #[test]
    fn duplicates_do_not_count_as_new_parts() {
        let registry = GroupRegistry::default();
        registry.add_fragment(&road_part(2));
        assert_eq!(registry.add_fragment(&road_part(2)), GroupStatus::UpdatedIncomplete);
        assert_eq!(registry.add_fragment(&road_part(2)), GroupStatus::UpdatedIncomplete);

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].received_parts, vec![2]);
    }

    #[test]
    fn completion_is_order_independent() {
        for order in [[1, 2, 3], [3, 1, 2], [2, 3, 1], [3, 2, 1]] {
            let registry = GroupRegistry::default();
            let statuses: Vec<GroupStatus> = order
                .iter()
                .map(|n| registry.add_fragment(&road_part(*n)))
                .collect();
            assert_eq!(statuses[2], GroupStatus::BecameComplete, "order {order:?}");
            assert!(!statuses[..2].iter().any(|s| s.is_completion()));
        }
    }

    #[test]
    fn fragment_after_completion_is_duplicate() {
        let registry = GroupRegistry::default();
        for n in 1..=3 {
            registry.add_fragment(&road_part(n));
        }
        assert_eq!(
            registry.add_fragment(&road_part(3)),
            GroupStatus::AlreadyCompleteDuplicate
        );
    }

    #[test]
    fn single_part_archive_completes_immediately() {
        let registry = GroupRegistry::default();
        let d = parse_fragment("Logo Pack-20260101T000000Z-1-001.zip").unwrap();
        assert_eq!(registry.add_fragment(&d), GroupStatus::BecameComplete);
    }

    #[test]
    fn concurrent_last_part_completes_exactly_once() {
        let registry = Arc::new(GroupRegistry::default());
        registry.add_fragment(&road_part(1));
        registry.add_fragment(&road_part(2));

        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.add_fragment(&road_part(3))
                })
            })
            .collect();

        let completions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|s| s.is_completion())
            .count();
        assert_eq!(completions, 1);
    }

    #[test]
    fn concurrent_mixed_parts_complete_exactly_once() {
        let registry = Arc::new(GroupRegistry::default());
        let barrier = Arc::new(Barrier::new(9));
        let handles: Vec<_> = (0..9u32)
            .map(|i| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.add_fragment(&road_part(i % 3 + 1))
                })
            })
            .collect();

        let statuses: Vec<GroupStatus> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(statuses.iter().filter(|s| s.is_completion()).count(), 1);
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == GroupStatus::Created)
                .count(),
            1
        );
    }

    #[test]
    fn take_completed_hands_off_once() {
        let registry = GroupRegistry::default();
        for n in 1..=3 {
            registry.add_fragment(&road_part(n));
        }

        let now = Utc::now();
        let taken = registry.take_completed(now);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].group_key, "ROAD TO EWC-20260205T124843Z-3");
        assert_eq!(taken[0].folder_name, "ROAD TO EWC");
        assert_eq!(
            taken[0].parts.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        assert!(registry.take_completed(now).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn late_duplicate_after_handoff_is_recognised() {
        let registry = GroupRegistry::default();
        for n in 1..=3 {
            registry.add_fragment(&road_part(n));
        }
        registry.take_completed(Utc::now());

        assert_eq!(
            registry.add_fragment(&road_part(2)),
            GroupStatus::AlreadyCompleteDuplicate
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_incomplete_group_is_abandoned() {
        let registry = GroupRegistry::default();
        let start = Utc::now();
        registry.add_fragment_at(&road_part(1), start);

        let threshold = chrono::Duration::minutes(10);
        assert!(registry.reap_stale(start + chrono::Duration::minutes(5), threshold).is_empty());

        let abandoned = registry.reap_stale(start + chrono::Duration::minutes(11), threshold);
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].missing_parts(), vec![2, 3]);
        assert!(registry.status_of("ROAD TO EWC-20260205T124843Z-3").is_none());
    }

    #[test]
    fn new_fragment_refreshes_staleness() {
        let registry = GroupRegistry::default();
        let start = Utc::now();
        let threshold = chrono::Duration::minutes(10);
        registry.add_fragment_at(&road_part(1), start);
        registry.add_fragment_at(&road_part(1), start + chrono::Duration::minutes(8));

        assert!(
            registry
                .reap_stale(start + chrono::Duration::minutes(12), threshold)
                .is_empty()
        );
    }

    #[test]
    fn complete_group_is_never_reaped() {
        let registry = GroupRegistry::default();
        let start = Utc::now();
        for n in 1..=3 {
            registry.add_fragment_at(&road_part(n), start);
        }
        let abandoned = registry.reap_stale(start + chrono::Duration::days(2), chrono::Duration::minutes(1));
        assert!(abandoned.is_empty());
        assert_eq!(registry.take_completed(Utc::now()).len(), 1);
    }

    #[test]
    fn tombstones_expire_silently() {
        let registry = GroupRegistry::default();
        for n in 1..=3 {
            registry.add_fragment(&road_part(n));
        }
        let handed = Utc::now();
        registry.take_completed(handed);

        let abandoned = registry.reap_stale(handed + chrono::Duration::hours(3), chrono::Duration::hours(2));
        assert!(abandoned.is_empty());
        assert!(registry.status_of("ROAD TO EWC-20260205T124843Z-3").is_none());
        assert_eq!(registry.add_fragment(&road_part(1)), GroupStatus::Created);
    }

    #[test]
    fn disagreeing_totals_keep_the_maximum() {
        let registry = GroupRegistry::default();
        let mut rx = registry.events.subscribe();

        let mut first = road_part(1);
        first.declared_total_parts = 2;
        registry.add_fragment(&first);

        let mut second = road_part(2);
        second.declared_total_parts = 4;
        assert_eq!(registry.add_fragment(&second), GroupStatus::UpdatedIncomplete);

        let mut shrinking = road_part(3);
        shrinking.declared_total_parts = 3;
        assert_eq!(registry.add_fragment(&shrinking), GroupStatus::UpdatedIncomplete);

        let snap = registry.snapshot();
        assert_eq!(snap[0].expected_parts, 4);

        let mut anomalies = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), DomainEvent::GroupAnomaly { .. }) {
                anomalies += 1;
            }
        }
        assert_eq!(anomalies, 2);
    }

    #[test]
    fn out_of_range_part_does_not_complete() {
        let registry = GroupRegistry::default();
        registry.add_fragment(&road_part(1));
        registry.add_fragment(&road_part(2));
        let mut stray = road_part(3);
        stray.part_number = 7;
        assert_eq!(registry.add_fragment(&stray), GroupStatus::UpdatedIncomplete);
        assert_eq!(registry.add_fragment(&road_part(3)), GroupStatus::BecameComplete);
    }

    #[test]
    fn origin_hint_travels_with_handoff() {
        let registry = GroupRegistry::default();
        registry.add_fragment(&road_part(1));
        assert!(registry.annotate_origin(
            "ROAD TO EWC-20260205T124843Z-3",
            "https://drive.example.com/folder/abc"
        ));
        assert!(!registry.annotate_origin("nope", "x"));
        registry.add_fragment(&road_part(2));
        registry.add_fragment(&road_part(3));

        let taken = registry.take_completed(Utc::now());
        assert_eq!(
            taken[0].origin_hint.as_deref(),
            Some("https://drive.example.com/folder/abc")
        );
    }

    #[test]
    fn created_event_published_once() {
        let registry = GroupRegistry::default();
        let mut rx = registry.events.subscribe();
        for n in 1..=3 {
            registry.add_fragment(&road_part(n));
        }
        let mut created = 0;
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::GroupCreated { expected_parts, .. } = event.as_ref() {
                assert_eq!(*expected_parts, 3);
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn completion_wakes_waiter() {
        let registry = Arc::new(GroupRegistry::default());
        for n in 1..=3 {
            registry.add_fragment(&road_part(n));
        }
        // Permit stored even though nobody was waiting yet.
        tokio::time::timeout(std::time::Duration::from_secs(1), registry.completed_notified())
            .await
            .expect("completion should have been signalled");
    }
}
