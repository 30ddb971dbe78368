use std::collections::BTreeMap;

use crate::detection::domain::detected_face::DetectedFace;
use crate::shared::constants::{TRACKING_MAX_DISTANCE, TRACKING_MAX_LOST};

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedFaceRecord {
    pub center: (u32, u32),
    pub frames_seen: u32,
    pub frames_lost: u32,
    pub active: bool,
}

/// Nearest-center continuity tracker.
///
/// Records are matched in ascending id order; each detected face can be
/// claimed by at most one record per update. Retired records are kept so
/// their ids are never handed out again.
pub struct FaceTracker {
    records: BTreeMap<u32, TrackedFaceRecord>,
    max_distance: f64,
    max_lost: u32,
}

impl FaceTracker {
    pub fn new(max_distance: f64, max_lost: u32) -> Self {
        Self {
            records: BTreeMap::new(),
            max_distance,
            max_lost,
        }
    }

    /// Assign `tracking_id` to every face in place.
    pub fn update(&mut self, faces: &mut [DetectedFace]) {
        let mut claimed = vec![false; faces.len()];

        for (&id, record) in self.records.iter_mut().filter(|(_, r)| r.active) {
            match nearest_unclaimed(record.center, faces, &claimed, self.max_distance) {
                Some(i) => {
                    claimed[i] = true;
                    record.center = faces[i].center();
                    record.frames_seen += 1;
                    record.frames_lost = 0;
                    faces[i].tracking_id = Some(id);
                }
                None => {
                    record.frames_lost += 1;
                    if record.frames_lost > self.max_lost {
                        record.active = false;
                        log::debug!("Face track {id} lost");
                    }
                }
            }
        }

        for face in faces.iter_mut().filter(|f| f.tracking_id.is_none()) {
            let id = self.next_free_id();
            self.records.insert(
                id,
                TrackedFaceRecord {
                    center: face.center(),
                    frames_seen: 1,
                    frames_lost: 0,
                    active: true,
                },
            );
            face.tracking_id = Some(id);
            log::debug!("New face track {id}");
        }
    }

    pub fn record(&self, id: u32) -> Option<&TrackedFaceRecord> {
        self.records.get(&id)
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.active).count()
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Smallest non-negative id not used by any record, active or retired.
    fn next_free_id(&self) -> u32 {
        let mut candidate = 0;
        for &id in self.records.keys() {
            if id != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }
}

impl Default for FaceTracker {
    fn default() -> Self {
        Self::new(TRACKING_MAX_DISTANCE, TRACKING_MAX_LOST)
    }
}

fn nearest_unclaimed(
    center: (u32, u32),
    faces: &[DetectedFace],
    claimed: &[bool],
    max_distance: f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, face) in faces.iter().enumerate() {
        if claimed[i] {
            continue;
        }
        let (fx, fy) = face.center();
        let dx = fx as f64 - center.0 as f64;
        let dy = fy as f64 - center.1 as f64;
        let d = (dx * dx + dy * dy).sqrt();
        if d < max_distance && best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detected_face::{BoundingBox, DetectionMethod};

    /// 20x20 face centered on `(cx, cy)`.
    fn face_at(cx: u32, cy: u32) -> DetectedFace {
        DetectedFace::new(
            BoundingBox::new(cx - 10, cy - 10, 20, 20),
            0.9,
            vec![],
            DetectionMethod::Neural,
        )
    }

    fn ids(faces: &[DetectedFace]) -> Vec<Option<u32>> {
        faces.iter().map(|f| f.tracking_id).collect()
    }

    // ── Assignment ──

    #[test]
    fn test_first_faces_get_sequential_ids() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100), face_at(400, 100)];
        tracker.update(&mut faces);
        assert_eq!(ids(&faces), vec![Some(0), Some(1)]);
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn test_id_stable_under_small_motion() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100)];
        tracker.update(&mut faces);
        for step in 1..=5 {
            let mut moved = vec![face_at(100 + step * 30, 100)];
            tracker.update(&mut moved);
            assert_eq!(moved[0].tracking_id, Some(0));
        }
        assert_eq!(tracker.record(0).unwrap().frames_seen, 6);
        assert_eq!(tracker.record(0).unwrap().center, (250, 100));
    }

    #[test]
    fn test_large_jump_creates_new_track() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100)];
        tracker.update(&mut faces);
        let mut jumped = vec![face_at(300, 100)];
        tracker.update(&mut jumped);
        assert_eq!(jumped[0].tracking_id, Some(1));
        assert_eq!(tracker.record(0).unwrap().frames_lost, 1);
    }

    #[test]
    fn test_exactly_max_distance_does_not_match() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100)];
        tracker.update(&mut faces);
        let mut moved = vec![face_at(200, 100)];
        tracker.update(&mut moved);
        assert_eq!(moved[0].tracking_id, Some(1));
    }

    #[test]
    fn test_one_face_claimed_by_one_record() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100), face_at(150, 100)];
        tracker.update(&mut faces);
        // Only one face remains, between both records; record 0 claims it first
        let mut single = vec![face_at(125, 100)];
        tracker.update(&mut single);
        assert_eq!(single[0].tracking_id, Some(0));
        assert_eq!(tracker.record(1).unwrap().frames_lost, 1);
    }

    // ── Retirement ──

    #[test]
    fn test_retired_on_eleventh_miss() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100)];
        tracker.update(&mut faces);

        for _ in 0..10 {
            tracker.update(&mut []);
        }
        assert!(tracker.record(0).unwrap().active);

        tracker.update(&mut []);
        assert!(!tracker.record(0).unwrap().active);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_reappearance_within_window_keeps_id() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100)];
        tracker.update(&mut faces);
        for _ in 0..10 {
            tracker.update(&mut []);
        }
        let mut back = vec![face_at(110, 100)];
        tracker.update(&mut back);
        assert_eq!(back[0].tracking_id, Some(0));
        assert_eq!(tracker.record(0).unwrap().frames_lost, 0);
    }

    #[test]
    fn test_retired_ids_are_not_reused() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100)];
        tracker.update(&mut faces);
        for _ in 0..11 {
            tracker.update(&mut []);
        }
        let mut again = vec![face_at(100, 100)];
        tracker.update(&mut again);
        assert_eq!(again[0].tracking_id, Some(1));
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn test_reset_clears_records() {
        let mut tracker = FaceTracker::default();
        let mut faces = vec![face_at(100, 100)];
        tracker.update(&mut faces);
        tracker.reset();
        assert_eq!(tracker.total(), 0);
        let mut again = vec![face_at(100, 100)];
        tracker.update(&mut again);
        assert_eq!(again[0].tracking_id, Some(0));
    }
}
