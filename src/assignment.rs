use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::session::Assignment;
use crate::session::AssignmentMap;
use crate::session::BBox;
use crate::session::DirectionSelection;
use crate::session::Frame;
use crate::session::PlayDirection;
use crate::session::PlayerId;
use crate::session::Team;

/// Host-side reconciliation state for one manual assignment session.
///
/// Owns the master player->assignment map and the per-frame edit cache; the
/// annotator widget itself holds no state across frames. The widget's latest
/// emission for the current frame is parked in `pending_report` and folded
/// into both structures when navigation leaves the frame (or on submit), so
/// abandoned interactions on a frame the user never leaves are still the
/// authoritative state for that frame.
pub struct AssignmentBoard {
    frames: Vec<Frame>,
    current: usize,
    /// Session-wide player assignments. Seeded from backend defaults the first
    /// time an id is encountered; entries are only ever added or overwritten.
    master: BTreeMap<PlayerId, Assignment>,
    /// Natural-space bounding box recorded at first encounter, echoed back to
    /// the backend on save.
    first_seen_bbox: BTreeMap<PlayerId, BBox>,
    /// Widget reports per visited frame index, used to restore the exact edit
    /// state when navigating back.
    frame_edits: HashMap<usize, AssignmentMap>,
    pending_report: Option<AssignmentMap>,
    pub directions: DirectionSelection,
}

impl AssignmentBoard {
    /// `frames` must be the session's full ordered frame sequence.
    pub fn new(frames: Vec<Frame>) -> Self {
        let mut board = AssignmentBoard {
            frames,
            current: 0,
            master: BTreeMap::new(),
            first_seen_bbox: BTreeMap::new(),
            frame_edits: HashMap::new(),
            pending_report: None,
            directions: DirectionSelection::default(),
        };
        board.seed_current_frame();
        board
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    pub fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub fn is_last_frame(&self) -> bool {
        self.current + 1 == self.frames.len()
    }

    pub fn master_assignment(&self, id: &str) -> Option<Assignment> {
        self.master.get(id).copied()
    }

    /// Record the annotator's latest emission for the current frame. The most
    /// recent report wins until the frame changes.
    pub fn record_report(&mut self, report: AssignmentMap) {
        self.pending_report = Some(report);
    }

    /// The assignment set the annotator should render right now: the latest
    /// widget report while one is pending for this frame, otherwise the
    /// display default.
    pub fn working_assignments(&self) -> AssignmentMap {
        match &self.pending_report {
            Some(report) => report.clone(),
            None => self.display_assignments(self.current),
        }
    }

    /// The assignment set handed to the annotator for `index`: the cached edit
    /// state if the frame was edited before, otherwise the master map filtered
    /// to the frame's players (falling back to each player's backend default).
    /// Idempotent; performs no writes.
    pub fn display_assignments(&self, index: usize) -> AssignmentMap {
        if let Some(edits) = self.frame_edits.get(&index) {
            return edits.clone();
        }

        self.frames[index]
            .players
            .iter()
            .map(|player| {
                let assignment = self.master.get(&player.id).copied().unwrap_or_else(|| player.default_assignment());
                (player.id.clone(), assignment)
            })
            .collect()
    }

    /// Fold any pending report and move the current index by `delta`, clamped
    /// to the frame range. Purely local; never fails.
    pub fn advance(&mut self, delta: isize) {
        self.fold_pending_report();
        self.current = self.current.saturating_add_signed(delta).min(self.frames.len().saturating_sub(1));
        self.seed_current_frame();
    }

    /// The finalized payload for the backend. Only meaningful on the last
    /// frame; elsewhere this is a no-op returning `None` so a stray call can
    /// never trigger a network request.
    pub fn submission(&mut self) -> Option<AssignmentSubmission> {
        if !self.is_last_frame() {
            return None;
        }
        self.fold_pending_report();

        let players = self
            .master
            .iter()
            .filter_map(|(id, assignment)| {
                let Some(bbox) = self.first_seen_bbox.get(id) else {
                    warn!(player = %id, "assignment without a recorded bounding box, skipping");
                    return None;
                };
                Some((
                    id.clone(),
                    SubmittedPlayer { team: assignment.team, removed: assignment.removed, bbox: bbox.corners() },
                ))
            })
            .collect();

        Some(AssignmentSubmission { players, directions: self.directions.wire() })
    }

    fn fold_pending_report(&mut self) {
        if let Some(report) = self.pending_report.take() {
            for (id, assignment) in &report {
                self.master.insert(id.clone(), *assignment);
            }
            self.frame_edits.insert(self.current, report);
        }
    }

    /// First encounter of a player id initializes its master entry from the
    /// backend-supplied default.
    fn seed_current_frame(&mut self) {
        let frame = &self.frames[self.current];
        for player in &frame.players {
            self.master.entry(player.id.clone()).or_insert_with(|| player.default_assignment());
            self.first_seen_bbox.entry(player.id.clone()).or_insert(player.bbox);
        }
    }
}

/// Wire shape of `POST team-assignment/save/{session}`.
#[derive(Debug, Serialize)]
pub struct AssignmentSubmission {
    pub players: BTreeMap<PlayerId, SubmittedPlayer>,
    pub directions: BTreeMap<&'static str, Option<PlayDirection>>,
}

#[derive(Debug, Serialize)]
pub struct SubmittedPlayer {
    pub team: Team,
    pub removed: bool,
    pub bbox: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FrameImage;
    use crate::session::Player;

    fn player(id: &str, team: Team) -> Player {
        Player { id: id.to_string(), bbox: BBox::new(10.0, 10.0, 5.0, 8.0), default_team: team }
    }

    fn frame(players: Vec<Player>) -> Frame {
        Frame { image: FrameImage { rgba: Vec::new(), width: 1920, height: 1080 }, players }
    }

    fn removed(team: Team) -> Assignment {
        Assignment { team, removed: true }
    }

    #[test]
    fn master_seeded_from_defaults_on_first_visit() {
        let board = AssignmentBoard::new(vec![frame(vec![player("7", Team::Two)])]);
        assert_eq!(board.master_assignment("7"), Some(Assignment::new(Team::Two)));
    }

    #[test]
    fn display_assignments_is_idempotent() {
        let board = AssignmentBoard::new(vec![frame(vec![player("7", Team::One), player("9", Team::Two)])]);
        let first = board.display_assignments(0);
        assert_eq!(first, board.display_assignments(0));
        assert_eq!(first["7"], Assignment::new(Team::One));
        assert_eq!(first["9"], Assignment::new(Team::Two));
    }

    #[test]
    fn advance_folds_report_into_cache_and_master() {
        let mut board =
            AssignmentBoard::new(vec![frame(vec![player("9", Team::Two)]), frame(vec![player("9", Team::Two)])]);

        // Shift-click on id 9: {team: 2, removed: false} -> {team: 2, removed: true}
        board.record_report(AssignmentMap::from([("9".to_string(), removed(Team::Two))]));
        board.advance(1);

        assert_eq!(board.current_index(), 1);
        assert_eq!(board.master_assignment("9"), Some(removed(Team::Two)));
        // Navigating back restores the exact edit state.
        board.advance(-1);
        assert_eq!(board.display_assignments(0)["9"], removed(Team::Two));
    }

    #[test]
    fn working_assignments_track_the_pending_report() {
        let mut board =
            AssignmentBoard::new(vec![frame(vec![player("7", Team::One)]), frame(vec![player("7", Team::One)])]);
        assert_eq!(board.working_assignments()["7"], Assignment::new(Team::One));

        board.record_report(AssignmentMap::from([("7".to_string(), Assignment::new(Team::Two))]));
        assert_eq!(board.working_assignments()["7"], Assignment::new(Team::Two));

        // Folding on navigation clears the pending report; the next frame
        // shows the propagated master state.
        board.advance(1);
        assert_eq!(board.working_assignments()["7"], Assignment::new(Team::Two));
    }

    #[test]
    fn advance_never_touches_players_absent_from_departing_frame() {
        let mut board =
            AssignmentBoard::new(vec![frame(vec![player("3", Team::One)]), frame(vec![player("4", Team::Two)])]);
        board.advance(1);
        board.record_report(AssignmentMap::from([("4".to_string(), Assignment::new(Team::One))]));
        board.advance(-1);

        assert_eq!(board.master_assignment("3"), Some(Assignment::new(Team::One)));
        assert_eq!(board.master_assignment("4"), Some(Assignment::new(Team::One)));
    }

    #[test]
    fn edits_propagate_to_later_frames_without_edits() {
        // Frame 0 marks id 3 removed; frame 1 also contains id 3 but is never
        // edited, so its display state comes from the master map.
        let mut board =
            AssignmentBoard::new(vec![frame(vec![player("3", Team::One)]), frame(vec![player("3", Team::One)])]);
        board.record_report(AssignmentMap::from([("3".to_string(), removed(Team::One))]));
        board.advance(1);

        assert_eq!(board.display_assignments(1)["3"], removed(Team::One));
    }

    #[test]
    fn display_falls_back_to_default_for_unseeded_ids() {
        let board =
            AssignmentBoard::new(vec![frame(vec![player("3", Team::One)]), frame(vec![player("11", Team::Two)])]);
        // Frame 1 was never visited; id 11 has no master entry yet.
        assert_eq!(board.master_assignment("11"), None);
        assert_eq!(board.display_assignments(1)["11"], Assignment::new(Team::Two));
    }

    #[test]
    fn advance_clamps_at_both_ends() {
        let mut board = AssignmentBoard::new(vec![frame(Vec::new()), frame(Vec::new())]);
        board.advance(-3);
        assert_eq!(board.current_index(), 0);
        board.advance(7);
        assert_eq!(board.current_index(), 1);
        assert!(board.is_last_frame());
    }

    #[test]
    fn submission_rejected_off_the_last_frame() {
        let mut board = AssignmentBoard::new(vec![frame(vec![player("7", Team::One)]), frame(Vec::new())]);
        assert!(board.submission().is_none());
        // The pending report must survive the rejected call.
        board.record_report(AssignmentMap::from([("7".to_string(), Assignment::new(Team::Two))]));
        assert!(board.submission().is_none());
        board.advance(1);
        assert_eq!(board.master_assignment("7"), Some(Assignment::new(Team::Two)));
    }

    #[test]
    fn submission_folds_pending_report_and_carries_directions() {
        let mut board = AssignmentBoard::new(vec![frame(vec![player("7", Team::One)])]);
        board.directions.set_left_to_right(Team::One);
        board.record_report(AssignmentMap::from([("7".to_string(), removed(Team::One))]));

        let submission = board.submission().expect("last frame submission");
        let entry = &submission.players["7"];
        assert!(entry.removed);
        assert_eq!(entry.bbox, [10.0, 10.0, 15.0, 18.0]);

        let value = serde_json::to_value(&submission).unwrap();
        assert_eq!(value["players"]["7"]["team"], "1");
        assert_eq!(value["directions"]["1"], "left_to_right");
        assert_eq!(value["directions"]["2"], "right_to_left");
    }
}
