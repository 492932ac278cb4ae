use egui::Color32;
use egui::CornerRadius;
use egui::Pos2;
use egui::Rect;
use egui::Sense;
use egui::Stroke;
use egui::StrokeKind;
use egui::TextureHandle;
use egui::Ui;
use egui::Vec2;

use crate::session::Assignment;
use crate::session::AssignmentMap;
use crate::session::Player;
use crate::session::TeamPalette;

/// Interactive frame overlay: paints one frame image scaled to the display
/// width with a clickable rectangle per detected player.
///
/// The widget is a pure function of its inputs. It holds no state across
/// frames or repaints; every state change is emitted to the host as the
/// complete assignment set for the frame, and the host hands the updated set
/// back in on the next repaint.
///
/// Interaction contract:
/// - plain click toggles the player between the two teams; clicks on a
///   removed player are ignored entirely (un-remove first)
/// - shift-click toggles the removed flag and leaves the team value alone, so
///   un-removing restores the side held before removal
/// - clicks outside every box are no-ops
pub struct FrameAnnotator<'a> {
    texture: &'a TextureHandle,
    natural_size: Vec2,
    scale: f32,
    players: &'a [Player],
    assignments: &'a AssignmentMap,
    palette: TeamPalette,
}

pub struct AnnotatorResponse {
    /// The complete post-interaction assignment set, present only when a click
    /// actually changed state this repaint.
    pub emitted: Option<AssignmentMap>,
    pub response: egui::Response,
}

/// Pointer interaction kinds the annotator distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// Plain primary click: team toggle.
    Plain,
    /// Shift-held primary click: removed toggle.
    Modified,
}

const BOX_STROKE_WIDTH: f32 = 2.0;

impl<'a> FrameAnnotator<'a> {
    pub fn new(
        texture: &'a TextureHandle,
        natural_size: Vec2,
        scale: f32,
        players: &'a [Player],
        assignments: &'a AssignmentMap,
        palette: TeamPalette,
    ) -> Self {
        FrameAnnotator {
            texture,
            natural_size,
            // A degenerate scale would make pointer mapping divide by zero.
            scale: scale.max(f32::EPSILON),
            players,
            assignments,
            palette,
        }
    }

    pub fn show(self, ui: &mut Ui) -> AnnotatorResponse {
        let display_size = self.natural_size * self.scale;
        let (response, painter) = ui.allocate_painter(display_size, Sense::click());
        let origin = response.rect.min;

        // Input is handled before painting so the box color reflects the
        // post-click state within the same repaint.
        let mut emitted = None;
        if response.clicked()
            && let Some(pointer) = response.interact_pointer_pos()
        {
            let (x, y) = to_natural(pointer, origin, self.scale);
            if let Some(player) = hit_player(self.players, x, y) {
                let kind = if ui.input(|i| i.modifiers.shift) { ClickKind::Modified } else { ClickKind::Plain };
                emitted = apply_click(self.assignments, self.players, &player.id, kind);
            }
        }

        let current = emitted.as_ref().unwrap_or(self.assignments);
        let uv = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
        painter.image(self.texture.id(), Rect::from_min_size(origin, display_size), uv, Color32::WHITE);

        for player in self.players {
            let assignment = current.get(&player.id).copied().unwrap_or_default();
            let bbox = &player.bbox;
            let rect = Rect::from_min_size(
                origin + Vec2::new(bbox.x, bbox.y) * self.scale,
                Vec2::new(bbox.width, bbox.height) * self.scale,
            );
            painter.rect_stroke(
                rect,
                CornerRadius::ZERO,
                Stroke::new(BOX_STROKE_WIDTH, self.palette.color_for(assignment)),
                StrokeKind::Inside,
            );
        }

        AnnotatorResponse { emitted, response }
    }
}

/// Map a screen-space pointer position back into natural frame coordinates.
fn to_natural(pointer: Pos2, origin: Pos2, scale: f32) -> (f32, f32) {
    ((pointer.x - origin.x) / scale, (pointer.y - origin.y) / scale)
}

/// The player whose box contains the given natural-space point. Later entries
/// in the ordered player list are drawn on top, so they win ties.
pub fn hit_player(players: &[Player], x: f32, y: f32) -> Option<&Player> {
    players.iter().rev().find(|player| player.bbox.contains(x, y))
}

/// Apply one click to the frame's assignment state.
///
/// Returns the complete updated assignment set covering every player in the
/// frame, or `None` when the click changes nothing (plain click on a removed
/// player). Ids missing from the input set are defaulted to team 1,
/// not-removed.
pub fn apply_click(
    assignments: &AssignmentMap,
    players: &[Player],
    id: &str,
    kind: ClickKind,
) -> Option<AssignmentMap> {
    let current = assignments.get(id).copied().unwrap_or_default();

    let updated = match kind {
        ClickKind::Plain => {
            if current.removed {
                return None;
            }
            Assignment { team: current.team.toggled(), removed: current.removed }
        }
        ClickKind::Modified => Assignment { team: current.team, removed: !current.removed },
    };

    let mut full: AssignmentMap = players
        .iter()
        .map(|player| (player.id.clone(), assignments.get(&player.id).copied().unwrap_or_default()))
        .collect();
    full.insert(id.to_string(), updated);
    Some(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BBox;
    use crate::session::Team;

    fn player(id: &str, bbox: BBox) -> Player {
        Player { id: id.to_string(), bbox, default_team: Team::One }
    }

    fn assignments(entries: &[(&str, Team, bool)]) -> AssignmentMap {
        entries.iter().map(|(id, team, removed)| (id.to_string(), Assignment { team: *team, removed: *removed })).collect()
    }

    #[test]
    fn plain_click_toggles_team_and_is_its_own_inverse() {
        let players = vec![player("7", BBox::new(10.0, 10.0, 5.0, 8.0))];
        let initial = assignments(&[("7", Team::One, false)]);

        let first = apply_click(&initial, &players, "7", ClickKind::Plain).unwrap();
        assert_eq!(first["7"], Assignment { team: Team::Two, removed: false });

        let second = apply_click(&first, &players, "7", ClickKind::Plain).unwrap();
        assert_eq!(second["7"], Assignment { team: Team::One, removed: false });
    }

    #[test]
    fn modified_click_toggles_removed_and_preserves_team() {
        let players = vec![player("9", BBox::new(0.0, 0.0, 4.0, 4.0))];
        let initial = assignments(&[("9", Team::Two, false)]);

        let removed = apply_click(&initial, &players, "9", ClickKind::Modified).unwrap();
        assert_eq!(removed["9"], Assignment { team: Team::Two, removed: true });

        let restored = apply_click(&removed, &players, "9", ClickKind::Modified).unwrap();
        assert_eq!(restored["9"], Assignment { team: Team::Two, removed: false });
    }

    #[test]
    fn plain_click_on_removed_player_is_ignored() {
        let players = vec![player("5", BBox::new(0.0, 0.0, 4.0, 4.0))];
        let initial = assignments(&[("5", Team::Two, true)]);
        assert_eq!(apply_click(&initial, &players, "5", ClickKind::Plain), None);
    }

    #[test]
    fn clicks_never_disturb_other_players() {
        let players = vec![player("1", BBox::new(0.0, 0.0, 4.0, 4.0)), player("2", BBox::new(20.0, 0.0, 4.0, 4.0))];
        let initial = assignments(&[("1", Team::One, false), ("2", Team::Two, true)]);

        let after = apply_click(&initial, &players, "1", ClickKind::Plain).unwrap();
        assert_eq!(after["2"], initial["2"]);
    }

    #[test]
    fn missing_ids_default_to_team_one() {
        let players = vec![player("1", BBox::new(0.0, 0.0, 4.0, 4.0)), player("2", BBox::new(20.0, 0.0, 4.0, 4.0))];
        // The input set omits id 2 entirely.
        let initial = assignments(&[("1", Team::One, false)]);

        let after = apply_click(&initial, &players, "2", ClickKind::Plain).unwrap();
        assert_eq!(after["2"], Assignment { team: Team::Two, removed: false });
        assert_eq!(after["1"], Assignment { team: Team::One, removed: false });
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn hit_test_prefers_topmost_of_overlapping_boxes() {
        let players = vec![
            player("under", BBox::new(0.0, 0.0, 10.0, 10.0)),
            player("over", BBox::new(5.0, 5.0, 10.0, 10.0)),
        ];
        assert_eq!(hit_player(&players, 7.0, 7.0).map(|p| p.id.as_str()), Some("over"));
        assert_eq!(hit_player(&players, 1.0, 1.0).map(|p| p.id.as_str()), Some("under"));
        assert_eq!(hit_player(&players, 40.0, 40.0), None);
        assert_eq!(hit_player(&[], 1.0, 1.0), None);
    }

    #[test]
    fn pointer_positions_map_back_to_natural_space() {
        let origin = Pos2::new(100.0, 50.0);
        let (x, y) = to_natural(Pos2::new(110.0, 60.0), origin, 0.5);
        assert_eq!((x, y), (20.0, 20.0));
    }
}
