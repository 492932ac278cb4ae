use std::collections::BTreeMap;
use std::fmt;

use egui::Color32;
use rand::RngCore;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

/// Player ids come from the backend as either JSON numbers or strings and are
/// stable within one session. We normalize them to strings.
pub type PlayerId = String;

/// The full assignment state of one frame as reported by the annotator.
pub type AssignmentMap = BTreeMap<PlayerId, Assignment>;

/// Opaque identifier for one analysis session on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// Fresh session ids are minted client-side: a sortable timestamp plus a
    /// random suffix so two uploads within the same second don't collide.
    pub fn generate() -> Self {
        let now = jiff::Zoned::now();
        let mut suffix = [0u8; 4];
        rand::rng().fill_bytes(&mut suffix);
        SessionId(format!(
            "{}_{}",
            now.strftime("%Y%m%d_%H%M%S"),
            data_encoding::HEXLOWER.encode(&suffix)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two competing sides.
///
/// Wire encoding is the stringly `"1"`/`"2"` the backend uses as map keys;
/// tolerant deserialization also accepts bare integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Team {
    One,
    Two,
}

impl Team {
    pub fn toggled(self) -> Team {
        match self {
            Team::One => Team::Two,
            Team::Two => Team::One,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Team::One => "1",
            Team::Two => "2",
        }
    }
}

impl Serialize for Team {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Team {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(1) => Ok(Team::One),
            Raw::Num(2) => Ok(Team::Two),
            Raw::Num(other) => Err(de::Error::custom(format!("invalid team number {other}"))),
            Raw::Str(s) => match s.as_str() {
                "1" => Ok(Team::One),
                "2" => Ok(Team::Two),
                other => Err(de::Error::custom(format!("invalid team {other:?}"))),
            },
        }
    }
}

/// Team membership of one detected player, or exclusion from the analysis.
///
/// The team value is retained while `removed` is set so that un-removing a
/// player restores the side they held before; downstream consumers ignore
/// `team` whenever `removed` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub team: Team,
    pub removed: bool,
}

impl Assignment {
    pub fn new(team: Team) -> Self {
        Assignment { team, removed: false }
    }
}

impl Default for Assignment {
    fn default() -> Self {
        Assignment::new(Team::One)
    }
}

/// Axis-aligned bounding box in the frame's natural coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        BBox { x, y, width, height }
    }

    /// Build from the `[x1, y1, x2, y2]` corner quadruple the backend sends.
    pub fn from_corners(corners: [f32; 4]) -> Self {
        let [x1, y1, x2, y2] = corners;
        BBox {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// The corner quadruple expected by the save endpoint.
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// One detected player within a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub bbox: BBox,
    /// Automatic assignment supplied by the backend, Team 1 when absent.
    pub default_team: Team,
}

impl Player {
    pub fn default_assignment(&self) -> Assignment {
        Assignment::new(self.default_team)
    }
}

/// Decoded RGBA raster of one representative frame.
#[derive(Clone)]
pub struct FrameImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl fmt::Debug for FrameImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameImage").field("width", &self.width).field("height", &self.height).finish()
    }
}

/// One sampled video image presented for manual review. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: FrameImage,
    pub players: Vec<Player>,
}

/// The frame sequence plus team configuration for one assignment session.
#[derive(Debug, Clone)]
pub struct FrameBatch {
    pub frames: Vec<Frame>,
    pub team_config: TeamConfig,
}

/// Display configuration for one side.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSide {
    pub name: String,
    pub color: Color32,
}

/// Names and colors for both sides, as configured at upload time and echoed
/// back by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamConfig {
    pub team1: TeamSide,
    pub team2: TeamSide,
}

impl Default for TeamConfig {
    fn default() -> Self {
        TeamConfig {
            team1: TeamSide { name: "Team 1".to_string(), color: Color32::from_rgb(0x00, 0x00, 0xff) },
            team2: TeamSide { name: "Team 2".to_string(), color: Color32::from_rgb(0xff, 0x00, 0x00) },
        }
    }
}

impl TeamConfig {
    pub fn palette(&self) -> TeamPalette {
        TeamPalette {
            team1: self.team1.color,
            team2: self.team2.color,
            removed: TeamPalette::REMOVED,
        }
    }
}

/// Overlay colors for the annotator, keyed by assignment state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamPalette {
    pub team1: Color32,
    pub team2: Color32,
    pub removed: Color32,
}

impl TeamPalette {
    /// Neutral gray for detections excluded from the analysis.
    pub const REMOVED: Color32 = Color32::from_rgb(0x77, 0x77, 0x77);

    pub fn color_for(&self, assignment: Assignment) -> Color32 {
        if assignment.removed {
            self.removed
        } else {
            match assignment.team {
                Team::One => self.team1,
                Team::Two => self.team2,
            }
        }
    }
}

/// Which screen side a team attacks toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayDirection {
    LeftToRight,
    RightToLeft,
}

impl PlayDirection {
    pub fn complement(self) -> PlayDirection {
        match self {
            PlayDirection::LeftToRight => PlayDirection::RightToLeft,
            PlayDirection::RightToLeft => PlayDirection::LeftToRight,
        }
    }
}

/// Play-direction choice for the session. Team 2 is always the logical
/// complement of team 1, so only one side is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionSelection {
    team1: Option<PlayDirection>,
}

impl DirectionSelection {
    /// Record that `team` plays from left to right.
    pub fn set_left_to_right(&mut self, team: Team) {
        self.team1 = Some(match team {
            Team::One => PlayDirection::LeftToRight,
            Team::Two => PlayDirection::RightToLeft,
        });
    }

    pub fn direction_of(&self, team: Team) -> Option<PlayDirection> {
        match team {
            Team::One => self.team1,
            Team::Two => self.team1.map(PlayDirection::complement),
        }
    }

    pub fn is_set(&self) -> bool {
        self.team1.is_some()
    }

    /// Wire shape of the save payload: `{"1": <dir|null>, "2": <dir|null>}`.
    pub fn wire(&self) -> BTreeMap<&'static str, Option<PlayDirection>> {
        BTreeMap::from([
            (Team::One.key(), self.direction_of(Team::One)),
            (Team::Two.key(), self.direction_of(Team::Two)),
        ])
    }
}

/// Whether the pipeline assigns teams itself or defers to manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentMode {
    Automatic,
    #[default]
    Manual,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_from_corners_normalizes_order() {
        let a = BBox::from_corners([10.0, 20.0, 50.0, 80.0]);
        let b = BBox::from_corners([50.0, 80.0, 10.0, 20.0]);
        assert_eq!(a, b);
        assert_eq!(a.x, 10.0);
        assert_eq!(a.width, 40.0);
        assert_eq!(a.corners(), [10.0, 20.0, 50.0, 80.0]);
    }

    #[test]
    fn bbox_contains_edges() {
        let b = BBox::new(10.0, 10.0, 5.0, 8.0);
        assert!(b.contains(10.0, 10.0));
        assert!(b.contains(15.0, 18.0));
        assert!(!b.contains(15.1, 12.0));
        assert!(!b.contains(9.9, 12.0));
    }

    #[test]
    fn team_toggle_is_involution() {
        assert_eq!(Team::One.toggled(), Team::Two);
        assert_eq!(Team::One.toggled().toggled(), Team::One);
    }

    #[test]
    fn team_accepts_strings_and_numbers() {
        assert_eq!(serde_json::from_str::<Team>("\"1\"").unwrap(), Team::One);
        assert_eq!(serde_json::from_str::<Team>("2").unwrap(), Team::Two);
        assert!(serde_json::from_str::<Team>("3").is_err());
        assert_eq!(serde_json::to_string(&Team::Two).unwrap(), "\"2\"");
    }

    #[test]
    fn direction_complement_tracks_team1() {
        let mut directions = DirectionSelection::default();
        assert!(!directions.is_set());
        assert_eq!(directions.direction_of(Team::Two), None);

        directions.set_left_to_right(Team::Two);
        assert_eq!(directions.direction_of(Team::One), Some(PlayDirection::RightToLeft));
        assert_eq!(directions.direction_of(Team::Two), Some(PlayDirection::LeftToRight));

        let wire = serde_json::to_value(directions.wire()).unwrap();
        assert_eq!(wire["1"], "right_to_left");
        assert_eq!(wire["2"], "left_to_right");
    }

    #[test]
    fn generated_session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
