use egui::Color32;
use serde::Deserialize;
use serde::Serialize;

use crate::api::DEFAULT_API_BASE;

pub const fn default_bool<const V: bool>() -> bool {
    V
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_display_width() -> f32 {
    1050.0
}

fn default_team1_name() -> String {
    "VFB".to_string()
}

fn default_team2_name() -> String {
    "FCB".to_string()
}

fn default_team1_color() -> Color32 {
    Color32::from_rgb(0x00, 0x00, 0xff)
}

fn default_team2_color() -> Color32 {
    Color32::from_rgb(0xff, 0x00, 0x00)
}

/// Global application settings, persisted through eframe storage.
#[derive(Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the analysis backend.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Pixel width the annotation frame is scaled to on screen.
    #[serde(default = "default_display_width")]
    pub annotator_display_width: f32,
    /// Team defaults pre-filled into the new-analysis form.
    #[serde(default = "default_team1_name")]
    pub team1_name: String,
    #[serde(default = "default_team1_color")]
    pub team1_color: Color32,
    #[serde(default = "default_team2_name")]
    pub team2_name: String,
    #[serde(default = "default_team2_color")]
    pub team2_color: Color32,
    /// Ask for confirmation before submitting the final assignment.
    #[serde(default = "default_bool::<false>")]
    pub confirm_submit: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            annotator_display_width: default_display_width(),
            team1_name: default_team1_name(),
            team1_color: default_team1_color(),
            team2_name: default_team2_name(),
            team2_color: default_team2_color(),
            confirm_submit: false,
        }
    }
}
