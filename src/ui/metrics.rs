use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use egui::Color32;
use egui::OpenUrl;
use egui::ProgressBar;
use egui::RichText;
use egui::TextureHandle;
use egui_extras::Column;
use egui_extras::TableBuilder;
use egui_plot::Legend;
use egui_plot::Line;
use egui_plot::Plot;
use egui_plot::PlotPoint;
use egui_plot::PlotPoints;
use egui_plot::Polygon;
use egui_plot::Text;

use crate::api::MetricsSummaryResponse;
use crate::api::ProgressReport;
use crate::app::ConsoleTabViewer;
use crate::icon_str;
use crate::icons;
use crate::session::FrameImage;
use crate::session::TeamConfig;
use crate::task;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One row of the KPI table: the backend metric keys for both teams plus how
/// the value is displayed and whether it takes part in the radar comparison.
struct KpiRow {
    label: &'static str,
    team1_key: &'static str,
    team2_key: &'static str,
    percent: bool,
    radar: bool,
}

const KPI_ROWS: &[KpiRow] = &[
    KpiRow { label: "Possession (%)", team1_key: "team_1_possession_percent", team2_key: "team_2_possession_percent", percent: true, radar: true },
    KpiRow { label: "Goals", team1_key: "team_1_goals", team2_key: "team_2_goals", percent: false, radar: true },
    KpiRow { label: "Shots", team1_key: "team_1_shots", team2_key: "team_2_shots", percent: false, radar: true },
    KpiRow { label: "Distance (m)", team1_key: "team_1_distance_m", team2_key: "team_2_distance_m", percent: false, radar: true },
    KpiRow { label: "Avg. speed (km/h)", team1_key: "team_1_avg_speed_kmh", team2_key: "team_2_avg_speed_kmh", percent: false, radar: true },
    KpiRow { label: "Space control (%)", team1_key: "space_control_avg_team_1", team2_key: "space_control_avg_team_2", percent: true, radar: false },
    KpiRow { label: "Defensive third control (%)", team1_key: "thirds_control_avg_defensive_team_1", team2_key: "thirds_control_avg_defensive_team_2", percent: true, radar: true },
    KpiRow { label: "Middle third control (%)", team1_key: "thirds_control_avg_middle_team_1", team2_key: "thirds_control_avg_middle_team_2", percent: true, radar: true },
    KpiRow { label: "Attacking third control (%)", team1_key: "thirds_control_avg_attacking_team_1", team2_key: "thirds_control_avg_attacking_team_2", percent: true, radar: true },
];

/// One spoke of the radar chart, values normalized to 0..=100.
#[derive(Debug, PartialEq)]
pub struct RadarAxis {
    pub label: &'static str,
    pub team1: f64,
    pub team2: f64,
}

/// Percent metrics are plotted as-is; absolute metrics are scaled so the
/// larger of the two teams sits at 100.
pub fn radar_axes(metrics: &BTreeMap<String, f64>) -> Vec<RadarAxis> {
    KPI_ROWS
        .iter()
        .filter(|row| row.radar)
        .map(|row| {
            let raw1 = metrics.get(row.team1_key).copied().unwrap_or(0.0);
            let raw2 = metrics.get(row.team2_key).copied().unwrap_or(0.0);
            let (team1, team2) = if row.percent {
                (raw1, raw2)
            } else {
                let max = raw1.max(raw2).max(1e-5);
                (raw1 / max * 100.0, raw2 / max * 100.0)
            };
            RadarAxis { label: row.label, team1, team2 }
        })
        .collect()
}

#[derive(Default)]
pub struct MetricsPageState {
    /// True once the annotated video has been rendered (or already existed
    /// when the session was opened).
    pub annotation_done: bool,
    pub annotation: ProgressReport,
    pub last_poll: Option<Instant>,
    pub poll_in_flight: bool,
    pub summary: Option<Box<MetricsSummaryResponse>>,
    pub summary_requested: bool,
    pub summary_error: Option<String>,
    pub heatmaps_requested: bool,
    pub heatmaps_loaded: bool,
    pub heatmap_images: [Option<FrameImage>; 2],
    pub heatmap_textures: [Option<TextureHandle>; 2],
    pub download_in_flight: bool,
}

impl MetricsPageState {
    pub fn poll_due(&self) -> bool {
        !self.annotation_done && !self.poll_in_flight && self.last_poll.is_none_or(|t| t.elapsed() >= POLL_INTERVAL)
    }
}

impl ConsoleTabViewer<'_> {
    pub fn build_metrics_tab(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &self.tab_state.session else {
            ui.label("No active session. Open or start one from the Session Setup tab.");
            return;
        };

        ui.heading(format!("{} Metrics analysis", icons::CHART_LINE));
        ui.horizontal(|ui| {
            ui.label("Session:");
            ui.label(RichText::new(session.id.to_string()).monospace());
        });
        ui.separator();

        if !session.metrics.annotation_done {
            self.build_annotation_progress(ui);
            return;
        }

        self.request_results_once();

        egui::ScrollArea::vertical().show(ui, |ui| {
            self.build_summary_section(ui);
            ui.separator();
            self.build_heatmap_section(ui);
            ui.separator();
            self.build_export_section(ui);
        });
    }

    fn build_annotation_progress(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &self.tab_state.session else {
            return;
        };
        let progress = session.metrics.annotation;
        let pct = (progress.fraction() * 100.0) as u32;
        ui.label("The annotated video is being rendered. Metrics become available once it is done.");
        ui.add(ProgressBar::new(progress.fraction()).text(format!("{} Rendering: {pct}%", icons::FILM_SLATE)));

        if session.metrics.poll_due() {
            let id = session.id.clone();
            let api = self.tab_state.api.clone();
            let generation = self.tab_state.session_generation;
            if let Some(session) = &mut self.tab_state.session {
                session.metrics.poll_in_flight = true;
            }
            self.tab_state.push_task(task::poll_annotation(api, id, generation));
        }
    }

    /// Kick off the one-shot summary and heatmap fetches the first time the
    /// finished page is shown.
    fn request_results_once(&mut self) {
        let api = self.tab_state.api.clone();
        let generation = self.tab_state.session_generation;
        let Some(session) = &mut self.tab_state.session else {
            return;
        };

        let mut tasks = Vec::new();
        if session.metrics.summary.is_none() && !session.metrics.summary_requested && session.metrics.summary_error.is_none()
        {
            session.metrics.summary_requested = true;
            tasks.push(task::load_metrics(api.clone(), session.id.clone(), generation));
        }

        if !session.metrics.heatmaps_requested {
            session.metrics.heatmaps_requested = true;
            let names = [session.team_config.team1.name.clone(), session.team_config.team2.name.clone()];
            tasks.push(task::load_heatmaps(api, session.id.clone(), names, generation));
        }

        for t in tasks {
            self.tab_state.push_task(t);
        }
    }

    fn build_summary_section(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &mut self.tab_state.session else {
            return;
        };
        ui.label(RichText::new("KPI overview").strong());

        if let Some(error) = session.metrics.summary_error.clone() {
            ui.colored_label(ui.visuals().error_fg_color, format!("{} Could not load metrics: {error}", icons::WARNING));
            if ui.button("Retry").clicked() {
                session.metrics.summary_error = None;
                session.metrics.summary_requested = false;
            }
            return;
        }

        let Some(summary) = &session.metrics.summary else {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading metrics...");
            });
            return;
        };

        let team_config = session.team_config.clone();
        build_kpi_columns(ui, summary, &team_config);
        ui.add_space(12.0);
        ui.label(RichText::new("Team comparison").strong());
        build_radar_chart(ui, &summary.metrics, &team_config);
    }

    fn build_heatmap_section(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &mut self.tab_state.session else {
            return;
        };
        ui.label(RichText::new("Team movement heatmaps").strong());

        if !session.metrics.heatmaps_loaded {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Generating heatmaps...");
            });
            return;
        }

        let metrics = &mut session.metrics;
        let names = [&session.team_config.team1.name, &session.team_config.team2.name];
        ui.columns(2, |columns| {
            for (i, column) in columns.iter_mut().enumerate() {
                if metrics.heatmap_textures[i].is_none() {
                    let Some(image) = &metrics.heatmap_images[i] else {
                        column.colored_label(
                            column.visuals().error_fg_color,
                            format!("{} No heatmap available for {}.", icons::WARNING, names[i]),
                        );
                        continue;
                    };
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(
                        [image.width as usize, image.height as usize],
                        &image.rgba,
                    );
                    metrics.heatmap_textures[i] =
                        Some(column.ctx().load_texture(format!("heatmap_{i}"), color_image, egui::TextureOptions::LINEAR));
                }

                if let Some(texture) = &metrics.heatmap_textures[i] {
                    column.add(egui::Image::new(texture).max_width(column.available_width()));
                    column.label(format!("Movement of {}", names[i]));
                }
            }
        });
    }

    fn build_export_section(&mut self, ui: &mut egui::Ui) {
        let api = self.tab_state.api.clone();
        let runtime = self.tab_state.runtime.clone();
        let generation = self.tab_state.session_generation;
        let Some(session) = &mut self.tab_state.session else {
            return;
        };
        let id = session.id.clone();

        ui.label(RichText::new("Exports").strong());
        ui.horizontal(|ui| {
            if ui.button(icon_str!(icons::MICROSOFT_EXCEL_LOGO, "Excel KPI export")).clicked() {
                ui.ctx().open_url(OpenUrl::new_tab(api.metrics_excel_url(&id)));
            }
            if ui.button(icon_str!(icons::MAP_TRIFOLD, "Heatmap archive")).clicked() {
                ui.ctx().open_url(OpenUrl::new_tab(api.heatmap_archive_url(&id)));
            }

            let download = egui::Button::new(icon_str!(icons::DOWNLOAD_SIMPLE, "Download annotated video"));
            if ui.add_enabled(!session.metrics.download_in_flight, download).clicked()
                && let Some(dest) = rfd::FileDialog::new()
                    .set_file_name(format!("{id}_annotated.mp4"))
                    .add_filter("MP4 video", &["mp4"])
                    .save_file()
            {
                session.metrics.download_in_flight = true;
                let task = task::start_download_video_task(&runtime, api.annotated_video_url(&id), dest, generation);
                self.tab_state.background_tasks.push(task);
            }
        });
    }
}

fn build_kpi_columns(ui: &mut egui::Ui, summary: &MetricsSummaryResponse, team_config: &TeamConfig) {
    ui.columns(2, |columns| {
        let sides: [(&crate::session::TeamSide, fn(&KpiRow) -> &'static str); 2] = [
            (&team_config.team1, |row| row.team1_key),
            (&team_config.team2, |row| row.team2_key),
        ];
        for (i, (side, key_of)) in sides.iter().enumerate() {
            let column = &mut columns[i];
            column.horizontal(|ui| {
                let (rect, _) = ui.allocate_exact_size(egui::Vec2::splat(14.0), egui::Sense::hover());
                ui.painter().rect_filled(rect, egui::CornerRadius::same(3), side.color);
                ui.label(RichText::new(&side.name).heading());
            });

            TableBuilder::new(column)
                .id_salt(format!("kpi_table_{i}"))
                .striped(true)
                .column(Column::remainder())
                .column(Column::auto())
                .body(|mut body| {
                    for row in KPI_ROWS {
                        let value = summary.metrics.get(key_of(row)).copied();
                        body.row(20.0, |mut table_row| {
                            table_row.col(|ui| {
                                ui.label(row.label);
                            });
                            table_row.col(|ui| {
                                let text = match value {
                                    None => "–".to_string(),
                                    Some(v) if row.percent => format!("{v:.1}"),
                                    Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
                                    Some(v) => format!("{v:.2}"),
                                };
                                ui.label(RichText::new(text).strong().color(Color32::from_rgb(0x14, 0xb8, 0xa6)));
                            });
                        });
                    }
                });
        }
    });
}

fn build_radar_chart(ui: &mut egui::Ui, metrics: &BTreeMap<String, f64>, team_config: &TeamConfig) {
    let axes = radar_axes(metrics);
    if axes.is_empty() {
        return;
    }

    let spoke = |index: usize, radius: f64| -> [f64; 2] {
        let angle = std::f64::consts::TAU * index as f64 / axes.len() as f64 + std::f64::consts::FRAC_PI_2;
        [radius * angle.cos(), radius * angle.sin()]
    };

    let polygon = |values: fn(&RadarAxis) -> f64| -> PlotPoints<'static> {
        axes.iter().enumerate().map(|(i, axis)| spoke(i, values(axis))).collect::<Vec<_>>().into()
    };

    let fill = |color: Color32| Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), 60);

    Plot::new("team_radar")
        .legend(Legend::default())
        .data_aspect(1.0)
        .height(420.0)
        .show_axes(false)
        .show_grid(false)
        .allow_drag(false)
        .allow_zoom(false)
        .allow_scroll(false)
        .show(ui, |plot_ui| {
            // Reference rings so the normalized scale stays readable.
            for ring in [25.0, 50.0, 75.0, 100.0] {
                let points: PlotPoints<'_> = (0..=64)
                    .map(|i| {
                        let angle = std::f64::consts::TAU * i as f64 / 64.0;
                        [ring * angle.cos(), ring * angle.sin()]
                    })
                    .collect::<Vec<_>>()
                    .into();
                plot_ui.line(Line::new("", points).color(Color32::from_gray(70)).width(0.5));
            }

            plot_ui.polygon(
                Polygon::new(team_config.team1.name.clone(), polygon(|a| a.team1))
                    .stroke(egui::Stroke::new(2.0, team_config.team1.color))
                    .fill_color(fill(team_config.team1.color)),
            );
            plot_ui.polygon(
                Polygon::new(team_config.team2.name.clone(), polygon(|a| a.team2))
                    .stroke(egui::Stroke::new(2.0, team_config.team2.color))
                    .fill_color(fill(team_config.team2.color)),
            );

            for (i, axis) in axes.iter().enumerate() {
                let [x, y] = spoke(i, 118.0);
                plot_ui.text(Text::new("", PlotPoint::new(x, y), axis.label));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radar_normalizes_absolute_metrics_against_the_leader() {
        let metrics = BTreeMap::from([
            ("team_1_possession_percent".to_string(), 62.5),
            ("team_2_possession_percent".to_string(), 37.5),
            ("team_1_distance_m".to_string(), 5000.0),
            ("team_2_distance_m".to_string(), 2500.0),
        ]);

        let axes = radar_axes(&metrics);
        let possession = axes.iter().find(|a| a.label == "Possession (%)").unwrap();
        assert_eq!((possession.team1, possession.team2), (62.5, 37.5));

        let distance = axes.iter().find(|a| a.label == "Distance (m)").unwrap();
        assert_eq!((distance.team1, distance.team2), (100.0, 50.0));
    }

    #[test]
    fn radar_handles_missing_and_zero_metrics() {
        let axes = radar_axes(&BTreeMap::new());
        assert!(!axes.is_empty());
        for axis in axes {
            assert_eq!((axis.team1, axis.team2), (0.0, 0.0));
        }
    }
}
