#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    #[cfg(feature = "logging")]
    {
        use tracing_subscriber::Layer;
        use tracing_subscriber::filter::LevelFilter;
        use tracing_subscriber::fmt;
        use tracing_subscriber::fmt::time::LocalTime;
        use tracing_subscriber::layer::SubscriberExt;

        let file_appender = tracing_appender::rolling::Builder::new()
            .rotation(tracing_appender::rolling::Rotation::HOURLY)
            .max_log_files(1)
            .filename_prefix("pitchside.log")
            .build(".")
            .expect("failed to build file appender");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The guard flushes the file writer on drop; keep it alive for the
        // whole process.
        std::mem::forget(guard);

        let subscriber = tracing_subscriber::registry()
            .with(fmt::Layer::new().with_ansi(true).with_filter(LevelFilter::DEBUG))
            .with(
                fmt::Layer::new()
                    .with_writer(non_blocking)
                    .with_timer(LocalTime::rfc_3339())
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            );
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    }

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([900.0, 620.0])
            .with_title(format!("{} v{}", pitchside::APP_NAME, env!("CARGO_PKG_VERSION")))
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        pitchside::APP_NAME,
        native_options,
        Box::new(|cc| Ok(Box::new(pitchside::PitchsideApp::new(cc)))),
    )
}
