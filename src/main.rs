use mpeg_audio_engine::cli::CliApp;
use mpeg_audio_engine::logging::EngineLogger;

fn main() {
    // quiet unless asked otherwise
    if std::env::var("MPEG_ENGINE_LOG_LEVEL").is_err() {
        std::env::set_var("MPEG_ENGINE_LOG_LEVEL", "warn");
    }
    if let Err(e) = EngineLogger::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let cli = CliApp::parse();

    if let Err(e) = cli.run() {
        log::error!("{}", e);
        CliApp::display_error(&e);
        std::process::exit(1);
    }
}
