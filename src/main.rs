use anyhow::Context;
use whatsapp_blur::blur::BlurService;
use whatsapp_blur::logging;
use whatsapp_blur::settings::Settings;

fn main() -> anyhow::Result<()> {
    let settings_path = Settings::default_path();
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("failed to read settings from {}", settings_path.display()))?;
    logging::init(settings.debug_logging, settings.log_file.clone());

    if !settings_path.exists() {
        match settings.save(&settings_path) {
            Ok(()) => tracing::info!(path = %settings_path.display(), "wrote default settings"),
            Err(err) => tracing::warn!(%err, "could not write default settings"),
        }
    }

    let service = BlurService::start(settings)?;
    let handle = service.handle();
    ctrlc::set_handler(move || {
        handle.shutdown();
    })
    .context("failed to install Ctrl-C handler")?;

    service.run();
    Ok(())
}
