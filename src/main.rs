use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::{info, trace};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod countdown;
mod domain;
mod engine;
mod inputter;
mod model;
mod record;
mod source;
mod ui;

use controller::Controller;
use domain::{AdminConfig, DEFAULT_EVENT_DATE, DEFAULT_LOG_FILE, RsvpError, parse_event_date};
use model::{Model, Status};
use source::FileSource;
use ui::AdminUI;

#[derive(Parser, Debug)]
#[command(
    name = "rsvp-admin",
    version,
    about = "Browse the RSVP confirmations of an event in the terminal."
)]
struct Args {
    /// Export of the confirmations (csv, json, parquet or arrow).
    #[arg(value_name = "FILE")]
    path: String,

    /// Confirmations per page.
    #[arg(short = 's', long, default_value_t = engine::DEFAULT_PAGE_SIZE as u64, value_parser = clap::value_parser!(u64).range(1..))]
    page_size: u64,

    /// Start of the event, used for the countdown.
    #[arg(short = 'd', long, default_value = DEFAULT_EVENT_DATE)]
    event_date: String,

    /// Milliseconds to wait for a key press before redrawing.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Where to write the log, the terminal belongs to the UI.
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: String,
}

impl Args {
    fn into_config(self) -> Result<AdminConfig, RsvpError> {
        let path = shellexpand::full(&self.path)
            .map_err(|e| RsvpError::LoadingFailed(e.to_string()))?;
        let log_file = shellexpand::full(&self.log_file)
            .map_err(|e| RsvpError::LoadingFailed(e.to_string()))?;

        Ok(AdminConfig::new(PathBuf::from(path.into_owned()))?
            .page_size(self.page_size as usize)
            .event_poll_time(self.poll_ms)
            .event_date(parse_event_date(&self.event_date)?)
            .log_file(PathBuf::from(log_file.into_owned())))
    }
}

fn main() -> ExitCode {
    let result = Args::parse().into_config().and_then(|cfg| {
        init_logging(&cfg)?;
        run(&cfg)
    });
    match result {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(cfg: &AdminConfig) -> Result<(), RsvpError> {
    let file = File::create(&cfg.log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(cfg: &AdminConfig) -> Result<(), RsvpError> {
    info!("Starting rsvp-admin with {}", cfg.records_path.display());

    let source = Arc::new(FileSource::new(cfg.records_path.clone()));
    let mut model = Model::init(cfg, source)?;
    let ui = AdminUI::new(cfg);
    let controller = Controller::new(cfg);

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut model, &ui, &controller);
    ratatui::restore();

    trace!("Leaving main loop");
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    model: &mut Model,
    ui: &AdminUI,
    controller: &Controller,
) -> Result<(), RsvpError> {
    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(model)?;
        model.update(message)?;
    }
    Ok(())
}
