use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use stream_decoder::audio::{FrameReader, StreamDecoder};
use stream_decoder::cli::{self, CliArgs, ParseError, StatusDisplay};
use stream_decoder::config::ConfigManager;
use stream_decoder::error::{DecoderError, ErrorSeverity};
use stream_decoder::logging;
use stream_decoder::models::{DecoderState, OUTPUT_CHANNELS};

/// Failures surfaced by the command line front end
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error(transparent)]
    Arguments(#[from] ParseError),
}

/// Totals reported once decoding ends
#[derive(Debug, Default)]
struct DecodeSummary {
    frames: u64,
    peak: f32,
    interrupted: bool,
}

impl DecodeSummary {
    fn record(&mut self, samples: &[f32]) {
        self.frames += (samples.len() / OUTPUT_CHANNELS) as u64;
        self.peak = samples.iter().fold(self.peak, |peak, s| peak.max(s.abs()));
    }

    fn decoded_ms(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 * 1000.0 / sample_rate as f64
    }
}

#[tokio::main]
async fn main() {
    if std::env::var(logging::LOG_LEVEL_ENV).is_err() {
        std::env::set_var(logging::LOG_LEVEL_ENV, "warn");
    }
    if let Err(e) = logging::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let args = CliArgs::parse_args();
    match run(args).await {
        Ok(()) => {}
        Err(AppError::Decoder(e)) => {
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
        Err(AppError::Arguments(e)) => {
            eprintln!("[{}] {}", ErrorSeverity::Error.as_str(), e);
            std::process::exit(2);
        }
    }
}

async fn run(args: CliArgs) -> Result<(), AppError> {
    let config_manager = match args.config_path() {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    }
    .map_err(DecoderError::from)?;

    let mut config = config_manager.get_config().clone();
    config.looping |= args.looping;
    config.hardware_decoding |= args.hw;

    let start_at = args.seek_position()?;
    let max_duration = args.max_duration()?;
    let path = args.input_path();

    let decoder = Arc::new(StreamDecoder::open(&path, config)?);
    decoder.start()?;

    let mut reader = FrameReader::new(decoder.clone());
    if let Some(position) = start_at {
        let position = cli::validate_seek_time(position, decoder.duration_ms())?;
        let target_ms = position.as_secs_f64() * 1000.0;
        tokio::task::block_in_place(|| reader.seek(target_ms, true))?;
    }

    let sample_rate = decoder.sample_rate();
    let tick = if args.realtime {
        Duration::from_millis(20)
    } else {
        Duration::from_millis(1)
    };
    let chunk_frames = if args.realtime {
        (sample_rate as usize * tick.as_millis() as usize / 1000).max(1)
    } else {
        4096
    };
    let mut chunk = vec![0.0f32; chunk_frames * OUTPUT_CHANNELS];

    let mut summary = DecodeSummary::default();
    let mut interval = tokio::time::interval(tick);
    let mut last_status = Instant::now();
    let started = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping decoder");
                summary.interrupted = true;
                break;
            }
            _ = interval.tick() => {
                let mut written = reader.fill(&mut chunk);
                summary.record(&chunk[..written * OUTPUT_CHANNELS]);
                while !args.realtime && written > 0 {
                    written = reader.fill(&mut chunk);
                    summary.record(&chunk[..written * OUTPUT_CHANNELS]);
                }

                if args.watch && last_status.elapsed() >= Duration::from_millis(250) {
                    StatusDisplay::display_position_update(&decoder.status(), reader.position_ms());
                    last_status = Instant::now();
                }

                if let Some(max) = max_duration {
                    if summary.decoded_ms(sample_rate) >= max.as_secs_f64() * 1000.0 {
                        break;
                    }
                }

                match decoder.state() {
                    DecoderState::EndOfStream if written == 0 && decoder.buffered_frames() == 0 => break,
                    DecoderState::Faulted | DecoderState::Stopped => {
                        warn!("Decoder stopped unexpectedly in state {}", decoder.state());
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if args.watch {
        println!();
    }
    reader.release();
    decoder.shutdown();

    StatusDisplay::display_full_status(
        &path.display().to_string(),
        &decoder.status(),
        summary.decoded_ms(sample_rate),
    );
    println!(
        "Peak level {:.3}, decoded in {:.2}s{}",
        summary.peak,
        started.elapsed().as_secs_f64(),
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}
