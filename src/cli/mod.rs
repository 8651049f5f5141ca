use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub mod status;
pub use status::StatusDisplay;

/// Decode an audio file in the background and report what came out
#[derive(Debug, Parser)]
#[command(name = "stream-decode")]
#[command(about = "Decode an audio file into time-stamped stereo PCM frames")]
#[command(version = "0.1.0")]
pub struct CliArgs {
    /// Audio file to decode
    pub path: String,

    /// Restart from the beginning at end of stream
    #[arg(long = "loop")]
    pub looping: bool,

    /// Start position (e.g. "1:30", "90", "90s")
    #[arg(long, value_name = "TIME")]
    pub seek: Option<String>,

    /// Allow hardware-accelerated decoders
    #[arg(long)]
    pub hw: bool,

    /// Configuration file (defaults to ~/.config/stream-decoder/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Consume audio at playback speed instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Stop after this many seconds of decoded audio
    #[arg(long, value_name = "SECONDS")]
    pub max_seconds: Option<f64>,

    /// Print a status line while decoding
    #[arg(long)]
    pub watch: bool,
}

impl CliArgs {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    pub fn input_path(&self) -> PathBuf {
        expand_path(&self.path)
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.as_deref().map(expand_path)
    }

    /// Requested start position, if any
    pub fn seek_position(&self) -> Result<Option<Duration>, ParseError> {
        self.seek.as_deref().map(parse_time).transpose()
    }

    pub fn max_duration(&self) -> Result<Option<Duration>, ParseError> {
        match self.max_seconds {
            None => Ok(None),
            Some(s) if s.is_finite() && s > 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(ParseError::InvalidArgument {
                argument: "--max-seconds".to_string(),
                value: s.to_string(),
                expected: "a positive number".to_string(),
            }),
        }
    }
}

/// Expand tilde (~) in path to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            home_dir.join(rest)
        } else {
            PathBuf::from(path)
        }
    } else if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

/// Parse a time position: "1:30", "1:30.5", "90", "90s" or "1500ms"
pub fn parse_time(time_str: &str) -> Result<Duration, ParseError> {
    let trimmed = time_str.trim();
    let invalid = || ParseError::InvalidTimeFormat {
        input: time_str.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Some((minutes, seconds)) = trimmed.split_once(':') {
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
        if !(0.0..60.0).contains(&seconds) {
            return Err(invalid());
        }
        return Ok(Duration::from_secs_f64(minutes as f64 * 60.0 + seconds));
    }

    let (number, divisor) = match trimmed.strip_suffix("ms") {
        Some(millis) => (millis, 1000.0),
        None => (trimmed.trim_end_matches('s'), 1.0),
    };
    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs_f64(value / divisor))
}

/// Validate seek position against stream duration (zero means unknown)
pub fn validate_seek_time(position: Duration, duration_ms: f64) -> Result<Duration, ParseError> {
    let position_ms = position.as_secs_f64() * 1000.0;
    if duration_ms > 0.0 && position_ms > duration_ms {
        return Err(ParseError::SeekBeyondDuration {
            position: position.as_secs_f64(),
            duration: duration_ms / 1000.0,
        });
    }
    Ok(position)
}

/// Format milliseconds as MM:SS.mmm
pub fn format_ms(ms: f64) -> String {
    let total = ms.max(0.0).round() as u64;
    format!("{:02}:{:02}.{:03}", total / 60_000, (total / 1000) % 60, total % 1000)
}

/// Argument parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },

    #[error("Seek position {position:.2}s exceeds stream duration {duration:.2}s")]
    SeekBeyondDuration { position: f64, duration: f64 },
}
