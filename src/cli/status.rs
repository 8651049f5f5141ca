use crate::error::{DecoderError, ErrorSeverity};
use crate::models::{DecoderState, DecoderStatus};

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display the full decoder status box
    pub fn display_full_status(path: &str, status: &DecoderStatus, decoded_ms: f64) {
        println!("┌─ Decoder Status ────────────────────────────────────────┐");
        println!("│ Input: {}", Self::truncate(path, 50));
        println!("│ State: {}", Self::format_state(status.state));
        println!(
            "│ Decoded: {} / {}",
            super::format_ms(decoded_ms),
            super::format_ms(status.duration_ms)
        );
        println!("│ Last frame: {}", super::format_ms(status.last_decoded_frame_ms));
        println!("│");
        println!("│ Sample Rate: {} Hz", status.sample_rate);
        println!(
            "│ Channels: {} ({})",
            status.channels,
            Self::channel_description(status.channels)
        );
        println!(
            "│ Hardware decoding: {}",
            if status.hw_decoding_allowed { "allowed" } else { "off" }
        );
        println!("│ Looping: {}", if status.looping { "yes" } else { "no" });
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display real-time progress (single line)
    pub fn display_position_update(status: &DecoderStatus, position_ms: f64) {
        let progress = if status.duration_ms > 0.0 {
            (position_ms / status.duration_ms).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };

        print!(
            "\r{} [{}] {}/{} ({} buffered)",
            status.state.as_str(),
            Self::create_progress_bar(progress, 30),
            super::format_ms(position_ms),
            super::format_ms(status.duration_ms),
            status.buffered_frames
        );

        use std::io::{self, Write};
        let _ = io::stdout().flush();
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &DecoderError) {
        let severity = error.severity();
        let icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };
        eprintln!("{} [{}] {}", icon, severity.as_str(), error.user_message());
        if !error.is_recoverable() {
            eprintln!("This stream cannot be decoded with the current input.");
        }
    }

    pub fn channel_description(channels: u16) -> &'static str {
        match channels {
            0 => "None",
            1 => "Mono",
            2 => "Stereo",
            _ => "Multi-channel",
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    /// Create a progress bar string
    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_state(state: DecoderState) -> String {
        match state {
            DecoderState::Ready => "⏸ Ready".to_string(),
            DecoderState::Running => "▶ Running".to_string(),
            DecoderState::EndOfStream => "⏹ End of stream".to_string(),
            DecoderState::Faulted => "✗ Faulted".to_string(),
            DecoderState::Stopped => "⏹ Stopped".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SetupError;

    fn create_test_status() -> DecoderStatus {
        DecoderStatus {
            state: DecoderState::Running,
            last_decoded_frame_ms: 61_500.0,
            duration_ms: 180_000.0,
            sample_rate: 44_100,
            channels: 2,
            buffered_frames: 4,
            hw_decoding_allowed: false,
            looping: false,
        }
    }

    #[test]
    fn test_channel_description() {
        assert_eq!(StatusDisplay::channel_description(0), "None");
        assert_eq!(StatusDisplay::channel_description(2), "Stereo");
        assert_eq!(StatusDisplay::channel_description(6), "Multi-channel");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(StatusDisplay::truncate("short", 10), "short");
        assert_eq!(StatusDisplay::truncate("a very long file name.flac", 10), "a very ...");
        assert_eq!(StatusDisplay::truncate("tiny", 2), "tiny");
        assert_eq!(StatusDisplay::truncate("ääääää", 5), "ää...");
    }

    #[test]
    fn test_create_progress_bar() {
        assert_eq!(StatusDisplay::create_progress_bar(0.0, 4), "░░░░");
        assert_eq!(StatusDisplay::create_progress_bar(0.5, 4), "██░░");
        assert_eq!(StatusDisplay::create_progress_bar(1.5, 4), "████");
    }

    #[test]
    fn test_format_state() {
        assert_eq!(StatusDisplay::format_state(DecoderState::Running), "▶ Running");
        assert!(StatusDisplay::format_state(DecoderState::Faulted).contains("Faulted"));
    }

    #[test]
    fn test_display_functions_dont_panic() {
        let status = create_test_status();
        StatusDisplay::display_full_status("/music/track.flac", &status, 61_000.0);
        StatusDisplay::display_position_update(&status, 61_000.0);

        let zero = DecoderStatus {
            duration_ms: 0.0,
            ..status
        };
        StatusDisplay::display_position_update(&zero, 10.0);

        StatusDisplay::display_simple_error(&DecoderError::Setup(SetupError::NoAudioStream));
    }
}
