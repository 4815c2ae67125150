// SPDX-License-Identifier: MIT
//
// Command-line arguments for the viewer.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rawkey_term::{DecoderConfig, ProbeConfig, ProbeStrategy};

/// rawkey: show every key the terminal sends, decoded.
#[derive(Parser, Debug)]
#[command(name = "rawkey", version, about, long_about = None)]
pub struct Cli {
    /// Milliseconds to wait after ESC before reporting the Escape key.
    #[arg(long, env = "RAWKEY_ESCAPE_TIMEOUT_MS", default_value_t = 30)]
    pub escape_timeout_ms: u64,

    /// How to measure the terminal.
    #[arg(long, value_enum, default_value_t = Probe::platform_default())]
    pub probe: Probe,

    /// Keep the cursor visible while running.
    #[arg(long)]
    pub show_cursor: bool,

    /// Write logs to this file. Without it nothing is logged, since
    /// stdout is the raw terminal.
    #[arg(long, env = "RAWKEY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Printable ASCII key that quits, besides Ctrl-C.
    #[arg(long, default_value = "q", value_parser = parse_quit_char)]
    pub quit_char: u8,
}

/// Geometry probe choice on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Probe {
    /// `ioctl(TIOCGWINSZ)`.
    Direct,
    /// Cursor position round trip.
    Cursor,
}

impl Probe {
    #[must_use]
    pub fn platform_default() -> Self {
        match ProbeStrategy::default() {
            ProbeStrategy::Direct => Self::Direct,
            ProbeStrategy::CursorRoundTrip => Self::Cursor,
        }
    }
}

impl From<Probe> for ProbeStrategy {
    fn from(probe: Probe) -> Self {
        match probe {
            Probe::Direct => Self::Direct,
            Probe::Cursor => Self::CursorRoundTrip,
        }
    }
}

impl Cli {
    pub const fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            escape_timeout: Duration::from_millis(self.escape_timeout_ms),
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            strategy: self.probe.into(),
            ..ProbeConfig::default()
        }
    }
}

fn parse_quit_char(s: &str) -> Result<u8, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_graphic() || c == ' ' => {
            u8::try_from(c).map_err(|err| err.to_string())
        }
        _ => Err(format!("expected one printable ASCII character, got {s:?}")),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rawkey").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_parse() {
        let cli = parse(&[
            "--escape-timeout-ms",
            "75",
            "--probe",
            "cursor",
            "--show-cursor",
            "--log-file",
            "/tmp/rawkey.log",
            "--quit-char",
            "x",
        ])
        .unwrap();

        assert_eq!(cli.escape_timeout_ms, 75);
        assert_eq!(cli.probe, Probe::Cursor);
        assert!(cli.show_cursor);
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/rawkey.log")));
        assert_eq!(cli.quit_char, b'x');
    }

    #[test]
    fn configs_follow_flags() {
        let cli = parse(&["--escape-timeout-ms", "5", "--probe", "direct"]).unwrap();
        assert_eq!(cli.decoder_config().escape_timeout, Duration::from_millis(5));
        assert_eq!(cli.probe_config().strategy, ProbeStrategy::Direct);
        assert_eq!(
            cli.probe_config().reply_timeout,
            ProbeConfig::default().reply_timeout
        );
    }

    #[test]
    fn quit_char_must_be_one_printable_ascii() {
        assert_eq!(parse_quit_char("q"), Ok(b'q'));
        assert_eq!(parse_quit_char(" "), Ok(b' '));
        assert!(parse_quit_char("").is_err());
        assert!(parse_quit_char("qq").is_err());
        assert!(parse_quit_char("é").is_err());
        assert!(parse_quit_char("\t").is_err());
    }

    #[test]
    fn rejects_unknown_probe() {
        assert!(parse(&["--probe", "psychic"]).is_err());
    }
}
