pub mod logging;
pub mod otp;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_RESUME_URL: &str = "resume-url";
pub const ARG_STATE_TTL_SECONDS: &str = "state-ttl-seconds";

/// A suspended login older than a day is not worth resuming.
pub const MAX_STATE_TTL_SECONDS: u64 = 24 * 60 * 60;

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("yubistep")
        .about("YubiKey OTP step-up authentication")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("YUBISTEP_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Base URL browsers use to reach this service")
                .env("YUBISTEP_PUBLIC_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_RESUME_URL)
                .long(ARG_RESUME_URL)
                .help("Host URL that resumes the login after a verified OTP")
                .env("YUBISTEP_RESUME_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_STATE_TTL_SECONDS)
                .long(ARG_STATE_TTL_SECONDS)
                .help("How long a suspended login stays valid, in seconds")
                .default_value("3600")
                .env("YUBISTEP_STATE_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_STATE_TTL_SECONDS)),
        );

    let command = otp::with_args(command);
    logging::with_args(command)
}
