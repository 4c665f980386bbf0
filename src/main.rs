//! Binary entrypoint that starts the charla server.

use std::process::ExitCode;

use charla::start_charla;

/// Load configuration and serve the chat API.
fn main() -> ExitCode {
    start_charla::run()
}
