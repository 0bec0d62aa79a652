use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(
        "Bitwarden CLI (bw) is not available.\nPlease install the Bitwarden CLI first:\n  npm install -g @bitwarden/cli"
    )]
    CliMissing,

    #[error("Please log in to Bitwarden first:\n  bw login")]
    NotLoggedIn,
}
