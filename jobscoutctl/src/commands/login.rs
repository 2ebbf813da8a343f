use clap::Args;

/// Performs the interactive login and saves the session token for reuse.
#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Run the login browser headless (a visible window is the default)
    #[arg(long)]
    pub headless: bool,
}
