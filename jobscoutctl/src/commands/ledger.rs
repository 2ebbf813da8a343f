use clap::Args;

/// Lists entries from the local push ledger.
#[derive(Args, Debug, Clone)]
pub struct LedgerShowArgs {
    /// Maximum rows returned
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
