mod ledger;
mod login;
mod run;

pub use ledger::LedgerShowArgs;
pub use login::LoginArgs;
pub use run::RunArgs;
