mod automation;
mod error;
mod human;
mod listing;
mod navigator;
mod pagination;
mod session;
mod source;

pub use automation::{
    BrowserAutomation, BrowserContext, BrowserLauncher, LaunchOverrides, ViewportSpec,
};
pub use error::{BrowserError, BrowserResult};
pub use human::HumanMotionController;
pub use listing::ListingScraper;
pub use navigator::SearchNavigator;
pub use pagination::{BrowserPager, PageProber, PaginationController};
pub use session::{Credentials, SessionManager, SessionToken, StoredCookie};
pub use source::BrowserJobSource;

pub(crate) fn escape_js(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
}
