pub mod error;
pub mod fake;
pub mod session;
pub mod state;
pub mod wait;
pub mod webdriver;

pub use error::BrowserError;
pub use session::{BrowserLauncher, BrowserSession};
pub use state::StorageState;
pub use webdriver::{WebDriverBrowser, WebDriverLauncher};
