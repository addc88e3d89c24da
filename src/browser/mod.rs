pub mod chrome;
pub mod driver;

pub use chrome::ChromeDriver;
pub use driver::{BrowserDriver, BrowserSession, PageDriver};
