pub mod driver;
pub mod meeting;
pub mod normalize;
pub mod osascript;
pub mod powershell;
mod process;

use crate::config::Config;
use crate::mail::driver::{MailDriver, Platform};
use crate::mail::osascript::OsascriptDriver;
use crate::mail::powershell::PowerShellDriver;

/// The automation backend for `platform`. Nothing downstream of this
/// branches on the platform again.
pub fn driver_for(platform: Platform, cfg: &Config) -> Box<dyn MailDriver> {
    match platform {
        Platform::Macos => Box::new(OsascriptDriver::new(
            cfg.osascript_path.as_deref().unwrap_or("osascript"),
        )),
        Platform::Windows => Box::new(PowerShellDriver::new(
            cfg.powershell_path.as_deref().unwrap_or("powershell"),
        )),
    }
}
