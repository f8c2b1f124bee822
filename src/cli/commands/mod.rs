//! CLI command implementations.

mod config;
mod delete;
mod doctor;
mod export;
mod generate;
mod init;
mod list;
mod serve;
mod show;
mod voice;

pub use config::run_config;
pub use delete::run_delete;
pub use doctor::run_doctor;
pub use export::run_export;
pub use generate::run_generate;
pub use init::run_init;
pub use list::run_list;
pub use serve::run_serve;
pub use show::run_show;
pub use voice::run_voice;

use crate::config::Settings;
use crate::library::SqliteCourseLibrary;

/// Open the configured course library.
fn open_library(settings: &Settings) -> crate::Result<SqliteCourseLibrary> {
    SqliteCourseLibrary::new(&settings.library_path())
}
