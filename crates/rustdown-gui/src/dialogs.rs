use std::path::PathBuf;

use rustdown_core::gateway::{DialogGateway, SUPPORTED_EXTENSIONS};

/// Native pickers. These block the UI thread until dismissed.
#[derive(Clone, Copy, Debug, Default)]
pub struct RfdDialogs;

impl RfdDialogs {
    fn dialog() -> rfd::FileDialog {
        rfd::FileDialog::new()
            .add_filter("Markdown", &["md", "markdown"])
            .add_filter("Text", SUPPORTED_EXTENSIONS)
    }

    fn variables_dialog() -> rfd::FileDialog {
        rfd::FileDialog::new().add_filter("TOML", &["toml"])
    }

    /// A `[[variables]]` file to import.
    pub fn pick_variables_file(self) -> Option<PathBuf> {
        Self::variables_dialog().pick_file()
    }

    pub fn pick_variables_target(self) -> Option<PathBuf> {
        Self::variables_dialog()
            .set_file_name("variables.toml")
            .save_file()
    }
}

impl DialogGateway for RfdDialogs {
    fn pick_open_path(&self) -> Option<PathBuf> {
        Self::dialog().pick_file()
    }

    fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
        Self::dialog().set_file_name(suggested_name).save_file()
    }
}
