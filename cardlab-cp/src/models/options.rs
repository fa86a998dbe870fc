//! User-selected capability flags for a batch.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Capability selections submitted with a batch.
///
/// Orientation checking is not listed here: it is a prerequisite step and is
/// always enabled by the plan builder. Enabling `generate_description`
/// without `identify` and `grade` is a caller concern; the engine will run
/// description generation with whatever data is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default = "default_true")]
    pub remove_background: bool,
    #[serde(default = "default_true")]
    pub identify: bool,
    #[serde(default = "default_true")]
    pub grade: bool,
    #[serde(default)]
    pub enhance: bool,
    #[serde(default = "default_true")]
    pub generate_description: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            remove_background: true,
            identify: true,
            grade: true,
            enhance: false,
            generate_description: true,
        }
    }
}
