pub mod app_state;
pub mod settings;

pub use app_state::{AppState, CURRENT_VERSION};
pub use settings::{ConfigStore, Settings};
