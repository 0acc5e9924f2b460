pub mod mode;
pub mod settings;
pub mod util;

pub use mode::{Appearance, Mode};
pub use settings::BridgeSettings;
