pub mod command_store;
pub mod keystore;
pub mod path_processing;
pub mod settings;
pub mod text_processing;

pub use command_store::*;
pub use keystore::*;
pub use path_processing::*;
pub use settings::*;
pub use text_processing::*;
