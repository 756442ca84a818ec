pub mod errors;
pub mod ids;
pub mod settings;
pub mod tools;

pub use errors::SessionError;
pub use ids::SessionId;
pub use settings::Settings;
