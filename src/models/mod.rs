pub mod agent;
pub mod delivery;
pub mod issue;
pub mod pagination;
pub mod rating;
pub mod settings;
pub mod tracking;

pub use agent::*;
pub use delivery::*;
pub use issue::*;
pub use pagination::*;
pub use rating::*;
pub use settings::*;
pub use tracking::*;
