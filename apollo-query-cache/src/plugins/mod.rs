//! Extensions shipped with the cache.

pub mod normalize_entities;
pub mod session_validation;

pub use self::normalize_entities::NormalizeEntities;
pub use self::normalize_entities::NormalizeEntitiesConfig;
pub use self::session_validation::SessionValidation;
pub use self::session_validation::SessionValidationConfig;
