//! Model configuration entity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ModelId;

/// A user-registered model configuration.
///
/// The relay only reads the display name; credentials and provider wiring
/// belong to the excluded CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub id: ModelId,
    pub name: String,
    pub provider: String,
}

impl ModelProfile {
    /// Creates a model profile.
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: ModelId::new(),
            name: name.into(),
            provider: provider.into(),
        }
    }
}
