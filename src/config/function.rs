use super::PropertySource;

pub const FUNCTION_DEFINITION_OPTION: &str = "function.definition";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionProperties {
    definition: String,
}

impl FunctionProperties {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }

    pub fn from_source(source: &PropertySource) -> Self {
        Self::new(
            source
                .get_text(&[FUNCTION_DEFINITION_OPTION])
                .unwrap_or_default(),
        )
    }

    /// The `|`-separated definition, empty when none is configured.
    pub fn definition(&self) -> &str {
        &self.definition
    }
}
