use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    #[error("numeric instability in {stage} at year {year}")]
    NumericInstability { stage: &'static str, year: u32 },
    #[error("simulation cancelled")]
    Cancelled,
}

impl CoreError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}
