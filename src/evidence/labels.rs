use crate::error::classification::ErrorCategory;

/// Convert an error category into a stable evidence label.
pub fn error_category_label(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Configuration => "configuration",
        ErrorCategory::Launch => "launch",
        ErrorCategory::Execution => "execution",
        ErrorCategory::Integration => "integration",
        ErrorCategory::Persistence => "persistence",
        ErrorCategory::Interrupted => "interrupted",
    }
}
