//! Input validation limits and generation-cap policy

/// Maximum length for a full name (256 chars)
pub const MAX_NAME_LEN: usize = 256;

/// Maximum length for free-text fields such as notes (64KB)
pub const MAX_TEXT_LEN: usize = 64 * 1024;

/// Maximum length for a child-link relationship label (64 chars)
pub const MAX_LABEL_LEN: usize = 64;

/// Hard cap on ancestor/descendant/tree recursion depth
pub const MAX_GENERATIONS: u32 = 10;

/// Generations used by ancestor/descendant queries when none is requested
pub const DEFAULT_GENERATIONS: u32 = 5;

/// Generations used by tree materialization when none is requested
pub const DEFAULT_TREE_GENERATIONS: u32 = 3;

/// Search page size used when the caller asks for zero or fewer rows
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Largest search page a caller may request
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Validation error type
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyName,
    NameTooLong { len: usize, max: usize },
    TextTooLong { field: &'static str, len: usize, max: usize },
    LabelTooLong { len: usize, max: usize },
    NonPositiveId { field: &'static str, id: i64 },
    MissingParty,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Full name cannot be empty"),
            Self::NameTooLong { len, max } => {
                write!(f, "Full name too long: {} chars (max {})", len, max)
            }
            Self::TextTooLong { field, len, max } => {
                write!(f, "{} too long: {} chars (max {})", field, len, max)
            }
            Self::LabelTooLong { len, max } => {
                write!(f, "Relationship label too long: {} chars (max {})", len, max)
            }
            Self::NonPositiveId { field, id } => {
                write!(f, "{} must be a positive id, got {}", field, id)
            }
            Self::MissingParty => write!(f, "A union needs a husband or a wife"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Clamp a requested generation count into `[1, MAX_GENERATIONS]`.
///
/// Values of zero or less fall back to `default`, values above the cap are
/// clamped rather than rejected.
pub fn clamp_generations(requested: i32, default: u32) -> u32 {
    if requested <= 0 {
        default.clamp(1, MAX_GENERATIONS)
    } else {
        (requested as u32).min(MAX_GENERATIONS)
    }
}

/// Normalize search paging arguments to `(limit, offset)`
pub fn clamp_page(limit: i64, offset: i64) -> (usize, usize) {
    let limit = if limit <= 0 {
        DEFAULT_SEARCH_LIMIT
    } else {
        (limit as usize).min(MAX_SEARCH_LIMIT)
    };
    (limit, offset.max(0) as usize)
}

/// Validate that an id is positive
pub fn validate_id(field: &'static str, id: i64) -> Result<(), ValidationError> {
    if id <= 0 {
        return Err(ValidationError::NonPositiveId { field, id });
    }
    Ok(())
}

/// Validate a full name
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Validate an optional free-text field
pub fn validate_text(field: &'static str, text: Option<&str>) -> Result<(), ValidationError> {
    match text {
        Some(t) if t.len() > MAX_TEXT_LEN => Err(ValidationError::TextTooLong {
            field,
            len: t.len(),
            max: MAX_TEXT_LEN,
        }),
        _ => Ok(()),
    }
}

/// Validate a child-link relationship label
pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.len() > MAX_LABEL_LEN {
        return Err(ValidationError::LabelTooLong {
            len: label.len(),
            max: MAX_LABEL_LEN,
        });
    }
    Ok(())
}
