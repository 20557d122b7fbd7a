/// A user-selectable disability filter.
///
/// # Examples
/// ```
/// use hazmap_core::Disability;
///
/// let wheelchair = Disability::new(1, "Wheelchair");
/// assert!(wheelchair.active);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Disability {
    /// Identifier assigned by the remote catalog.
    pub id: i64,
    /// Display label.
    pub label: String,
    /// Whether the user has this filter enabled.
    pub active: bool,
}

impl Disability {
    /// Construct an active disability filter.
    pub fn new(id: i64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            active: true,
        }
    }
}
