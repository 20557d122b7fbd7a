//! Hazard categories and their canonical kinds.
//!
//! A category's name arrives from the remote catalog either as a plain
//! string or as a JSON object holding per-locale variants
//! (`{"name": "Stairs", "name_ru": "Лестница"}`). The payload is resolved
//! once, when the [`Category`] is built, into a [`LocalizedName`]; the
//! canonical [`CategoryKind`] is derived from the default entry at the same
//! time.

use std::collections::BTreeMap;

/// Key holding the default (locale-independent) name.
pub const DEFAULT_NAME_KEY: &str = "name";

/// Canonical classification of a hazard category.
///
/// # Examples
/// ```
/// use hazmap_core::CategoryKind;
///
/// assert_eq!(CategoryKind::from_display_name("Kerb"), CategoryKind::Curb);
/// assert_eq!(CategoryKind::Curb.as_str(), "curb");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CategoryKind {
    /// Kerb or curb edge.
    Curb,
    /// Pedestrian crossing.
    Crosswalk,
    /// Uneven surface.
    RoughRoad,
    /// Ramp.
    Ramp,
    /// Steep incline.
    Slope,
    /// Stairs.
    Stairs,
    /// Object obstructing the way.
    ObjectOnTheRoad,
    /// Public transport stop.
    BusStop,
    /// Gate.
    Gate,
    /// Narrow passage.
    NarrowRoad,
    /// Traffic light.
    TrafficLight,
    /// Name did not match any known kind.
    #[cfg_attr(feature = "serde", serde(rename = "unknown_obj"))]
    Unknown,
}

impl CategoryKind {
    /// Return the canonical tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Curb => "curb",
            Self::Crosswalk => "crosswalk",
            Self::RoughRoad => "rough_road",
            Self::Ramp => "ramp",
            Self::Slope => "slope",
            Self::Stairs => "stairs",
            Self::ObjectOnTheRoad => "object_on_the_road",
            Self::BusStop => "bus_stop",
            Self::Gate => "gate",
            Self::NarrowRoad => "narrow_road",
            Self::TrafficLight => "traffic_light",
            Self::Unknown => "unknown_obj",
        }
    }

    /// Classify a default-locale display name.
    ///
    /// Matching is exact: the remote catalog publishes a fixed set of English
    /// names and anything else maps to [`CategoryKind::Unknown`].
    #[must_use]
    pub fn from_display_name(name: &str) -> Self {
        match name {
            "Stairs" => Self::Stairs,
            "Object on the road" => Self::ObjectOnTheRoad,
            "Bus stop" => Self::BusStop,
            "Gate" => Self::Gate,
            "Traffic light" => Self::TrafficLight,
            "Kerb" => Self::Curb,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "curb" => Ok(Self::Curb),
            "crosswalk" => Ok(Self::Crosswalk),
            "rough_road" => Ok(Self::RoughRoad),
            "ramp" => Ok(Self::Ramp),
            "slope" => Ok(Self::Slope),
            "stairs" => Ok(Self::Stairs),
            "object_on_the_road" => Ok(Self::ObjectOnTheRoad),
            "bus_stop" => Ok(Self::BusStop),
            "gate" => Ok(Self::Gate),
            "narrow_road" => Ok(Self::NarrowRoad),
            "traffic_light" => Ok(Self::TrafficLight),
            "unknown_obj" => Ok(Self::Unknown),
            _ => Err(format!("unknown category kind '{s}'")),
        }
    }
}

/// Raw name payload together with its resolved locale variants.
///
/// # Examples
/// ```
/// use hazmap_core::LocalizedName;
///
/// let name = LocalizedName::parse(r#"{"name": "Gate", "name_ru": "Ворота"}"#);
/// assert_eq!(name.for_locale("ru"), "Ворота");
/// assert_eq!(name.for_locale("de"), "Gate");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedName {
    raw: String,
    variants: BTreeMap<String, String>,
}

impl LocalizedName {
    /// Resolve a raw payload.
    ///
    /// A JSON object contributes one entry per key; string values are taken
    /// as they are and other values in their JSON text form. Any other
    /// payload is treated as the default name.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let variants = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| match value {
                    serde_json::Value::String(text) => (key, text),
                    other => (key, other.to_string()),
                })
                .collect(),
            _ => BTreeMap::from([(DEFAULT_NAME_KEY.to_owned(), raw.clone())]),
        };
        Self { raw, variants }
    }

    /// The payload exactly as received.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The default-locale name, if the payload carried one.
    #[must_use]
    pub fn default_name(&self) -> Option<&str> {
        self.variants.get(DEFAULT_NAME_KEY).map(String::as_str)
    }

    /// Name for a language code, falling back to the default name and then
    /// to the raw payload.
    #[must_use]
    pub fn for_locale(&self, language: &str) -> &str {
        self.variants
            .get(&format!("{DEFAULT_NAME_KEY}_{language}"))
            .or_else(|| self.variants.get(DEFAULT_NAME_KEY))
            .map_or(self.raw.as_str(), String::as_str)
    }
}

/// A class of accessibility hazard published by the remote catalog.
///
/// Equality is identity: two categories with the same `id` are the same
/// category, whatever their other fields say.
///
/// # Examples
/// ```
/// use hazmap_core::{Category, CategoryKind};
///
/// let category = Category::new(7, "Kerb");
/// assert_eq!(category.kind(), CategoryKind::Curb);
/// assert!(category.active);
/// ```
#[derive(Debug, Clone)]
pub struct Category {
    /// Stable identifier assigned by the remote catalog.
    pub id: i64,
    name: LocalizedName,
    kind: CategoryKind,
    /// Free-form description.
    pub description: String,
    /// Informational link.
    pub url: String,
    /// Location of the category icon.
    pub icon_url: String,
    /// Whether the category is part of the current catalog.
    pub published: bool,
    /// Whether the user has this category enabled as a map filter.
    pub active: bool,
}

impl Category {
    /// Build a published, active category with empty metadata.
    pub fn new(id: i64, raw_name: impl Into<String>) -> Self {
        let name = LocalizedName::parse(raw_name);
        let kind = name
            .default_name()
            .map_or(CategoryKind::Unknown, CategoryKind::from_display_name);
        Self {
            id,
            name,
            kind,
            description: String::new(),
            url: String::new(),
            icon_url: String::new(),
            published: true,
            active: true,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the informational link.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the icon location.
    #[must_use]
    pub fn with_icon_url(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = icon_url.into();
        self
    }

    /// Set the published flag.
    #[must_use]
    pub const fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    /// Set the user filter state.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// The resolved name.
    #[must_use]
    pub const fn name(&self) -> &LocalizedName {
        &self.name
    }

    /// Display name for a language code.
    #[must_use]
    pub fn display_name(&self, language: &str) -> &str {
        self.name.for_locale(language)
    }

    /// Canonical kind derived from the default name.
    #[must_use]
    pub const fn kind(&self) -> CategoryKind {
        self.kind
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Category {}

impl std::hash::Hash for Category {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("Kerb", CategoryKind::Curb)]
    #[case("Stairs", CategoryKind::Stairs)]
    #[case("Object on the road", CategoryKind::ObjectOnTheRoad)]
    #[case("Bus stop", CategoryKind::BusStop)]
    #[case("Gate", CategoryKind::Gate)]
    #[case("Traffic light", CategoryKind::TrafficLight)]
    #[case(r#"{"name": "Kerb", "name_ru": "Бордюр"}"#, CategoryKind::Curb)]
    fn resolves_known_names(#[case] raw: &str, #[case] expected: CategoryKind) {
        assert_eq!(Category::new(1, raw).kind(), expected);
    }

    #[rstest]
    #[case("kerb")]
    #[case("{not json")]
    #[case(r#"{"name_en": "Kerb"}"#)]
    #[case("")]
    fn unmatched_names_are_unknown(#[case] raw: &str) {
        let category = Category::new(1, raw);
        assert_eq!(category.kind(), CategoryKind::Unknown);
        assert_eq!(category.kind().as_str(), "unknown_obj");
    }

    #[rstest]
    fn locale_lookup_falls_back_to_default_then_raw() {
        let localized = LocalizedName::parse(r#"{"name": "Ramp", "name_fr": "Rampe"}"#);
        assert_eq!(localized.for_locale("fr"), "Rampe");
        assert_eq!(localized.for_locale("en"), "Ramp");

        let only_locale = LocalizedName::parse(r#"{"name_fr": "Rampe"}"#);
        assert_eq!(only_locale.for_locale("en"), r#"{"name_fr": "Rampe"}"#);
    }

    #[rstest]
    fn non_string_json_values_keep_their_json_text() {
        let localized =
            LocalizedName::parse(r#"{"name": "Gate", "name_de": 3, "name_fi": {"a": true}}"#);
        assert_eq!(localized.for_locale("de"), "3");
        assert_eq!(localized.for_locale("fi"), r#"{"a":true}"#);
        assert_eq!(localized.for_locale("en"), "Gate");
    }

    #[rstest]
    fn plain_string_becomes_default_name() {
        let localized = LocalizedName::parse("Slope ahead");
        assert_eq!(localized.default_name(), Some("Slope ahead"));
        assert_eq!(localized.raw(), "Slope ahead");
    }

    #[rstest]
    fn equality_follows_identifier() {
        let first = Category::new(4, "Gate").with_description("old");
        let second = Category::new(4, "Stairs").with_published(false);
        assert_eq!(first, second);
        assert_ne!(first, Category::new(5, "Gate"));
    }

    #[rstest]
    fn kind_tags_round_trip_through_from_str() {
        for kind in [CategoryKind::Curb, CategoryKind::NarrowRoad, CategoryKind::Unknown] {
            assert_eq!(CategoryKind::from_str(kind.as_str()), Ok(kind));
        }
        assert!(CategoryKind::from_str("lava").is_err());
    }
}
