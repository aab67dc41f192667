/// Translation settings. Built once by the host and passed to every entry point.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    pub filters: FiltersConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct FiltersConfig {
    pub string: StringFiltersConfig,
    pub id: IdFiltersConfig,
}

/// Experimental String operators, all disabled unless set.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct StringFiltersConfig {
    /// Enables `_MATCHES`.
    pub matches: bool,
    /// Enables `_LT`, `_LTE`, `_GT` and `_GTE`.
    pub comparison: bool,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct IdFiltersConfig {
    /// Enables `_MATCHES`.
    pub matches: bool,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct LimitsConfig {
    /// Upper bound for every list, applied on top of per-type limits.
    pub max: Option<u64>,
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}
