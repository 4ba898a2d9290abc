use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::Vendor;

/// Stored credentials and model choice for one vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Per-vendor credential/model store, passed explicitly to whoever builds a gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorProfiles {
    profiles: BTreeMap<Vendor, VendorProfile>,
}

impl VendorProfiles {
    pub fn get(&self, vendor: Vendor) -> Option<&VendorProfile> {
        self.profiles.get(&vendor)
    }

    pub fn set(&mut self, vendor: Vendor, profile: VendorProfile) {
        self.profiles.insert(vendor, profile);
    }

    pub fn api_key(&self, vendor: Vendor) -> Option<&str> {
        self.get(vendor)
            .and_then(|p| p.api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn model(&self, vendor: Vendor) -> Option<&str> {
        self.get(vendor)
            .and_then(|p| p.model.as_deref())
            .filter(|model| !model.trim().is_empty())
    }

    pub fn vendors(&self) -> impl Iterator<Item = Vendor> + '_ {
        self.profiles.keys().copied()
    }
}

/// Resolved configuration for a single gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSettings {
    pub vendor: Vendor,
    /// Empty when no key is configured; single-file audits then fall back.
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl VendorSettings {
    const VENDOR_ENV: &'static str = "SOL_AUDIT_VENDOR";
    const API_KEY_ENV: &'static str = "SOL_AUDIT_API_KEY";
    const ENDPOINT_ENV: &'static str = "SOL_AUDIT_ENDPOINT";
    const MODEL_ENV: &'static str = "SOL_AUDIT_MODEL";
    const TIMEOUT_ENV: &'static str = "SOL_AUDIT_TIMEOUT_SECS";
    const RETRIES_ENV: &'static str = "SOL_AUDIT_MAX_RETRIES";

    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            api_key: String::new(),
            endpoint: None,
            model: None,
            timeout_secs: None,
            max_retries: 2,
        }
    }

    /// Load settings from environment variables layered over stored profiles.
    ///
    /// * `SOL_AUDIT_VENDOR`: vendor identifier (default: `gemini`).
    /// * `SOL_AUDIT_API_KEY`: API key; falls back to the vendor profile.
    /// * `SOL_AUDIT_MODEL`: model id; falls back to the profile, then the vendor default.
    pub fn from_env(profiles: &VendorProfiles) -> Result<Self> {
        Self::for_vendor(None, profiles)
    }

    /// Like [`VendorSettings::from_env`], but an explicit vendor wins over
    /// `SOL_AUDIT_VENDOR`. Environment values still override the profile.
    pub fn for_vendor(vendor: Option<Vendor>, profiles: &VendorProfiles) -> Result<Self> {
        Self::from_map(std::env::vars().collect(), profiles, vendor)
    }

    fn from_map(
        vars: HashMap<String, String>,
        profiles: &VendorProfiles,
        vendor: Option<Vendor>,
    ) -> Result<Self> {
        let non_blank = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let vendor = match (vendor, non_blank(Self::VENDOR_ENV)) {
            (Some(vendor), _) => vendor,
            (None, Some(raw)) => raw
                .parse::<Vendor>()
                .with_context(|| format!("invalid {} value", Self::VENDOR_ENV))?,
            (None, None) => Vendor::Gemini,
        };
        let profile = profiles.get(vendor);

        let api_key = non_blank(Self::API_KEY_ENV)
            .or_else(|| profiles.api_key(vendor).map(str::to_string))
            .unwrap_or_default();
        let endpoint = non_blank(Self::ENDPOINT_ENV).or_else(|| {
            profile
                .and_then(|p| p.endpoint.clone())
                .filter(|v| !v.trim().is_empty())
        });
        let model =
            non_blank(Self::MODEL_ENV).or_else(|| profiles.model(vendor).map(str::to_string));
        let timeout_secs = non_blank(Self::TIMEOUT_ENV).and_then(|v| v.parse::<u64>().ok());
        let max_retries = non_blank(Self::RETRIES_ENV)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2);

        Ok(Self {
            vendor,
            api_key,
            endpoint,
            model,
            timeout_secs,
            max_retries,
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.vendor.default_model().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn profiles() -> VendorProfiles {
        let mut profiles = VendorProfiles::default();
        profiles.set(
            Vendor::Gemini,
            VendorProfile {
                api_key: Some("gemini-profile-key".into()),
                model: Some("gemini-1.5-pro-latest".into()),
                endpoint: None,
            },
        );
        profiles.set(
            Vendor::Claude,
            VendorProfile {
                api_key: Some("claude-profile-key".into()),
                model: None,
                endpoint: Some("https://proxy.example.com".into()),
            },
        );
        profiles
    }

    #[test]
    fn defaults_to_gemini_without_credentials() {
        let settings = VendorSettings::from_map(HashMap::new(), &VendorProfiles::default(), None).unwrap();
        assert_eq!(settings.vendor, Vendor::Gemini);
        assert!(!settings.has_credentials());
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.model_or_default(), "gemini-1.5-flash-latest");
    }

    #[test]
    fn profile_supplies_key_and_model() {
        let settings = VendorSettings::from_map(HashMap::new(), &profiles(), None).unwrap();
        assert_eq!(settings.api_key, "gemini-profile-key");
        assert_eq!(settings.model_or_default(), "gemini-1.5-pro-latest");
    }

    #[test]
    fn environment_overrides_profile() {
        let settings = VendorSettings::from_map(
            vars(&[
                ("SOL_AUDIT_VENDOR", "anthropic"),
                ("SOL_AUDIT_API_KEY", "env-key"),
                ("SOL_AUDIT_TIMEOUT_SECS", "45"),
                ("SOL_AUDIT_MAX_RETRIES", "5"),
            ]),
            &profiles(),
            None,
        )
        .unwrap();
        assert_eq!(settings.vendor, Vendor::Claude);
        assert_eq!(settings.api_key, "env-key");
        assert_eq!(settings.endpoint.as_deref(), Some("https://proxy.example.com"));
        assert_eq!(settings.timeout_secs, Some(45));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.model_or_default(), "claude-opus-4-20250514");
    }

    #[test]
    fn rejects_unknown_vendor() {
        let err = VendorSettings::from_map(
            vars(&[("SOL_AUDIT_VENDOR", "mistral")]),
            &VendorProfiles::default(),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("SOL_AUDIT_VENDOR"));
    }

    #[test]
    fn explicit_vendor_reads_that_profile() {
        let store = profiles();
        let settings =
            VendorSettings::from_map(HashMap::new(), &store, Some(Vendor::Claude)).unwrap();
        assert_eq!(settings.vendor, Vendor::Claude);
        assert_eq!(settings.api_key, "claude-profile-key");
        assert!(settings.model.is_none());

        let openai = VendorSettings::from_map(HashMap::new(), &store, Some(Vendor::OpenAi)).unwrap();
        assert!(!openai.has_credentials());
    }

    #[test]
    fn explicit_vendor_keeps_environment_values() {
        let settings = VendorSettings::from_map(
            vars(&[
                ("SOL_AUDIT_VENDOR", "gemini"),
                ("SOL_AUDIT_API_KEY", "sk-env"),
                ("SOL_AUDIT_MODEL", "gpt-4o"),
                ("SOL_AUDIT_ENDPOINT", "http://localhost:9000"),
            ]),
            &VendorProfiles::default(),
            Some(Vendor::OpenAi),
        )
        .unwrap();
        assert_eq!(settings.vendor, Vendor::OpenAi);
        assert_eq!(settings.api_key, "sk-env");
        assert_eq!(settings.model.as_deref(), Some("gpt-4o"));
        assert_eq!(settings.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn explicit_vendor_ignores_invalid_vendor_variable() {
        let settings = VendorSettings::from_map(
            vars(&[("SOL_AUDIT_VENDOR", "mistral")]),
            &profiles(),
            Some(Vendor::Gemini),
        )
        .unwrap();
        assert_eq!(settings.api_key, "gemini-profile-key");
    }

    #[test]
    fn profiles_deserialize_from_vendor_keyed_map() {
        let profiles: VendorProfiles = serde_json::from_str(
            r#"{"openai":{"api_key":"sk-test","model":"gpt-4o"},"grok":{"api_key":" "}}"#,
        )
        .unwrap();
        assert_eq!(profiles.api_key(Vendor::OpenAi), Some("sk-test"));
        assert_eq!(profiles.model(Vendor::OpenAi), Some("gpt-4o"));
        assert_eq!(profiles.api_key(Vendor::Grok), None);
        assert_eq!(profiles.vendors().count(), 2);
    }
}
