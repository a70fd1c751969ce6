use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::DefaultOnNull;
use sha2::{Digest, Sha256};
use strum_macros::{Display, EnumIter, EnumString};

/// Keys left out of the fingerprint. Providers refresh these on every
/// re-publication without changing the warning itself. `expires` is compared
/// separately so that a pure extension is still noticed.
const FINGERPRINT_EXCLUDED: [&str; 4] = ["identifier", "sent", "effective", "expires"];

pub const DEFAULT_FEED_BASE_URL: &str = "https://warnung.bund.de";

#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    Mowas,
    Katwarn,
    Biwapp,
    Dwd,
    Lhp,
}

impl Provider {
    /// Path of the provider's feed below the feed base URL
    pub fn feed_path(&self) -> &'static str {
        match self {
            Self::Mowas => "/bbk.mowas/gefahrendurchsagen.json",
            Self::Katwarn => "/bbk.katwarn/warnmeldungen.json",
            Self::Biwapp => "/bbk.biwapp/warnmeldungen.json",
            Self::Dwd => "/bbk.dwd/unwetter.json",
            Self::Lhp => "/bbk.lhp/hochwassermeldungen.json",
        }
    }
}

/// A warning exactly as a provider publishes it. Feeds send `null` as often
/// as they leave a field out, both read as empty.
#[serde_with::serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WarningData {
    pub identifier: String,
    pub sent: DateTime<Utc>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub status: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub msg_type: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub info: Vec<WarningInfo>,
}

#[serde_with::serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct WarningInfo {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub event: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub urgency: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub severity: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub certainty: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub headline: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub description: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub instruction: String,
    pub web: Option<String>,
    pub effective: Option<DateTime<Utc>>,
    pub onset: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub area: Vec<WarningArea>,
}

#[serde_with::serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct WarningArea {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename = "areaDesc", default)]
    pub area_desc: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub geocode: Vec<Geocode>,
}

#[serde_with::serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Geocode {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename = "valueName", default)]
    pub value_name: String,
    pub value: String,
}

/// A warning from a known provider with its content fingerprint attached.
#[derive(Clone, Debug, PartialEq)]
pub struct WarningEntry {
    pub identifier: String,
    pub provider: Provider,
    pub sent: DateTime<Utc>,
    pub status: String,
    pub msg_type: String,
    pub info: Vec<WarningInfo>,
    pub fingerprint: String,
}

impl WarningEntry {
    pub fn new(data: WarningData, provider: Provider) -> Result<Self> {
        let fingerprint = fingerprint(&data)?;
        Ok(Self {
            identifier: data.identifier,
            provider,
            sent: data.sent,
            status: data.status,
            msg_type: data.msg_type,
            info: data.info,
            fingerprint,
        })
    }

    fn first_info(&self) -> Option<&WarningInfo> {
        self.info.first()
    }

    pub fn headline(&self) -> &str {
        self.first_info().map_or("", |i| i.headline.as_str())
    }

    pub fn event(&self) -> &str {
        self.first_info().map_or("", |i| i.event.as_str())
    }

    pub fn effective(&self) -> Option<DateTime<Utc>> {
        self.first_info().and_then(|i| i.effective)
    }

    pub fn onset(&self) -> Option<DateTime<Utc>> {
        self.first_info().and_then(|i| i.onset)
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.first_info().and_then(|i| i.expires)
    }

    /// Every area description of the first info block
    pub fn area_description(&self) -> String {
        self.first_info()
            .map(|i| {
                i.area
                    .iter()
                    .map(|a| a.area_desc.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    }

    /// Every geocode value targeted by any area of any info block.
    pub fn geocodes(&self) -> impl Iterator<Item = &str> {
        self.info
            .iter()
            .flat_map(|i| i.area.iter())
            .flat_map(|a| a.geocode.iter())
            .map(|g| g.value.as_str())
    }

    /// Whether a later publication of the same warning needs to be passed on.
    /// Expiry is checked on every info block since it is not fingerprinted.
    pub fn differs_from(&self, other: &WarningEntry) -> bool {
        self.fingerprint != other.fingerprint
            || self.info.len() != other.info.len()
            || self
                .info
                .iter()
                .zip(&other.info)
                .any(|(a, b)| a.expires != b.expires)
    }
}

/// Geocodes are a set, every other array keeps its order.
pub fn fingerprint(data: &WarningData) -> Result<String> {
    let mut data = data.clone();
    for area in data.info.iter_mut().flat_map(|i| i.area.iter_mut()) {
        area.geocode.sort_by(|a, b| (&a.value_name, &a.value).cmp(&(&b.value_name, &b.value)));
    }
    let value = serde_json::to_value(&data)?;
    let mut hasher = Sha256::new();
    hash_value(&mut hasher, &value);
    Ok(format!("{:x}", hasher.finalize()))
}

// Object keys are visited in sorted order so the hash never depends on map
// ordering. Every value is tagged to keep e.g. "1" and 1 apart.
fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Value::Number(n) => {
            hasher.update(b"#");
            hasher.update(n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update(b"s");
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(b"[");
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !FINGERPRINT_EXCLUDED.contains(&k.as_str()))
                .collect();
            keys.sort();
            hasher.update(b"{");
            hasher.update((keys.len() as u64).to_le_bytes());
            for key in keys {
                hasher.update(key.as_bytes());
                hasher.update(b":");
                hash_value(hasher, &map[key]);
            }
        }
    }
}
