use serde::{Deserialize, Deserializer, Serialize};

/// Per-call cache directive for the remote data store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CachePolicy {
    /// Serve from the local cache when present, else fetch.
    CacheFirst,
    /// Always hit the network; the cache is not consulted.
    NetworkOnly,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::CacheFirst => "cache_first",
            CachePolicy::NetworkOnly => "network_only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterStatus {
    Alive,
    Dead,
    Unknown,
    Other(String),
}

impl CharacterStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Alive" => CharacterStatus::Alive,
            "Dead" => CharacterStatus::Dead,
            "unknown" => CharacterStatus::Unknown,
            other => CharacterStatus::Other(other.to_string()),
        }
    }

    /// Short label for one-line listings.
    pub fn marker(&self) -> &str {
        match self {
            CharacterStatus::Alive => "alive",
            CharacterStatus::Dead => "dead",
            CharacterStatus::Unknown => "?",
            CharacterStatus::Other(raw) => raw,
        }
    }
}

/// Named place reference; the catalog only selects the name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Episode {
    pub id: Option<String>,
    pub name: Option<String>,
    pub air_date: Option<String>,
    /// Season/episode code such as `S01E01`.
    #[serde(rename = "episode")]
    pub code: Option<String>,
}

/// Character record as returned by the catalog. Every field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Character {
    pub id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub species: Option<String>,
    #[serde(rename = "type")]
    pub subtype: Option<String>,
    pub gender: Option<String>,
    pub image: Option<String>,
    pub origin: Option<LocationRef>,
    pub location: Option<LocationRef>,
    #[serde(
        rename = "episode",
        default,
        deserialize_with = "non_null_entries"
    )]
    pub episodes: Vec<Episode>,
}

impl Character {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn status_kind(&self) -> Option<CharacterStatus> {
        self.status.as_deref().map(CharacterStatus::parse)
    }

    pub fn origin_name(&self) -> Option<&str> {
        self.origin.as_ref().and_then(|o| o.name.as_deref())
    }

    pub fn location_name(&self) -> Option<&str> {
        self.location.as_ref().and_then(|l| l.name.as_deref())
    }

    /// Episode names in appearance order, skipping unnamed entries.
    pub fn episode_names(&self) -> Vec<String> {
        self.episodes
            .iter()
            .filter_map(|e| e.name.clone())
            .collect()
    }
}

/// One page of list results plus the cursor for the page after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharactersPage {
    pub results: Vec<Character>,
    pub next_page: Option<i64>,
    pub has_next_page: bool,
}

impl CharactersPage {
    pub fn new(results: Vec<Character>, next_page: Option<i64>) -> Self {
        Self {
            results,
            next_page,
            has_next_page: next_page.is_some(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }
}

fn non_null_entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default().into_iter().flatten().collect())
}
