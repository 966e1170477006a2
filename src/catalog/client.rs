use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// One document from the archive's search endpoint. The library layer
/// only ever keeps `identifier` and `title`; the rest is display data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogDoc {
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub year: Option<serde_json::Value>,
    #[serde(default)]
    pub subject: Option<Subjects>,
}

/// The archive returns `subject` as either a single `;`-separated string
/// or a list of tags, depending on the item.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Subjects {
    One(String),
    Many(Vec<String>),
}

impl Subjects {
    pub fn tags(&self) -> Vec<String> {
        match self {
            Subjects::One(s) => s.split(';').map(|t| t.trim().to_lowercase()).collect(),
            Subjects::Many(list) => list.iter().map(|t| t.trim().to_lowercase()).collect(),
        }
    }
}

/// Tag histogram over a search result page, used by the UI's genre filter.
pub fn count_subjects(docs: &[CatalogDoc]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for doc in docs {
        if let Some(ref subjects) = doc.subject {
            for tag in subjects.tags() {
                if !tag.is_empty() {
                    *counts.entry(tag).or_insert(0) += 1;
                }
            }
        }
    }
    counts
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchDocs,
}

#[derive(Debug, Deserialize)]
struct SearchDocs {
    #[serde(default)]
    docs: Vec<CatalogDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemMetadata {
    #[serde(default)]
    pub metadata: ItemFields,
    #[serde(default)]
    pub files: Vec<ItemFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemFields {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemFile {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Episode {
    pub title: String,
    pub url: String,
    pub number: usize,
}

pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    collection: String,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> CatalogResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        })
    }

    /// Queries the archive's advancedsearch endpoint, most-downloaded
    /// first. Free-text, year and subject clauses are ANDed onto the
    /// collection filter.
    pub async fn search(
        &self,
        query: Option<&str>,
        year: Option<&str>,
        genre: Option<&str>,
    ) -> CatalogResult<Vec<CatalogDoc>> {
        let mut q = format!("collection:{} AND mediatype:movies", self.collection);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            q.push_str(&format!(" AND ({})", query));
        }
        if let Some(year) = year.filter(|y| !y.is_empty()) {
            q.push_str(&format!(" AND year:{}", year));
        }
        if let Some(genre) = genre.filter(|g| !g.is_empty()) {
            q.push_str(&format!(" AND subject:{}", genre));
        }

        let url = format!("{}/advancedsearch.php", self.base_url);
        let response: SearchResponse = self
            .http
            .get(&url)
            .query(&[
                ("q", q.as_str()),
                ("fl[]", "identifier,title,description,subject,year"),
                ("sort[]", "downloads desc"),
                ("rows", "100"),
                ("output", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.response.docs)
    }

    pub async fn metadata(&self, identifier: &str) -> CatalogResult<ItemMetadata> {
        let url = format!(
            "{}/metadata/{}",
            self.base_url,
            urlencoding::encode(identifier)
        );
        let metadata = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(metadata)
    }

    /// Prefers an explicit thumbnail file, falls back to the archive's
    /// generated item image.
    pub fn thumbnail_url(&self, identifier: &str, meta: &ItemMetadata) -> String {
        for file in &meta.files {
            let name = file.name.to_lowercase();
            let format = file
                .format
                .as_deref()
                .unwrap_or_default()
                .to_lowercase();
            if name.contains("thumb")
                || matches!(
                    format.as_str(),
                    "jpeg" | "jpeg thumb" | "jpeg2000" | "jpeg2000 image"
                )
            {
                return self.download_url(identifier, &file.name);
            }
        }
        format!("{}/services/img/{}", self.base_url, identifier)
    }

    /// First streamable file of the item, if any.
    pub fn stream_url(&self, identifier: &str, meta: &ItemMetadata) -> Option<String> {
        meta.files
            .iter()
            .find(|f| f.name.ends_with(".mp4"))
            .map(|f| self.download_url(identifier, &f.name))
    }

    pub fn episodes(&self, identifier: &str, meta: &ItemMetadata) -> Vec<Episode> {
        let mut episodes = Vec::new();
        for file in &meta.files {
            if !file.name.ends_with(".mp4") {
                continue;
            }
            episodes.push(Episode {
                title: file.title.clone().unwrap_or_else(|| file.name.clone()),
                url: self.download_url(identifier, &file.name),
                number: episodes.len() + 1,
            });
        }
        episodes
    }

    fn download_url(&self, identifier: &str, file_name: &str) -> String {
        let encoded: Vec<String> = file_name
            .split('/')
            .map(|s| urlencoding::encode(s).to_string())
            .collect();
        format!(
            "{}/download/{}/{}",
            self.base_url,
            urlencoding::encode(identifier),
            encoded.join("/")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> CatalogClient {
        CatalogClient::new(&CatalogConfig::default()).unwrap()
    }

    fn file(name: &str, title: Option<&str>, format: Option<&str>) -> ItemFile {
        ItemFile {
            name: name.to_string(),
            title: title.map(|t| t.to_string()),
            format: format.map(|f| f.to_string()),
        }
    }

    #[test]
    fn subjects_accept_string_and_list_forms() {
        let one = Subjects::One("Comedy; Animation ;cartoons".to_string());
        assert_eq!(one.tags(), vec!["comedy", "animation", "cartoons"]);

        let many = Subjects::Many(vec!["Comedy".to_string(), "Animation".to_string()]);
        assert_eq!(many.tags(), vec!["comedy", "animation"]);
    }

    #[test]
    fn subject_counts_aggregate_across_docs() {
        let docs = vec![
            CatalogDoc {
                identifier: "a".to_string(),
                title: "A".to_string(),
                description: None,
                year: None,
                subject: Some(Subjects::One("comedy;animation".to_string())),
            },
            CatalogDoc {
                identifier: "b".to_string(),
                title: "B".to_string(),
                description: None,
                year: None,
                subject: Some(Subjects::Many(vec!["Comedy".to_string()])),
            },
        ];

        let counts = count_subjects(&docs);
        assert_eq!(counts.get("comedy"), Some(&2));
        assert_eq!(counts.get("animation"), Some(&1));
    }

    #[test]
    fn stream_url_picks_the_first_mp4() {
        let client = test_client();
        let meta = ItemMetadata {
            metadata: ItemFields::default(),
            files: vec![
                file("cover.jpg", None, Some("JPEG")),
                file("ep 1.mp4", None, None),
                file("ep2.mp4", None, None),
            ],
        };

        let url = client.stream_url("tom-and-jerry", &meta).unwrap();
        assert_eq!(url, "https://archive.org/download/tom-and-jerry/ep%201.mp4");
    }

    #[test]
    fn thumbnail_falls_back_to_the_item_image() {
        let client = test_client();
        let meta = ItemMetadata {
            metadata: ItemFields::default(),
            files: vec![file("ep1.mp4", None, None)],
        };

        assert_eq!(
            client.thumbnail_url("tom-and-jerry", &meta),
            "https://archive.org/services/img/tom-and-jerry"
        );
    }

    #[test]
    fn episodes_are_numbered_in_file_order() {
        let client = test_client();
        let meta = ItemMetadata {
            metadata: ItemFields::default(),
            files: vec![
                file("1x01.mp4", Some("1x01 Pilot"), None),
                file("notes.txt", None, None),
                file("1x02.mp4", None, None),
            ],
        };

        let episodes = client.episodes("show", &meta);
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].title, "1x01 Pilot");
        assert_eq!(episodes[0].number, 1);
        assert_eq!(episodes[1].title, "1x02.mp4");
        assert_eq!(episodes[1].number, 2);
    }
}
