use percent_encoding::percent_decode_str;
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use crate::{
    error::FetchError, hash::HashDigest, retry_policies::FixedIntervalRetry, source::HttpOptions,
};

/// Where the list of files to fetch comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLocation {
    Path(PathBuf),
    Url(Url),
}

impl ManifestLocation {
    /// A parseable URL is remote, anything else must be an existing file.
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Url(url)),
            _ => {
                let path = PathBuf::from(input);
                if path.try_exists()? {
                    Ok(Self::Path(path))
                } else {
                    Err(FetchError::ManifestError {
                        message: format!(
                            "`{input}` is not a valid http(s) URL or an existing file. Check file permissions if file exists."
                        ),
                    })
                }
            }
        }
    }
}

/// One file named by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Group the file belongs to. URL lists have none.
    pub group: Option<String>,
    pub url: Url,
    /// Name as given by the manifest, not yet sanitized.
    pub filename: String,
    pub checksum: Option<HashDigest>,
}

#[derive(Deserialize)]
struct GroupedManifest {
    #[serde(alias = "sequences")]
    groups: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct FileEntry {
    download_url: Option<String>,
    filename: Option<String>,
    sha1sum: Option<String>,
    sha256: Option<String>,
}

/// Parses either a grouped JSON manifest or a plain URL list.
///
/// For JSON, only groups in `required_groups` are kept; an empty set keeps them all.
pub fn parse_manifest(
    text: &str,
    required_groups: &BTreeSet<String>,
) -> Result<Vec<ManifestEntry>, FetchError> {
    if text.trim_start().starts_with('{') {
        parse_grouped_json(text, required_groups)
    } else {
        if !required_groups.is_empty() {
            tracing::warn!("URL lists carry no groups, ignoring the required group filter");
        }
        Ok(parse_url_list(text))
    }
}

fn parse_grouped_json(
    text: &str,
    required_groups: &BTreeSet<String>,
) -> Result<Vec<ManifestEntry>, FetchError> {
    let manifest: GroupedManifest = serde_json::from_str(text)?;

    for missing in required_groups
        .iter()
        .filter(|g| !manifest.groups.contains_key(*g))
    {
        tracing::warn!("Required group `{}` is not in the manifest", missing);
    }

    let mut entries = Vec::new();
    for (group, files) in manifest.groups {
        if !required_groups.is_empty() && !required_groups.contains(&group) {
            continue;
        }
        let Value::Object(files) = files else {
            tracing::warn!("Group `{}` is not an object, skipping", group);
            continue;
        };
        for (key, file) in files {
            let Ok(file) = serde_json::from_value::<FileEntry>(file) else {
                tracing::debug!("Skipping non-file entry `{}` in `{}`", key, group);
                continue;
            };
            let (Some(download_url), Some(filename)) = (file.download_url, file.filename) else {
                continue;
            };
            let url = match Url::parse(&download_url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping invalid URL for `{}`: {}", filename, e);
                    continue;
                }
            };
            let checksum = file
                .sha256
                .as_deref()
                .map(HashDigest::sha256)
                .or_else(|| file.sha1sum.as_deref().map(HashDigest::sha1));
            entries.push(ManifestEntry {
                group: Some(group.clone()),
                url,
                filename,
                checksum,
            });
        }
    }
    Ok(entries)
}

/// One `URL [filename]` per line. Blank lines and lines starting with `#` or `//` are ignored.
fn parse_url_list(text: &str) -> Vec<ManifestEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let Some(raw_url) = fields.next() else {
            continue;
        };
        let url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Skipping invalid URL '{}': {}", raw_url, e);
                continue;
            }
        };
        let filename = fields
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| filename_from_url(&url));
        entries.push(ManifestEntry {
            group: None,
            url,
            filename,
            checksum: None,
        });
    }
    entries
}

/// Last path segment of `url`, percent-decoded, or "download".
pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string())
}

fn get_client(
    http: &HttpOptions,
    retry_policy: FixedIntervalRetry,
) -> Result<ClientWithMiddleware, FetchError> {
    Ok(ClientBuilder::new(http.client_builder().build()?)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Reads the manifest text from disk or over HTTP.
pub async fn load_manifest(
    location: &ManifestLocation,
    http: &HttpOptions,
    retry_policy: FixedIntervalRetry,
) -> Result<String, FetchError> {
    match location {
        ManifestLocation::Path(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            FetchError::io_with_context(e, format!("reading manifest {}", path.display()))
        }),
        ManifestLocation::Url(url) => {
            let client = get_client(http, retry_policy)?;
            let resp = client.get(url.clone()).send().await?;
            let resp = resp.error_for_status()?;
            Ok(resp.text().await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::HttpOptionsBuilder;
    use mockito::Server;
    use std::time::Duration;
    use tempfile::tempdir;

    const GROUPED: &str = r#"{
        "sequences": {
            "Apartment_seq136": {
                "main_vrs": {
                    "download_url": "https://cdn.example.com/136/main.vrs",
                    "filename": "Apartment_seq136_main.vrs",
                    "sha1sum": "AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D"
                },
                "depth": {
                    "download_url": "https://cdn.example.com/136/depth.zip",
                    "filename": "Apartment_seq136_depth.zip"
                },
                "broken": { "filename": "no_url.bin" }
            },
            "Apartment_seq137": {
                "main_vrs": {
                    "download_url": "https://cdn.example.com/137/main.vrs",
                    "filename": "Apartment_seq137_main.vrs"
                }
            },
            "Apartment_seq999": "not a group"
        }
    }"#;

    fn groups(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grouped_manifest_keeps_required_groups_only() {
        let entries = parse_manifest(GROUPED, &groups(&["Apartment_seq136"])).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["Apartment_seq136_depth.zip", "Apartment_seq136_main.vrs"]
        );
        assert!(
            entries
                .iter()
                .all(|e| e.group.as_deref() == Some("Apartment_seq136"))
        );
        let main = entries
            .iter()
            .find(|e| e.filename == "Apartment_seq136_main.vrs")
            .unwrap();
        assert_eq!(
            main.checksum,
            Some(HashDigest::sha1("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"))
        );
    }

    #[test]
    fn test_grouped_manifest_without_filter_takes_everything() {
        let entries = parse_manifest(GROUPED, &BTreeSet::new()).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_groups_key_is_accepted() {
        let text = r#"{"groups": {"g": {"a": {"download_url": "http://x.test/a", "filename": "a"}}}}"#;
        let entries = parse_manifest(text, &groups(&["g", "missing"])).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url.as_str(), "http://x.test/a");
    }

    #[test]
    fn test_malformed_json_is_a_manifest_error() {
        let result = parse_manifest("{ not json", &BTreeSet::new());
        assert!(matches!(result, Err(FetchError::ManifestError { .. })));
    }

    #[test]
    fn test_url_list() {
        let text = "\
# comment
// another comment

https://cdn.example.com/objects/abc?Expires=1 scans.tar.part-00.zip
https://cdn.example.com/files/my%20file.bin
not a url
https://cdn.example.com/
";
        let entries = parse_manifest(text, &BTreeSet::new()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["scans.tar.part-00.zip", "my file.bin", "download"]);
        assert!(entries.iter().all(|e| e.group.is_none()));
    }

    #[test]
    fn test_location_parse() {
        assert!(matches!(
            ManifestLocation::parse("https://example.com/list.json"),
            Ok(ManifestLocation::Url(_))
        ));
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "").unwrap();
        assert_eq!(
            ManifestLocation::parse(path.to_str().unwrap()).unwrap(),
            ManifestLocation::Path(path)
        );
        assert!(ManifestLocation::parse("/definitely/not/here.json").is_err());
    }

    #[tokio::test]
    async fn test_load_remote_manifest() -> Result<(), Box<dyn std::error::Error>> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/urls.json")
            .with_status(200)
            .with_body(GROUPED)
            .create_async()
            .await;

        let location = ManifestLocation::Url(Url::parse(&format!("{}/urls.json", server.url()))?);
        let http = HttpOptionsBuilder::default().build()?;
        let text = load_manifest(
            &location,
            &http,
            FixedIntervalRetry::for_attempts(1, Duration::from_millis(1)),
        )
        .await?;

        assert_eq!(text, GROUPED);
        mock.assert_async().await;
        Ok(())
    }
}
