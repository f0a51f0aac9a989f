//! Built-in site categories and target resolution.
//!
//! A target is a category name, a URL, or a file with one URL per line.

use anyhow::{bail, Context, Result};
use std::path::Path;
use url::Url;

/// A named list of sites known for notable motion design.
#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub name: &'static str,
    pub description: &'static str,
    pub sites: &'static [&'static str],
}

pub const CATEGORIES: &[Category] = &[
    Category {
        name: "awwwards",
        description: "Awwwards site-of-the-day winners",
        sites: &[
            "https://resn.co.nz",
            "https://activetheory.net",
            "https://www.aristidebenoist.com/",
            "https://2022.crafted.fr",
            "https://www.kikk.be",
            "https://www.impossible.com",
            "https://www.adyen.com/careers",
        ],
    },
    Category {
        name: "cssda",
        description: "CSS Design Awards picks",
        sites: &["https://www.awwwards.com", "https://www.apple.com/airpods-pro/"],
    },
    Category {
        name: "fwa",
        description: "FWA showcase",
        sites: &["https://www.google.com/search"],
    },
    Category {
        name: "agencies",
        description: "Interactive studios and agencies",
        sites: &[
            "https://resn.co.nz",
            "https://activetheory.net",
            "https://locomotive.ca",
            "https://www.epic.net",
            "https://www.metalab.com",
            "https://14islands.com",
            "https://www.ultranoir.com",
        ],
    },
    Category {
        name: "japanese",
        description: "Japanese corporate sites",
        sites: &["https://www.recruit.co.jp/"],
    },
    Category {
        name: "ecommerce",
        description: "Product and retail sites",
        sites: &[
            "https://www.apple.com/",
            "https://www.tesla.com/",
            "https://www.dyson.com/",
        ],
    },
    Category {
        name: "portfolios",
        description: "Personal developer portfolios",
        sites: &["https://www.aristidebenoist.com/"],
    },
];

/// Categories merged into `all`, in order.
const ALL_MEMBERS: &[&str] = &["awwwards", "agencies", "ecommerce", "portfolios"];

pub fn category(name: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// URLs of a category; `all` is the de-duplicated union of [`ALL_MEMBERS`].
pub fn category_urls(name: &str) -> Option<Vec<String>> {
    if name.eq_ignore_ascii_case("all") {
        let mut urls: Vec<String> = Vec::new();
        for member in ALL_MEMBERS.iter().filter_map(|m| category(m)) {
            for site in member.sites {
                push_unique(&mut urls, site);
            }
        }
        return Some(urls);
    }
    category(name).map(|c| c.sites.iter().map(|s| s.to_string()).collect())
}

/// Parse one URL, adding `https://` when no scheme is given.
pub fn normalize_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let parsed = Url::parse(&candidate).with_context(|| format!("invalid URL: {raw}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => bail!("unsupported scheme '{other}' in {raw}"),
    }
}

/// Comparison key for a URL; `https://a.test` and `https://a.test/` share one.
fn site_key(url: &str) -> String {
    normalize_url(url).unwrap_or_else(|_| url.trim().to_string())
}

/// Append `url` unless an equivalent URL is already present.
pub fn push_unique(urls: &mut Vec<String>, url: &str) -> bool {
    let key = site_key(url);
    if urls.iter().any(|u| site_key(u) == key) {
        return false;
    }
    urls.push(url.to_string());
    true
}

/// Parse a target file: one URL per line, `#` starts a comment.
pub fn parse_target_file(content: &str) -> Result<Vec<String>> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(normalize_url)
        .collect()
}

/// Resolved input for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    /// Used to name the report files.
    pub name: String,
    pub urls: Vec<String>,
}

/// Resolve a category name, a file path or a URL.
pub fn resolve_target(target: &str) -> Result<Targets> {
    if let Some(urls) = category_urls(target) {
        return Ok(Targets {
            name: target.to_ascii_lowercase(),
            urls,
        });
    }

    let path = Path::new(target);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let urls = parse_target_file(&content)?;
        if urls.is_empty() {
            bail!("{} contains no URLs", path.display());
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_string());
        return Ok(Targets { name, urls });
    }

    if !target.contains('.') && !target.contains("://") {
        bail!("unknown category '{target}' (run `motion-probe categories` to list them)");
    }
    let url = normalize_url(target)?;
    let name = Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.replace('.', "-")))
        .unwrap_or_else(|| "site".to_string());
    Ok(Targets {
        name,
        urls: vec![url],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_deduplicated_in_order() {
        let all = category_urls("all").unwrap();
        assert_eq!(all[0], "https://resn.co.nz");
        assert_eq!(all.iter().filter(|u| *u == "https://resn.co.nz").count(), 1);
        assert!(all.contains(&"https://www.tesla.com/".to_string()));
        assert!(!all.contains(&"https://www.recruit.co.jp/".to_string()));
        // awwwards (7) + agencies (5 new) + ecommerce (3); portfolios repeats awwwards
        assert_eq!(all.len(), 15);
        assert_eq!(all.iter().filter(|u| u.contains("aristidebenoist")).count(), 1);
    }

    #[test]
    fn test_push_unique_ignores_trailing_slash() {
        let mut urls = vec!["https://www.kikk.be".to_string()];
        assert!(!push_unique(&mut urls, "https://www.kikk.be/"));
        assert!(!push_unique(&mut urls, "www.kikk.be"));
        assert!(push_unique(&mut urls, "https://www.kikk.be/festival"));
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_category_lookup_is_case_insensitive() {
        assert_eq!(category_urls("ECommerce").unwrap().len(), 3);
        assert!(category_urls("nope").is_none());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com/");
        assert_eq!(
            normalize_url(" http://example.com/a?b=1 ").unwrap(),
            "http://example.com/a?b=1"
        );
        assert!(normalize_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_parse_target_file_skips_comments() {
        let urls =
            parse_target_file("# studios\nresn.co.nz\n\nhttps://locomotive.ca # agency\n").unwrap();
        assert_eq!(urls, vec!["https://resn.co.nz/", "https://locomotive.ca/"]);
    }

    #[test]
    fn test_resolve_target_kinds() {
        let targets = resolve_target("agencies").unwrap();
        assert_eq!(targets.name, "agencies");
        assert_eq!(targets.urls.len(), 7);

        let single = resolve_target("www.example.com").unwrap();
        assert_eq!(single.name, "www-example-com");
        assert_eq!(single.urls, vec!["https://www.example.com/"]);

        assert!(resolve_target("unknowncategory").is_err());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("studios.txt");
        std::fs::write(&file, "resn.co.nz\n").unwrap();
        let from_file = resolve_target(file.to_str().unwrap()).unwrap();
        assert_eq!(from_file.name, "studios");
    }
}
