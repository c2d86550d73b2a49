use crate::archive::manifest::{ManifestParser, ManifestToken};
use crate::archive::util::parse_date_at;
use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::blocking::Client;
use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

/// A manifest entry with its category and date decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub category: String,
    pub date: DateTime<Tz>,
    pub token: ManifestToken,
}

/// Historical listings prefix each name with a `YYYY/` directory.
fn name_offsets(old: bool) -> (usize, usize) {
    if old { (5, 8) } else { (0, 3) }
}

pub fn decode_entry(token: ManifestToken, old: bool, tz: Tz) -> Result<RemoteEntry> {
    let (cat_at, date_at) = name_offsets(old);
    let category = token
        .file
        .get(cat_at..cat_at + 3)
        .ok_or_else(|| anyhow!("manifest entry {} is too short", token.file))?
        .to_string();
    let date = parse_date_at(&token.file, date_at, tz)?;
    Ok(RemoteEntry {
        category,
        date,
        token,
    })
}

/// Parse a manifest body, keeping entries dated within `[start, end]`.
pub fn entries_in_range<R: BufRead>(
    body: R,
    old: bool,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    tz: Tz,
) -> Result<Vec<RemoteEntry>> {
    let mut parser = ManifestParser::new(body).context("remote listing header")?;
    let mut out = Vec::new();
    for token in parser.by_ref() {
        let entry = decode_entry(token, old, tz)?;
        if entry.date < *start || entry.date > *end {
            continue;
        }
        out.push(entry);
    }
    parser.finish().context("remote listing body")?;
    Ok(out)
}

pub struct RemoteLister {
    client: Client,
    base_url: String,
}

impl RemoteLister {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn list_url(&self, old: bool) -> String {
        if old {
            format!("{}/list.cgi?old", self.base_url)
        } else {
            format!("{}/list.cgi", self.base_url)
        }
    }

    /// GET the listing once; non-2xx statuses are errors naming the URL.
    pub fn fetch(&self, old: bool) -> Result<BufReader<impl Read>> {
        let url = self.list_url(old);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("GET request for {url} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("GET request for {url} failed: {}", response.status());
        }
        Ok(BufReader::new(response))
    }

    pub fn list(
        &self,
        old: bool,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
        tz: Tz,
    ) -> Result<Vec<RemoteEntry>> {
        let body = self.fetch(old)?;
        entries_in_range(body, old, start, end, tz)
            .with_context(|| format!("failed to read {}", self.list_url(old)))
    }
}
