//! Network feeds from public statistical agencies.
//!
//! Fetches are blocking, bounded by the configured timeout and never retried.
//! Any failure (transport, HTTP status, parse, too few states) is logged and
//! the caller falls back to the next source.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::cache::FeedCache;
use super::reference::ReferenceTables;
use crate::config::FetchConfig;
use crate::io::frame::{find_column_containing, parse_number, read_csv_bytes, string_column};

/// A feed resolving fewer states than this is treated as failed.
pub const MIN_FEED_STATES: usize = 40;

const SSA_OASDI_URL: &str =
    "https://www.ssa.gov/OACT/ProgData/funds/data/OASDIBenefitPaymentsByState.csv";
const BEA_API_URL: &str = "https://apps.bea.gov/api/data";
const FBI_ESTIMATES_URL: &str = "https://api.usa.gov/crime/fbi/sapi/api/estimates/states";
const NAEP_API_URL: &str = "https://www.nationsreportcard.gov/api/data";

/// Most recent grade-8 NAEP assessment year.
const NAEP_YEAR: u16 = 2022;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// SSA OASDI benefits paid by state, dollars
    SsaOasdi,
    /// BEA SAINC1 line 1 personal income by state, dollars
    BeaPersonalIncome,
    /// FBI CDE violent crime per 100k by state
    FbiViolentCrime,
    /// NAEP grade-8 mathematics mean scale score by state
    NaepMath,
    /// NAEP grade-8 reading mean scale score by state
    NaepReading,
}

impl Feed {
    pub fn name(&self) -> &'static str {
        match self {
            Feed::SsaOasdi => "ssa-oasdi",
            Feed::BeaPersonalIncome => "bea-personal-income",
            Feed::FbiViolentCrime => "fbi-violent-crime",
            Feed::NaepMath => "naep-math",
            Feed::NaepReading => "naep-reading",
        }
    }

    fn cache_key(&self, year: u16) -> String {
        format!("feed:{}:{}", self.name(), year)
    }

    /// Request URL, or `None` when the feed needs a key that is not configured.
    fn url(&self, year: u16, bea_key: Option<&str>, fbi_key: Option<&str>) -> Option<String> {
        match self {
            Feed::SsaOasdi => Some(SSA_OASDI_URL.to_string()),
            Feed::BeaPersonalIncome => bea_key.map(|key| {
                format!(
                    "{}?UserID={}&method=GetData&datasetname=Regional&TableName=SAINC1\
                     &LineCode=1&GeoFIPS=STATE&Year={}&ResultFormat=JSON",
                    BEA_API_URL, key, year
                )
            }),
            Feed::FbiViolentCrime => fbi_key
                .map(|key| format!("{}?year={}&API_KEY={}", FBI_ESTIMATES_URL, year, key)),
            Feed::NaepMath => Some(naep_url("mathematics", "MRPCM")),
            Feed::NaepReading => Some(naep_url("reading", "RRPCM")),
        }
    }

    pub fn parse(&self, body: &str, tables: &ReferenceTables) -> Result<BTreeMap<String, f64>> {
        let parsed = match self {
            Feed::SsaOasdi => parse_ssa_csv(body, tables)?,
            Feed::BeaPersonalIncome => parse_bea_json(body, tables)?,
            Feed::FbiViolentCrime => parse_fbi_json(body, tables)?,
            Feed::NaepMath | Feed::NaepReading => parse_naep_json(body, tables)?,
        };
        anyhow::ensure!(
            parsed.len() >= MIN_FEED_STATES,
            "{} resolved only {} states (need {})",
            self.name(),
            parsed.len(),
            MIN_FEED_STATES
        );
        Ok(parsed)
    }
}

fn naep_url(subject: &str, subscale: &str) -> String {
    format!(
        "{}?type=data&subject={}&grade=8&subscale={}&variable=JURISDICTION\
         &jurisdiction=NT&stattype=MN:MN&Year={}",
        NAEP_API_URL, subject, subscale, NAEP_YEAR
    )
}

/// SSA OASDI benefits CSV. Amounts are millions of dollars.
///
/// The state column is the first whose header mentions "state"; the amount
/// column the first mentioning "total" or "benefit".
pub fn parse_ssa_csv(body: &str, tables: &ReferenceTables) -> Result<BTreeMap<String, f64>> {
    let df = read_csv_bytes(body.as_bytes())?;
    let state_col = find_column_containing(&df, &["state"]).context("SSA feed has no state column")?;
    let amount_col = df
        .get_column_names()
        .into_iter()
        .map(|c| c.to_string())
        .find(|c| {
            let lower = c.to_ascii_lowercase();
            c != &state_col && (lower.contains("total") || lower.contains("benefit"))
        })
        .context("SSA feed has no benefits column")?;

    let states = string_column(&df, &state_col)?;
    let amounts = string_column(&df, &amount_col)?;
    Ok(states
        .into_iter()
        .zip(amounts)
        .filter_map(|(state, amount)| {
            let code = tables.resolve_state(state.as_deref()?)?;
            Some((code.to_string(), parse_number(amount.as_deref()?)? * 1_000_000.0))
        })
        .collect())
}

/// BEA Regional API response (`BEAAPI.Results.Data[]`). Values are thousands
/// of dollars; the national total (GeoFips 00000) is skipped.
pub fn parse_bea_json(body: &str, tables: &ReferenceTables) -> Result<BTreeMap<String, f64>> {
    let json: Value = serde_json::from_str(body).context("BEA response is not JSON")?;
    let rows = json
        .pointer("/BEAAPI/Results/Data")
        .and_then(Value::as_array)
        .context("BEA response has no Results.Data")?;

    Ok(rows
        .iter()
        .filter(|row| row.get("GeoFips").and_then(Value::as_str) != Some("00000"))
        .filter_map(|row| {
            let name = row.get("GeoName")?.as_str()?;
            // GeoName may carry a footnote marker, e.g. "Alaska *"
            let code = tables.resolve_state(name.trim_end_matches(['*', ' ']))?;
            let value = match row.get("DataValue")? {
                Value::String(s) => parse_number(s)?,
                Value::Number(n) => n.as_f64()?,
                _ => return None,
            };
            Some((code.to_string(), value * 1_000.0))
        })
        .collect())
}

/// FBI CDE state estimates. The rate is derived as violent crimes per 100k
/// residents from the reported counts.
pub fn parse_fbi_json(body: &str, tables: &ReferenceTables) -> Result<BTreeMap<String, f64>> {
    let json: Value = serde_json::from_str(body).context("FBI response is not JSON")?;
    let rows = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(Value::as_array)
        .context("FBI response has no results")?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let abbr = row
                .get("state_abbr")
                .or_else(|| row.get("state_abbrev"))?
                .as_str()?;
            let code = tables.resolve_state(abbr)?;
            let population = row.get("population")?.as_f64()?;
            let violent = row.get("violent_crime")?.as_f64()?;
            (population > 0.0).then(|| (code.to_string(), violent / population * 100_000.0))
        })
        .collect())
}

/// Nation's Report Card API response. Rows sit under `result` (or
/// `results`); the jurisdiction may be a state name or postal code and the
/// score a number or numeric string.
pub fn parse_naep_json(body: &str, tables: &ReferenceTables) -> Result<BTreeMap<String, f64>> {
    let json: Value = serde_json::from_str(body).context("NAEP response is not JSON")?;
    let rows = json
        .get("result")
        .or_else(|| json.get("results"))
        .and_then(Value::as_array)
        .context("NAEP response has no result")?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let jurisdiction = row
                .get("jurisdiction")
                .or_else(|| row.get("juris"))?
                .as_str()?;
            let code = tables.resolve_state(jurisdiction)?;
            let score = match row.get("value").or_else(|| row.get("score"))? {
                Value::String(s) => parse_number(s)?,
                Value::Number(n) => n.as_f64()?,
                _ => return None,
            };
            Some((code.to_string(), score))
        })
        .collect())
}

/// Blocking HTTP client with the crate user agent and the configured timeout.
pub fn http_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("public-good-index/", env!("CARGO_PKG_VERSION")))
        .timeout(config.timeout()?)
        .build()
        .context("Failed to build HTTP client")
}

/// Blocking HTTP client for the feeds, with an optional body cache.
pub struct FeedClient {
    http: Client,
    cache: Option<FeedCache>,
    year: u16,
    bea_key: Option<String>,
    fbi_key: Option<String>,
}

impl FeedClient {
    pub fn new(config: &FetchConfig, cache: Option<FeedCache>, year: u16) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            cache,
            year,
            bea_key: config.bea_key(),
            fbi_key: config.fbi_key(),
        })
    }

    /// GET a body as text. Errors never carry the URL, which may hold an
    /// API key.
    fn get(&self, url: &str) -> Result<String> {
        self.http
            .get(url)
            .send()
            .map_err(reqwest::Error::without_url)
            .context("request failed")?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .context("error status")?
            .text()
            .map_err(reqwest::Error::without_url)
            .context("failed to read body")
    }

    /// Load a feed, cache first. `None` on any failure.
    pub fn load(&self, feed: Feed, tables: &ReferenceTables) -> Option<BTreeMap<String, f64>> {
        let key = feed.cache_key(self.year);

        if let Some(body) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            match feed.parse(&body, tables) {
                Ok(parsed) => {
                    debug!(feed = feed.name(), states = parsed.len(), "served from cache");
                    return Some(parsed);
                }
                Err(e) => debug!(feed = feed.name(), error = %e, "cached body unusable, refetching"),
            }
        }

        let Some(url) = feed.url(self.year, self.bea_key.as_deref(), self.fbi_key.as_deref())
        else {
            info!(feed = feed.name(), "no API key configured, skipping feed");
            return None;
        };

        let body = match self.get(&url) {
            Ok(body) => body,
            Err(e) => {
                warn!(feed = feed.name(), error = %format!("{:#}", e), "fetch failed");
                return None;
            }
        };

        match feed.parse(&body, tables) {
            Ok(parsed) => {
                info!(feed = feed.name(), states = parsed.len(), "fetched");
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.put(&key, &body) {
                        warn!(feed = feed.name(), error = %e, "failed to cache feed body");
                    }
                }
                Some(parsed)
            }
            Err(e) => {
                warn!(feed = feed.name(), error = %format!("{:#}", e), "feed unusable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> ReferenceTables {
        ReferenceTables::bundled(2023).unwrap()
    }

    fn ssa_body(tables: &ReferenceTables, count: usize) -> String {
        let mut body = "State,Total Benefits (millions)\nUnited States,\"1,000,000\"\n".to_string();
        for state in tables.states.values().take(count) {
            body.push_str(&format!("{},\"1,200\"\n", state.name));
        }
        body
    }

    #[test]
    fn test_parse_ssa_csv() {
        let tables = tables();
        let parsed = Feed::SsaOasdi.parse(&ssa_body(&tables, 51), &tables).unwrap();
        assert_eq!(parsed.len(), 51);
        assert_eq!(parsed["AL"], 1_200_000_000.0);
    }

    #[test]
    fn test_too_few_states_fails() {
        let tables = tables();
        let body = ssa_body(&tables, 10);
        assert_eq!(parse_ssa_csv(&body, &tables).unwrap().len(), 10);
        assert!(Feed::SsaOasdi.parse(&body, &tables).is_err());
    }

    #[test]
    fn test_parse_bea_json() {
        let body = r#"{"BEAAPI":{"Results":{"Data":[
            {"GeoFips":"00000","GeoName":"United States","DataValue":"23,000,000"},
            {"GeoFips":"01000","GeoName":"Alabama","DataValue":"250,000"},
            {"GeoFips":"02000","GeoName":"Alaska *","DataValue":"(NA)"},
            {"GeoFips":"04000","GeoName":"Arizona","DataValue":400000}
        ]}}}"#;
        let parsed = parse_bea_json(body, &tables()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["AL"], 250_000_000.0);
        assert_eq!(parsed["AZ"], 400_000_000.0);
    }

    #[test]
    fn test_parse_bea_error_body() {
        assert!(parse_bea_json(r#"{"BEAAPI":{"Error":{}}}"#, &tables()).is_err());
        assert!(parse_bea_json("<html>", &tables()).is_err());
    }

    #[test]
    fn test_parse_fbi_json() {
        let body = r#"{"results":[
            {"state_abbr":"CA","population":1000000,"violent_crime":5000},
            {"state_abbrev":"TX","population":2000000,"violent_crime":8000},
            {"state_abbr":"NY","population":0,"violent_crime":10},
            {"state_abbr":"PR","population":10,"violent_crime":1}
        ]}"#;
        let parsed = parse_fbi_json(body, &tables()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!((parsed["CA"] - 500.0).abs() < 1e-9);
        assert!((parsed["TX"] - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_naep_json() {
        let body = r#"{"status":200,"result":[
            {"jurisdiction":"NT","value":273.1},
            {"jurisdiction":"AL","value":264.6},
            {"juris":"Alaska","score":"270.3"},
            {"jurisdiction":"DoDEA","value":292.0},
            {"jurisdiction":"CA","value":null}
        ]}"#;
        let parsed = parse_naep_json(body, &tables()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["AL"], 264.6);
        assert_eq!(parsed["AK"], 270.3);
        assert!(parse_naep_json(r#"{"status":400}"#, &tables()).is_err());
    }

    #[test]
    fn test_naep_feeds_are_keyless() {
        let math = Feed::NaepMath.url(2023, None, None).unwrap();
        assert!(math.contains("subject=mathematics"));
        assert!(math.contains("Year=2022"));
        let reading = Feed::NaepReading.url(2023, None, None).unwrap();
        assert!(reading.contains("subscale=RRPCM"));
        assert_eq!(Feed::NaepReading.cache_key(2023), "feed:naep-reading:2023");
    }

    #[test]
    fn test_naep_feed_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().to_path_buf());
        let tables = tables();
        let rows: Vec<String> = tables
            .states
            .keys()
            .map(|code| format!(r#"{{"jurisdiction":"{}","value":281.5}}"#, code))
            .collect();
        let body = format!(r#"{{"result":[{}]}}"#, rows.join(","));
        cache.put(&Feed::NaepMath.cache_key(2023), &body).unwrap();

        let client = FeedClient::new(&FetchConfig::default(), Some(cache), 2023).unwrap();
        let parsed = client.load(Feed::NaepMath, &tables).unwrap();
        assert_eq!(parsed.len(), tables.states.len());
        assert_eq!(parsed["WY"], 281.5);
    }

    #[test]
    fn test_keyed_feeds_need_keys() {
        assert!(Feed::BeaPersonalIncome.url(2023, None, None).is_none());
        assert!(Feed::FbiViolentCrime.url(2023, Some("x"), None).is_none());
        let url = Feed::FbiViolentCrime.url(2023, None, Some("k")).unwrap();
        assert!(url.ends_with("?year=2023&API_KEY=k"));
        assert!(Feed::SsaOasdi.url(2023, None, None).is_some());
    }

    #[test]
    fn test_cache_key_excludes_api_key() {
        assert_eq!(Feed::BeaPersonalIncome.cache_key(2023), "feed:bea-personal-income:2023");
    }

    #[test]
    fn test_fetch_error_does_not_leak_api_key() {
        let client = FeedClient::new(&FetchConfig::default(), None, 2023).unwrap();
        // Nothing listens on the discard port, so the connection is refused
        let err = client
            .get("http://127.0.0.1:9/api/data?UserID=SECRETKEY123&method=GetData")
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("request failed"), "{}", message);
        assert!(!message.contains("SECRETKEY123"), "{}", message);
    }

    #[test]
    fn test_load_serves_fresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().to_path_buf());
        let tables = tables();
        cache
            .put(&Feed::SsaOasdi.cache_key(2023), &ssa_body(&tables, 51))
            .unwrap();

        let client = FeedClient::new(&FetchConfig::default(), Some(cache), 2023).unwrap();
        let parsed = client.load(Feed::SsaOasdi, &tables).unwrap();
        assert_eq!(parsed.len(), 51);
    }
}
