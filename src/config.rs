//! Run configuration for both harvest modes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{HarvestError, HarvestResult};

/// Partition keys are year ranges like `1990-2000`.
static YEAR_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{4}$").unwrap());

/// Default location of the persisted table.
pub const DEFAULT_TABLE_PATH: &str = "boats.csv";

/// Default rendering-proxy endpoint.
pub const DEFAULT_PROXY_ENDPOINT: &str = "https://api.zenrows.com/v1/";

/// Year ranges covering the whole catalogue, oldest first. Early decades are
/// wide because few boats of that age are listed; recent years are narrow.
const DEFAULT_PARTITIONS: [&str; 17] = [
    "1900-1950",
    "1950-1960",
    "1960-1970",
    "1970-1980",
    "1980-1990",
    "1990-2000",
    "2000-2005",
    "2005-2010",
    "2010-2012",
    "2012-2014",
    "2014-2016",
    "2016-2018",
    "2018-2020",
    "2020-2022",
    "2022-2024",
    "2024-2026",
    "2026-2028",
];

const BACKFILL_URL_TEMPLATE: &str = "https://www.boatshop24.com/bs24/search/boat?page={page}\
    &facets=countrySubdivision,make,condition,makeModel,type,class,country,countryRegion,\
    countryCity,fuelType,hullMaterial,hullShape,minYear,maxYear,minMaxPercentilPrices,\
    enginesConfiguration,enginesDriveType,numberOfEngines,minTotalHorsepowerPercentil,\
    maxTotalHorsepowerPercentil,minLengthPercentil,maxLengthPercentil\
    &fields=id,make,model,year,featureType,specifications.dimensions.lengths.nominal,\
    location.address,aliases,owner.logos,owner.name,owner.rootName,\
    owner.location.address.city,owner.location.address.country,price.hidden,\
    price.type.amount,portalLink,class,media,isOemModel,isCurrentModel,attributes,\
    previousPrice,mediaCount,cpybLogo\
    &useMultiFacetedFacets=true&enableSponsoredSearch=true&locale=en-US&distance=200mi\
    &pageSize={page_size}&sort=modified-desc&year={year_range}&advantageSort=1";

const UPDATE_URL_TEMPLATE: &str = "https://www.boatshop24.com/bs24/search/boat?page={page}\
    &facets=countrySubdivision,make,condition,makeModel,type,class,country,countryRegion,\
    countryCity,fuelType,hullMaterial,hullShape,minYear,maxYear,minMaxPercentilPrices,\
    enginesConfiguration,enginesDriveType,numberOfEngines,minTotalHorsepowerPercentil,\
    maxTotalHorsepowerPercentil,minLengthPercentil,maxLengthPercentil\
    &fields=id,make,model,year,featureType,specifications.dimensions.lengths.nominal,\
    location.address,aliases,owner.logos,owner.name,owner.rootName,\
    owner.location.address.city,owner.location.address.country,price.hidden,\
    price.type.amount,portalLink,class,media,isOemModel,isCurrentModel,attributes,\
    previousPrice,mediaCount,cpybLogo\
    &useMultiFacetedFacets=true&enableSponsoredSearch=true&locale=en-US&distance=200mi\
    &pageSize={page_size}&sort=modified-desc&advantageSort=1";

/// Configuration for the harvest loop.
///
/// Query URLs are built from templates carrying `{page}`, `{page_size}` and
/// (backfill only) `{year_range}` tokens; partition keys are substituted
/// verbatim. Both templates sort by modification time, newest first, which
/// is what makes the daily update's old-id stop heuristic sound.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Location of the persisted CSV table.
    pub table_path: PathBuf,

    /// Records requested per page.
    pub page_size: u32,

    /// Courtesy pause between successful page fetches.
    pub request_delay: Duration,

    /// Wait before refetching a failed page.
    pub retry_backoff: Duration,

    /// Failed page cycles a backfill partition survives before it is
    /// abandoned. The counter spans the whole partition and is not reset
    /// by successful pages.
    pub backfill_retry_budget: u32,

    /// Failed page cycles across a daily-update run before it gives up.
    /// `None` retries forever, which is the documented default behavior.
    pub update_retry_limit: Option<u32>,

    /// Year ranges backfill mode walks, in order.
    pub partitions: Vec<String>,

    /// Query template for backfill mode.
    pub backfill_url_template: String,

    /// Query template for daily-update mode.
    pub update_url_template: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfig {
            table_path: PathBuf::from(DEFAULT_TABLE_PATH),
            page_size: 100,
            request_delay: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(2),
            backfill_retry_budget: 2,
            update_retry_limit: None,
            partitions: DEFAULT_PARTITIONS.iter().map(|s| s.to_string()).collect(),
            backfill_url_template: BACKFILL_URL_TEMPLATE.to_string(),
            update_url_template: UPDATE_URL_TEMPLATE.to_string(),
        }
    }
}

impl HarvestConfig {
    /// Check the configuration before a run starts.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.page_size == 0 {
            return Err(HarvestError::Configuration(
                "page_size must be at least 1".to_string(),
            ));
        }
        for template in [&self.backfill_url_template, &self.update_url_template] {
            if !template.contains("{page}") {
                return Err(HarvestError::Configuration(format!(
                    "url template has no {{page}} token: {template}"
                )));
            }
        }
        if !self.backfill_url_template.contains("{year_range}") {
            return Err(HarvestError::Configuration(
                "backfill url template has no {year_range} token".to_string(),
            ));
        }
        if self.partitions.is_empty() {
            return Err(HarvestError::Configuration(
                "partition list is empty".to_string(),
            ));
        }
        for partition in &self.partitions {
            if !YEAR_RANGE_REGEX.is_match(partition) {
                return Err(HarvestError::Configuration(format!(
                    "partition key '{partition}' is not a year range like 1990-2000"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the backfill query URL for one partition and page.
    pub fn backfill_url(&self, partition: &str, page: u32) -> String {
        self.backfill_url_template
            .replace("{page}", &page.to_string())
            .replace("{page_size}", &self.page_size.to_string())
            .replace("{year_range}", partition)
    }

    /// Resolve the daily-update query URL for one page.
    pub fn update_url(&self, page: u32) -> String {
        self.update_url_template
            .replace("{page}", &page.to_string())
            .replace("{page_size}", &self.page_size.to_string())
    }
}

/// Settings for the rendering proxy the fetches go through.
#[derive(Clone)]
pub struct ProxyConfig {
    /// Proxy endpoint receiving the target URL as a query parameter.
    pub endpoint: String,

    /// Proxy API key. Redacted from debug output and never logged.
    pub api_key: String,
}

impl ProxyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        ProxyConfig {
            endpoint: DEFAULT_PROXY_ENDPOINT.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn validate(&self) -> HarvestResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(HarvestError::Configuration(
                "proxy api key is empty".to_string(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(HarvestError::Configuration(
                "proxy endpoint is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(HarvestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let mut config = HarvestConfig::default();
        config.page_size = 0;

        let err = config.validate().unwrap_err();

        assert!(matches!(err, HarvestError::Configuration(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rejects_malformed_partition_key() {
        let mut config = HarvestConfig::default();
        config.partitions = vec!["all-of-them".to_string()];

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_partition_list() {
        let mut config = HarvestConfig::default();
        config.partitions.clear();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_template_without_page_token() {
        let mut config = HarvestConfig::default();
        config.update_url_template = "https://example.com/search".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_backfill_template_without_year_range_token() {
        let mut config = HarvestConfig::default();
        config.backfill_url_template = config.update_url_template.clone();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backfill_url_substitutes_all_tokens() {
        let mut config = HarvestConfig::default();
        config.page_size = 25;

        let url = config.backfill_url("1990-2000", 3);

        assert!(url.contains("page=3"));
        assert!(url.contains("pageSize=25"));
        assert!(url.contains("year=1990-2000"));
        assert!(!url.contains('{'));
    }

    #[test]
    fn test_update_url_has_no_partition_token() {
        let config = HarvestConfig::default();

        let url = config.update_url(1);

        assert!(url.contains("page=1"));
        assert!(url.contains("sort=modified-desc"));
        assert!(!url.contains("year="));
        assert!(!url.contains('{'));
    }

    #[test]
    fn test_proxy_debug_redacts_api_key() {
        let proxy = ProxyConfig::new("sk-very-secret");

        let rendered = format!("{:?}", proxy);

        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        assert!(ProxyConfig::new("  ").validate().is_err());
    }
}
