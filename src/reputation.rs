//! Registration, DNS and search-index lookups.
//!
//! Each lookup owns its fields and its own timeout; a failure in one never
//! changes the defaults of another.

use crate::{
    config::{DnsConfig, SearchConfig, WhoisConfig},
    types::{ReputationInfo, UNDETERMINED},
    whois::{RegistrationDates, WhoisClient, WhoisError},
};
use chrono::{DateTime, Utc};
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    system_conf, TokioAsyncResolver,
};
use tracing::{debug, warn};

pub struct ReputationResolver {
    whois: WhoisClient,
    resolver: TokioAsyncResolver,
    http_client: reqwest::Client,
    dns: DnsConfig,
    search: SearchConfig,
}

impl ReputationResolver {
    pub fn new(
        whois: WhoisConfig,
        dns: DnsConfig,
        search: SearchConfig,
        http_client: reqwest::Client,
    ) -> Result<Self, WhoisError> {
        let (resolver_config, mut opts) = system_conf::read_system_conf().unwrap_or_else(|e| {
            warn!("Failed to read system resolver config, using defaults: {}", e);
            (ResolverConfig::default(), ResolverOpts::default())
        });
        opts.timeout = dns.timeout();
        opts.attempts = 1;

        Ok(Self {
            whois: WhoisClient::new(whois)?,
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
            http_client,
            dns,
            search,
        })
    }

    /// Runs the three lookups concurrently and collects their values.
    pub async fn resolve(&self, url: &str, hostname: &str) -> ReputationInfo {
        let ((domain_registration_length, domain_age), dns_record, google_index) = tokio::join!(
            self.registration(hostname),
            self.dns_record(hostname),
            self.search_index(url),
        );

        ReputationInfo {
            domain_registration_length,
            domain_age,
            dns_record,
            google_index,
            page_rank: UNDETERMINED,
        }
    }

    /// `(registration_length, domain_age)` in days, `-1` when unknown.
    pub async fn registration(&self, hostname: &str) -> (f64, f64) {
        match self.whois.lookup(hostname).await {
            Ok(dates) => registration_features(&dates, Utc::now()),
            Err(e) => {
                warn!("Whois lookup failed for {}: {}", hostname, e);
                metrics::counter!("degraded_steps_total", "step" => "whois").increment(1);
                (UNDETERMINED, UNDETERMINED)
            }
        }
    }

    /// `1` when the host resolves, `0` otherwise. A miss is a definite
    /// negative, never `-1`.
    pub async fn dns_record(&self, hostname: &str) -> f64 {
        if hostname.is_empty() {
            return 0.0;
        }

        let limit = self.dns.timeout();
        match tokio::time::timeout(limit, self.resolver.lookup_ip(hostname)).await {
            Ok(Ok(lookup)) if lookup.iter().next().is_some() => 1.0,
            Ok(Ok(_)) => 0.0,
            Ok(Err(e)) => {
                debug!("DNS lookup failed for {}: {}", hostname, e);
                metrics::counter!("degraded_steps_total", "step" => "dns").increment(1);
                0.0
            }
            Err(_) => {
                debug!("DNS lookup for {} timed out after {:?}", hostname, limit);
                metrics::counter!("degraded_steps_total", "step" => "dns").increment(1);
                0.0
            }
        }
    }

    /// `1` when the search engine knows the site, `0` when it reports no
    /// results, `-1` when the query itself failed.
    pub async fn search_index(&self, url: &str) -> f64 {
        let limit = self.search.timeout();
        let query = format!("site:{}", url);

        let request = self
            .http_client
            .get(&self.search.endpoint)
            .query(&[("q", query.as_str())])
            .timeout(limit)
            .send();

        let text = match tokio::time::timeout(limit, request).await {
            Ok(Ok(response)) => response.text().await,
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("Search index query for {} timed out after {:?}", url, limit);
                metrics::counter!("degraded_steps_total", "step" => "search").increment(1);
                return UNDETERMINED;
            }
        };

        match text {
            Ok(body) => index_presence(&body, &self.search.no_results_marker),
            Err(e) => {
                warn!("Search index query failed for {}: {}", url, e);
                metrics::counter!("degraded_steps_total", "step" => "search").increment(1);
                UNDETERMINED
            }
        }
    }
}

pub fn registration_features(dates: &RegistrationDates, now: DateTime<Utc>) -> (f64, f64) {
    let registration_length = dates
        .expires
        .map(|expires| (expires - dates.created).num_days() as f64)
        .unwrap_or(UNDETERMINED);
    let domain_age = (now - dates.created).num_days() as f64;
    (registration_length, domain_age)
}

pub fn index_presence(body: &str, no_results_marker: &str) -> f64 {
    if body.contains(no_results_marker) {
        0.0
    } else {
        1.0
    }
}
