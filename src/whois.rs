//! Minimal port-43 whois client.
//!
//! Known TLDs go straight to their registry server; anything else asks IANA
//! for a `refer:` line first.

use crate::config::WhoisConfig;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use publicsuffix::{List, Psl};
use std::{net::IpAddr, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, info};

const BUNDLED_SUFFIX_LIST: &str = include_str!("../data/public_suffix_list.dat");

#[derive(Debug, Error)]
pub enum WhoisError {
    #[error("whois I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("whois lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("no whois server for {0}")]
    NoServer(String),
    #[error("whois record for {0} has no creation date")]
    MissingDates(String),
    #[error("invalid public suffix list: {0}")]
    SuffixList(String),
}

/// Dates pulled from a registration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationDates {
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

const CREATION_KEYS: [&str; 7] = [
    "creation date",
    "created",
    "created on",
    "registered on",
    "registration time",
    "registered",
    "domain registration date",
];

const EXPIRATION_KEYS: [&str; 8] = [
    "registry expiry date",
    "registrar registration expiration date",
    "expiration date",
    "expiry date",
    "expires",
    "expires on",
    "paid-till",
    "domain expiration date",
];

pub struct WhoisClient {
    config: WhoisConfig,
    suffixes: List,
}

impl WhoisClient {
    pub fn new(config: WhoisConfig) -> Result<Self, WhoisError> {
        let suffixes = load_suffix_list(config.suffix_list_path.as_deref())?;
        Ok(Self { config, suffixes })
    }

    /// Looks up the registration dates for the registrable domain of
    /// `hostname`. The whole exchange, referral included, shares one timeout.
    pub async fn lookup(&self, hostname: &str) -> Result<RegistrationDates, WhoisError> {
        if is_ip_literal(hostname) {
            return Err(WhoisError::NoServer(hostname.to_string()));
        }

        let limit = self.config.timeout();
        timeout(limit, self.lookup_registration(hostname))
            .await
            .map_err(|_| WhoisError::Timeout(limit))?
    }

    async fn lookup_registration(&self, hostname: &str) -> Result<RegistrationDates, WhoisError> {
        let domain = registrable_domain(&self.suffixes, hostname)
            .ok_or_else(|| WhoisError::NoServer(hostname.to_string()))?;
        let tld = domain.rsplit('.').next().unwrap_or_default();

        let server = match registry_server(tld) {
            Some(server) => server.to_string(),
            None => self.refer(tld).await?,
        };

        let record = self.query(&server, &domain).await?;
        debug!("whois {} via {}: {} bytes", domain, server, record.len());

        parse_record(&record).ok_or(WhoisError::MissingDates(domain))
    }

    async fn refer(&self, tld: &str) -> Result<String, WhoisError> {
        let response = self.query(&self.config.iana_server, tld).await?;
        response
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                (key.trim().eq_ignore_ascii_case("refer") && !value.trim().is_empty())
                    .then(|| format!("{}:43", value.trim()))
            })
            .ok_or_else(|| WhoisError::NoServer(tld.to_string()))
    }

    async fn query(&self, server: &str, query: &str) -> Result<String, WhoisError> {
        let mut stream = TcpStream::connect(server).await?;
        stream.write_all(format!("{}\r\n", query).as_bytes()).await?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

/// Reads the list at `path`, or the bundled excerpt when unset.
pub fn load_suffix_list(path: Option<&str>) -> Result<List, WhoisError> {
    let parsed = match path {
        Some(path) => {
            let list = std::fs::read_to_string(path)?.parse::<List>();
            info!("Loaded public suffix list from {}", path);
            list
        }
        None => BUNDLED_SUFFIX_LIST.parse::<List>(),
    };
    parsed.map_err(|e| WhoisError::SuffixList(e.to_string()))
}

fn is_ip_literal(hostname: &str) -> bool {
    hostname
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

/// Public suffix plus one label (`www.bbc.co.uk` gives `bbc.co.uk`). `None`
/// for bare suffixes, IP literals and empty hosts.
pub fn registrable_domain(suffixes: &List, hostname: &str) -> Option<String> {
    let host = hostname.trim_end_matches('.').to_lowercase();
    if host.is_empty() || is_ip_literal(&host) {
        return None;
    }
    let domain = suffixes.domain(host.as_bytes())?;
    std::str::from_utf8(domain.as_bytes()).ok().map(str::to_string)
}

fn registry_server(tld: &str) -> Option<&'static str> {
    let server = match tld {
        "com" | "net" => "whois.verisign-grs.com:43",
        "org" => "whois.pir.org:43",
        "info" => "whois.afilias.net:43",
        "biz" => "whois.nic.biz:43",
        "us" => "whois.nic.us:43",
        "co" => "whois.nic.co:43",
        "io" => "whois.nic.io:43",
        "me" => "whois.nic.me:43",
        "uk" => "whois.nic.uk:43",
        "ca" => "whois.cira.ca:43",
        "de" => "whois.denic.de:43",
        "fr" => "whois.nic.fr:43",
        "ru" => "whois.tcinet.ru:43",
        "jp" => "whois.jprs.jp:43",
        "au" => "whois.auda.org.au:43",
        "br" => "whois.registro.br:43",
        "app" | "dev" => "whois.nic.google:43",
        _ => return None,
    };
    Some(server)
}

/// First creation and first expiration date found in a raw record.
pub fn parse_record(record: &str) -> Option<RegistrationDates> {
    let created = first_date(record, &CREATION_KEYS)?;
    let expires = first_date(record, &EXPIRATION_KEYS);
    Some(RegistrationDates { created, expires })
}

fn first_date(record: &str, keys: &[&str]) -> Option<DateTime<Utc>> {
    record.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_lowercase();
        if keys.contains(&key.as_str()) {
            parse_date(value.trim())
        } else {
            None
        }
    })
}

pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y.%m.%d %H:%M:%S"];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    // Some registries append a zone name or extra text after the date.
    let date_part = value.split_whitespace().next().unwrap_or(value);
    const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d-%b-%Y", "%Y.%m.%d", "%d.%m.%Y", "%Y/%m/%d"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt));
        }
    }

    None
}
