use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub plant_api_base_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Plant IDs polled every cycle.
    /// Format: comma-separated IDs and inclusive ranges, e.g. `"0-5,8,10-12"`.
    pub plant_ids: Vec<i32>,
    /// Extraction cycle interval in seconds.
    pub poll_interval_secs: u64,
    /// Root directory of the historical archive.
    pub archive_dir: String,
    /// Archive job interval in seconds.
    pub archive_interval_secs: u64,
    /// Readings older than this leave the live store for the archive.
    pub current_window_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            plant_api_base_url: required("PLANT_API_BASE_URL")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            plant_ids: parse_plant_ids(&optional("PLANT_IDS", "0-50"))?,
            poll_interval_secs: optional("POLL_INTERVAL_SECS", "60")
                .parse()
                .context("POLL_INTERVAL_SECS must be a positive integer")?,
            archive_dir: optional("ARCHIVE_DIR", "archive"),
            archive_interval_secs: optional("ARCHIVE_INTERVAL_SECS", "3600")
                .parse()
                .context("ARCHIVE_INTERVAL_SECS must be a positive integer")?,
            current_window_hours: optional("CURRENT_WINDOW_HOURS", "24")
                .parse()
                .context("CURRENT_WINDOW_HOURS must be an integer")?,
        })
    }

    pub fn current_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.current_window_hours)
    }
}

/// Parse `"0-5,8,10-12"` into `[0, 1, 2, 3, 4, 5, 8, 10, 11, 12]`.
///
/// Order of appearance is kept; ranges are inclusive.
fn parse_plant_ids(raw: &str) -> Result<Vec<i32>> {
    let mut ids = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split_once('-') {
            Some((start, end)) => {
                let start: i32 = start
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid range start in PLANT_IDS entry {entry:?}"))?;
                let end: i32 = end
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid range end in PLANT_IDS entry {entry:?}"))?;
                if end < start {
                    bail!("PLANT_IDS range {entry:?} ends before it starts");
                }
                ids.extend(start..=end);
            }
            None => ids.push(
                entry
                    .parse()
                    .with_context(|| format!("invalid plant id in PLANT_IDS: {entry:?}"))?,
            ),
        }
    }

    Ok(ids)
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plant_ids_empty() {
        assert!(parse_plant_ids("").unwrap().is_empty());
    }

    #[test]
    fn parse_plant_ids_default_range() {
        let ids = parse_plant_ids("0-50").unwrap();
        assert_eq!(ids.len(), 51);
        assert_eq!(ids.first(), Some(&0));
        assert_eq!(ids.last(), Some(&50));
    }

    #[test]
    fn parse_plant_ids_mixed() {
        let ids = parse_plant_ids("3, 0-2 ,9").unwrap();
        assert_eq!(ids, vec![3, 0, 1, 2, 9]);
    }

    #[test]
    fn parse_plant_ids_single_element_range() {
        assert_eq!(parse_plant_ids("7-7").unwrap(), vec![7]);
    }

    #[test]
    fn parse_plant_ids_reversed_range_errors() {
        let err = parse_plant_ids("5-1").unwrap_err();
        assert!(err.to_string().contains("ends before it starts"));
    }

    #[test]
    fn parse_plant_ids_garbage_errors() {
        let err = parse_plant_ids("1,two").unwrap_err();
        assert!(err.to_string().contains("invalid plant id"));

        let err = parse_plant_ids("a-3").unwrap_err();
        assert!(err.to_string().contains("range start"));
    }
}
