// statbar-sources/src/weather.rs
use statbar_core::{
    BackgroundJob, Config, Fetch, Reconfigure, Refresh, RefreshPolicy, RetryPolicy, Source,
    SourceContext, SourceError,
};
use std::io;
use std::time::Duration;

pub const WTTR_URL: &str = "https://wttr.in";

/// Responses this long or longer are rejected
pub const MAX_WEATHER_LEN: usize = 47;

/// How long `close` waits for an in-flight request
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] Box<ureq::Error>),
    #[error("failed to read response: {0}")]
    Io(#[from] io::Error),
    #[error("too much data from server, got {0} bytes, maximum is {max}", max = MAX_WEATHER_LEN)]
    TooLong(usize),
}

/// `<base>/<location>?format=1&u`
pub fn weather_url(base: &str, location: &str) -> String {
    format!("{base}/{}?format=1&u", location.trim().replace(' ', "+"))
}

/// First line of a wttr.in one-line report
pub fn parse_report(body: &str) -> Result<String, FetchError> {
    let line = body.lines().next().unwrap_or_default().trim_end();
    if line.len() >= MAX_WEATHER_LEN {
        return Err(FetchError::TooLong(line.len()));
    }
    Ok(line.to_string())
}

/// Blocking wttr.in client
pub struct WttrFetcher {
    agent: ureq::Agent,
    base: String,
}

impl WttrFetcher {
    pub fn new() -> Self {
        Self::with_base(WTTR_URL)
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base: base.into(),
        }
    }
}

impl Default for WttrFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for WttrFetcher {
    type Error = FetchError;

    fn fetch(&self, location: &str) -> Result<String, FetchError> {
        let url = weather_url(&self.base, location);
        tracing::debug!(%url, "requesting weather");
        let body = self
            .agent
            .get(&url)
            .call()
            .map_err(Box::new)?
            .into_string()?;
        parse_report(&body)
    }
}

/// Weather report fetched on a worker thread.
///
/// The location is copied into each request when it starts, so a reload
/// that changes it only affects the next request.
pub struct WeatherSource<F: Fetch = WttrFetcher> {
    job: BackgroundJob<F>,
    location: Option<String>,
    ctx: Option<SourceContext>,
}

impl WeatherSource<WttrFetcher> {
    pub fn new(location: Option<String>) -> Self {
        Self::with_fetcher(WttrFetcher::new(), RetryPolicy::default(), location)
    }
}

impl<F: Fetch> WeatherSource<F> {
    pub fn with_fetcher(fetcher: F, policy: RetryPolicy, location: Option<String>) -> Self {
        Self {
            job: BackgroundJob::new("weather", fetcher, policy),
            location,
            ctx: None,
        }
    }
}

impl<F: Fetch> Source for WeatherSource<F> {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::Background
    }

    fn placeholder(&self) -> String {
        "...".into()
    }

    fn fragment_limit(&self) -> usize {
        MAX_WEATHER_LEN
    }

    fn period(&self, config: &Config) -> Option<Duration> {
        Some(config.intervals.weather)
    }

    fn init(&mut self, ctx: &SourceContext) -> Result<(), SourceError> {
        self.ctx = Some(ctx.clone());
        if self.location.is_none() {
            return Err(SourceError::Unconfigured("weather location"));
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<Refresh, SourceError> {
        let (Some(ctx), Some(location)) = (&self.ctx, &self.location) else {
            return Err(SourceError::Unconfigured("weather location"));
        };
        Ok(self
            .job
            .trigger(ctx.id, location.clone(), &ctx.completions)?)
    }

    fn reconfigure(&mut self, config: &Config) -> Reconfigure {
        if config.weather_location == self.location {
            return Reconfigure::Unchanged;
        }
        self.location = config.weather_location.clone();
        match &self.location {
            Some(location) => {
                tracing::info!(location, "weather location changed");
                Reconfigure::Enable
            }
            None => Reconfigure::Disable,
        }
    }

    fn close(&mut self) {
        self.job.shutdown(SHUTDOWN_GRACE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statbar_core::background::completion_channel;
    use statbar_core::{Completion, SourceId};
    use std::sync::{Arc, Mutex};

    struct Canned {
        reply: Result<String, String>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Fetch for Canned {
        type Error = String;

        fn fetch(&self, location: &str) -> Result<String, String> {
            self.seen.lock().unwrap().push(location.to_string());
            self.reply.clone()
        }
    }

    fn source(
        reply: Result<String, String>,
        location: Option<&str>,
    ) -> (WeatherSource<Canned>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Canned {
            reply,
            seen: Arc::clone(&seen),
        };
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        };
        (
            WeatherSource::with_fetcher(fetcher, policy, location.map(String::from)),
            seen,
        )
    }

    #[test]
    fn test_url_format() {
        assert_eq!(
            weather_url(WTTR_URL, "Oslo"),
            "https://wttr.in/Oslo?format=1&u"
        );
        assert_eq!(
            weather_url("http://localhost:8080", " New York "),
            "http://localhost:8080/New+York?format=1&u"
        );
    }

    #[test]
    fn test_report_takes_first_line() {
        assert_eq!(parse_report("☀️   +68°F\n").unwrap(), "☀️   +68°F");
        assert_eq!(parse_report("a\nb\n").unwrap(), "a");
        assert_eq!(parse_report("").unwrap(), "");
    }

    #[test]
    fn test_report_length_limit() {
        let just_fits = "x".repeat(MAX_WEATHER_LEN - 1);
        assert_eq!(parse_report(&just_fits).unwrap(), just_fits);

        let too_long = "x".repeat(MAX_WEATHER_LEN);
        assert!(matches!(
            parse_report(&too_long),
            Err(FetchError::TooLong(47))
        ));
    }

    #[test]
    fn test_unconfigured_location_is_idle() {
        let (mut weather, _) = source(Ok("sunny".into()), None);
        let (completions, _rx) = completion_channel();
        let ctx = SourceContext {
            id: SourceId(1),
            completions,
        };
        assert!(matches!(
            weather.init(&ctx),
            Err(SourceError::Unconfigured(_))
        ));
        assert!(weather.refresh().is_err());
    }

    #[test]
    fn test_refresh_delivers_completion() {
        let (mut weather, seen) = source(Ok("⛅️  +54°F".into()), Some("Bergen"));
        let (completions, rx) = completion_channel();
        let ctx = SourceContext {
            id: SourceId(1),
            completions,
        };
        weather.init(&ctx).unwrap();

        assert_eq!(weather.refresh().unwrap(), Refresh::Pending);
        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            completion,
            Completion {
                source: SourceId(1),
                text: "⛅️  +54°F".into(),
            }
        );
        assert_eq!(seen.lock().unwrap().as_slice(), ["Bergen"]);

        weather.close();
    }

    #[test]
    fn test_failed_fetch_sends_nothing() {
        let (mut weather, seen) = source(Err("timeout".into()), Some("Bergen"));
        let (completions, rx) = completion_channel();
        weather
            .init(&SourceContext {
                id: SourceId(1),
                completions,
            })
            .unwrap();

        weather.refresh().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().len() < 3 {
            assert!(std::time::Instant::now() < deadline, "retries never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
        weather.close();

        assert_eq!(seen.lock().unwrap().len(), 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reconfigure_follows_location() {
        let (mut weather, _) = source(Ok("x".into()), None);
        let mut config = Config::default();
        assert_eq!(weather.reconfigure(&config), Reconfigure::Unchanged);

        config.weather_location = Some("Tromsø".into());
        assert_eq!(weather.reconfigure(&config), Reconfigure::Enable);
        assert_eq!(weather.reconfigure(&config), Reconfigure::Unchanged);

        config.weather_location = None;
        assert_eq!(weather.reconfigure(&config), Reconfigure::Disable);
    }
}
