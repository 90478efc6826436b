//! Current-conditions lookup against an OpenWeatherMap style endpoint.
//!
//! Kept apart from the task engine: nothing here touches task state, and
//! every failure ends up as a `WeatherError` for the caller to show.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::config::WeatherConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    City(String),
    Coordinates { lat: f64, lon: f64 },
}

impl fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeatherQuery::City(city) => write!(f, "{city}"),
            WeatherQuery::Coordinates { lat, lon } => write!(f, "{lat:.4},{lon:.4}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub location: String,
    pub temperature: f64,
    pub condition: String,
    pub description: String,
    pub icon: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeatherError {
    #[error("City '{0}' was not found. Check the spelling and try again.")]
    CityNotFound(String),

    #[error("The weather service rejected the API key. Check your configuration.")]
    InvalidCredentials,

    #[error("No weather API key configured (set weather.api_key or TASKDECK_WEATHER_API_KEY).")]
    MissingApiKey,

    #[error("The weather service is having trouble (HTTP {0}). Please retry in a moment.")]
    Server(u16),

    #[error("The weather request timed out. Please retry.")]
    Timeout,

    #[error("The weather request was cancelled by a newer one.")]
    Cancelled,

    #[error("Could not reach the weather service: {0}")]
    Transport(String),

    #[error("Unexpected response from the weather service: {0}")]
    InvalidResponse(String),

    #[error("Gave up after {0} retries.")]
    RetryLimitReached(u32),

    #[error("There is no previous weather request to retry.")]
    NothingToRetry,
}

impl WeatherError {
    /// Failures worth offering a manual retry for
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WeatherError::Server(_) | WeatherError::Timeout | WeatherError::Transport(_)
        )
    }
}

/// Anything able to answer a weather query
pub trait WeatherSource: Send + Sync + 'static {
    fn current(
        &self,
        query: &WeatherQuery,
    ) -> impl Future<Output = Result<WeatherReport, WeatherError>> + Send;
}

pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    units: String,
}

impl OpenWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, WeatherError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(WeatherError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| WeatherError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key,
            units: config.units.clone(),
        })
    }

    fn request_url(&self, query: &WeatherQuery) -> Result<Url, WeatherError> {
        let mut params: Vec<(&str, String)> = match query {
            WeatherQuery::City(city) => vec![("q", city.trim().to_string())],
            WeatherQuery::Coordinates { lat, lon } => {
                vec![("lat", lat.to_string()), ("lon", lon.to_string())]
            }
        };
        params.push(("appid", self.api_key.clone()));
        params.push(("units", self.units.clone()));

        Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| WeatherError::InvalidResponse(format!("bad base URL: {e}")))
    }
}

impl WeatherSource for OpenWeatherClient {
    async fn current(&self, query: &WeatherQuery) -> Result<WeatherReport, WeatherError> {
        let url = self.request_url(query)?;
        debug!(%query, "requesting current weather");

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                WeatherError::Timeout
            } else {
                WeatherError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                WeatherError::Timeout
            } else {
                WeatherError::Transport(e.to_string())
            }
        })?;

        parse_response(query, status, &body)
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    name: String,
    main: ApiMain,
    #[serde(default)]
    weather: Vec<ApiCondition>,
}

#[derive(Deserialize)]
struct ApiMain {
    temp: f64,
}

#[derive(Deserialize)]
struct ApiCondition {
    main: String,
    #[serde(default)]
    description: String,
    icon: Option<String>,
}

/// Maps an HTTP status and body to a report or a distinct error
pub fn parse_response(
    query: &WeatherQuery,
    status: StatusCode,
    body: &str,
) -> Result<WeatherReport, WeatherError> {
    match status {
        StatusCode::NOT_FOUND => return Err(WeatherError::CityNotFound(query.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(WeatherError::InvalidCredentials);
        }
        s if s.is_server_error() => return Err(WeatherError::Server(s.as_u16())),
        s if !s.is_success() => {
            warn!(status = %s, "unexpected weather status");
            return Err(WeatherError::InvalidResponse(format!("HTTP {s}")));
        }
        _ => {}
    }

    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|e| WeatherError::InvalidResponse(e.to_string()))?;
    let condition = parsed
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| WeatherError::InvalidResponse("missing weather conditions".to_string()))?;

    Ok(WeatherReport {
        location: parsed.name,
        temperature: parsed.main.temp,
        condition: condition.main,
        description: condition.description,
        icon: condition.icon,
    })
}

/// A request started by `WeatherLookup`
pub struct PendingWeather {
    handle: JoinHandle<Result<WeatherReport, WeatherError>>,
}

impl PendingWeather {
    pub async fn outcome(self) -> Result<WeatherReport, WeatherError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(WeatherError::Cancelled),
            Err(e) => Err(WeatherError::Transport(e.to_string())),
        }
    }
}

/// Keeps at most one request in flight and counts manual retries.
///
/// Starting a lookup aborts the previous one. `retry` re-issues the last
/// query until `max_retries` is used up; a fresh `lookup` resets the count.
/// Must be used inside a tokio runtime.
pub struct WeatherLookup<S> {
    source: Arc<S>,
    timeout: Duration,
    max_retries: u32,
    retries: u32,
    last_query: Option<WeatherQuery>,
    in_flight: Option<AbortHandle>,
}

impl<S: WeatherSource> WeatherLookup<S> {
    pub fn new(source: S, timeout: Duration, max_retries: u32) -> Self {
        Self {
            source: Arc::new(source),
            timeout,
            max_retries,
            retries: 0,
            last_query: None,
            in_flight: None,
        }
    }

    pub fn lookup(&mut self, query: WeatherQuery) -> PendingWeather {
        self.retries = 0;
        self.issue(query)
    }

    pub fn retry(&mut self) -> Result<PendingWeather, WeatherError> {
        let query = self.last_query.clone().ok_or(WeatherError::NothingToRetry)?;
        if self.retries >= self.max_retries {
            return Err(WeatherError::RetryLimitReached(self.max_retries));
        }
        self.retries += 1;
        debug!(attempt = self.retries, %query, "retrying weather lookup");
        Ok(self.issue(query))
    }

    pub fn retries_left(&self) -> u32 {
        self.max_retries.saturating_sub(self.retries)
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }

    fn issue(&mut self, query: WeatherQuery) -> PendingWeather {
        self.cancel();
        self.last_query = Some(query.clone());

        let source = Arc::clone(&self.source);
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, source.current(&query)).await {
                Ok(result) => result,
                Err(_) => Err(WeatherError::Timeout),
            }
        });

        self.in_flight = Some(handle.abort_handle());
        PendingWeather { handle }
    }
}
