//! User location resolution for emergency requests.
//!
//! [`LocationResolver`] checks the saved default location first and only
//! falls back to a live [`GeolocationProvider`] when none is stored. Live
//! lookups are one-shot: one provider call per resolution, no watching.
//!
//! The default live provider geolocates by IP address over HTTP.

use crate::config::LocationConfig;
use crate::geo::Coordinates;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why a live position could not be obtained. The message is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Geolocation is not supported on this device.")]
    Unsupported,

    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("Timed out waiting for a location: {0}")]
    Timeout(String),

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),
}

/// Where a session's location came from, or why there is none.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationSource {
    PersistedDefault(Coordinates),
    LiveDevice(Coordinates),
    Unavailable(LocationError),
}

impl LocationSource {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            LocationSource::PersistedDefault(c) | LocationSource::LiveDevice(c) => Some(*c),
            LocationSource::Unavailable(_) => None,
        }
    }
}

/// Read side of the persisted default location.
///
/// Implementations return `None` for anything they cannot parse.
pub trait SavedLocationStore: Send + Sync {
    fn saved_location(&self) -> Option<Coordinates>;
}

/// One-shot "get current position".
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Result of starting a resolution.
pub enum Resolution {
    /// A saved location was found; no provider call was made.
    Ready(LocationSource),
    /// Awaiting the live provider. Dropping the future cancels the lookup.
    Pending(BoxFuture<'static, LocationSource>),
}

#[derive(Clone)]
pub struct LocationResolver {
    store: Arc<dyn SavedLocationStore>,
    provider: Arc<dyn GeolocationProvider>,
}

impl LocationResolver {
    pub fn new(store: Arc<dyn SavedLocationStore>, provider: Arc<dyn GeolocationProvider>) -> Self {
        Self { store, provider }
    }

    /// Reads the store once and, only if it holds nothing usable, prepares a
    /// single live lookup.
    pub fn begin(&self) -> Resolution {
        if let Some(coords) = self.store.saved_location() {
            info!("Using saved default location {}", coords);
            return Resolution::Ready(LocationSource::PersistedDefault(coords));
        }

        let provider = Arc::clone(&self.provider);
        Resolution::Pending(
            async move {
                match provider.current_position().await {
                    Ok(coords) => LocationSource::LiveDevice(coords),
                    Err(e) => {
                        warn!("Live location unavailable: {}", e);
                        LocationSource::Unavailable(e)
                    }
                }
            }
            .boxed(),
        )
    }

    pub async fn resolve(&self) -> LocationSource {
        match self.begin() {
            Resolution::Ready(source) => source,
            Resolution::Pending(lookup) => lookup.await,
        }
    }

    pub fn provider(&self) -> Arc<dyn GeolocationProvider> {
        Arc::clone(&self.provider)
    }
}

/// IP geolocation services with a free JSON endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoService {
    IpApi,
    IpWhois,
    IpApiCo,
}

impl GeoService {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ipapi" | "ip-api" => Some(GeoService::IpApi),
            "ipwhois" => Some(GeoService::IpWhois),
            "ipapico" | "ipapi.co" => Some(GeoService::IpApiCo),
            _ => None,
        }
    }

    /// Endpoint for `ip`; an empty `ip` asks about the caller's own address.
    pub fn lookup_url(self, ip: &str) -> String {
        let ip = ip.trim();
        match self {
            GeoService::IpApi => format!("http://ip-api.com/json/{}", ip),
            GeoService::IpWhois => format!("https://ipwho.is/{}", ip),
            GeoService::IpApiCo if ip.is_empty() => "https://ipapi.co/json/".to_string(),
            GeoService::IpApiCo => format!("https://ipapi.co/{}/json/", ip),
        }
    }
}

/// Fetches the raw JSON answer of an IP geolocation service.
///
/// Transport failures come back as `Err(message)`; they must never panic.
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn fetch(&self) -> Result<serde_json::Value, String>;
}

pub struct HttpIpLookup {
    client: Client,
    url: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IpLookup for HttpIpLookup {
    async fn fetch(&self) -> Result<serde_json::Value, String> {
        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| e.to_string())?;
        res.json::<serde_json::Value>()
            .await
            .map_err(|e| e.to_string())
    }
}

/// Approximate position from IP geolocation, bounded by its own timeout.
pub struct IpGeolocationProvider {
    lookup: Box<dyn IpLookup>,
    timeout: Duration,
}

impl IpGeolocationProvider {
    pub fn new(lookup: Box<dyn IpLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }
}

#[async_trait]
impl GeolocationProvider for IpGeolocationProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        let body = match tokio::time::timeout(self.timeout, self.lookup.fetch()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                error!("Error using geolocation service: {}", e);
                return Err(LocationError::PositionUnavailable(e));
            }
            Err(_) => {
                return Err(LocationError::Timeout(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        let coords = position_from_response(&body)?;
        info!("Geolocation successful - {}", coords);
        Ok(coords)
    }
}

// ip-api answers `{status, lat, lon, message}`, ipwho.is `{success, latitude,
// longitude, message}`, ipapi.co `{error, latitude, longitude, reason}`.
fn position_from_response(body: &Value) -> Result<Coordinates, LocationError> {
    let rejected = body.get("status").and_then(Value::as_str) == Some("fail")
        || body.get("success").and_then(Value::as_bool) == Some(false)
        || body.get("error").and_then(Value::as_bool) == Some(true);
    if rejected {
        let reason = ["message", "reason"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .unwrap_or("lookup rejected by service");
        return Err(LocationError::PositionUnavailable(reason.to_string()));
    }

    let degrees = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| body.get(*k))
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
    };
    match (degrees(&["lat", "latitude"]), degrees(&["lon", "lng", "longitude"])) {
        (Some(lat), Some(lon)) if Coordinates::new(lat, lon).is_valid() => {
            Ok(Coordinates::new(lat, lon))
        }
        _ => Err(LocationError::PositionUnavailable(
            "service returned unusable coordinates".to_string(),
        )),
    }
}

/// Stands in for a platform where the user refused location access.
pub struct DeniedProvider;

#[async_trait]
impl GeolocationProvider for DeniedProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::PermissionDenied(
            "live location is disabled in config.toml".to_string(),
        ))
    }
}

/// Stands in for a platform with no geolocation capability.
pub struct UnsupportedProvider;

#[async_trait]
impl GeolocationProvider for UnsupportedProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unsupported)
    }
}

/// Builds the live provider described by the `[location]` config section.
pub fn provider_from_config(config: &LocationConfig) -> Arc<dyn GeolocationProvider> {
    if !config.allow_live {
        return Arc::new(DeniedProvider);
    }
    if config.provider.trim().eq_ignore_ascii_case("none") {
        return Arc::new(UnsupportedProvider);
    }
    let Some(service) = GeoService::from_name(&config.provider) else {
        warn!(
            "Unknown geolocation provider '{}'; live location unsupported",
            config.provider
        );
        return Arc::new(UnsupportedProvider);
    };
    match HttpIpLookup::new(service.lookup_url(&config.lookup_ip)) {
        Ok(lookup) => Arc::new(IpGeolocationProvider::new(
            Box::new(lookup),
            Duration::from_secs(config.timeout_seconds),
        )),
        Err(e) => {
            error!("Could not build HTTP client for geolocation: {}", e);
            Arc::new(UnsupportedProvider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedStore(Option<Coordinates>);

    impl SavedLocationStore for FixedStore {
        fn saved_location(&self) -> Option<Coordinates> {
            self.0
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        result: Result<Coordinates, LocationError>,
    }

    #[async_trait]
    impl GeolocationProvider for CountingProvider {
        async fn current_position(&self) -> Result<Coordinates, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn resolver(
        saved: Option<Coordinates>,
        live: Result<Coordinates, LocationError>,
    ) -> (LocationResolver, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            result: live,
        });
        let resolver = LocationResolver::new(Arc::new(FixedStore(saved)), provider.clone());
        (resolver, provider)
    }

    #[tokio::test]
    async fn saved_location_wins_without_calling_provider() {
        let home = Coordinates::new(6.45, 3.39);
        let (resolver, provider) = resolver(Some(home), Ok(Coordinates::new(0.0, 0.0)));

        assert!(matches!(resolver.begin(), Resolution::Ready(_)));
        assert_eq!(resolver.resolve().await, LocationSource::PersistedDefault(home));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_live_provider_once() {
        let here = Coordinates::new(4.95, 8.32);
        let (resolver, provider) = resolver(None, Ok(here));

        assert_eq!(resolver.resolve().await, LocationSource::LiveDevice(here));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_unavailable_with_message() {
        let denied = LocationError::PermissionDenied("User denied Geolocation".into());
        let (resolver, _) = resolver(None, Err(denied.clone()));

        let source = resolver.resolve().await;
        assert_eq!(source, LocationSource::Unavailable(denied));
        assert_eq!(source.coordinates(), None);
    }

    #[tokio::test]
    async fn pending_lookup_does_not_run_until_polled() {
        let (resolver, provider) = resolver(None, Ok(Coordinates::new(1.0, 1.0)));
        let Resolution::Pending(lookup) = resolver.begin() else {
            panic!("expected a pending lookup");
        };
        drop(lookup);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn config_selects_denied_and_unsupported_providers() {
        let mut config = LocationConfig::default();
        config.allow_live = false;
        let err = provider_from_config(&config).current_position().await.unwrap_err();
        assert!(matches!(err, LocationError::PermissionDenied(_)));

        config.allow_live = true;
        config.provider = "none".to_string();
        let err = provider_from_config(&config).current_position().await.unwrap_err();
        assert_eq!(err, LocationError::Unsupported);
    }

    #[test]
    fn service_names_parse() {
        assert_eq!(GeoService::from_name("IpApi"), Some(GeoService::IpApi));
        assert_eq!(GeoService::from_name("ipapi.co"), Some(GeoService::IpApiCo));
        assert_eq!(GeoService::from_name("carrier-pigeon"), None);
    }

    #[test]
    fn lookup_urls_follow_service() {
        assert_eq!(GeoService::IpApi.lookup_url(""), "http://ip-api.com/json/");
        assert_eq!(GeoService::IpWhois.lookup_url("8.8.8.8"), "https://ipwho.is/8.8.8.8");
        assert_eq!(GeoService::IpApiCo.lookup_url(""), "https://ipapi.co/json/");
        assert_eq!(GeoService::IpApiCo.lookup_url("1.1.1.1"), "https://ipapi.co/1.1.1.1/json/");
    }

    enum CannedLookup {
        Hangs,
        Fails(&'static str),
        Answers(Value),
    }

    #[async_trait]
    impl IpLookup for CannedLookup {
        async fn fetch(&self) -> Result<Value, String> {
            match self {
                CannedLookup::Hangs => futures::future::pending().await,
                CannedLookup::Fails(msg) => Err(msg.to_string()),
                CannedLookup::Answers(body) => Ok(body.clone()),
            }
        }
    }

    async fn ip_position(lookup: CannedLookup) -> Result<Coordinates, LocationError> {
        IpGeolocationProvider::new(Box::new(lookup), Duration::from_millis(50))
            .current_position()
            .await
    }

    #[tokio::test]
    async fn silent_service_times_out() {
        let err = ip_position(CannedLookup::Hangs).await.unwrap_err();
        assert!(matches!(err, LocationError::Timeout(_)));
    }

    #[tokio::test]
    async fn transport_error_is_position_unavailable() {
        let err = ip_position(CannedLookup::Fails("connection refused"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LocationError::PositionUnavailable("connection refused".to_string())
        );
    }

    #[tokio::test]
    async fn unparsable_coordinates_are_position_unavailable() {
        let body = serde_json::json!({ "status": "success", "lat": "north-ish", "lon": 3.4 });
        let err = ip_position(CannedLookup::Answers(body)).await.unwrap_err();
        assert!(matches!(err, LocationError::PositionUnavailable(_)));

        let body = serde_json::json!({ "latitude": 123.0, "longitude": 3.4 });
        let err = ip_position(CannedLookup::Answers(body)).await.unwrap_err();
        assert!(matches!(err, LocationError::PositionUnavailable(_)));
    }

    #[tokio::test]
    async fn rejected_lookup_keeps_service_message() {
        let body = serde_json::json!({ "status": "fail", "message": "reserved range" });
        let err = ip_position(CannedLookup::Answers(body)).await.unwrap_err();
        assert_eq!(
            err,
            LocationError::PositionUnavailable("reserved range".to_string())
        );
    }

    #[tokio::test]
    async fn service_answers_parse_in_each_shape() {
        let ip_api = serde_json::json!({ "status": "success", "lat": 6.4541, "lon": 3.3947 });
        assert_eq!(
            ip_position(CannedLookup::Answers(ip_api)).await,
            Ok(Coordinates::new(6.4541, 3.3947))
        );

        let ipwhois = serde_json::json!({ "success": true, "latitude": "4.9757", "longitude": "8.3417" });
        assert_eq!(
            ip_position(CannedLookup::Answers(ipwhois)).await,
            Ok(Coordinates::new(4.9757, 8.3417))
        );
    }
}
