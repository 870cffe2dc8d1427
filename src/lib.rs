//! # Flight Tracker Library
//!
//! Finds real flight options by asking Gemini (grounded in Google Search) for a
//! JSON flight list, and turns each result into a best-effort booking link.
//!
//! The booking side is deterministic: [`deeplinks`] builds an ordered list of
//! candidate URLs and [`BookingLinkResolver`] walks it through a [`Navigator`]
//! until one of them actually opens.

pub mod browser;
pub mod client;
pub mod config;
pub mod deeplinks;
pub mod prompt;

use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

// Re-export main types for convenience
pub use browser::{NavigationOutcome, Navigator, SystemBrowser};
pub use client::{FlightClient, FlightResponseParser};
pub use config::ClientConfig;
pub use deeplinks::{
    candidate_urls, preferred_booking_url, BookingCandidate, BookingLinkResolver,
    BookingStrategy, Resolution,
};
pub use prompt::build_prompt;

/// Shown next to every result list; prices come from an AI summary, not a fare engine.
pub const BOOKING_DISCLAIMER: &str = "Please verify flight details on the airline's website before booking. Prices and availability are subject to change.";

/// Error types for the flights library
#[derive(Error, Debug)]
pub enum FlightError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Gemini API returned status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Flight data parsing failed: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid search: {0}")]
    InvalidSearch(String),

    #[error("Invalid date format: {0}")]
    DateParseError(String),

    #[error("Flight {0} has no departure date")]
    MissingDepartureDate(String),
}

impl FlightError {
    /// Message suitable for showing to an end user instead of the raw error.
    pub fn user_message(&self) -> String {
        match self {
            FlightError::ParseError(_) => {
                "The flight data returned was in an unexpected format. Please try your search again."
                    .to_string()
            }
            FlightError::HttpError(_) | FlightError::ApiError { .. } => {
                "Failed to fetch real-time flight data. The AI may be experiencing heavy traffic."
                    .to_string()
            }
            FlightError::MissingDepartureDate(_) => {
                "This flight is missing its departure date, so a booking page can't be opened. Please search again."
                    .to_string()
            }
            FlightError::InvalidSearch(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Trip type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TripType {
    #[default]
    OneWay,
    RoundTrip,
}

impl FromStr for TripType {
    type Err = FlightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round-trip" | "roundtrip" => Ok(TripType::RoundTrip),
            "one-way" | "oneway" => Ok(TripType::OneWay),
            _ => Err(FlightError::InvalidSearch(format!("Invalid trip type: {}", s))),
        }
    }
}

impl fmt::Display for TripType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripType::OneWay => write!(f, "one-way"),
            TripType::RoundTrip => write!(f, "round-trip"),
        }
    }
}

/// What the user asked for. Origin and destination are free text ("San Francisco", "RUH").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<String>,
    #[serde(default)]
    pub trip_type: TripType,
    #[serde(default = "default_adults")]
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
}

fn default_adults() -> u32 {
    1
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            origin: String::new(),
            destination: String::new(),
            departure_date: String::new(),
            return_date: None,
            trip_type: TripType::OneWay,
            adults: 1,
            children: 0,
        }
    }
}

impl SearchParams {
    /// One adult, one-way.
    pub fn new(origin: &str, destination: &str, departure_date: &str) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date: departure_date.to_string(),
            ..Self::default()
        }
    }

    /// Return date that should be used for a return leg, if any.
    ///
    /// A return date left over on a one-way search is ignored.
    pub fn return_leg(&self) -> Option<&str> {
        match self.trip_type {
            TripType::RoundTrip => non_empty(self.return_date.as_deref()),
            TripType::OneWay => None,
        }
    }

    /// Checks the search form before anything is sent to the model.
    pub fn validate(&self) -> Result<(), FlightError> {
        if self.origin.trim().is_empty()
            || self.destination.trim().is_empty()
            || self.departure_date.trim().is_empty()
        {
            return Err(FlightError::InvalidSearch(
                "Please fill in Origin, Destination, and Departure Date.".to_string(),
            ));
        }

        let departure = parse_date(&self.departure_date)?;

        if let Some(return_date) = self.return_leg() {
            let return_date = parse_date(return_date)?;
            if return_date < departure {
                return Err(FlightError::InvalidSearch(format!(
                    "Return date {} is before departure date {}",
                    return_date, departure
                )));
            }
        }

        if self.adults == 0 {
            return Err(FlightError::InvalidSearch(
                "At least one adult passenger is required".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, FlightError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        FlightError::DateParseError(format!("expected YYYY-MM-DD, got {}", date))
    })
}

/// One end of a flight as the model reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    #[serde(deserialize_with = "null_as_default")]
    pub code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub time: String,
}

impl Endpoint {
    /// Airport code, if the model supplied one.
    pub fn iata(&self) -> Option<&str> {
        non_empty(Some(&self.code))
    }
}

/// A single flight offer returned by the model.
///
/// Every field is optional on the wire: a record with gaps still parses, and
/// the booking chain decides what it can do with what is there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Flight {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub airline: String,
    #[serde(deserialize_with = "null_as_default")]
    pub flight_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_code: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub origin: Endpoint,
    #[serde(deserialize_with = "null_as_default")]
    pub destination: Endpoint,
    #[serde(deserialize_with = "null_as_default")]
    pub duration: String,
    #[serde(deserialize_with = "lenient_stops")]
    pub stops: u32,
    #[serde(deserialize_with = "lenient_price")]
    pub price: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub booking_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_date: Option<String>,
}

impl Flight {
    /// Departure date in `YYYY-MM-DD` form, if present.
    pub fn travel_date(&self) -> Option<&str> {
        non_empty(self.departure_date.as_deref())
    }

    /// Two-letter carrier designator, if present.
    pub fn carrier(&self) -> Option<&str> {
        non_empty(self.carrier_code.as_deref())
    }

    pub fn stops_label(&self) -> String {
        match self.stops {
            0 => "Direct".to_string(),
            1 => "1 Stop".to_string(),
            n => format!("{} Stops", n),
        }
    }

    /// Short human label used in logs and error messages.
    pub fn label(&self) -> String {
        match (self.airline.trim(), self.flight_number.trim()) {
            ("", "") if !self.id.is_empty() => self.id.clone(),
            ("", "") => "(unnamed flight)".to_string(),
            (airline, "") => airline.to_string(),
            ("", number) => number.to_string(),
            (airline, number) => format!("{} {}", airline, number),
        }
    }
}

/// Citation the model attached to its answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    pub title: String,
}

/// Flight search result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub flights: Vec<Flight>,
    pub sources: Vec<GroundingSource>,
}

/// Trimmed, non-empty view of an optional string.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Models sometimes emit `null` where a string or number belongs.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Text field that may arrive as a number (`"id": 1`).
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(D::Error::custom(format!("expected text, got {}", other))),
    }
}

/// Price as a number or as text such as `"$1,234.56"` or `"USD 89"`.
fn lenient_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom(format!("price {} out of range", n))),
        Some(Value::String(s)) => parse_amount(&s)
            .ok_or_else(|| D::Error::custom(format!("price {:?} is not a number", s))),
        Some(other) => Err(D::Error::custom(format!("expected a price, got {}", other))),
    }
}

/// Stop count as a number, a numeric string, or `"Direct"`/`"Nonstop"`.
fn lenient_stops<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid stop count {}", n))),
        Some(Value::String(s)) => {
            let text = s.trim().to_lowercase();
            if text.is_empty() || text == "direct" || text == "nonstop" || text == "non-stop" {
                return Ok(0);
            }
            text.split_whitespace()
                .next()
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| D::Error::custom(format!("invalid stop count {:?}", s)))
        }
        Some(other) => Err(D::Error::custom(format!("expected a stop count, got {}", other))),
    }
}

/// Numeric part of a money string; currency symbols, codes and separators are ignored.
fn parse_amount(text: &str) -> Option<f64> {
    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().ok()
}

/// Main public API function: search flights with configuration from the environment
pub async fn get_flights(params: &SearchParams) -> Result<SearchOutcome, FlightError> {
    params.validate()?;
    let client = FlightClient::from_env()?;
    client.get_flights(params).await
}

/// Rejects flights that cannot be booked because they carry no departure date.
pub fn ensure_bookable(flight: &Flight) -> Result<(), FlightError> {
    if flight.travel_date().is_none() {
        warn!(flight = %flight.label(), "Flight has no departure date, no booking link");
        return Err(FlightError::MissingDepartureDate(flight.label()));
    }
    Ok(())
}

/// Link shown next to a search result; same guard as [`book_flight`].
pub fn booking_link(flight: &Flight, params: &SearchParams) -> Result<String, FlightError> {
    ensure_bookable(flight)?;
    Ok(preferred_booking_url(flight, params))
}

/// Opens the best booking page for `flight` through `navigator`.
///
/// A flight without a departure date cannot be resolved to anything useful, so
/// it is rejected here and the navigator is never touched.
pub fn book_flight<N: Navigator>(
    flight: &Flight,
    params: &SearchParams,
    navigator: N,
) -> Result<Resolution, FlightError> {
    ensure_bookable(flight)?;

    let resolution = BookingLinkResolver::new(navigator).resolve(flight, params);
    info!(
        flight = %flight.label(),
        strategy = %resolution.strategy,
        outcome = ?resolution.outcome,
        "Booking navigation finished"
    );
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_type_parsing() {
        assert!(matches!("round-trip".parse::<TripType>(), Ok(TripType::RoundTrip)));
        assert!(matches!("RoundTrip".parse::<TripType>(), Ok(TripType::RoundTrip)));
        assert!(matches!("one-way".parse::<TripType>(), Ok(TripType::OneWay)));
        assert!("multi-city".parse::<TripType>().is_err());
        assert_eq!(TripType::RoundTrip.to_string(), "round-trip");
    }

    #[test]
    fn test_search_params_default() {
        let params = SearchParams::new("SFO", "NRT", "2025-10-26");
        assert_eq!(params.adults, 1);
        assert_eq!(params.children, 0);
        assert_eq!(params.trip_type, TripType::OneWay);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_fields() {
        let params = SearchParams::new("SFO", "", "2025-10-26");
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("Please fill in Origin, Destination, and Departure Date."));

        let params = SearchParams::new("SFO", "NRT", "26/10/2025");
        assert!(matches!(params.validate(), Err(FlightError::DateParseError(_))));

        let mut params = SearchParams::new("SFO", "NRT", "2025-10-26");
        params.adults = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_return_before_departure() {
        let mut params = SearchParams::new("SFO", "NRT", "2025-10-26");
        params.trip_type = TripType::RoundTrip;
        params.return_date = Some("2025-10-20".to_string());
        assert!(matches!(params.validate(), Err(FlightError::InvalidSearch(_))));

        // Ignored on a one-way search
        params.trip_type = TripType::OneWay;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_return_leg() {
        let mut params = SearchParams::new("RUH", "JED", "2025-03-01");
        params.return_date = Some("2025-03-08".to_string());
        assert_eq!(params.return_leg(), None);

        params.trip_type = TripType::RoundTrip;
        assert_eq!(params.return_leg(), Some("2025-03-08"));

        params.return_date = Some("  ".to_string());
        assert_eq!(params.return_leg(), None);
    }

    #[test]
    fn test_flight_deserializes_partial_record() {
        let flight: Flight = serde_json::from_str(
            r#"{"airline": "flyadeal", "flightNumber": null, "origin": {"code": "RUH"}, "stops": null}"#,
        )
        .unwrap();
        assert_eq!(flight.airline, "flyadeal");
        assert_eq!(flight.flight_number, "");
        assert_eq!(flight.origin.iata(), Some("RUH"));
        assert_eq!(flight.destination.iata(), None);
        assert_eq!(flight.stops, 0);
        assert_eq!(flight.travel_date(), None);
    }

    #[test]
    fn test_flight_field_names_are_camel_case() {
        let flight: Flight = serde_json::from_str(
            r#"{"carrierCode": "F3", "bookingUrl": "https://www.flyadeal.com", "departureDate": "2025-03-01"}"#,
        )
        .unwrap();
        assert_eq!(flight.carrier(), Some("F3"));
        assert_eq!(flight.booking_url, "https://www.flyadeal.com");
        assert_eq!(flight.travel_date(), Some("2025-03-01"));
    }

    #[test]
    fn test_stops_label() {
        let mut flight = Flight::default();
        assert_eq!(flight.stops_label(), "Direct");
        flight.stops = 1;
        assert_eq!(flight.stops_label(), "1 Stop");
        flight.stops = 2;
        assert_eq!(flight.stops_label(), "2 Stops");
    }

    #[test]
    fn test_lenient_record_fields() {
        let flight: Flight = serde_json::from_str(
            r#"{"id": 1, "price": "$1,234.50", "stops": "1 stop", "origin": null, "destination": null}"#,
        )
        .unwrap();
        assert_eq!(flight.id, "1");
        assert_eq!(flight.price, 1234.5);
        assert_eq!(flight.stops, 1);
        assert_eq!(flight.origin, Endpoint::default());

        let flight: Flight =
            serde_json::from_str(r#"{"price": "USD 89", "stops": "Direct"}"#).unwrap();
        assert_eq!(flight.price, 89.0);
        assert_eq!(flight.stops, 0);

        let flight: Flight = serde_json::from_str(r#"{"price": 99, "stops": 2.0}"#).unwrap();
        assert_eq!(flight.price, 99.0);
        assert_eq!(flight.stops, 2);
    }

    #[test]
    fn test_unusable_fields_still_fail_the_record() {
        assert!(serde_json::from_str::<Flight>(r#"{"price": "call for price"}"#).is_err());
        assert!(serde_json::from_str::<Flight>(r#"{"stops": -1}"#).is_err());
        assert!(serde_json::from_str::<Flight>(r#"{"id": {"nested": true}}"#).is_err());
    }

    #[test]
    fn test_booking_link_requires_departure_date() {
        let params = SearchParams::new("RUH", "JED", "2025-03-01");
        let mut flight = Flight {
            airline: "Saudia".to_string(),
            origin: Endpoint { code: "RUH".to_string(), ..Endpoint::default() },
            destination: Endpoint { code: "JED".to_string(), ..Endpoint::default() },
            ..Flight::default()
        };
        assert!(matches!(
            booking_link(&flight, &params),
            Err(FlightError::MissingDepartureDate(_))
        ));

        flight.departure_date = Some("2025-03-01".to_string());
        assert_eq!(
            booking_link(&flight, &params).unwrap(),
            "https://www.google.com/travel/flights/RUH/JED/d/2025-03-01?hl=en"
        );
    }

    #[test]
    fn test_user_messages() {
        let err = FlightError::ParseError("bad json".to_string());
        assert!(err.user_message().contains("unexpected format"));

        let err = FlightError::ApiError { status: 503, message: "overloaded".to_string() };
        assert!(err.user_message().contains("heavy traffic"));

        let err = FlightError::InvalidSearch("Please fill in Origin, Destination, and Departure Date.".to_string());
        assert_eq!(err.user_message(), "Please fill in Origin, Destination, and Departure Date.");
    }
}
