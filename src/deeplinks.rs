//! Booking link resolution
//!
//! AI-sourced flight records are often incomplete or wrong, so there is no
//! single "booking URL". Instead each [`BookingStrategy`] is a pure builder
//! that either produces a candidate URL or declines, and
//! [`BookingLinkResolver`] tries them in priority order:
//!
//! 1. a deep link for airlines with a predictable search URL (flyadeal)
//! 2. the `bookingUrl` the model supplied, if it is an absolute http(s) URL
//! 3. a Google Flights deep link for the route and date, filtered to the flight
//! 4. a plain Google Flights search, which is always available

use crate::browser::{NavigationOutcome, Navigator};
use crate::{Flight, SearchParams};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

pub const GOOGLE_FLIGHTS_URL: &str = "https://www.google.com/travel/flights";

/// Airline whose booking site accepts a pre-filled search in the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirlineDeepLink {
    /// Lowercase brand string matched against the airline name.
    pub brand: &'static str,
    /// IATA carrier designator.
    pub carrier_code: &'static str,
    pub base_url: &'static str,
}

pub const KNOWN_AIRLINES: &[AirlineDeepLink] = &[AirlineDeepLink {
    brand: "flyadeal",
    carrier_code: "F3",
    base_url: "https://www.flyadeal.com/en/select-flight",
}];

/// Finds the known airline an offer belongs to, by name or carrier code.
pub fn match_airline(flight: &Flight) -> Option<&'static AirlineDeepLink> {
    let name = flight.airline.to_lowercase();
    let code = flight.carrier().map(str::to_uppercase);

    KNOWN_AIRLINES.iter().find(|airline| {
        name.contains(airline.brand) || code.as_deref() == Some(airline.carrier_code)
    })
}

/// Ways of producing a booking URL, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStrategy {
    AirlineDeepLink,
    ProvidedUrl,
    GoogleFlightsDeepLink,
    GoogleFlightsSearch,
}

impl BookingStrategy {
    /// Strategies that may decline. [`BookingStrategy::GoogleFlightsSearch`]
    /// always follows them.
    pub const CHAIN: [BookingStrategy; 3] = [
        BookingStrategy::AirlineDeepLink,
        BookingStrategy::ProvidedUrl,
        BookingStrategy::GoogleFlightsDeepLink,
    ];

    /// Builds this strategy's URL, or `None` when its precondition is not met.
    pub fn candidate(self, flight: &Flight, params: &SearchParams) -> Option<String> {
        match self {
            BookingStrategy::AirlineDeepLink => airline_deep_link(flight, params),
            BookingStrategy::ProvidedUrl => provided_booking_url(flight),
            BookingStrategy::GoogleFlightsDeepLink => google_flights_deep_link(flight),
            BookingStrategy::GoogleFlightsSearch => Some(google_flights_search_url(flight)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStrategy::AirlineDeepLink => "airline_deep_link",
            BookingStrategy::ProvidedUrl => "provided_url",
            BookingStrategy::GoogleFlightsDeepLink => "google_flights_deep_link",
            BookingStrategy::GoogleFlightsSearch => "google_flights_search",
        }
    }
}

impl fmt::Display for BookingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingCandidate {
    pub strategy: BookingStrategy,
    pub url: String,
}

/// Airline search page pre-filled with route, date and passengers.
pub fn airline_deep_link(flight: &Flight, params: &SearchParams) -> Option<String> {
    let airline = match_airline(flight)?;
    let origin = flight.origin.iata()?;
    let destination = flight.destination.iata()?;
    let date = flight.travel_date()?;

    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("o1", &origin.to_uppercase())
        .append_pair("d1", &destination.to_uppercase())
        .append_pair("dd1", date)
        .append_pair("adt", &params.adults.to_string())
        .append_pair("chd", &params.children.to_string())
        .append_pair("inf", "0")
        .append_pair("cc", "");

    if let Some(return_date) = params.return_leg() {
        query.append_pair("dd2", return_date);
    }

    Some(format!("{}?{}", airline.base_url, query.finish()))
}

/// The model's own `bookingUrl`, unchanged, when it starts with `http://` or
/// `https://` (lowercase, no leading whitespace) and parses with a host.
pub fn provided_booking_url(flight: &Flight) -> Option<String> {
    let raw = flight.booking_url.as_str();
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        if !raw.is_empty() {
            debug!(booking_url = raw, "Ignoring booking URL that is not absolute http(s)");
        }
        return None;
    }

    match Url::parse(raw) {
        Ok(url) if url.has_host() => Some(flight.booking_url.clone()),
        Ok(_) => {
            debug!(booking_url = raw, "Ignoring booking URL without a host");
            None
        }
        Err(e) => {
            debug!(error = %e, booking_url = raw, "Ignoring malformed booking URL");
            None
        }
    }
}

/// Google Flights results for the route and date, narrowed to the flight when possible.
pub fn google_flights_deep_link(flight: &Flight) -> Option<String> {
    let origin = flight.origin.iata()?;
    let destination = flight.destination.iata()?;
    let date = flight.travel_date()?;

    let mut url = Url::parse(GOOGLE_FLIGHTS_URL).ok()?;
    url.path_segments_mut()
        .ok()?
        .extend([origin, destination, "d", date]);

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("hl", "en");
        if let Some(filter) = flight_filter(flight) {
            query.append_pair("flt", &filter);
        }
    }

    Some(url.into())
}

/// `CARRIER.NUMBER` filter for a single-leg flight.
///
/// With stops the flight number only names the first leg, and filtering on it
/// hides the itinerary the user picked, so no filter is produced.
fn flight_filter(flight: &Flight) -> Option<String> {
    let carrier = flight.carrier()?.to_uppercase();
    let number = flight.flight_number.trim();
    if number.is_empty() {
        return None;
    }
    if flight.stops > 0 {
        debug!(stops = flight.stops, "Skipping flight filter for multi-leg itinerary");
        return None;
    }

    // "F3 123" and "F3123" both mean flight 123
    let number = match number.get(..carrier.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(&carrier) => {
            let rest = number[carrier.len()..].trim_start_matches([' ', '-']);
            if rest.starts_with(|c: char| c.is_ascii_digit()) {
                rest
            } else {
                number
            }
        }
        _ => number,
    };

    Some(format!("{}.{}", carrier, number))
}

/// Natural-language Google Flights search. Missing fields become empty strings.
pub fn google_flights_search_url(flight: &Flight) -> String {
    let query = format!(
        "Flights from {} to {} on {}",
        flight.origin.code.trim(),
        flight.destination.code.trim(),
        flight.departure_date.as_deref().unwrap_or("").trim()
    );

    let encoded: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("q", &query)
        .finish();
    format!("{}?{}", GOOGLE_FLIGHTS_URL, encoded)
}

/// Every candidate for `flight` in the order they would be tried.
///
/// The last entry is always the generic search.
pub fn candidate_urls(flight: &Flight, params: &SearchParams) -> Vec<BookingCandidate> {
    let mut candidates: Vec<BookingCandidate> = BookingStrategy::CHAIN
        .iter()
        .filter_map(|&strategy| {
            strategy
                .candidate(flight, params)
                .map(|url| BookingCandidate { strategy, url })
        })
        .collect();

    candidates.push(BookingCandidate {
        strategy: BookingStrategy::GoogleFlightsSearch,
        url: google_flights_search_url(flight),
    });
    candidates
}

/// The URL that would be opened if nothing gets blocked.
pub fn preferred_booking_url(flight: &Flight, params: &SearchParams) -> String {
    BookingStrategy::CHAIN
        .iter()
        .find_map(|strategy| strategy.candidate(flight, params))
        .unwrap_or_else(|| google_flights_search_url(flight))
}

/// What happened during one resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Strategy of the last URL handed to the navigator.
    pub strategy: BookingStrategy,
    pub url: String,
    /// Always `Opened` unless the final generic search was blocked too.
    pub outcome: NavigationOutcome,
    /// Candidates that were tried and blocked, in order.
    pub blocked: Vec<BookingCandidate>,
}

/// Walks the strategy chain and opens the first URL that is not blocked.
pub struct BookingLinkResolver<N> {
    navigator: N,
}

impl<N: Navigator> BookingLinkResolver<N> {
    pub fn new(navigator: N) -> Self {
        Self { navigator }
    }

    pub fn into_inner(self) -> N {
        self.navigator
    }

    /// Opens a booking page for `flight`. Never fails: strategies that cannot
    /// build a URL are skipped, blocked ones fall through, and the generic
    /// search is attempted last no matter what.
    pub fn resolve(&mut self, flight: &Flight, params: &SearchParams) -> Resolution {
        let mut blocked = Vec::new();

        for strategy in BookingStrategy::CHAIN {
            let Some(url) = strategy.candidate(flight, params) else {
                debug!(strategy = %strategy, flight = %flight.label(), "No candidate, skipping");
                continue;
            };

            match self.navigator.open(&url) {
                NavigationOutcome::Opened => {
                    info!(strategy = %strategy, url = %url, "Opened booking page");
                    return Resolution {
                        strategy,
                        url,
                        outcome: NavigationOutcome::Opened,
                        blocked,
                    };
                }
                NavigationOutcome::Blocked => {
                    warn!(strategy = %strategy, url = %url, "Navigation blocked, trying next strategy");
                    blocked.push(BookingCandidate { strategy, url });
                }
            }
        }

        let url = google_flights_search_url(flight);
        let outcome = self.navigator.open(&url);
        match outcome {
            NavigationOutcome::Opened => {
                info!(url = %url, "Opened generic Google Flights search")
            }
            NavigationOutcome::Blocked => {
                warn!(url = %url, "Generic Google Flights search was blocked as well")
            }
        }

        Resolution {
            strategy: BookingStrategy::GoogleFlightsSearch,
            url,
            outcome,
            blocked,
        }
    }
}
