// src/mcp_server.rs

use anyhow::Result;
use flight_tracker::{
    booking_link, candidate_urls, ensure_bookable, preferred_booking_url, BookingCandidate,
    Endpoint, Flight, FlightClient, GroundingSource, SearchOutcome, SearchParams, TripType,
    BOOKING_DISCLAIMER,
};
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    schemars, tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Flight search MCP server
#[derive(Default, Clone)]
pub struct FlightServer;

impl FlightServer {
    pub fn new() -> Self {
        Self
    }

    /// Initialize logging to file; stdout carries the MCP transport
    fn init_logging() -> Result<()> {
        let log_dir = PathBuf::from("logs");
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "flight-tracker-mcp.log");

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,flight_tracker=debug"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .init();

        info!("Logging initialized - logs will be written to logs/flight-tracker-mcp.log.*");
        Ok(())
    }
}

/// Flight search parameters
#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
pub struct FlightSearchParams {
    #[schemars(description = "Origin city or airport (e.g., San Francisco, RUH)")]
    pub origin: String,
    #[schemars(description = "Destination city or airport (e.g., Tokyo, JED)")]
    pub destination: String,
    #[schemars(description = "Departure date in YYYY-MM-DD format")]
    pub departure_date: String,
    #[schemars(description = "Return date in YYYY-MM-DD format for round trips")]
    pub return_date: Option<String>,
    #[schemars(description = "Trip type: one-way or round-trip (default: round-trip when a return date is given)")]
    pub trip_type: Option<String>,
    #[schemars(description = "Number of adult passengers (default: 1)")]
    pub adults: Option<u32>,
    #[schemars(description = "Number of child passengers (default: 0)")]
    pub children: Option<u32>,
    #[schemars(description = "Maximum number of flights to return (default: 7)")]
    pub max_flights: Option<usize>,
}

/// One flight as shown by `search_flights`, to be passed back for booking links
#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
pub struct BookingFlightInfo {
    #[schemars(description = "Airline name (e.g., flyadeal)")]
    pub airline: String,
    #[schemars(description = "Flight number (e.g., F3 101)")]
    pub flight_number: Option<String>,
    #[schemars(description = "Two-letter carrier code (e.g., F3)")]
    pub carrier_code: Option<String>,
    #[schemars(description = "Origin airport code (e.g., RUH)")]
    pub origin_code: Option<String>,
    #[schemars(description = "Destination airport code (e.g., JED)")]
    pub destination_code: Option<String>,
    #[schemars(description = "Departure date in YYYY-MM-DD format")]
    pub departure_date: Option<String>,
    #[schemars(description = "Number of stops (0 for direct)")]
    pub stops: Option<u32>,
    #[schemars(description = "Booking URL reported with the flight, if any")]
    pub booking_url: Option<String>,
}

/// Booking link request parameters
#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
pub struct BookingLinkRequest {
    #[schemars(description = "The flight to book")]
    pub flight: BookingFlightInfo,
    #[schemars(description = "Return date in YYYY-MM-DD format for round trips")]
    pub return_date: Option<String>,
    #[schemars(description = "Trip type: one-way or round-trip")]
    pub trip_type: Option<String>,
    #[schemars(description = "Number of adult passengers (default: 1)")]
    pub adults: Option<u32>,
    #[schemars(description = "Number of child passengers (default: 0)")]
    pub children: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FlightInfo {
    #[serde(flatten)]
    pub flight: Flight,
    pub stops_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_unavailable: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlightSearchResult {
    pub total_flights: usize,
    pub flights: Vec<FlightInfo>,
    pub sources: Vec<GroundingSource>,
    pub disclaimer: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BookingLinkResult {
    pub preferred_url: String,
    pub candidates: Vec<BookingCandidate>,
}

#[tool(tool_box)]
impl FlightServer {
    /// Flight search grounded in Google Search
    #[tool(description = "Search for real, bookable flights between two places. Returns flights with a best-effort booking link for each, plus the web sources the data came from.")]
    async fn search_flights(
        &self,
        #[tool(aggr)] params: FlightSearchParams,
    ) -> String {
        info!(
            origin = %params.origin,
            destination = %params.destination,
            departure_date = %params.departure_date,
            return_date = params.return_date.as_deref(),
            adults = params.adults.unwrap_or(1),
            children = params.children.unwrap_or(0),
            "Flight search request received"
        );

        let max_flights = params.max_flights;
        let query = match build_search_params(params) {
            Ok(query) => query,
            Err(e) => {
                warn!("Invalid flight search request: {}", e);
                return error_json(&e);
            }
        };

        let client = match FlightClient::from_env() {
            Ok(client) => client,
            Err(e) => {
                error!("Error creating flight client: {}", e);
                return error_json(&e.to_string());
            }
        };

        match client.get_flights(&query).await {
            Ok(outcome) => {
                info!(flights_found = outcome.flights.len(), "Flight search completed successfully");
                format_flight_results_json(outcome, &query, max_flights)
            }
            Err(e) => {
                error!("Flight search failed: {}", e);
                error_json(&e.user_message())
            }
        }
    }

    /// Ordered booking link candidates for one flight
    #[tool(description = "List booking links for a specific flight in priority order: airline deep link, the flight's own booking URL, a Google Flights deep link, and a generic Google Flights search. The first entry is the preferred link.")]
    async fn get_booking_links(
        &self,
        #[tool(aggr)] params: BookingLinkRequest,
    ) -> String {
        info!(
            airline = %params.flight.airline,
            flight_number = params.flight.flight_number.as_deref(),
            "Booking link request received"
        );

        let flight = flight_from_info(params.flight);
        if let Err(e) = ensure_bookable(&flight) {
            warn!(flight = %flight.label(), "Booking link requested for flight without departure date");
            return error_json(&e.user_message());
        }

        let trip_type = match resolve_trip_type(params.trip_type.as_deref(), params.return_date.as_deref()) {
            Ok(trip_type) => trip_type,
            Err(e) => return error_json(&e),
        };

        let query = SearchParams {
            origin: flight.origin.code.clone(),
            destination: flight.destination.code.clone(),
            departure_date: flight.departure_date.clone().unwrap_or_default(),
            return_date: params.return_date,
            trip_type,
            adults: params.adults.unwrap_or(1),
            children: params.children.unwrap_or(0),
        };

        let candidates = candidate_urls(&flight, &query);
        debug!(candidates = candidates.len(), "Built booking link candidates");

        let result = BookingLinkResult {
            preferred_url: preferred_booking_url(&flight, &query),
            candidates,
        };
        serde_json::to_string_pretty(&result)
            .unwrap_or_else(|e| error_json(&format!("Failed to serialize booking links: {}", e)))
    }
}

fn error_json(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

fn resolve_trip_type(trip_type: Option<&str>, return_date: Option<&str>) -> Result<TripType, String> {
    match (trip_type, return_date) {
        (Some(trip_type), _) => trip_type.parse::<TripType>().map_err(|e| e.user_message()),
        (None, Some(date)) if !date.trim().is_empty() => Ok(TripType::RoundTrip),
        (None, _) => Ok(TripType::OneWay),
    }
}

// Helper functions for parameter conversion
fn build_search_params(params: FlightSearchParams) -> Result<SearchParams, String> {
    let trip_type = resolve_trip_type(params.trip_type.as_deref(), params.return_date.as_deref())?;

    let query = SearchParams {
        origin: params.origin,
        destination: params.destination,
        departure_date: params.departure_date,
        return_date: params.return_date,
        trip_type,
        adults: params.adults.unwrap_or(1),
        children: params.children.unwrap_or(0),
    };
    query.validate().map_err(|e| e.user_message())?;
    Ok(query)
}

fn flight_from_info(info: BookingFlightInfo) -> Flight {
    Flight {
        airline: info.airline,
        flight_number: info.flight_number.unwrap_or_default(),
        carrier_code: info.carrier_code,
        origin: Endpoint {
            code: info.origin_code.unwrap_or_default(),
            ..Endpoint::default()
        },
        destination: Endpoint {
            code: info.destination_code.unwrap_or_default(),
            ..Endpoint::default()
        },
        stops: info.stops.unwrap_or(0),
        booking_url: info.booking_url.unwrap_or_default(),
        departure_date: info.departure_date,
        ..Flight::default()
    }
}

fn format_flight_results_json(
    outcome: SearchOutcome,
    query: &SearchParams,
    max_flights: Option<usize>,
) -> String {
    if outcome.flights.is_empty() {
        return serde_json::json!({
            "total_flights": 0,
            "flights": [],
            "sources": outcome.sources,
            "message": "No flights found for your search criteria. Try adjusting your dates or destinations."
        })
        .to_string();
    }

    let limit = max_flights.unwrap_or(7);
    let flights: Vec<FlightInfo> = outcome
        .flights
        .into_iter()
        .take(limit)
        .map(|flight| {
            let (link, unavailable) = match booking_link(&flight, query) {
                Ok(url) => (Some(url), None),
                Err(e) => (None, Some(e.user_message())),
            };
            FlightInfo {
                stops_label: flight.stops_label(),
                booking_link: link,
                booking_unavailable: unavailable,
                flight,
            }
        })
        .collect();

    let search_result = FlightSearchResult {
        total_flights: flights.len(),
        flights,
        sources: outcome.sources,
        disclaimer: BOOKING_DISCLAIMER,
    };

    serde_json::to_string_pretty(&search_result)
        .unwrap_or_else(|e| error_json(&format!("Failed to serialize results: {}", e)))
}

#[tool(tool_box)]
impl ServerHandler for FlightServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("A flight search server backed by Gemini with Google Search grounding. Use search_flights to find flights and get_booking_links to get prioritized booking links for a chosen flight.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if let Err(e) = FlightServer::init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        // Continue without logging rather than failing
    }

    info!("Starting MCP Flight Server");

    let server = FlightServer::new();
    let transport = stdio();

    // SDK handles initialization, tool discovery, and message routing
    let service = server.serve(transport).await?;

    info!("MCP service started, waiting for requests");

    service.waiting().await?;

    info!("MCP service shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_params() -> FlightSearchParams {
        FlightSearchParams {
            origin: "Riyadh".to_string(),
            destination: "Jeddah".to_string(),
            departure_date: "2025-03-01".to_string(),
            return_date: None,
            trip_type: None,
            adults: None,
            children: None,
            max_flights: None,
        }
    }

    #[test]
    fn test_build_search_params_defaults() {
        let query = build_search_params(search_params()).unwrap();
        assert_eq!(query.trip_type, TripType::OneWay);
        assert_eq!(query.adults, 1);
        assert_eq!(query.children, 0);
    }

    #[test]
    fn test_return_date_implies_round_trip() {
        let mut params = search_params();
        params.return_date = Some("2025-03-08".to_string());
        let query = build_search_params(params).unwrap();
        assert_eq!(query.trip_type, TripType::RoundTrip);
        assert_eq!(query.return_leg(), Some("2025-03-08"));
    }

    #[test]
    fn test_invalid_search_is_rejected() {
        let mut params = search_params();
        params.departure_date = String::new();
        assert!(build_search_params(params).is_err());

        let mut params = search_params();
        params.trip_type = Some("multi-city".to_string());
        assert!(build_search_params(params).is_err());
    }

    #[test]
    fn test_flight_from_info() {
        let flight = flight_from_info(BookingFlightInfo {
            airline: "flyadeal".to_string(),
            flight_number: Some("F3 101".to_string()),
            carrier_code: Some("F3".to_string()),
            origin_code: Some("RUH".to_string()),
            destination_code: Some("JED".to_string()),
            departure_date: Some("2025-03-01".to_string()),
            stops: None,
            booking_url: None,
        });
        assert_eq!(flight.origin.iata(), Some("RUH"));
        assert_eq!(flight.carrier(), Some("F3"));
        assert_eq!(flight.booking_url, "");
    }

    #[test]
    fn test_format_results_adds_booking_links() {
        let outcome = SearchOutcome {
            flights: vec![
                Flight {
                    airline: "flyadeal".to_string(),
                    origin: Endpoint { code: "RUH".to_string(), ..Endpoint::default() },
                    destination: Endpoint { code: "JED".to_string(), ..Endpoint::default() },
                    departure_date: Some("2025-03-01".to_string()),
                    ..Flight::default()
                },
                Flight::default(),
            ],
            sources: vec![],
        };
        let query = SearchParams::new("Riyadh", "Jeddah", "2025-03-01");

        let json = format_flight_results_json(outcome, &query, Some(1));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_flights"], 1);
        assert_eq!(value["flights"][0]["stops_label"], "Direct");
        assert!(value["flights"][0]["booking_link"]
            .as_str()
            .unwrap()
            .starts_with("https://www.flyadeal.com/en/select-flight?o1=RUH&d1=JED"));
    }

    #[test]
    fn test_flight_without_date_has_no_booking_link() {
        let outcome = SearchOutcome {
            flights: vec![Flight {
                airline: "Saudia".to_string(),
                origin: Endpoint { code: "RUH".to_string(), ..Endpoint::default() },
                destination: Endpoint { code: "JED".to_string(), ..Endpoint::default() },
                ..Flight::default()
            }],
            sources: vec![],
        };
        let query = SearchParams::new("Riyadh", "Jeddah", "2025-03-01");

        let json = format_flight_results_json(outcome, &query, None);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["flights"][0].get("booking_link").is_none());
        assert!(value["flights"][0]["booking_unavailable"]
            .as_str()
            .unwrap()
            .contains("missing its departure date"));
    }

    #[test]
    fn test_invalid_search_message_is_bare() {
        let mut params = search_params();
        params.origin = " ".to_string();
        assert_eq!(
            build_search_params(params).unwrap_err(),
            "Please fill in Origin, Destination, and Departure Date."
        );
    }

    #[test]
    fn test_format_empty_results() {
        let json = format_flight_results_json(SearchOutcome::default(), &SearchParams::default(), None);
        assert!(json.contains("No flights found"));
    }
}
