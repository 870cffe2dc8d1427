//! CLI interface for flight-tracker

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use flight_tracker::{
    book_flight, booking_link, candidate_urls, Flight, FlightClient, FlightError, SearchOutcome,
    SearchParams, SystemBrowser, TripType, BOOKING_DISCLAIMER,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flight-tracker")]
#[command(about = "Find real-time flights with Gemini and open the best booking page")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search for flights
    Search {
        /// Origin city or airport
        #[arg(short, long)]
        from: String,
        /// Destination city or airport
        #[arg(short, long)]
        to: String,
        /// Departure date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
        /// Return date for round trips (YYYY-MM-DD)
        #[arg(short, long)]
        return_date: Option<String>,
        /// Trip type (one-way, round-trip); defaults to round-trip when a return date is given
        #[arg(long)]
        trip_type: Option<String>,
        /// Number of adults
        #[arg(long, default_value = "1")]
        adults: u32,
        /// Number of children
        #[arg(long, default_value = "0")]
        children: u32,
        /// Save results (with the search) as JSON for `links` and `book`
        #[arg(short, long)]
        output: Option<String>,
        /// Print raw JSON instead of flight cards
        #[arg(long)]
        json: bool,
    },
    /// Show every booking link candidate for a saved flight, in the order they are tried
    Links {
        /// Results file written by `search --output`
        #[arg(short, long)]
        results: String,
        /// Flight number in the list (1-based)
        #[arg(short, long, default_value = "1")]
        index: usize,
    },
    /// Open the booking page for a saved flight
    Book {
        /// Results file written by `search --output`
        #[arg(short, long)]
        results: String,
        /// Flight number in the list (1-based)
        #[arg(short, long, default_value = "1")]
        index: usize,
    },
}

/// A search together with what it returned, as written by `search --output`.
#[derive(Debug, Serialize, Deserialize)]
struct SavedSearch {
    query: SearchParams,
    #[serde(flatten)]
    outcome: SearchOutcome,
}

impl SavedSearch {
    fn load(path: &str) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("{} is not a saved search", path))
    }

    fn flight(&self, index: usize) -> anyhow::Result<&Flight> {
        if index == 0 || index > self.outcome.flights.len() {
            bail!(
                "flight {} does not exist; the saved search has {} flight(s)",
                index,
                self.outcome.flights.len()
            );
        }
        Ok(&self.outcome.flights[index - 1])
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flight_tracker=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn booking_line(flight: &Flight, query: &SearchParams) -> String {
    match booking_link(flight, query) {
        Ok(url) => format!("Book: {}", url),
        Err(e) => format!("Book: unavailable. {}", e.user_message()),
    }
}

fn print_cards(search: &SavedSearch) {
    let flights = &search.outcome.flights;
    if flights.is_empty() {
        println!("No flights found for your search criteria. Try adjusting your dates or destinations.");
    }

    for (i, flight) in flights.iter().enumerate() {
        println!("\n--- Flight {} ---", i + 1);
        println!("{} {}", flight.airline, flight.flight_number);
        println!(
            "{} {} → {} {}",
            flight.origin.time, flight.origin.code, flight.destination.time, flight.destination.code
        );
        println!("{} · {}", flight.duration, flight.stops_label());
        println!("${:.2}", flight.price);
        println!("{}", booking_line(flight, &search.query));
    }

    if !search.outcome.sources.is_empty() {
        println!("\nData Sourced From:");
        for source in &search.outcome.sources {
            println!("  {} <{}>", source.title, source.uri);
        }
    }

    println!("\n{}", BOOKING_DISCLAIMER);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            from,
            to,
            date,
            return_date,
            trip_type,
            adults,
            children,
            output,
            json,
        } => {
            let trip_type = match (trip_type, &return_date) {
                (Some(trip_type), _) => trip_type.parse::<TripType>()?,
                (None, Some(_)) => TripType::RoundTrip,
                (None, None) => TripType::OneWay,
            };

            let query = SearchParams {
                origin: from,
                destination: to,
                departure_date: date,
                return_date,
                trip_type,
                adults,
                children,
            };
            query.validate()?;

            let client = FlightClient::from_env()?;

            eprintln!("Searching for the best flights...");
            let outcome = match client.get_flights(&query).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    return Err(e.into());
                }
            };

            let saved = SavedSearch { query, outcome };

            if let Some(output_file) = output {
                let json = serde_json::to_string_pretty(&saved)?;
                fs::write(&output_file, json)?;
                eprintln!("Results saved to {}", output_file);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&saved.outcome)?);
            } else {
                print_cards(&saved);
            }
        }
        Commands::Links { results, index } => {
            let saved = SavedSearch::load(&results)?;
            let flight = saved.flight(index)?;

            println!("{}", flight.label());
            for (i, candidate) in candidate_urls(flight, &saved.query).iter().enumerate() {
                println!("{}. [{}] {}", i + 1, candidate.strategy, candidate.url);
            }
        }
        Commands::Book { results, index } => {
            if !Path::new(&results).exists() {
                bail!("results file {} not found; run `search --output {}` first", results, results);
            }
            let saved = SavedSearch::load(&results)?;
            let flight = saved.flight(index)?;

            match book_flight(flight, &saved.query, SystemBrowser::new()) {
                Ok(resolution) if resolution.outcome.is_opened() => {
                    println!("Opened {} ({})", resolution.url, resolution.strategy);
                }
                Ok(resolution) => {
                    // Every launch attempt failed; the link is still useful to the user
                    println!("Could not open a browser. Open this link manually:\n{}", resolution.url);
                }
                Err(e @ FlightError::MissingDepartureDate(_)) => {
                    eprintln!("{}", e.user_message());
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
